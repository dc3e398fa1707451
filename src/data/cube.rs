//! The hyperspectral cube value type.

use ndarray::{Array3, ShapeBuilder};
use serde::{Deserialize, Serialize};

use crate::data::error::LoadError;
use crate::data::geo::GeoReference;
use crate::data::layout::{AxisRoles, Layout, flat_index};
use crate::data::storage::{ScalarKind, TypedStorage};

/// Descriptive metadata carried alongside the samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CubeMetadata {
    pub description: Option<String>,
    /// One name per band, empty when the source has none
    pub band_names: Vec<String>,
    /// Full width at half maximum per band, in the same unit as the wavelengths
    pub fwhm: Option<Vec<f64>>,
    /// Wavelength unit as written in the source file
    pub wavelength_units: Option<String>,
    /// ENVI bad band list; `false` marks a band to ignore
    pub bad_bands: Option<Vec<bool>>,
    /// Image coordinates of the upper-left pixel (ENVI `x start`, `y start`)
    pub pixel_start: Option<(i64, i64)>,
    /// Variable the cube was read from (MATLAB files)
    pub variable_name: Option<String>,
}

/// A three-dimensional hyperspectral cube.
///
/// `dims` are physical extents in storage order. Which axis is the channel
/// axis is decided per query by a [`Layout`]. Element `(i0, i1, i2)` lives at
/// [`flat_index`]`(dims, is_column_major, [i0, i1, i2])`; the buffer is never
/// reordered to match the other convention.
///
/// Cubes are immutable once built. Transforms produce new cubes.
#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    dims: [usize; 3],
    storage: TypedStorage,
    column_major: bool,
    wavelengths: Option<Vec<f64>>,
    geo_reference: Option<GeoReference>,
    source_format: String,
    metadata: CubeMetadata,
}

impl Cube {
    /// Create a cube, checking that every extent is positive and that the
    /// storage holds exactly `d0 * d1 * d2` elements.
    pub fn new(
        dims: [usize; 3],
        storage: TypedStorage,
        column_major: bool,
    ) -> Result<Self, LoadError> {
        if dims.contains(&0) {
            return Err(LoadError::invalid_dimensions(format!(
                "extents must be positive, got {:?}",
                dims
            )));
        }
        let expected = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| LoadError::invalid_dimensions(format!("{:?} overflows", dims)))?;
        if storage.len() != expected {
            return Err(LoadError::invalid_dimensions(format!(
                "{:?} needs {} elements, storage has {}",
                dims,
                expected,
                storage.len()
            )));
        }

        Ok(Self {
            dims,
            storage,
            column_major,
            wavelengths: None,
            geo_reference: None,
            source_format: String::new(),
            metadata: CubeMetadata::default(),
        })
    }

    /// Attach per-channel wavelengths in nanometers.
    pub fn with_wavelengths(mut self, wavelengths: Vec<f64>) -> Self {
        self.wavelengths = Some(wavelengths);
        self
    }

    pub fn with_geo_reference(mut self, geo_reference: GeoReference) -> Self {
        self.geo_reference = Some(geo_reference);
        self
    }

    pub fn with_source_format(mut self, source_format: impl Into<String>) -> Self {
        self.source_format = source_format.into();
        self
    }

    pub fn with_metadata(mut self, metadata: CubeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// New cube with the same shape, order and descriptive data but
    /// different samples. `storage` must hold the same element count.
    pub(crate) fn with_same_shape(&self, storage: TypedStorage) -> Self {
        debug_assert_eq!(storage.len(), self.storage.len());
        Self {
            dims: self.dims,
            storage,
            column_major: self.column_major,
            wavelengths: self.wavelengths.clone(),
            geo_reference: self.geo_reference.clone(),
            source_format: self.source_format.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn storage(&self) -> &TypedStorage {
        &self.storage
    }

    pub fn kind(&self) -> ScalarKind {
        self.storage.kind()
    }

    pub fn is_column_major(&self) -> bool {
        self.column_major
    }

    pub fn wavelengths(&self) -> Option<&[f64]> {
        self.wavelengths.as_deref()
    }

    pub fn geo_reference(&self) -> Option<&GeoReference> {
        self.geo_reference.as_ref()
    }

    pub fn source_format(&self) -> &str {
        &self.source_format
    }

    pub fn metadata(&self) -> &CubeMetadata {
        &self.metadata
    }

    /// Total number of elements.
    pub fn element_count(&self) -> usize {
        self.storage.len()
    }

    /// Flat storage offset of physical coordinates.
    #[inline]
    pub fn flat_index(&self, i0: usize, i1: usize, i2: usize) -> usize {
        flat_index(self.dims, self.column_major, [i0, i1, i2])
    }

    /// Value at physical coordinates.
    ///
    /// # Panics
    /// Panics if a coordinate is outside its extent.
    #[inline]
    pub fn value_at(&self, i0: usize, i1: usize, i2: usize) -> f64 {
        assert!(
            i0 < self.dims[0] && i1 < self.dims[1] && i2 < self.dims[2],
            "index ({i0}, {i1}, {i2}) out of bounds for {:?}",
            self.dims
        );
        self.storage.value_at(self.flat_index(i0, i1, i2))
    }

    /// Bounds-checked variant of [`value_at`](Self::value_at).
    pub fn get(&self, i0: usize, i1: usize, i2: usize) -> Option<f64> {
        (i0 < self.dims[0] && i1 < self.dims[1] && i2 < self.dims[2])
            .then(|| self.storage.value_at(self.flat_index(i0, i1, i2)))
    }

    pub fn resolve(&self, layout: Layout) -> AxisRoles {
        layout.resolve(self.dims)
    }

    pub fn channel_count(&self, layout: Layout) -> usize {
        self.resolve(layout).extents(self.dims).0
    }

    /// `(height, width)` under `layout`.
    pub fn spatial_size(&self, layout: Layout) -> (usize, usize) {
        let (_, height, width) = self.resolve(layout).extents(self.dims);
        (height, width)
    }

    /// Value at logical `(channel, y, x)` under `layout`.
    pub fn value_at_logical(
        &self,
        layout: Layout,
        channel: usize,
        y: usize,
        x: usize,
    ) -> Option<f64> {
        let [i0, i1, i2] = self.resolve(layout).to_physical(channel, y, x);
        self.get(i0, i1, i2)
    }

    /// All channel values of pixel `(y, x)`.
    pub fn spectrum(&self, layout: Layout, y: usize, x: usize) -> Option<Vec<f64>> {
        let roles = self.resolve(layout);
        let (channels, height, width) = roles.extents(self.dims);
        if y >= height || x >= width {
            return None;
        }
        Some(
            (0..channels)
                .map(|c| {
                    let [i0, i1, i2] = roles.to_physical(c, y, x);
                    self.storage.value_at(self.flat_index(i0, i1, i2))
                })
                .collect(),
        )
    }

    /// One channel as a row-major `height * width` plane.
    pub fn channel_plane(&self, layout: Layout, channel: usize) -> Option<Vec<f64>> {
        let roles = self.resolve(layout);
        let (channels, height, width) = roles.extents(self.dims);
        if channel >= channels {
            return None;
        }
        let mut plane = Vec::with_capacity(height * width);
        for y in 0..height {
            for x in 0..width {
                let [i0, i1, i2] = roles.to_physical(channel, y, x);
                plane.push(self.storage.value_at(self.flat_index(i0, i1, i2)));
            }
        }
        Some(plane)
    }

    /// Wavelengths, only if there is exactly one per channel under `layout`.
    pub fn wavelengths_for(&self, layout: Layout) -> Option<&[f64]> {
        let wavelengths = self.wavelengths.as_deref()?;
        let channels = self.channel_count(layout);
        if wavelengths.len() == channels {
            Some(wavelengths)
        } else {
            log::debug!(
                "{} wavelengths do not match {} channels under layout {}",
                wavelengths.len(),
                channels,
                layout
            );
            None
        }
    }

    /// Copy the samples into an `ndarray` indexed by physical coordinates,
    /// keeping the cube's memory order.
    pub fn to_array3(&self) -> Result<Array3<f64>, ndarray::ShapeError> {
        let [d0, d1, d2] = self.dims;
        Array3::from_shape_vec((d0, d1, d2).set_f(self.column_major), self.storage.to_f64_vec())
    }
}

//! Format dispatch for hyperspectral cube loading.
//!
//! The set of formats is closed: NumPy, ENVI, MATLAB and TIFF. A file is
//! routed by extension through a fixed lookup table, falling back to
//! magic-byte detection when the extension is missing or unknown.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hsiview::data::{CubeReader, Layout};
//!
//! let reader = CubeReader::new();
//! let cube = reader.load("scene.hdr")?;
//! let (height, width) = cube.spatial_size(Layout::Auto);
//! ```

use std::io::Read;
use std::path::Path;

use web_time::Instant;

use crate::config::LoaderSettings;
use crate::constants::{
    BIGTIFF_MAGIC_BE, BIGTIFF_MAGIC_LE, ENVI_MAGIC, MAT_MAGIC, NPY_MAGIC, SNIFF_LENGTH,
    TIFF_MAGIC_BE, TIFF_MAGIC_LE,
};
use crate::data::Cube;
use crate::data::error::LoadError;
use crate::data::loaders::{EnviLoader, MatLoader, NativeDecoder, NpyLoader, TiffLoader};

/// A loader for one file format.
///
/// Each format (NumPy, ENVI, MATLAB, TIFF) implements this trait to turn a
/// file on disk into a [`Cube`].
pub trait CubeLoader: Send + Sync {
    /// Unique identifier for this loader (e.g., "npy", "envi").
    fn id(&self) -> &'static str;

    /// Human-readable name for UI display.
    fn display_name(&self) -> &'static str;

    /// File extensions this loader handles (lowercase, without dots).
    fn extensions(&self) -> &'static [&'static str];

    /// Check if the leading bytes of a file look like this format.
    fn can_load(&self, data: &[u8]) -> bool;

    /// Load a cube from `path`.
    fn load_file(&self, path: &Path) -> Result<Cube, LoadError>;
}

/// The supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFormat {
    Npy,
    Envi,
    Mat,
    Tiff,
}

/// Extension lookup table (lowercase, without dots).
const EXTENSION_TABLE: &[(&str, CubeFormat)] = &[
    ("npy", CubeFormat::Npy),
    ("hdr", CubeFormat::Envi),
    ("dat", CubeFormat::Envi),
    ("img", CubeFormat::Envi),
    ("bsq", CubeFormat::Envi),
    ("bil", CubeFormat::Envi),
    ("bip", CubeFormat::Envi),
    ("raw", CubeFormat::Envi),
    ("mat", CubeFormat::Mat),
    ("tif", CubeFormat::Tiff),
    ("tiff", CubeFormat::Tiff),
];

impl CubeFormat {
    /// Get all formats.
    pub fn all() -> &'static [CubeFormat] {
        &[CubeFormat::Npy, CubeFormat::Envi, CubeFormat::Mat, CubeFormat::Tiff]
    }

    /// Look up a format by file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        EXTENSION_TABLE
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, format)| *format)
    }

    /// Detect a format from the leading bytes of a file.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(NPY_MAGIC) {
            Some(CubeFormat::Npy)
        } else if data.starts_with(MAT_MAGIC) {
            Some(CubeFormat::Mat)
        } else if [TIFF_MAGIC_LE, TIFF_MAGIC_BE, BIGTIFF_MAGIC_LE, BIGTIFF_MAGIC_BE]
            .iter()
            .any(|magic| data.starts_with(magic))
        {
            Some(CubeFormat::Tiff)
        } else if data
            .strip_prefix(b"\xEF\xBB\xBF".as_slice())
            .unwrap_or(data)
            .starts_with(ENVI_MAGIC)
        {
            Some(CubeFormat::Envi)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CubeFormat::Npy => "NumPy",
            CubeFormat::Envi => "ENVI",
            CubeFormat::Mat => "MATLAB",
            CubeFormat::Tiff => "TIFF",
        }
    }
}

/// Entry point for loading cubes from disk.
///
/// Holds one loader per format. MATLAB files need a decoder supplied with
/// [`with_mat_decoder`](Self::with_mat_decoder); TIFF has a built-in one.
pub struct CubeReader {
    npy: NpyLoader,
    envi: EnviLoader,
    mat: MatLoader,
    tiff: TiffLoader,
}

impl CubeReader {
    /// Create a reader with default settings.
    pub fn new() -> Self {
        Self::from_settings(&LoaderSettings::default())
    }

    /// Create a reader configured from loader settings.
    pub fn from_settings(settings: &LoaderSettings) -> Self {
        Self {
            npy: NpyLoader,
            envi: EnviLoader::from_settings(settings),
            mat: MatLoader::default(),
            tiff: TiffLoader::default(),
        }
    }

    /// Use `decoder` to read MATLAB files.
    pub fn with_mat_decoder(mut self, decoder: Box<dyn NativeDecoder>) -> Self {
        self.mat = MatLoader::new(decoder);
        self
    }

    /// Replace the built-in TIFF decoder.
    pub fn with_tiff_decoder(mut self, decoder: Box<dyn NativeDecoder>) -> Self {
        self.tiff = TiffLoader::new(decoder);
        self
    }

    /// Get the loader for a format.
    pub fn loader(&self, format: CubeFormat) -> &dyn CubeLoader {
        match format {
            CubeFormat::Npy => &self.npy,
            CubeFormat::Envi => &self.envi,
            CubeFormat::Mat => &self.mat,
            CubeFormat::Tiff => &self.tiff,
        }
    }

    /// Get all supported file extensions (for file filtering).
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = CubeFormat::all()
            .iter()
            .flat_map(|f| self.loader(*f).extensions().iter().copied())
            .collect();
        extensions.sort();
        extensions.dedup();
        extensions
    }

    /// Check if a filename has a supported extension.
    pub fn is_supported_file(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(CubeFormat::from_extension)
            .is_some()
    }

    /// Pick the format of `path`: by extension first, then by sniffing.
    pub fn detect_format(&self, path: &Path) -> Result<CubeFormat, LoadError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        if let Some(format) = extension.as_deref().and_then(CubeFormat::from_extension) {
            log::debug!("{:?}: {} format by extension", path, format.name());
            return Ok(format);
        }

        let mut head = Vec::with_capacity(SNIFF_LENGTH);
        std::fs::File::open(path)
            .map_err(|e| LoadError::io(path, e))?
            .take(SNIFF_LENGTH as u64)
            .read_to_end(&mut head)
            .map_err(|e| LoadError::io(path, e))?;

        match CubeFormat::detect(&head) {
            Some(format) => {
                log::debug!("{:?}: {} format by detection", path, format.name());
                Ok(format)
            }
            None => Err(LoadError::UnsupportedFormat(extension.unwrap_or_default())),
        }
    }

    /// Load a cube, choosing the loader from the file's extension or
    /// contents.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Cube, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::FileNotFound(path.to_path_buf()));
        }

        let start = Instant::now();
        let format = self.detect_format(path)?;
        let loader = self.loader(format);
        let cube = loader.load_file(path).inspect_err(|e| {
            log::trace!("Loader {} failed on {:?}: {}", loader.id(), path, e);
        })?;

        log::info!(
            "Loaded {:?} with {} loader: dims {:?}, {}, {} in {:.1?}",
            path,
            loader.id(),
            cube.dims(),
            cube.kind(),
            if cube.is_column_major() { "column-major" } else { "row-major" },
            start.elapsed()
        );

        Ok(cube)
    }
}

impl Default for CubeReader {
    fn default() -> Self {
        Self::new()
    }
}

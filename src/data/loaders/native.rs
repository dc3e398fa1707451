//! Seam for formats decoded outside this crate.
//!
//! A [`NativeDecoder`] hands back a flat buffer with its extents and element
//! kind. The buffer is owned by the decoder until [`NativeDecoder::release`]
//! runs, which [`cube_from_native`] guarantees on every exit path.

use std::path::Path;

use thiserror::Error;

use crate::data::error::LoadError;
use crate::data::storage::{ByteOrder, ScalarKind, TypedStorage};
use crate::data::{Cube, CubeMetadata};

/// Errors reported by a native decoder.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested variable is absent, or no suitable one was found
    #[error("No such variable: {0}")]
    VariableNotFound(String),

    #[error("Unsupported element type: {0}")]
    UnsupportedType(String),

    #[error("Decoder failure: {0}")]
    Failed(String),
}

impl From<DecodeError> for LoadError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Io(e) => LoadError::from(e),
            DecodeError::VariableNotFound(name) => {
                LoadError::read(format!("variable '{}' not found", name))
            }
            DecodeError::UnsupportedType(name) => LoadError::unsupported_type(name),
            DecodeError::Failed(detail) => LoadError::corrupted(detail),
        }
    }
}

/// A decoded array as produced by a native decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeArray {
    /// Element bytes in host byte order, first axis fastest
    pub data: Vec<u8>,
    /// Extents as reported; the rank is `dims.len()`
    pub dims: Vec<i64>,
    pub kind: ScalarKind,
    /// Name of the variable the array came from, if the format has names
    pub variable: Option<String>,
}

/// Shape and element kind of one array stored in a multi-array file.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub dims: Vec<i64>,
    pub kind: ScalarKind,
}

impl VariableInfo {
    /// Rank 3 with positive extents.
    pub fn is_cube(&self) -> bool {
        self.dims.len() == 3 && self.dims.iter().all(|&d| d > 0)
    }
}

/// External decoder for one file format.
pub trait NativeDecoder: Send + Sync {
    /// Short name used in logs and source format labels.
    fn name(&self) -> &'static str;

    /// Decode `path`. `variable` selects a named array in formats that hold
    /// several; `None` lets the decoder pick.
    fn decode(&self, path: &Path, variable: Option<&str>) -> Result<NativeArray, DecodeError>;

    /// Arrays stored in `path`. Formats without named arrays list none.
    fn list_variables(&self, _path: &Path) -> Result<Vec<VariableInfo>, DecodeError> {
        Ok(Vec::new())
    }

    /// Give back a buffer obtained from [`decode`](Self::decode).
    fn release(&self, array: &mut NativeArray) {
        array.data = Vec::new();
    }
}

/// Releases the held array when dropped.
struct ReleaseGuard<'a> {
    decoder: &'a dyn NativeDecoder,
    array: NativeArray,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.decoder.release(&mut self.array);
    }
}

/// Map a decoder error for `path`, keeping missing files as `FileNotFound`.
pub(crate) fn native_error(path: &Path, err: DecodeError) -> LoadError {
    match err {
        DecodeError::Io(io) => LoadError::io(path, io),
        other => other.into(),
    }
}

fn decode_guarded<'a>(
    decoder: &'a dyn NativeDecoder,
    path: &Path,
    variable: Option<&str>,
) -> Result<ReleaseGuard<'a>, LoadError> {
    Ok(ReleaseGuard {
        decoder,
        array: decoder
            .decode(path, variable)
            .map_err(|e| native_error(path, e))?,
    })
}

/// Decode `path` with `decoder` and copy the result into a column-major cube.
pub fn cube_from_native(
    decoder: &dyn NativeDecoder,
    path: &Path,
    variable: Option<&str>,
) -> Result<Cube, LoadError> {
    let guard = decode_guarded(decoder, path, variable)?;
    let array = &guard.array;

    let &[d0, d1, d2] = array.dims.as_slice() else {
        return Err(LoadError::NotA3DCube(array.dims.len()));
    };
    let dims = [d0, d1, d2].map(|d| usize::try_from(d).ok().filter(|&d| d > 0));
    let [Some(d0), Some(d1), Some(d2)] = dims else {
        return Err(LoadError::invalid_dimensions(format!(
            "{} reported extents {:?}",
            decoder.name(),
            array.dims
        )));
    };

    let count = d0
        .checked_mul(d1)
        .and_then(|n| n.checked_mul(d2))
        .ok_or_else(|| LoadError::invalid_dimensions(format!("{:?} overflows", array.dims)))?;
    let storage = TypedStorage::from_bytes(array.kind, &array.data, count, ByteOrder::native())?;

    let mut source_format = decoder.name().to_string();
    let mut metadata = CubeMetadata::default();
    if let Some(name) = &array.variable {
        source_format = format!("{} ({})", source_format, name);
        metadata.variable_name = Some(name.clone());
    }

    Ok(Cube::new([d0, d1, d2], storage, true)?
        .with_source_format(source_format)
        .with_metadata(metadata))
}

/// Decode the named variable as a vector of values, e.g. wavelengths kept
/// next to a cube. At most one extent may exceed 1.
pub fn vector_from_native(
    decoder: &dyn NativeDecoder,
    path: &Path,
    variable: &str,
) -> Result<Vec<f64>, LoadError> {
    let guard = decode_guarded(decoder, path, Some(variable))?;
    let array = &guard.array;

    let extents: Option<Vec<usize>> = array
        .dims
        .iter()
        .map(|&d| usize::try_from(d).ok().filter(|&d| d > 0))
        .collect();
    let extents = extents.filter(|e| !e.is_empty()).ok_or_else(|| {
        LoadError::invalid_dimensions(format!("'{}' has extents {:?}", variable, array.dims))
    })?;
    if extents.iter().filter(|&&d| d > 1).count() > 1 {
        return Err(LoadError::invalid_dimensions(format!(
            "'{}' with extents {:?} is not a vector",
            variable, array.dims
        )));
    }

    let count = extents.iter().product();
    let storage = TypedStorage::from_bytes(array.kind, &array.data, count, ByteOrder::native())?;
    Ok(storage.to_f64_vec())
}

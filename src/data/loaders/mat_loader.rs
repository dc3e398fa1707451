//! MATLAB `.mat` loading through an injected decoder.

use std::path::Path;

use crate::constants::MAT_MAGIC;
use crate::data::Cube;
use crate::data::error::LoadError;
use crate::data::loader::CubeLoader;
use crate::data::loaders::native::{
    NativeDecoder, VariableInfo, cube_from_native, native_error, vector_from_native,
};

/// Loader for MATLAB files.
///
/// MAT-file parsing lives outside this crate. Without a decoder every load
/// fails with [`LoadError::UnsupportedFormat`].
#[derive(Default)]
pub struct MatLoader {
    decoder: Option<Box<dyn NativeDecoder>>,
}

impl MatLoader {
    pub fn new(decoder: Box<dyn NativeDecoder>) -> Self {
        Self {
            decoder: Some(decoder),
        }
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Load one named variable instead of the decoder's pick.
    pub fn load_variable(&self, path: &Path, variable: &str) -> Result<Cube, LoadError> {
        cube_from_native(self.decoder()?, path, Some(variable))
    }

    /// Variables in `path` that can be loaded as cubes.
    pub fn list_variables(&self, path: &Path) -> Result<Vec<VariableInfo>, LoadError> {
        let variables = self
            .decoder()?
            .list_variables(path)
            .map_err(|e| native_error(path, e))?;
        Ok(variables.into_iter().filter(VariableInfo::is_cube).collect())
    }

    /// Load a cube together with the wavelength vector stored in the same
    /// file under `wavelengths`.
    ///
    /// A vector whose length matches no extent of the cube is dropped with a
    /// warning.
    pub fn load_with_wavelengths(
        &self,
        path: &Path,
        variable: Option<&str>,
        wavelengths: &str,
    ) -> Result<Cube, LoadError> {
        let decoder = self.decoder()?;
        let cube = cube_from_native(decoder, path, variable)?;
        let values = vector_from_native(decoder, path, wavelengths)?;

        if cube.dims().contains(&values.len()) {
            Ok(cube.with_wavelengths(values))
        } else {
            log::warn!(
                "Dropping {} wavelengths from '{}' for a {:?} cube",
                values.len(),
                wavelengths,
                cube.dims()
            );
            Ok(cube)
        }
    }

    fn decoder(&self) -> Result<&dyn NativeDecoder, LoadError> {
        self.decoder.as_deref().ok_or_else(|| {
            log::warn!("No MATLAB decoder configured");
            LoadError::UnsupportedFormat("mat".to_string())
        })
    }
}

impl CubeLoader for MatLoader {
    fn id(&self) -> &'static str {
        "mat"
    }

    fn display_name(&self) -> &'static str {
        "MATLAB (.mat)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["mat"]
    }

    fn can_load(&self, data: &[u8]) -> bool {
        data.starts_with(MAT_MAGIC)
    }

    fn load_file(&self, path: &Path) -> Result<Cube, LoadError> {
        cube_from_native(self.decoder()?, path, None)
    }
}

//! hsiview - hyperspectral cube loading and normalization
//!
//! Reads NumPy, ENVI, MATLAB and TIFF files into a single immutable
//! [`Cube`] type and provides the intensity transforms used to view them.

pub mod config;
pub mod constants;
pub mod data;
pub mod transform;

pub use config::CoreConfig;
pub use data::{Cube, CubeReader, Layout, LoadError};
pub use transform::{Normalization, NormalizationMethod, convert_type, normalize};

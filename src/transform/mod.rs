//! Cube-to-cube transforms.
//!
//! All transforms are pure: they read a [`Cube`](crate::data::Cube) and
//! build a new one with the same shape, memory order, wavelengths and
//! geo-reference. A degenerate input (no spread) gives `None`.

mod convert;
mod normalize;
pub mod stats;

pub use convert::{ConversionMode, convert_type};
pub use normalize::{Normalization, NormalizationMethod, NormalizationScope, normalize};

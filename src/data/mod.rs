//! Hyperspectral cube data model and file loaders.
//!
//! This module provides:
//! - [`Cube`]: an immutable 3D array with typed storage and an order flag
//! - [`Layout`]: views of the physical axes as channel, height and width
//! - [`CubeReader`]: format dispatch over the built-in loaders
//!
//! ## Loading a file
//!
//! ```rust,ignore
//! use hsiview::data::{CubeReader, Layout};
//!
//! let cube = CubeReader::new().load("scene.npy")?;
//! let spectrum = cube.spectrum(Layout::Auto, 10, 20);
//! ```

mod cube;
mod error;
mod geo;
mod layout;
mod loader;
pub mod loaders;
mod storage;

pub use cube::{Cube, CubeMetadata};
pub use error::LoadError;
pub use geo::{GeoReference, Hemisphere};
pub use layout::{AxisRoles, Layout, flat_index, unravel_index};
pub use loader::{CubeFormat, CubeLoader, CubeReader};
pub use storage::{ByteOrder, Scalar, ScalarKind, TypedStorage, read_elements};

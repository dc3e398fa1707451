//! Built-in cube loaders, one per supported format.
//!
//! NumPy and ENVI are parsed here. MATLAB and TIFF go through the
//! [`NativeDecoder`] seam; TIFF ships with a decoder, MATLAB needs one
//! supplied by the caller.

pub mod envi_header;
mod envi_loader;
mod mat_loader;
pub mod native;
mod npy_loader;
mod tiff_loader;

pub use envi_header::{EnviHeader, Interleave};
pub use envi_loader::EnviLoader;
pub use mat_loader::MatLoader;
pub use native::{
    DecodeError, NativeArray, NativeDecoder, VariableInfo, cube_from_native, vector_from_native,
};
pub use npy_loader::{NpyHeader, NpyLoader};
pub use tiff_loader::{TiffDecoder, TiffLoader};

//! Global constants for the cube core

/// Magic bytes opening every NumPy `.npy` file.
pub const NPY_MAGIC: &[u8] = &[0x93, b'N', b'U', b'M', b'P', b'Y'];

/// Text opening a MATLAB level-5 MAT-file header.
pub const MAT_MAGIC: &[u8] = b"MATLAB 5.0 MAT-file";

/// First line of an ENVI header.
pub const ENVI_MAGIC: &[u8] = b"ENVI";

/// TIFF byte-order marks with the version word.
pub const TIFF_MAGIC_LE: &[u8] = &[0x49, 0x49, 0x2A, 0x00];
pub const TIFF_MAGIC_BE: &[u8] = &[0x4D, 0x4D, 0x00, 0x2A];

/// BigTIFF variants.
pub const BIGTIFF_MAGIC_LE: &[u8] = &[0x49, 0x49, 0x2B, 0x00];
pub const BIGTIFF_MAGIC_BE: &[u8] = &[0x4D, 0x4D, 0x00, 0x2B];

/// Extension of ENVI header files.
pub const ENVI_HEADER_EXTENSION: &str = "hdr";

/// Binary payload extensions probed next to an ENVI header, in order.
pub const ENVI_DATA_EXTENSIONS: &[&str] = &["dat", "img", "bsq", "bil", "bip", "raw"];

/// Bytes read from the start of a file for format sniffing.
pub const SNIFF_LENGTH: usize = 64;

/// Default percentile bounds for percentile-clip normalization.
pub const DEFAULT_PERCENTILE_LOWER: f64 = 2.0;
pub const DEFAULT_PERCENTILE_UPPER: f64 = 98.0;

//! TIFF loading.
//!
//! The built-in [`TiffDecoder`] reads every page and every sample of a TIFF
//! and stacks them as channels of an `(H, W, C)` column-major array.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tiff::decoder::{ChunkType, Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::constants::{BIGTIFF_MAGIC_BE, BIGTIFF_MAGIC_LE, TIFF_MAGIC_BE, TIFF_MAGIC_LE};
use crate::data::Cube;
use crate::data::error::LoadError;
use crate::data::loader::CubeLoader;
use crate::data::loaders::native::{DecodeError, NativeArray, NativeDecoder, cube_from_native};
use crate::data::storage::ScalarKind;

/// `PlanarConfiguration` value for one plane per sample.
const PLANAR_SEPARATE: u32 = 2;

/// Decoder backed by the `tiff` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiffDecoder;

/// One decoded page, converted to column-major `(H, W, samples)`.
struct Page {
    kind: ScalarKind,
    samples: usize,
    bytes: Vec<u8>,
}

impl TiffDecoder {
    fn read_page<R: Read + Seek>(
        decoder: &mut Decoder<R>,
        width: usize,
        height: usize,
    ) -> Result<Page, DecodeError> {
        let planar = decoder
            .get_tag_u32(Tag::PlanarConfiguration)
            .is_ok_and(|v| v == PLANAR_SEPARATE);
        let image = if planar {
            Self::read_planes(decoder)?
        } else {
            decoder.read_image().map_err(tiff_error)?
        };

        let (kind, samples, bytes) = match image {
            DecodingResult::U8(v) => reorder(ScalarKind::U8, &v, width, height, planar)?,
            DecodingResult::U16(v) => reorder(ScalarKind::U16, &v, width, height, planar)?,
            DecodingResult::U32(v) => reorder(ScalarKind::U32, &v, width, height, planar)?,
            DecodingResult::U64(v) => reorder(ScalarKind::U64, &v, width, height, planar)?,
            DecodingResult::I8(v) => reorder(ScalarKind::I8, &v, width, height, planar)?,
            DecodingResult::I16(v) => reorder(ScalarKind::I16, &v, width, height, planar)?,
            DecodingResult::I32(v) => reorder(ScalarKind::I32, &v, width, height, planar)?,
            DecodingResult::I64(v) => reorder(ScalarKind::I64, &v, width, height, planar)?,
            DecodingResult::F32(v) => reorder(ScalarKind::F32, &v, width, height, planar)?,
            DecodingResult::F64(v) => reorder(ScalarKind::F64, &v, width, height, planar)?,
            _ => return Err(DecodeError::UnsupportedType("TIFF sample format".to_string())),
        };
        Ok(Page {
            kind,
            samples,
            bytes,
        })
    }

    /// Read every strip of a planar-separate page, plane after plane.
    ///
    /// `read_image` stops after the first plane of such pages.
    fn read_planes<R: Read + Seek>(
        decoder: &mut Decoder<R>,
    ) -> Result<DecodingResult, DecodeError> {
        if decoder.get_chunk_type() != ChunkType::Strip {
            return Err(DecodeError::UnsupportedType("tiled planar-separate TIFF".to_string()));
        }
        let strips = decoder.strip_count().map_err(tiff_error)?;

        let mut planes: Option<DecodingResult> = None;
        for strip in 0..strips {
            let chunk = decoder.read_chunk(strip).map_err(tiff_error)?;
            planes = Some(match planes {
                None => chunk,
                Some(head) => append(head, chunk)?,
            });
        }
        planes.ok_or_else(|| DecodeError::Failed("planar page has no strips".to_string()))
    }
}

/// Concatenate two decoded strips of the same sample type.
fn append(head: DecodingResult, tail: DecodingResult) -> Result<DecodingResult, DecodeError> {
    macro_rules! join {
        ($($variant:ident),*) => {
            match (head, tail) {
                $((DecodingResult::$variant(mut a), DecodingResult::$variant(b)) => {
                    a.extend(b);
                    Ok(DecodingResult::$variant(a))
                })*
                _ => Err(DecodeError::Failed("strips differ in sample type".to_string())),
            }
        };
    }
    join!(U8, U16, U32, U64, I8, I16, I32, I64, F32, F64)
}

/// Reorder one page from TIFF order into column-major `(H, W, samples)`
/// host-endian bytes.
fn reorder<T: bytemuck::Pod>(
    kind: ScalarKind,
    values: &[T],
    width: usize,
    height: usize,
    planar: bool,
) -> Result<(ScalarKind, usize, Vec<u8>), DecodeError> {
    let plane = width * height;
    if plane == 0 || values.len() % plane != 0 {
        return Err(DecodeError::Failed(format!(
            "{} samples do not fill a {}x{} page",
            values.len(),
            width,
            height
        )));
    }
    let samples = values.len() / plane;

    let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); values.len()];
    for row in 0..height {
        for col in 0..width {
            for s in 0..samples {
                let src = if planar {
                    s * plane + row * width + col
                } else {
                    (row * width + col) * samples + s
                };
                out[row + height * (col + width * s)] = values[src];
            }
        }
    }
    Ok((kind, samples, bytemuck::cast_slice(&out).to_vec()))
}

fn tiff_error(err: tiff::TiffError) -> DecodeError {
    match err {
        tiff::TiffError::IoError(e) => DecodeError::Io(e),
        tiff::TiffError::UnsupportedError(e) => DecodeError::UnsupportedType(e.to_string()),
        other => DecodeError::Failed(other.to_string()),
    }
}

impl NativeDecoder for TiffDecoder {
    fn name(&self) -> &'static str {
        "TIFF"
    }

    fn decode(&self, path: &Path, _variable: Option<&str>) -> Result<NativeArray, DecodeError> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(tiff_error)?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(tiff_error)?;
        let (width, height) = (width as usize, height as usize);

        let mut kind = None;
        let mut channels = 0usize;
        let mut data = Vec::new();
        loop {
            let page_size = decoder.dimensions().map_err(tiff_error)?;
            if page_size != (width as u32, height as u32) {
                return Err(DecodeError::Failed(format!(
                    "page {}x{} differs from first page {}x{}",
                    page_size.0, page_size.1, width, height
                )));
            }

            let page = Self::read_page(&mut decoder, width, height)?;
            match kind {
                None => kind = Some(page.kind),
                Some(k) if k != page.kind => {
                    return Err(DecodeError::UnsupportedType(format!(
                        "pages mix {} and {}",
                        k, page.kind
                    )));
                }
                Some(_) => {}
            }
            // Column-major with channel slowest: pages append.
            data.extend_from_slice(&page.bytes);
            channels += page.samples;

            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(tiff_error)?;
        }

        let kind = kind.ok_or_else(|| DecodeError::Failed("TIFF has no pages".to_string()))?;
        log::debug!(
            "TiffDecoder: {}x{} with {} channels of {}",
            height,
            width,
            channels,
            kind
        );

        Ok(NativeArray {
            data,
            dims: vec![height as i64, width as i64, channels as i64],
            kind,
            variable: None,
        })
    }
}

/// Loader for TIFF files.
pub struct TiffLoader {
    decoder: Box<dyn NativeDecoder>,
}

impl TiffLoader {
    pub fn new(decoder: Box<dyn NativeDecoder>) -> Self {
        Self { decoder }
    }
}

impl Default for TiffLoader {
    fn default() -> Self {
        Self::new(Box::new(TiffDecoder))
    }
}

impl CubeLoader for TiffLoader {
    fn id(&self) -> &'static str {
        "tiff"
    }

    fn display_name(&self) -> &'static str {
        "TIFF (.tif, .tiff)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["tif", "tiff"]
    }

    fn can_load(&self, data: &[u8]) -> bool {
        [TIFF_MAGIC_LE, TIFF_MAGIC_BE, BIGTIFF_MAGIC_LE, BIGTIFF_MAGIC_BE]
            .iter()
            .any(|magic| data.starts_with(magic))
    }

    fn load_file(&self, path: &Path) -> Result<Cube, LoadError> {
        cube_from_native(self.decoder.as_ref(), path, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Layout;
    use tiff::encoder::{TiffEncoder, colortype};

    #[test]
    fn test_reorder_chunky_and_planar() {
        // 2x1 pixels, 2 samples: chunky order is p0s0 p0s1 p1s0 p1s1
        let (_, samples, bytes) =
            reorder(ScalarKind::U8, &[1u8, 2, 3, 4], 2, 1, false).expect("fits");
        assert_eq!(samples, 2);
        assert_eq!(bytes, vec![1, 3, 2, 4]);

        let (_, _, bytes) = reorder(ScalarKind::U8, &[1u8, 3, 2, 4], 2, 1, true).expect("fits");
        assert_eq!(bytes, vec![1, 3, 2, 4]);

        assert!(reorder(ScalarKind::U8, &[1u8, 2, 3], 2, 1, false).is_err());
    }

    #[test]
    fn test_multi_page_rgb() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("stack.tif");
        let (width, height) = (3u32, 2u32);
        // value = 100 * page + 10 * pixel + sample
        let page = |p: u8| -> Vec<u8> {
            (0..(width * height) as u8)
                .flat_map(|px| (0..3u8).map(move |s| 100 * p + 10 * px + s))
                .collect()
        };
        {
            let file = File::create(&path).expect("create");
            let mut encoder = TiffEncoder::new(file).expect("encoder");
            encoder
                .write_image::<colortype::RGB8>(width, height, &page(0))
                .expect("page 0");
            encoder
                .write_image::<colortype::RGB8>(width, height, &page(1))
                .expect("page 1");
        }

        let cube = TiffLoader::default().load_file(&path).expect("valid tiff");
        assert_eq!(cube.dims(), [2, 3, 6]);
        assert!(cube.is_column_major());
        assert_eq!(cube.kind(), ScalarKind::U8);
        assert_eq!(cube.channel_count(Layout::Auto), 2);
        assert_eq!(cube.channel_count(Layout::Hwc), 6);

        // row 1, col 2 is pixel 5
        assert_eq!(cube.value_at(1, 2, 0), 50.0);
        assert_eq!(cube.value_at(1, 2, 2), 52.0);
        assert_eq!(cube.value_at(1, 2, 4), 151.0);
        assert_eq!(cube.value_at(0, 1, 3), 110.0);
    }

    #[test]
    fn test_gray16() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("gray.tiff");
        let data: Vec<u16> = vec![0, 1000, 2000, 65535];
        {
            let file = File::create(&path).expect("create");
            let mut encoder = TiffEncoder::new(file).expect("encoder");
            encoder
                .write_image::<colortype::Gray16>(2, 2, &data)
                .expect("write");
        }

        let cube = TiffLoader::default().load_file(&path).expect("valid tiff");
        assert_eq!(cube.dims(), [2, 2, 1]);
        assert_eq!(cube.kind(), ScalarKind::U16);
        assert_eq!(cube.value_at(0, 1, 0), 1000.0);
        assert_eq!(cube.value_at(1, 0, 0), 2000.0);
        assert_eq!(cube.value_at(1, 1, 0), 65535.0);
    }

    #[test]
    fn test_missing_file() {
        let err = TiffLoader::default()
            .load_file(Path::new("/no/such/file.tif"))
            .expect_err("missing");
        assert!(matches!(err, LoadError::FileNotFound(_)));
    }

    fn push_entry(out: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: u32) {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&field_type.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        // SHORT values sit left-justified, which matches a little-endian LONG
        out.extend_from_slice(&value.to_le_bytes());
    }

    /// Little-endian uncompressed 8-bit RGB, planar-separate, one row per
    /// strip. Each plane is given row by row.
    fn planar_rgb8(width: u32, height: u32, planes: [&[u8]; 3]) -> Vec<u8> {
        const SHORT: u16 = 3;
        const LONG: u16 = 4;
        let entries = 10u16;
        let strips = 3 * height;
        let offsets_at = 8 + 2 + 12 * u32::from(entries) + 4;
        let counts_at = offsets_at + 4 * strips;
        let data_at = counts_at + 4 * strips;

        let mut out = TIFF_MAGIC_LE.to_vec();
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend_from_slice(&entries.to_le_bytes());
        push_entry(&mut out, 256, SHORT, 1, width);
        push_entry(&mut out, 257, SHORT, 1, height);
        push_entry(&mut out, 258, SHORT, 1, 8);
        push_entry(&mut out, 259, SHORT, 1, 1);
        push_entry(&mut out, 262, SHORT, 1, 2);
        push_entry(&mut out, 273, LONG, strips, offsets_at);
        push_entry(&mut out, 277, SHORT, 1, 3);
        push_entry(&mut out, 278, LONG, 1, 1);
        push_entry(&mut out, 279, LONG, strips, counts_at);
        push_entry(&mut out, 284, SHORT, 1, PLANAR_SEPARATE);
        out.extend_from_slice(&0u32.to_le_bytes());

        for strip in 0..strips {
            out.extend_from_slice(&(data_at + strip * width).to_le_bytes());
        }
        for _ in 0..strips {
            out.extend_from_slice(&width.to_le_bytes());
        }
        for plane in planes {
            out.extend_from_slice(plane);
        }
        out
    }

    #[test]
    fn test_planar_separate_keeps_every_plane() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("planar.tif");
        std::fs::write(&path, planar_rgb8(2, 1, [&[1u8, 2], &[3u8, 4], &[5u8, 6]])).expect("write");

        let cube = TiffLoader::default().load_file(&path).expect("valid tiff");
        assert_eq!(cube.dims(), [1, 2, 3]);
        assert!(cube.is_column_major());
        assert_eq!(cube.value_at(0, 0, 0), 1.0);
        assert_eq!(cube.value_at(0, 1, 1), 4.0);
        assert_eq!(cube.value_at(0, 1, 2), 6.0);
    }

    #[test]
    fn test_planar_separate_multiple_strips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("planar.tiff");
        let red: [u8; 4] = [1, 2, 3, 4];
        let green: [u8; 4] = [11, 12, 13, 14];
        let blue: [u8; 4] = [21, 22, 23, 24];
        std::fs::write(&path, planar_rgb8(2, 2, [&red, &green, &blue])).expect("write");

        let cube = TiffLoader::default().load_file(&path).expect("valid tiff");
        assert_eq!(cube.dims(), [2, 2, 3]);
        assert_eq!(cube.kind(), ScalarKind::U8);
        for row in 0..2 {
            for col in 0..2 {
                for s in 0..3 {
                    let expected = (10 * s + 2 * row + col + 1) as f64;
                    assert_eq!(cube.value_at(row, col, s), expected, "at ({row}, {col}, {s})");
                }
            }
        }
    }

    #[test]
    fn test_pages_of_different_size() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("ragged.tif");
        {
            let file = File::create(&path).expect("create");
            let mut encoder = TiffEncoder::new(file).expect("encoder");
            encoder
                .write_image::<colortype::Gray8>(3, 2, &[0; 6])
                .expect("page 0");
            encoder
                .write_image::<colortype::Gray8>(2, 2, &[0; 4])
                .expect("page 1");
        }

        let err = TiffLoader::default().load_file(&path).expect_err("ragged pages");
        assert!(matches!(err, LoadError::CorruptedData(_)));
    }

    #[test]
    fn test_pages_of_different_type() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("mixed.tif");
        {
            let file = File::create(&path).expect("create");
            let mut encoder = TiffEncoder::new(file).expect("encoder");
            encoder
                .write_image::<colortype::Gray8>(2, 2, &[0; 4])
                .expect("page 0");
            encoder
                .write_image::<colortype::Gray16>(2, 2, &[0; 4])
                .expect("page 1");
        }

        let err = TiffLoader::default().load_file(&path).expect_err("mixed pages");
        assert!(matches!(err, LoadError::UnsupportedDataType(_)));
    }

    #[test]
    fn test_has_no_named_variables() {
        let variables = TiffDecoder.list_variables(Path::new("stack.tif")).expect("listed");
        assert!(variables.is_empty());
    }

    #[test]
    fn test_sniffs_classic_and_big_tiff() {
        let loader = TiffLoader::default();
        assert!(loader.can_load(&[0x49, 0x49, 0x2A, 0x00, 8, 0, 0, 0]));
        assert!(loader.can_load(&[0x4D, 0x4D, 0x00, 0x2A, 0, 0, 0, 8]));
        assert!(loader.can_load(&[0x49, 0x49, 0x2B, 0x00, 8, 0, 0, 0]));
        assert!(loader.can_load(&[0x4D, 0x4D, 0x00, 0x2B, 0, 8, 0, 0]));
        assert!(!loader.can_load(b"II*"));
        assert!(!loader.can_load(b"ENVI"));
    }
}

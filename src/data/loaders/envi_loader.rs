//! Loader for ENVI header/binary pairs.
//!
//! Either file of the pair can be opened; the other is found next to it.
//! Whatever the on-disk interleave, samples are regathered into
//! `(lines, samples, bands)` row-major order.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::LoaderSettings;
use crate::constants::{ENVI_DATA_EXTENSIONS, ENVI_HEADER_EXTENSION, ENVI_MAGIC};
use crate::data::error::LoadError;
use crate::data::loader::CubeLoader;
use crate::data::loaders::envi_header::{EnviHeader, Interleave};
use crate::data::storage::{Scalar, TypedStorage, with_values};
use crate::data::{Cube, CubeMetadata};

/// Loader for ENVI `.hdr` + binary payload pairs.
///
/// **Output**: dims `[lines, samples, bands]`, row-major, so the default
/// layout resolves bands as the channel axis.
#[derive(Debug, Clone)]
pub struct EnviLoader {
    /// Payload extensions probed next to a header, in order
    data_extensions: Vec<String>,
    convert_micrometers: bool,
}

impl Default for EnviLoader {
    fn default() -> Self {
        Self {
            data_extensions: ENVI_DATA_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            convert_micrometers: true,
        }
    }
}

impl EnviLoader {
    pub fn from_settings(settings: &LoaderSettings) -> Self {
        Self {
            data_extensions: settings.envi_data_extensions.clone(),
            convert_micrometers: settings.convert_micrometers,
        }
    }

    /// Find `(header, payload)` for either member of a pair.
    pub fn resolve_pair(&self, path: &Path) -> Result<(PathBuf, PathBuf), LoadError> {
        let is_header = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ENVI_HEADER_EXTENSION));

        let candidates = if is_header {
            self.payload_candidates(path)
        } else {
            header_candidates(path)
        };
        let Some(found) = candidates.iter().find(|p| p.is_file()).cloned() else {
            let probed: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
            return Err(LoadError::read(format!(
                "no ENVI {} next to {}, tried {}",
                if is_header { "payload" } else { "header" },
                path.display(),
                probed.join(", ")
            )));
        };

        if is_header {
            Ok((path.to_path_buf(), found))
        } else {
            Ok((found, path.to_path_buf()))
        }
    }

    fn payload_candidates(&self, header: &Path) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        for ext in &self.data_extensions {
            candidates.push(header.with_extension(ext));
            candidates.push(header.with_extension(ext.to_ascii_uppercase()));
        }
        // `scene.dat.hdr` pairs with `scene.dat`, `scene.hdr` with `scene`
        candidates.push(header.with_extension(""));
        candidates
    }

    /// Load an already-resolved pair.
    pub fn load_pair(&self, header_path: &Path, data_path: &Path) -> Result<Cube, LoadError> {
        let text =
            std::fs::read_to_string(header_path).map_err(|e| LoadError::io(header_path, e))?;
        let header = EnviHeader::parse(&text)?;

        let file = File::open(data_path).map_err(|e| LoadError::io(data_path, e))?;
        let file_len = file.metadata().map_err(|e| LoadError::io(data_path, e))?.len();
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(header.header_offset))
            .map_err(|e| LoadError::io(data_path, e))?;

        self.decode(&header, &mut reader, file_len.saturating_sub(header.header_offset))
    }

    /// Load from header text and the full content of the binary file.
    pub fn load_from_parts(&self, header_text: &str, payload: &[u8]) -> Result<Cube, LoadError> {
        let header = EnviHeader::parse(header_text)?;
        let offset = usize::try_from(header.header_offset)
            .map_err(|_| LoadError::corrupted("header offset out of range"))?;
        let mut body = payload.get(offset..).unwrap_or_default();
        let available = body.len() as u64;
        self.decode(&header, &mut body, available)
    }

    fn decode<R: Read>(
        &self,
        header: &EnviHeader,
        reader: &mut R,
        available: u64,
    ) -> Result<Cube, LoadError> {
        let needed = header
            .payload_bytes()
            .ok_or_else(|| LoadError::invalid_dimensions("ENVI extents overflow"))?;
        if available < needed as u64 {
            return Err(LoadError::corrupted(format!(
                "ENVI payload has {} bytes after the offset, {}x{}x{} {} needs {}",
                available, header.lines, header.samples, header.bands, header.data_type, needed
            )));
        }

        let dims = (header.lines, header.samples, header.bands);
        let count = dims.0 * dims.1 * dims.2;
        let raw = TypedStorage::read_from(reader, header.data_type, count, header.byte_order)?;
        let storage = regather(raw, header.interleave, dims)?;

        let mut cube = Cube::new([dims.0, dims.1, dims.2], storage, false)?
            .with_source_format(format!("ENVI ({})", header.interleave.name()))
            .with_metadata(self.metadata(header));

        if let Some(wavelengths) = header.wavelengths_nm(self.convert_micrometers) {
            if wavelengths.len() == header.bands {
                cube = cube.with_wavelengths(wavelengths);
            } else {
                log::warn!(
                    "Dropping {} wavelengths for {} bands",
                    wavelengths.len(),
                    header.bands
                );
            }
        }
        if let Some(geo) = header.geo_reference() {
            cube = cube.with_geo_reference(geo);
        }

        Ok(cube)
    }

    fn metadata(&self, header: &EnviHeader) -> CubeMetadata {
        let converted = self.convert_micrometers && header.in_micrometers();
        CubeMetadata {
            description: header.description.clone(),
            band_names: header.band_names.clone(),
            fwhm: header.fwhm_nm(self.convert_micrometers),
            wavelength_units: if converted {
                Some("Nanometers".to_string())
            } else {
                header.wavelength_units.clone()
            },
            bad_bands: header.bad_bands.clone(),
            pixel_start: header.x_start.zip(header.y_start),
            variable_name: None,
        }
    }
}

fn header_candidates(data: &Path) -> Vec<PathBuf> {
    let mut with_suffix = data.as_os_str().to_owned();
    with_suffix.push(".");
    with_suffix.push(ENVI_HEADER_EXTENSION);
    vec![
        data.with_extension(ENVI_HEADER_EXTENSION),
        data.with_extension(ENVI_HEADER_EXTENSION.to_ascii_uppercase()),
        PathBuf::from(with_suffix),
    ]
}

/// Reorder a raw payload into `(line, sample, band)` row-major order.
fn regather(
    raw: TypedStorage,
    interleave: Interleave,
    dims: (usize, usize, usize),
) -> Result<TypedStorage, LoadError> {
    if interleave == Interleave::Bip {
        return Ok(raw);
    }
    let bytes = raw.byte_size();
    with_values!(raw, v => gather(&v, interleave, dims, bytes).map(Scalar::into_storage))
}

fn gather<T: Copy + Send + Sync>(
    src: &[T],
    interleave: Interleave,
    dims: (usize, usize, usize),
    bytes: usize,
) -> Result<Vec<T>, LoadError> {
    let (_, samples, bands) = dims;
    let mut out = Vec::new();
    out.try_reserve_exact(src.len())
        .map_err(LoadError::allocation(bytes))?;
    out.par_extend((0..src.len()).into_par_iter().map(|i| {
        let c = i % bands;
        let w = (i / bands) % samples;
        let h = i / (bands * samples);
        src[interleave.source_index((h, w, c), dims)]
    }));
    Ok(out)
}

impl CubeLoader for EnviLoader {
    fn id(&self) -> &'static str {
        "envi"
    }

    fn display_name(&self) -> &'static str {
        "ENVI (.hdr + binary)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["hdr", "dat", "img", "bsq", "bil", "bip", "raw"]
    }

    fn can_load(&self, data: &[u8]) -> bool {
        data.strip_prefix(b"\xEF\xBB\xBF".as_slice())
            .unwrap_or(data)
            .starts_with(ENVI_MAGIC)
    }

    fn load_file(&self, path: &Path) -> Result<Cube, LoadError> {
        let (header, data) = self.resolve_pair(path)?;
        log::debug!("ENVI pair: header {:?}, data {:?}", header, data);
        self.load_pair(&header, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::storage::ScalarKind;

    fn header(interleave: &str, extra: &str) -> String {
        format!(
            "ENVI\nsamples = 2\nlines = 2\nbands = 2\ndata type = 4\ninterleave = {}\n{}",
            interleave, extra
        )
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_bsq_scenario() {
        // (h, w, c) = [[[1, 2], [3, 4]], [[5, 6], [7, 8]]], band planes on disk
        let payload = f32_bytes(&[1.0, 3.0, 5.0, 7.0, 2.0, 4.0, 6.0, 8.0]);
        let cube = EnviLoader::default()
            .load_from_parts(&header("bsq", ""), &payload)
            .expect("valid pair");
        assert_eq!(cube.dims(), [2, 2, 2]);
        assert!(!cube.is_column_major());
        assert_eq!(cube.kind(), ScalarKind::F32);
        assert_eq!(cube.source_format(), "ENVI (bsq)");

        let mut expected = 1.0;
        for h in 0..2 {
            for w in 0..2 {
                for c in 0..2 {
                    assert_eq!(cube.value_at(h, w, c), expected, "at ({h}, {w}, {c})");
                    expected += 1.0;
                }
            }
        }
        assert_eq!(
            cube.storage(),
            &TypedStorage::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
        );
    }

    #[test]
    fn test_int8_data_type() {
        let text = "ENVI\nsamples = 2\nlines = 1\nbands = 1\ndata type = 1\ninterleave = bsq\n";
        let cube = EnviLoader::default()
            .load_from_parts(text, &[0xFF, 0x80])
            .expect("valid pair");
        assert_eq!(cube.kind(), ScalarKind::I8);
        assert_eq!(cube.storage(), &TypedStorage::I8(vec![-1, -128]));
        assert_eq!(cube.value_at(0, 1, 0), -128.0);
    }

    #[test]
    fn test_interleaves_agree() {
        // value = 100 * h + 10 * w + c
        let (lines, samples, bands) = (3, 4, 2);
        let value = |h: usize, w: usize, c: usize| (100 * h + 10 * w + c) as f32;
        let dims = (lines, samples, bands);
        let text = |il: &str| {
            format!(
                "ENVI\nsamples = {}\nlines = {}\nbands = {}\ndata type = 4\ninterleave = {}\n",
                samples, lines, bands, il
            )
        };

        for interleave in [Interleave::Bsq, Interleave::Bil, Interleave::Bip] {
            let mut disk = vec![0.0f32; lines * samples * bands];
            for h in 0..lines {
                for w in 0..samples {
                    for c in 0..bands {
                        disk[interleave.source_index((h, w, c), dims)] = value(h, w, c);
                    }
                }
            }
            let cube = EnviLoader::default()
                .load_from_parts(&text(interleave.name()), &f32_bytes(&disk))
                .expect("valid pair");
            for h in 0..lines {
                for w in 0..samples {
                    for c in 0..bands {
                        assert_eq!(cube.value_at(h, w, c), f64::from(value(h, w, c)));
                    }
                }
            }
        }
    }

    #[test]
    fn test_big_endian_with_offset() {
        let text = "ENVI\nsamples = 2\nlines = 1\nbands = 1\ndata type = 2\n\
                    interleave = bsq\nbyte order = 1\nheader offset = 3\n";
        let mut payload = vec![0xAA; 3];
        payload.extend_from_slice(&(-2i16).to_be_bytes());
        payload.extend_from_slice(&300i16.to_be_bytes());
        let cube = EnviLoader::default()
            .load_from_parts(text, &payload)
            .expect("valid pair");
        assert_eq!(cube.storage(), &TypedStorage::I16(vec![-2, 300]));
    }

    #[test]
    fn test_undersized_payload() {
        let payload = f32_bytes(&[1.0; 7]);
        assert!(matches!(
            EnviLoader::default().load_from_parts(&header("bsq", ""), &payload),
            Err(LoadError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_wavelengths_and_metadata() {
        let extra = "wavelength units = micrometers\nwavelength = {0.5, 0.6}\n\
                     fwhm = {0.01, 0.02}\nx start = 10\ny start = 20\n";
        let cube = EnviLoader::default()
            .load_from_parts(&header("bip", extra), &f32_bytes(&[0.0; 8]))
            .expect("valid pair");
        let wavelengths = cube.wavelengths().expect("wavelengths");
        assert!((wavelengths[0] - 500.0).abs() < 1e-9);
        assert!((wavelengths[1] - 600.0).abs() < 1e-9);
        assert_eq!(cube.metadata().wavelength_units.as_deref(), Some("Nanometers"));
        assert_eq!(cube.metadata().pixel_start, Some((10, 20)));
        let fwhm = cube.metadata().fwhm.as_deref().expect("fwhm");
        assert!((fwhm[1] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_wavelengths_dropped() {
        let extra = "wavelength = {450, 550, 650}\n";
        let cube = EnviLoader::default()
            .load_from_parts(&header("bsq", extra), &f32_bytes(&[0.0; 8]))
            .expect("valid pair");
        assert_eq!(cube.wavelengths(), None);
    }

    #[test]
    fn test_can_load() {
        let loader = EnviLoader::default();
        assert!(loader.can_load(b"ENVI\nsamples = 1"));
        assert!(loader.can_load(b"\xEF\xBB\xBFENVI\n"));
        assert!(!loader.can_load(b"MATLAB 5.0"));
    }

    #[test]
    fn test_resolve_pair_both_ways() {
        let dir = tempfile::tempdir().expect("temp dir");
        let hdr = dir.path().join("scene.hdr");
        let img = dir.path().join("scene.img");
        std::fs::write(&hdr, header("bsq", "")).expect("write header");
        std::fs::write(&img, f32_bytes(&[0.0; 8])).expect("write payload");

        let loader = EnviLoader::default();
        assert_eq!(loader.resolve_pair(&hdr).expect("pair"), (hdr.clone(), img.clone()));
        assert_eq!(loader.resolve_pair(&img).expect("pair"), (hdr.clone(), img.clone()));

        std::fs::remove_file(&img).expect("remove payload");
        match loader.resolve_pair(&hdr) {
            Err(LoadError::ReadError(detail)) => {
                assert!(detail.contains("scene.img"), "{detail}");
                assert!(detail.contains("scene.dat"), "{detail}");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        std::fs::remove_file(&hdr).expect("remove header");
        std::fs::write(&img, f32_bytes(&[0.0; 8])).expect("write payload");
        assert!(matches!(loader.resolve_pair(&img), Err(LoadError::ReadError(_))));
    }

    #[test]
    fn test_resolve_double_extension() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dat = dir.path().join("scene.dat");
        let hdr = dir.path().join("scene.dat.hdr");
        std::fs::write(&hdr, header("bsq", "")).expect("write header");
        std::fs::write(&dat, f32_bytes(&[0.0; 8])).expect("write payload");

        let loader = EnviLoader::default();
        assert_eq!(loader.resolve_pair(&dat).expect("pair"), (hdr.clone(), dat.clone()));
        assert_eq!(loader.resolve_pair(&hdr).expect("pair"), (hdr, dat));
    }
}

//! ENVI pairs on disk, opened from either file.

use std::path::Path;

use hsiview::config::LoaderSettings;
use hsiview::data::{CubeReader, Layout, LoadError};

const LINES: usize = 3;
const SAMPLES: usize = 4;
const BANDS: usize = 5;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn value(h: usize, w: usize, c: usize) -> i16 {
    (h * 100 + w * 10 + c) as i16 - 50
}

/// Write a pair named `stem` with the given interleave and return the
/// header path.
fn write_pair(dir: &Path, stem: &str, interleave: &str, data_ext: &str) -> std::path::PathBuf {
    let mut payload = Vec::new();
    let mut push = |h, w, c| payload.extend_from_slice(&value(h, w, c).to_le_bytes());
    match interleave {
        "bsq" => {
            for c in 0..BANDS {
                for h in 0..LINES {
                    for w in 0..SAMPLES {
                        push(h, w, c);
                    }
                }
            }
        }
        "bil" => {
            for h in 0..LINES {
                for c in 0..BANDS {
                    for w in 0..SAMPLES {
                        push(h, w, c);
                    }
                }
            }
        }
        _ => {
            for h in 0..LINES {
                for w in 0..SAMPLES {
                    for c in 0..BANDS {
                        push(h, w, c);
                    }
                }
            }
        }
    }

    let header = format!(
        "ENVI\ndescription = {{test {interleave}}}\nsamples = {SAMPLES}\nlines = {LINES}\n\
         bands = {BANDS}\nheader offset = 0\nfile type = ENVI Standard\ndata type = 2\n\
         interleave = {interleave}\nbyte order = 0\nwavelength units = Micrometers\n\
         wavelength = {{\n 0.40, 0.45, 0.50,\n 0.55, 0.60}}\n"
    );
    let header_path = dir.join(format!("{stem}.hdr"));
    std::fs::write(&header_path, header).expect("write header");
    std::fs::write(dir.join(format!("{stem}.{data_ext}")), payload).expect("write payload");
    header_path
}

#[test]
fn test_interleaves_load_identically() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let reader = CubeReader::new();

    let cubes: Vec<_> = [("bsq", "img"), ("bil", "dat"), ("bip", "bip")]
        .iter()
        .map(|(interleave, ext)| {
            let header = write_pair(dir.path(), interleave, interleave, ext);
            reader.load(&header).expect("load")
        })
        .collect();

    for cube in &cubes {
        assert_eq!(cube.dims(), [LINES, SAMPLES, BANDS]);
        assert!(!cube.is_column_major());
        assert_eq!(cube.storage(), cubes[0].storage());
        assert_eq!(cube.channel_count(Layout::Auto), BANDS.min(LINES));
        assert_eq!(cube.channel_count(Layout::Hwc), BANDS);
    }
    for h in 0..LINES {
        for w in 0..SAMPLES {
            for c in 0..BANDS {
                assert_eq!(cubes[0].value_at(h, w, c), f64::from(value(h, w, c)));
            }
        }
    }
}

#[test]
fn test_open_from_payload_side() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    write_pair(dir.path(), "scene", "bil", "raw");

    let cube = CubeReader::new()
        .load(dir.path().join("scene.raw"))
        .expect("load");
    assert_eq!(cube.source_format(), "ENVI (bil)");
    assert_eq!(cube.metadata().description.as_deref(), Some("test bil"));
    assert_eq!(
        cube.wavelengths_for(Layout::Hwc),
        Some(&[400.0, 450.0, 500.0, 550.0, 600.0][..])
    );
    assert_eq!(cube.spectrum(Layout::Hwc, 1, 2).map(|s| s[4]), Some(f64::from(value(1, 2, 4))));
}

#[test]
fn test_micrometers_kept_when_disabled() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let header = write_pair(dir.path(), "scene", "bsq", "dat");

    let settings = LoaderSettings {
        convert_micrometers: false,
        ..LoaderSettings::default()
    };
    let cube = CubeReader::from_settings(&settings).load(&header).expect("load");
    assert_eq!(cube.wavelengths(), Some(&[0.40, 0.45, 0.50, 0.55, 0.60][..]));
    assert_eq!(cube.metadata().wavelength_units.as_deref(), Some("Micrometers"));
}

#[test]
fn test_missing_payload() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let header = write_pair(dir.path(), "scene", "bsq", "bin");

    std::fs::remove_file(header.with_extension("bin")).expect("remove payload");

    match CubeReader::new().load(&header) {
        Err(LoadError::ReadError(detail)) => assert!(detail.contains("scene.dat"), "{detail}"),
        other => panic!("unexpected result: {other:?}"),
    }
}

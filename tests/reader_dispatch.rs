//! Format dispatch, injected decoders and a load-then-normalize pipeline.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hsiview::config::CoreConfig;
use hsiview::data::loaders::{DecodeError, NativeArray, NativeDecoder};
use hsiview::data::{CubeFormat, CubeReader, Layout, LoadError, ScalarKind, TypedStorage};
use hsiview::transform::{Normalization, NormalizationMethod, normalize};
use ndarray::Array3;
use ndarray_npy::write_npy;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Stand-in MAT decoder that serves one `(2, 2, 3)` float64 variable.
struct StubMatDecoder {
    releases: Arc<AtomicUsize>,
}

impl NativeDecoder for StubMatDecoder {
    fn name(&self) -> &'static str {
        "MATLAB"
    }

    fn decode(&self, path: &Path, variable: Option<&str>) -> Result<NativeArray, DecodeError> {
        if !path.exists() {
            return Err(DecodeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            )));
        }
        if variable.is_some_and(|v| v != "reflectance") {
            return Err(DecodeError::VariableNotFound(variable.unwrap_or_default().to_string()));
        }
        let values: Vec<f64> = (0..12).map(f64::from).collect();
        Ok(NativeArray {
            data: values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
            dims: vec![2, 2, 3],
            kind: ScalarKind::F64,
            variable: Some("reflectance".to_string()),
        })
    }

    fn release(&self, array: &mut NativeArray) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        array.data.clear();
    }
}

#[test]
fn test_detect_by_content_without_extension() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("cube_without_extension");
    write_npy(&path, &Array3::<f32>::zeros((2, 2, 2))).expect("write npy");

    let reader = CubeReader::new();
    assert_eq!(reader.detect_format(&path).expect("detect"), CubeFormat::Npy);
    assert_eq!(reader.load(&path).expect("load").dims(), [2, 2, 2]);
}

#[test]
fn test_unknown_content() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "just some text").expect("write");

    match CubeReader::new().load(&path) {
        Err(LoadError::UnsupportedFormat(ext)) => assert_eq!(ext, "txt"),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_mat_requires_decoder() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("scene.mat");
    std::fs::write(&path, b"MATLAB 5.0 MAT-file, Platform: GLNXA64").expect("write");

    assert!(matches!(
        CubeReader::new().load(&path),
        Err(LoadError::UnsupportedFormat(_))
    ));

    let releases = Arc::new(AtomicUsize::new(0));
    let reader = CubeReader::new().with_mat_decoder(Box::new(StubMatDecoder {
        releases: releases.clone(),
    }));
    let cube = reader.load(&path).expect("load");
    assert!(cube.is_column_major());
    assert_eq!(cube.dims(), [2, 2, 3]);
    // column-major: (1, 1, 2) is 1 + 2 * (1 + 2 * 2)
    assert_eq!(cube.value_at(1, 1, 2), 11.0);
    assert_eq!(cube.metadata().variable_name.as_deref(), Some("reflectance"));
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn test_load_then_normalize_with_config() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("scene.npy");
    let array = Array3::from_shape_fn((4, 4, 3), |(y, x, c)| (y * 40 + x * 10 + c * 50) as u8);
    write_npy(&path, &array).expect("write npy");

    let mut config = CoreConfig::new();
    config.transform.default_method = NormalizationMethod::MinMaxCustom { min: 0.0, max: 255.0 };
    config.transform.preserve_type = true;
    config.log_level = log::LevelFilter::Debug;
    let config = CoreConfig::from_json(&config.to_json().expect("serialize")).expect("parse");
    config.apply_log_level();

    let cube = CubeReader::from_settings(&config.loader).load(&path).expect("load");
    let normalization: Normalization = config.transform.normalization();
    let out = normalize(&cube, &normalization, config.loader.default_layout).expect("spread");

    assert_eq!(out.kind(), ScalarKind::U8);
    let TypedStorage::U8(values) = out.storage() else {
        panic!("expected uint8 storage");
    };
    assert_eq!(values.iter().min(), Some(&0));
    assert_eq!(values.iter().max(), Some(&255));
    assert_eq!(out.channel_count(Layout::Auto), 3);
}

//! NumPy files written by `ndarray-npy` load without data movement.

use hsiview::data::{CubeReader, Layout, LoadError, ScalarKind, TypedStorage};
use ndarray::{Array2, Array3, ShapeBuilder};
use ndarray_npy::write_npy;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_c_order_f32() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("cube.npy");
    let array = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as f32);
    write_npy(&path, &array).expect("write npy");

    let cube = CubeReader::new().load(&path).expect("load");
    assert_eq!(cube.dims(), [2, 3, 4]);
    assert!(!cube.is_column_major());
    assert_eq!(cube.kind(), ScalarKind::F32);
    for ((i, j, k), &v) in array.indexed_iter() {
        assert_eq!(cube.value_at(i, j, k), f64::from(v));
    }
}

#[test]
fn test_fortran_order_kept_verbatim() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("fortran.npy");
    let raw: Vec<u16> = (0..24).map(|v| v * 3).collect();
    let array = Array3::from_shape_vec((2, 3, 4).f(), raw.clone()).expect("shape");
    write_npy(&path, &array).expect("write npy");

    let cube = CubeReader::new().load(&path).expect("load");
    assert_eq!(cube.dims(), [2, 3, 4]);
    assert!(cube.is_column_major());
    // element at source offset k is storage[k]
    assert_eq!(cube.storage(), &TypedStorage::U16(raw));
    for ((i, j, k), &v) in array.indexed_iter() {
        assert_eq!(cube.value_at(i, j, k), f64::from(v));
    }

    let roundtrip = cube.to_array3().expect("array");
    assert_eq!(roundtrip, array.mapv(f64::from));
}

#[test]
fn test_int64_and_two_dimensional() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");

    let path = dir.path().join("big.npy");
    let array = Array3::from_elem((1, 2, 2), 1i64 << 40);
    write_npy(&path, &array).expect("write npy");
    let cube = CubeReader::new().load(&path).expect("load");
    assert_eq!(cube.kind(), ScalarKind::I64);
    assert_eq!(cube.value_at(0, 1, 1), (1i64 << 40) as f64);

    let path = dir.path().join("plane.npy");
    let plane = Array2::from_shape_fn((3, 5), |(y, x)| (y * 5 + x) as u8);
    write_npy(&path, &plane).expect("write npy");
    let cube = CubeReader::new().load(&path).expect("load");
    assert_eq!(cube.dims(), [3, 5, 1]);
    assert_eq!(cube.channel_count(Layout::Auto), 1);
    assert_eq!(cube.spatial_size(Layout::Auto), (3, 5));
    assert_eq!(cube.value_at_logical(Layout::Auto, 0, 2, 4), Some(14.0));
}

#[test]
fn test_truncated_file() {
    init_logging();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("short.npy");
    let array = Array3::from_elem((4, 4, 4), 1.0f64);
    write_npy(&path, &array).expect("write npy");

    let bytes = std::fs::read(&path).expect("read back");
    std::fs::write(&path, &bytes[..bytes.len() - 8]).expect("truncate");

    assert!(matches!(
        CubeReader::new().load(&path),
        Err(LoadError::CorruptedData(_))
    ));
}

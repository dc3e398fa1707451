//! Element type conversion.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{Cube, ScalarKind, TypedStorage};
use crate::transform::stats::Stats;

/// How values are brought into the target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    /// Round and saturate at the target bounds
    #[default]
    Clamp,
    /// Stretch the data range onto the full target range; `[0, 1]` for
    /// float targets
    Stretch,
}

/// Convert `cube` to element type `kind`.
///
/// Returns `None` for [`ConversionMode::Stretch`] when the data has no
/// spread.
pub fn convert_type(cube: &Cube, kind: ScalarKind, mode: ConversionMode) -> Option<Cube> {
    let values = cube.storage().to_f64_vec();

    let storage = match mode {
        ConversionMode::Clamp => {
            if cube.kind() == kind {
                cube.storage().clone()
            } else {
                TypedStorage::from_f64(kind, &values)
            }
        }
        ConversionMode::Stretch => {
            let stats = Stats::from_values(&values);
            if stats.is_empty() || stats.range() <= 0.0 {
                log::debug!("Cannot stretch constant data into {}", kind);
                return None;
            }
            let (out_lo, out_hi) = if kind.is_integer() {
                kind.value_range()
            } else {
                (0.0, 1.0)
            };
            let (lo, range) = (stats.min, stats.range());
            let stretched: Vec<f64> = values
                .par_iter()
                .map(|&x| (x - lo) / range * (out_hi - out_lo) + out_lo)
                .collect();
            TypedStorage::from_f64(kind, &stretched)
        }
    };

    Some(cube.with_same_shape(storage))
}

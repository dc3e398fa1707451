//! Intensity normalization.
//!
//! Every method maps each element through one scalar function whose
//! parameters come from statistics of the whole cube or of the element's
//! channel. A cube with no usable spread (constant data, zero variance)
//! yields `None` instead of a cube.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{Cube, Layout, ScalarKind, TypedStorage, flat_index, unravel_index};
use crate::transform::stats::{Stats, percentile_of_sorted, sorted_finite};

/// Scalar mapping applied to every element.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum NormalizationMethod {
    /// Stretch `[min, max]` onto `[0, 1]`
    #[default]
    MinMax,
    /// Stretch `[min, max]` onto `[min, max]` of the target
    MinMaxCustom { min: f64, max: f64 },
    /// Clip to the `lower`/`upper` percentiles, then stretch onto `[0, 1]`
    Percentile { lower: f64, upper: f64 },
    /// Subtract the mean, divide by the population standard deviation
    ZScore,
    /// `ln(max(0, x) + 1)`
    Log,
    /// `sqrt(max(0, x))`
    Sqrt,
}

impl NormalizationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            NormalizationMethod::MinMax => "Min-max",
            NormalizationMethod::MinMaxCustom { .. } => "Min-max (custom range)",
            NormalizationMethod::Percentile { .. } => "Percentile clip",
            NormalizationMethod::ZScore => "Z-score",
            NormalizationMethod::Log => "Log",
            NormalizationMethod::Sqrt => "Square root",
        }
    }

    /// Interval every output value falls in when the input is of `kind`,
    /// if one is known.
    fn output_range(&self, kind: ScalarKind) -> Option<(f64, f64)> {
        let (_, kind_max) = kind.value_range();
        match *self {
            NormalizationMethod::MinMax | NormalizationMethod::Percentile { .. } => {
                Some((0.0, 1.0))
            }
            NormalizationMethod::MinMaxCustom { min, max } => Some((min.min(max), min.max(max))),
            NormalizationMethod::ZScore => None,
            NormalizationMethod::Log => Some((0.0, (kind_max.max(0.0) + 1.0).ln())),
            NormalizationMethod::Sqrt => Some((0.0, kind_max.max(0.0).sqrt())),
        }
    }
}

/// Whether statistics are shared by the whole cube or kept per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationScope {
    #[default]
    Global,
    PerChannel,
}

/// A complete normalization request.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Normalization {
    pub method: NormalizationMethod,
    pub scope: NormalizationScope,
    /// Re-quantize into the source integer type when the output range fits
    pub preserve_type: bool,
}

impl Normalization {
    pub fn new(method: NormalizationMethod) -> Self {
        Self {
            method,
            scope: NormalizationScope::Global,
            preserve_type: false,
        }
    }

    pub fn per_channel(mut self) -> Self {
        self.scope = NormalizationScope::PerChannel;
        self
    }

    pub fn preserving_type(mut self) -> Self {
        self.preserve_type = true;
        self
    }
}

/// Fitted parameters of one mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mapping {
    /// `(clamp(x) - lo) / (hi - lo) * (out_hi - out_lo) + out_lo`
    Rescale {
        lo: f64,
        hi: f64,
        out_lo: f64,
        out_hi: f64,
        clip: bool,
    },
    Standardize { mean: f64, std_dev: f64 },
    Log,
    Sqrt,
}

impl Mapping {
    /// Fit `method` to `values`. `None` when the values have no spread.
    fn fit(method: NormalizationMethod, values: &[f64]) -> Option<Self> {
        match method {
            NormalizationMethod::MinMax => Self::rescale(Stats::from_values(values), 0.0, 1.0),
            NormalizationMethod::MinMaxCustom { min, max } => {
                Self::rescale(Stats::from_values(values), min, max)
            }
            NormalizationMethod::Percentile { lower, upper } => {
                let sorted = sorted_finite(values);
                let lo = percentile_of_sorted(&sorted, lower)?;
                let hi = percentile_of_sorted(&sorted, upper)?;
                (hi > lo).then_some(Mapping::Rescale {
                    lo,
                    hi,
                    out_lo: 0.0,
                    out_hi: 1.0,
                    clip: true,
                })
            }
            NormalizationMethod::ZScore => {
                let stats = Stats::from_values(values);
                let std_dev = stats.std_dev();
                (!stats.is_empty() && std_dev > 0.0).then_some(Mapping::Standardize {
                    mean: stats.mean,
                    std_dev,
                })
            }
            NormalizationMethod::Log => Some(Mapping::Log),
            NormalizationMethod::Sqrt => Some(Mapping::Sqrt),
        }
    }

    fn rescale(stats: Stats, out_lo: f64, out_hi: f64) -> Option<Self> {
        (!stats.is_empty() && stats.range() > 0.0).then_some(Mapping::Rescale {
            lo: stats.min,
            hi: stats.max,
            out_lo,
            out_hi,
            clip: false,
        })
    }

    #[inline]
    fn apply(&self, x: f64) -> f64 {
        match *self {
            Mapping::Rescale {
                lo,
                hi,
                out_lo,
                out_hi,
                clip,
            } => {
                let x = if clip { x.clamp(lo, hi) } else { x };
                (x - lo) / (hi - lo) * (out_hi - out_lo) + out_lo
            }
            Mapping::Standardize { mean, std_dev } => (x - mean) / std_dev,
            Mapping::Log => (x.max(0.0) + 1.0).ln(),
            Mapping::Sqrt => x.max(0.0).sqrt(),
        }
    }
}

/// Normalize `cube`, returning a new cube of the same shape.
///
/// `layout` locates the channel axis for [`NormalizationScope::PerChannel`].
/// Returns `None` when the cube has no usable spread; per channel, a
/// channel without spread is copied unchanged and `None` is returned only
/// if no channel has any.
pub fn normalize(cube: &Cube, normalization: &Normalization, layout: Layout) -> Option<Cube> {
    let values = cube.storage().to_f64_vec();
    if values.is_empty() {
        return None;
    }
    let method = normalization.method;

    let output = match normalization.scope {
        NormalizationScope::Global => {
            let Some(mapping) = Mapping::fit(method, &values) else {
                log::debug!("{} normalization is degenerate for this cube", method.name());
                return None;
            };
            values.par_iter().map(|&x| mapping.apply(x)).collect()
        }
        NormalizationScope::PerChannel => per_channel(cube, method, layout, &values)?,
    };

    let kind = cube.kind();
    let storage = match method.output_range(kind) {
        Some((lo, hi))
            if normalization.preserve_type
                && kind.is_integer()
                && kind.contains_range(lo, hi) =>
        {
            TypedStorage::from_f64(kind, &output)
        }
        _ => TypedStorage::F64(output),
    };

    Some(cube.with_same_shape(storage))
}

fn per_channel(
    cube: &Cube,
    method: NormalizationMethod,
    layout: Layout,
    values: &[f64],
) -> Option<Vec<f64>> {
    let dims = cube.dims();
    let column_major = cube.is_column_major();
    let roles = cube.resolve(layout);
    let (channels, height, width) = roles.extents(dims);

    let mappings: Vec<Option<Mapping>> = (0..channels)
        .into_par_iter()
        .map(|c| {
            let channel: Vec<f64> = (0..height)
                .flat_map(|y| (0..width).map(move |x| (y, x)))
                .map(|(y, x)| values[flat_index(dims, column_major, roles.to_physical(c, y, x))])
                .collect();
            Mapping::fit(method, &channel)
        })
        .collect();

    let degenerate = mappings.iter().filter(|m| m.is_none()).count();
    if degenerate == channels {
        log::debug!("{} normalization is degenerate in every channel", method.name());
        return None;
    }
    if degenerate > 0 {
        log::debug!("{} of {} channels passed through unchanged", degenerate, channels);
    }

    Some(
        values
            .par_iter()
            .enumerate()
            .map(|(i, &x)| {
                let c = unravel_index(dims, column_major, i)[roles.channel];
                match &mappings[c] {
                    Some(mapping) => mapping.apply(x),
                    None => x,
                }
            })
            .collect(),
    )
}

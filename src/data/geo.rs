//! Affine geo-reference of a cube's pixel grid.
//!
//! Follows the ENVI `map info` convention: the reference pixel is 1-based and
//! addresses pixel corners, so `(1.0, 1.0)` is the upper-left corner of the
//! upper-left pixel. Rotation is counter-clockwise in degrees.

use serde::{Deserialize, Serialize};

use crate::data::error::LoadError;

/// Hemisphere of a UTM zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hemisphere {
    North,
    South,
}

/// Mapping from pixel coordinates to a map coordinate system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    /// Projection name (e.g. "UTM", "Geographic Lat/Lon")
    pub projection: String,
    /// 1-based pixel location of the tie point
    pub reference_pixel: (f64, f64),
    /// Map coordinates of the tie point
    pub map_origin: (f64, f64),
    /// Ground size of one pixel along x and y
    pub pixel_size: (f64, f64),
    pub rotation_deg: f64,
    pub zone: Option<i32>,
    pub hemisphere: Option<Hemisphere>,
    pub datum: Option<String>,
    pub units: Option<String>,
}

impl GeoReference {
    /// North-up reference with the tie point on the upper-left corner.
    pub fn new(
        projection: impl Into<String>,
        map_origin: (f64, f64),
        pixel_size: (f64, f64),
    ) -> Self {
        Self {
            projection: projection.into(),
            reference_pixel: (1.0, 1.0),
            map_origin,
            pixel_size,
            rotation_deg: 0.0,
            zone: None,
            hemisphere: None,
            datum: None,
            units: None,
        }
    }

    /// Parse an ENVI `map info` value.
    ///
    /// Layout: `{projection, ref x, ref y, map x, map y, size x, size y,
    /// [zone, hemisphere,] [datum,] [units=..., rotation=...]}`.
    pub fn from_map_info(value: &str) -> Result<Self, LoadError> {
        let inner = value.trim().trim_start_matches('{').trim_end_matches('}');
        let tokens: Vec<&str> = inner.split(',').map(str::trim).collect();
        if tokens.len() < 7 {
            return Err(LoadError::corrupted(format!(
                "map info has {} fields, expected at least 7",
                tokens.len()
            )));
        }

        let number = |i: usize| -> Result<f64, LoadError> {
            tokens[i].parse::<f64>().map_err(|_| {
                LoadError::corrupted(format!(
                    "map info field {} is not numeric: '{}'",
                    i, tokens[i]
                ))
            })
        };

        let mut geo = Self {
            projection: tokens[0].to_string(),
            reference_pixel: (number(1)?, number(2)?),
            map_origin: (number(3)?, number(4)?),
            pixel_size: (number(5)?, number(6)?),
            rotation_deg: 0.0,
            zone: None,
            hemisphere: None,
            datum: None,
            units: None,
        };

        let is_utm = geo.projection.eq_ignore_ascii_case("utm");
        for token in tokens.iter().skip(7).filter(|t| !t.is_empty()) {
            if let Some((key, val)) = token.split_once('=') {
                let key = key.trim().to_ascii_lowercase();
                let val = val.trim();
                match key.as_str() {
                    "units" => geo.units = Some(val.to_string()),
                    "rotation" => match val.parse::<f64>() {
                        Ok(r) => geo.rotation_deg = r,
                        Err(_) => log::warn!("Ignoring non-numeric map info rotation '{}'", val),
                    },
                    _ => log::debug!("Ignoring map info key '{}'", key),
                }
            } else if is_utm && geo.zone.is_none() && token.parse::<i32>().is_ok() {
                geo.zone = token.parse().ok();
            } else if token.eq_ignore_ascii_case("north") {
                geo.hemisphere = Some(Hemisphere::North);
            } else if token.eq_ignore_ascii_case("south") {
                geo.hemisphere = Some(Hemisphere::South);
            } else if geo.datum.is_none() {
                geo.datum = Some(token.to_string());
            }
        }

        Ok(geo)
    }

    fn axes(&self) -> ((f64, f64), (f64, f64)) {
        let (sin, cos) = self.rotation_deg.to_radians().sin_cos();
        // x runs along (cos, sin), y (downwards on screen) along (sin, -cos)
        ((cos, sin), (sin, -cos))
    }

    /// Map coordinates of 0-based pixel-corner coordinates `(x, y)`.
    pub fn pixel_to_map(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = (x - (self.reference_pixel.0 - 1.0)) * self.pixel_size.0;
        let dy = (y - (self.reference_pixel.1 - 1.0)) * self.pixel_size.1;
        let (u, v) = self.axes();
        (
            self.map_origin.0 + dx * u.0 + dy * v.0,
            self.map_origin.1 + dx * u.1 + dy * v.1,
        )
    }

    /// Inverse of [`pixel_to_map`](Self::pixel_to_map). `None` for a
    /// zero pixel size.
    pub fn map_to_pixel(&self, map_x: f64, map_y: f64) -> Option<(f64, f64)> {
        if self.pixel_size.0 == 0.0 || self.pixel_size.1 == 0.0 {
            return None;
        }
        let ex = map_x - self.map_origin.0;
        let ey = map_y - self.map_origin.1;
        let (u, v) = self.axes();
        let dx = ex * u.0 + ey * u.1;
        let dy = ex * v.0 + ey * v.1;
        Some((
            dx / self.pixel_size.0 + self.reference_pixel.0 - 1.0,
            dy / self.pixel_size.1 + self.reference_pixel.1 - 1.0,
        ))
    }

    /// Same grid re-tied to the corner of pixel `(x, y)`.
    fn retied(&self, x: f64, y: f64) -> Self {
        Self {
            reference_pixel: (1.0, 1.0),
            map_origin: self.pixel_to_map(x, y),
            ..self.clone()
        }
    }

    /// Reference of a crop whose upper-left pixel was `(x0, y0)`.
    pub fn cropped(&self, x0: usize, y0: usize) -> Self {
        self.retied(x0 as f64, y0 as f64)
    }

    /// Reference after resampling a `from` (width, height) grid to `to`.
    pub fn resized(&self, from: (usize, usize), to: (usize, usize)) -> Self {
        let mut geo = self.retied(0.0, 0.0);
        if to.0 > 0 && to.1 > 0 {
            geo.pixel_size = (
                self.pixel_size.0 * from.0 as f64 / to.0 as f64,
                self.pixel_size.1 * from.1 as f64 / to.1 as f64,
            );
        }
        geo
    }

    /// Reference after rotating a `width` x `height` image by `turns`
    /// quarter turns clockwise. Negative turns rotate counter-clockwise.
    pub fn rotated_quarter_turns(&self, turns: i32, width: usize, height: usize) -> Self {
        let mut geo = self.retied(0.0, 0.0);
        let mut height = height;
        let mut width = width;
        for _ in 0..turns.rem_euclid(4) {
            // new pixel (x', y') sits on old (y', height - x')
            geo = Self {
                map_origin: geo.pixel_to_map(0.0, height as f64),
                pixel_size: (geo.pixel_size.1, geo.pixel_size.0),
                rotation_deg: (geo.rotation_deg + 90.0).rem_euclid(360.0),
                ..geo
            };
            std::mem::swap(&mut width, &mut height);
        }
        geo
    }
}

//! ENVI `.hdr` header parsing.
//!
//! Headers are `key = value` lines with case-insensitive keys. A value that
//! opens a `{` without closing it continues on the following lines until a
//! line containing `}`.

use std::collections::BTreeMap;

use crate::data::error::LoadError;
use crate::data::geo::GeoReference;
use crate::data::storage::{ByteOrder, ScalarKind};

/// On-disk arrangement of bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interleave {
    /// Band sequential: `(band, line, sample)`
    Bsq,
    /// Band interleaved by line: `(line, band, sample)`
    Bil,
    /// Band interleaved by pixel: `(line, sample, band)`
    Bip,
}

impl Interleave {
    pub fn from_name(name: &str) -> Option<Self> {
        match strip_braces(name).to_ascii_lowercase().as_str() {
            "bsq" => Some(Interleave::Bsq),
            "bil" => Some(Interleave::Bil),
            "bip" => Some(Interleave::Bip),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interleave::Bsq => "bsq",
            Interleave::Bil => "bil",
            Interleave::Bip => "bip",
        }
    }

    /// Flat on-disk offset of `(h, w, c)` in a `lines x samples x bands` file.
    #[inline]
    pub fn source_index(
        self,
        (h, w, c): (usize, usize, usize),
        (lines, samples, bands): (usize, usize, usize),
    ) -> usize {
        match self {
            Interleave::Bsq => c * lines * samples + h * samples + w,
            Interleave::Bil => h * bands * samples + c * samples + w,
            Interleave::Bip => (h * samples + w) * bands + c,
        }
    }
}

/// Map an ENVI `data type` code to an element kind.
pub fn data_type_kind(code: u32) -> Option<ScalarKind> {
    match code {
        1 => Some(ScalarKind::I8),
        2 => Some(ScalarKind::I16),
        3 => Some(ScalarKind::I32),
        4 => Some(ScalarKind::F32),
        5 => Some(ScalarKind::F64),
        12 => Some(ScalarKind::U16),
        13 => Some(ScalarKind::U32),
        _ => None,
    }
}

/// Parsed ENVI header.
#[derive(Debug, Clone, PartialEq)]
pub struct EnviHeader {
    /// Width
    pub samples: usize,
    /// Height
    pub lines: usize,
    pub bands: usize,
    pub data_type: ScalarKind,
    pub interleave: Interleave,
    pub byte_order: ByteOrder,
    /// Bytes to skip at the start of the binary file
    pub header_offset: u64,
    pub wavelengths: Option<Vec<f64>>,
    pub fwhm: Option<Vec<f64>>,
    pub wavelength_units: Option<String>,
    pub description: Option<String>,
    pub band_names: Vec<String>,
    pub bad_bands: Option<Vec<bool>>,
    pub map_info: Option<String>,
    pub units: Option<String>,
    pub rotation: Option<f64>,
    pub x_start: Option<i64>,
    pub y_start: Option<i64>,
    /// Every `key = value` pair as read, keys lowercased
    pub fields: BTreeMap<String, String>,
}

impl EnviHeader {
    /// Parse header text.
    pub fn parse(text: &str) -> Result<Self, LoadError> {
        let fields = parse_fields(text);

        let samples = required_usize(&fields, "samples")?;
        let lines = required_usize(&fields, "lines")?;
        let bands = required_usize(&fields, "bands")?;

        let code = required(&fields, "data type")?;
        let code: u32 = code
            .parse()
            .map_err(|_| LoadError::corrupted(format!("data type '{}' is not an integer", code)))?;
        let data_type = data_type_kind(code)
            .ok_or_else(|| LoadError::unsupported_type(format!("ENVI data type {}", code)))?;

        let interleave = required(&fields, "interleave")?;
        let interleave = Interleave::from_name(interleave)
            .ok_or_else(|| LoadError::corrupted(format!("unknown interleave '{}'", interleave)))?;

        let byte_order = match fields.get("byte order").map(|v| strip_braces(v)) {
            None | Some("0") => ByteOrder::Little,
            Some("1") => ByteOrder::Big,
            Some(other) => {
                return Err(LoadError::corrupted(format!("byte order '{}' is not 0 or 1", other)));
            }
        };

        let header_offset = match fields.get("header offset") {
            Some(v) => strip_braces(v).parse::<u64>().map_err(|_| {
                LoadError::corrupted(format!("header offset '{}' is not an integer", v))
            })?,
            None => 0,
        };

        let header = Self {
            samples,
            lines,
            bands,
            data_type,
            interleave,
            byte_order,
            header_offset,
            wavelengths: optional_numbers(&fields, "wavelength"),
            fwhm: optional_numbers(&fields, "fwhm"),
            wavelength_units: optional_text(&fields, "wavelength units"),
            description: optional_text(&fields, "description"),
            band_names: fields.get("band names").map(|v| split_list(v)).unwrap_or_default(),
            bad_bands: optional_numbers(&fields, "bbl")
                .map(|flags| flags.into_iter().map(|f| f != 0.0).collect()),
            map_info: fields.get("map info").cloned(),
            units: optional_text(&fields, "units"),
            rotation: optional_numbers(&fields, "rotation").and_then(|v| v.first().copied()),
            x_start: optional_integer(&fields, "x start"),
            y_start: optional_integer(&fields, "y start"),
            fields,
        };

        log::debug!(
            "ENVI header: {}x{}x{} {} {} {:?} offset={}",
            header.lines,
            header.samples,
            header.bands,
            header.data_type,
            header.interleave.name(),
            header.byte_order,
            header.header_offset
        );

        Ok(header)
    }

    /// Number of elements in the payload.
    pub fn element_count(&self) -> Option<usize> {
        self.lines
            .checked_mul(self.samples)
            .and_then(|n| n.checked_mul(self.bands))
    }

    /// Payload size in bytes.
    pub fn payload_bytes(&self) -> Option<usize> {
        self.element_count()
            .and_then(|n| n.checked_mul(self.data_type.bytes()))
    }

    /// True when `wavelength units` names micrometers.
    pub fn in_micrometers(&self) -> bool {
        self.wavelength_units.as_deref().is_some_and(|u| {
            matches!(
                u.trim().to_ascii_lowercase().as_str(),
                "micrometers" | "micrometer" | "microns" | "micron" | "um" | "µm"
            )
        })
    }

    /// Wavelengths in nanometers when the header states micrometers and
    /// `convert_micrometers` is set; otherwise as written.
    pub fn wavelengths_nm(&self, convert_micrometers: bool) -> Option<Vec<f64>> {
        self.wavelengths
            .as_deref()
            .map(|v| self.scaled(v, convert_micrometers))
    }

    /// FWHM values, converted like [`wavelengths_nm`](Self::wavelengths_nm).
    pub fn fwhm_nm(&self, convert_micrometers: bool) -> Option<Vec<f64>> {
        self.fwhm
            .as_deref()
            .map(|v| self.scaled(v, convert_micrometers))
    }

    fn scaled(&self, values: &[f64], convert_micrometers: bool) -> Vec<f64> {
        if convert_micrometers && self.in_micrometers() {
            values.iter().map(|w| w * 1000.0).collect()
        } else {
            values.to_vec()
        }
    }

    /// Geo-reference built from `map info`, with header-level `rotation`
    /// and `units` filling what the record leaves out. A malformed record
    /// is logged and ignored.
    pub fn geo_reference(&self) -> Option<GeoReference> {
        let map_info = self.map_info.as_deref()?;
        let mut geo = match GeoReference::from_map_info(map_info) {
            Ok(geo) => geo,
            Err(e) => {
                log::warn!("Ignoring map info: {}", e);
                return None;
            }
        };
        if geo.rotation_deg == 0.0 {
            if let Some(rotation) = self.rotation {
                geo.rotation_deg = rotation;
            }
        }
        if geo.units.is_none() {
            geo.units = self.units.clone();
        }
        Some(geo)
    }
}

/// Split header text into lowercased keys and raw values, joining
/// brace-continued lines with spaces.
pub fn parse_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let mut pending: Option<(String, String)> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some((key, mut value)) = pending.take() {
            value.push(' ');
            value.push_str(trimmed);
            if trimmed.contains('}') {
                fields.insert(key, value);
            } else {
                pending = Some((key, value));
            }
            continue;
        }

        if trimmed.eq_ignore_ascii_case("envi") {
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            log::trace!("Skipping ENVI header line without '=': {}", trimmed);
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_string();

        if value.contains('{') && !value.contains('}') {
            pending = Some((key, value));
        } else {
            fields.insert(key, value);
        }
    }

    if let Some((key, value)) = pending {
        log::warn!("ENVI header field '{}' has no closing brace", key);
        fields.insert(key, value);
    }

    fields
}

fn strip_braces(value: &str) -> &str {
    value.trim().trim_start_matches('{').trim_end_matches('}').trim()
}

/// Comma-separated items of a `{...}` value.
fn split_list(value: &str) -> Vec<String> {
    strip_braces(value)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn required<'a>(fields: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, LoadError> {
    fields
        .get(key)
        .map(|v| strip_braces(v))
        .ok_or_else(|| LoadError::corrupted(format!("missing required field '{}'", key)))
}

fn required_usize(fields: &BTreeMap<String, String>, key: &str) -> Result<usize, LoadError> {
    let value = required(fields, key)?;
    let parsed: usize = value
        .parse()
        .map_err(|_| LoadError::corrupted(format!("{} '{}' is not an integer", key, value)))?;
    if parsed == 0 {
        return Err(LoadError::invalid_dimensions(format!("{} must be positive", key)));
    }
    Ok(parsed)
}

fn optional_text(fields: &BTreeMap<String, String>, key: &str) -> Option<String> {
    fields
        .get(key)
        .map(|v| strip_braces(v).to_string())
        .filter(|v| !v.is_empty())
}

fn optional_numbers(fields: &BTreeMap<String, String>, key: &str) -> Option<Vec<f64>> {
    let value = fields.get(key)?;
    let parsed: Result<Vec<f64>, _> = split_list(value).iter().map(|s| s.parse::<f64>()).collect();
    match parsed {
        Ok(numbers) if !numbers.is_empty() => Some(numbers),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Ignoring ENVI field '{}': {}", key, e);
            None
        }
    }
}

fn optional_integer(fields: &BTreeMap<String, String>, key: &str) -> Option<i64> {
    let value = strip_braces(fields.get(key)?);
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|v| v.round() as i64))
}

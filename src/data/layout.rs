//! Logical axis layouts and flat indexing.
//!
//! A cube's three extents carry no meaning by themselves. A [`Layout`] says
//! which physical axis is the channel axis and which are height and width;
//! the same cube can be viewed under several layouts without copying.

use serde::{Deserialize, Serialize};

/// Assignment of the three physical axes to channel, height and width.
///
/// The explicit variants spell the role of physical axes 0, 1 and 2 in
/// order, so `Hwc` means axis 0 is height, axis 1 is width and axis 2 is
/// the channel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Smallest extent is the channel axis
    #[default]
    Auto,
    Chw,
    Cwh,
    Hcw,
    Hwc,
    Wch,
    Whc,
}

impl Layout {
    /// Get all layouts, `Auto` first.
    pub fn all() -> &'static [Layout] {
        &[
            Layout::Auto,
            Layout::Chw,
            Layout::Cwh,
            Layout::Hcw,
            Layout::Hwc,
            Layout::Wch,
            Layout::Whc,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layout::Auto => "auto",
            Layout::Chw => "chw",
            Layout::Cwh => "cwh",
            Layout::Hcw => "hcw",
            Layout::Hwc => "hwc",
            Layout::Wch => "wch",
            Layout::Whc => "whc",
        }
    }

    /// Parse a layout name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::all().iter().copied().find(|l| l.name() == name)
    }

    /// Resolve this layout against physical extents.
    ///
    /// A cube with a unit-length axis is a single-band image: the first unit
    /// axis becomes the channel axis whatever the layout says, so its channel
    /// count is always 1.
    pub fn resolve(self, dims: [usize; 3]) -> AxisRoles {
        if let Some(unit) = dims.iter().position(|&d| d == 1) {
            return AxisRoles::with_channel(unit);
        }

        match self {
            Layout::Auto => {
                // strict `<` keeps the first minimum on ties
                let channel =
                    (1..3).fold(0, |best, axis| if dims[axis] < dims[best] { axis } else { best });
                AxisRoles::with_channel(channel)
            }
            Layout::Chw => AxisRoles::new(0, 1, 2),
            Layout::Cwh => AxisRoles::new(0, 2, 1),
            Layout::Hcw => AxisRoles::new(1, 0, 2),
            Layout::Hwc => AxisRoles::new(2, 0, 1),
            Layout::Wch => AxisRoles::new(1, 2, 0),
            Layout::Whc => AxisRoles::new(2, 1, 0),
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical axis index of each logical role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisRoles {
    pub channel: usize,
    pub height: usize,
    pub width: usize,
}

impl AxisRoles {
    pub fn new(channel: usize, height: usize, width: usize) -> Self {
        Self {
            channel,
            height,
            width,
        }
    }

    /// Channel on `channel`, the other two axes height then width in
    /// physical order.
    fn with_channel(channel: usize) -> Self {
        let mut rest = (0..3).filter(|&axis| axis != channel);
        let height = rest.next().unwrap_or(0);
        let width = rest.next().unwrap_or(0);
        Self::new(channel, height, width)
    }

    /// `(channels, height, width)` extents under these roles.
    pub fn extents(&self, dims: [usize; 3]) -> (usize, usize, usize) {
        (dims[self.channel], dims[self.height], dims[self.width])
    }

    /// Physical coordinates of logical `(c, h, w)`.
    #[inline]
    pub fn to_physical(&self, c: usize, h: usize, w: usize) -> [usize; 3] {
        let mut index = [0; 3];
        index[self.channel] = c;
        index[self.height] = h;
        index[self.width] = w;
        index
    }
}

/// Flat storage offset of physical coordinates `index`.
///
/// Column-major puts the first index fastest (`i0 + d0*(i1 + d1*i2)`),
/// row-major the last (`i2 + d2*(i1 + d1*i0)`).
#[inline]
pub fn flat_index(dims: [usize; 3], column_major: bool, index: [usize; 3]) -> usize {
    let [i0, i1, i2] = index;
    let [d0, d1, d2] = dims;
    if column_major {
        i0 + d0 * (i1 + d1 * i2)
    } else {
        i2 + d2 * (i1 + d1 * i0)
    }
}

/// Inverse of [`flat_index`].
#[inline]
pub fn unravel_index(dims: [usize; 3], column_major: bool, flat: usize) -> [usize; 3] {
    let [d0, d1, d2] = dims;
    if column_major {
        [flat % d0, (flat / d0) % d1, flat / (d0 * d1)]
    } else {
        [flat / (d1 * d2), (flat / d2) % d1, flat % d2]
    }
}

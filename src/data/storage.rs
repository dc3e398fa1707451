//! Bit-width preserving numeric storage for cube elements.
//!
//! A cube keeps its samples in the element type they had on disk, so an
//! 8-bit mask stays one byte per element in memory. Generic numeric code
//! never branches on the type itself; it reads through [`TypedStorage::value_at`].

use std::io::Read;

use bytemuck::Pod;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::error::LoadError;

/// Primitive element kind of a [`TypedStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    /// Get all kinds, narrowest integers first.
    pub fn all() -> &'static [ScalarKind] {
        &[
            ScalarKind::U8,
            ScalarKind::I8,
            ScalarKind::U16,
            ScalarKind::I16,
            ScalarKind::U32,
            ScalarKind::I32,
            ScalarKind::U64,
            ScalarKind::I64,
            ScalarKind::F32,
            ScalarKind::F64,
        ]
    }

    /// Size of one element in bytes.
    pub fn bytes(self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::U64 | ScalarKind::I64 | ScalarKind::F64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    /// Smallest and largest representable value, as `f64`.
    pub fn value_range(self) -> (f64, f64) {
        match self {
            ScalarKind::U8 => (0.0, f64::from(u8::MAX)),
            ScalarKind::I8 => (f64::from(i8::MIN), f64::from(i8::MAX)),
            ScalarKind::U16 => (0.0, f64::from(u16::MAX)),
            ScalarKind::I16 => (f64::from(i16::MIN), f64::from(i16::MAX)),
            ScalarKind::U32 => (0.0, f64::from(u32::MAX)),
            ScalarKind::I32 => (f64::from(i32::MIN), f64::from(i32::MAX)),
            ScalarKind::U64 => (0.0, u64::MAX as f64),
            ScalarKind::I64 => (i64::MIN as f64, i64::MAX as f64),
            ScalarKind::F32 => (f64::from(f32::MIN), f64::from(f32::MAX)),
            ScalarKind::F64 => (f64::MIN, f64::MAX),
        }
    }

    /// Whether every value in `[lo, hi]` is representable by this kind.
    pub fn contains_range(self, lo: f64, hi: f64) -> bool {
        let (min, max) = self.value_range();
        lo.is_finite() && hi.is_finite() && lo >= min && hi <= max
    }

    /// Get the display name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::U8 => "uint8",
            ScalarKind::I8 => "int8",
            ScalarKind::U16 => "uint16",
            ScalarKind::I16 => "int16",
            ScalarKind::U32 => "uint32",
            ScalarKind::I32 => "int32",
            ScalarKind::U64 => "uint64",
            ScalarKind::I64 => "int64",
            ScalarKind::F32 => "float32",
            ScalarKind::F64 => "float64",
        }
    }
}

impl std::fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte order of serialized elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the host.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn is_native(self) -> bool {
        self == Self::native()
    }
}

/// A primitive type that can back a [`TypedStorage`] variant.
pub trait Scalar: Pod + Send + Sync + PartialOrd {
    const KIND: ScalarKind;

    fn to_f64(self) -> f64;

    /// Quantize a float: integers round half away from zero and saturate,
    /// NaN becomes zero. Floats cast.
    fn from_f64(value: f64) -> Self;

    fn byte_swapped(self) -> Self;

    fn into_storage(values: Vec<Self>) -> TypedStorage;
}

macro_rules! impl_int_scalar {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl Scalar for $t {
                const KIND: ScalarKind = ScalarKind::$kind;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    if value.is_nan() {
                        0
                    } else {
                        // `as` saturates at the type bounds
                        value.round() as $t
                    }
                }

                #[inline]
                fn byte_swapped(self) -> Self {
                    self.swap_bytes()
                }

                fn into_storage(values: Vec<Self>) -> TypedStorage {
                    TypedStorage::$kind(values)
                }
            }
        )*
    };
}

impl_int_scalar!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
);

impl Scalar for f32 {
    const KIND: ScalarKind = ScalarKind::F32;

    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn byte_swapped(self) -> Self {
        f32::from_bits(self.to_bits().swap_bytes())
    }

    fn into_storage(values: Vec<Self>) -> TypedStorage {
        TypedStorage::F32(values)
    }
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn byte_swapped(self) -> Self {
        f64::from_bits(self.to_bits().swap_bytes())
    }

    fn into_storage(values: Vec<Self>) -> TypedStorage {
        TypedStorage::F64(values)
    }
}

/// Element buffer of a cube, one variant per primitive kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedStorage {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Run `$body` with `$values` bound to the inner `Vec` of whichever variant
/// `$storage` holds.
macro_rules! with_values {
    ($storage:expr, $values:ident => $body:expr) => {
        match $storage {
            TypedStorage::U8($values) => $body,
            TypedStorage::I8($values) => $body,
            TypedStorage::U16($values) => $body,
            TypedStorage::I16($values) => $body,
            TypedStorage::U32($values) => $body,
            TypedStorage::I32($values) => $body,
            TypedStorage::U64($values) => $body,
            TypedStorage::I64($values) => $body,
            TypedStorage::F32($values) => $body,
            TypedStorage::F64($values) => $body,
        }
    };
}

/// Run `$body` with the type alias `$t` set to the primitive of `$kind`.
macro_rules! with_kind {
    ($kind:expr, $t:ident => $body:expr) => {
        match $kind {
            ScalarKind::U8 => {
                type $t = u8;
                $body
            }
            ScalarKind::I8 => {
                type $t = i8;
                $body
            }
            ScalarKind::U16 => {
                type $t = u16;
                $body
            }
            ScalarKind::I16 => {
                type $t = i16;
                $body
            }
            ScalarKind::U32 => {
                type $t = u32;
                $body
            }
            ScalarKind::I32 => {
                type $t = i32;
                $body
            }
            ScalarKind::U64 => {
                type $t = u64;
                $body
            }
            ScalarKind::I64 => {
                type $t = i64;
                $body
            }
            ScalarKind::F32 => {
                type $t = f32;
                $body
            }
            ScalarKind::F64 => {
                type $t = f64;
                $body
            }
        }
    };
}

pub(crate) use {with_kind, with_values};

impl TypedStorage {
    /// Number of elements.
    pub fn len(&self) -> usize {
        with_values!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            TypedStorage::U8(_) => ScalarKind::U8,
            TypedStorage::I8(_) => ScalarKind::I8,
            TypedStorage::U16(_) => ScalarKind::U16,
            TypedStorage::I16(_) => ScalarKind::I16,
            TypedStorage::U32(_) => ScalarKind::U32,
            TypedStorage::I32(_) => ScalarKind::I32,
            TypedStorage::U64(_) => ScalarKind::U64,
            TypedStorage::I64(_) => ScalarKind::I64,
            TypedStorage::F32(_) => ScalarKind::F32,
            TypedStorage::F64(_) => ScalarKind::F64,
        }
    }

    pub fn bytes_per_element(&self) -> usize {
        self.kind().bytes()
    }

    /// Total size of the element buffer in bytes.
    pub fn byte_size(&self) -> usize {
        self.len() * self.bytes_per_element()
    }

    /// Read the element at `index` as `f64`.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    #[inline]
    pub fn value_at(&self, index: usize) -> f64 {
        with_values!(self, v => v[index].to_f64())
    }

    /// Bounds-checked variant of [`value_at`](Self::value_at).
    pub fn get(&self, index: usize) -> Option<f64> {
        (index < self.len()).then(|| self.value_at(index))
    }

    /// Iterate all elements as `f64` in storage order.
    pub fn iter_f64(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(move |i| self.value_at(i))
    }

    /// Copy all elements into a new `f64` buffer.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_values!(self, v => v.par_iter().map(|&x| x.to_f64()).collect())
    }

    /// Raw element bytes in host byte order.
    pub fn as_bytes(&self) -> &[u8] {
        with_values!(self, v => bytemuck::cast_slice(v.as_slice()))
    }

    /// Quantize `values` into a new buffer of `kind` (round and clamp for
    /// integer kinds).
    pub fn from_f64(kind: ScalarKind, values: &[f64]) -> Self {
        with_kind!(kind, T => T::into_storage(
            values.par_iter().map(|&x| T::from_f64(x)).collect()
        ))
    }

    /// Read `count` elements of `kind` serialized in `order` from `reader`.
    ///
    /// A short read is reported as [`LoadError::CorruptedData`].
    pub fn read_from<R: Read>(
        reader: &mut R,
        kind: ScalarKind,
        count: usize,
        order: ByteOrder,
    ) -> Result<Self, LoadError> {
        with_kind!(kind, T => read_elements::<T, R>(reader, count, order).map(T::into_storage))
    }

    /// Decode the first `count` elements of `bytes`.
    pub fn from_bytes(
        kind: ScalarKind,
        bytes: &[u8],
        count: usize,
        order: ByteOrder,
    ) -> Result<Self, LoadError> {
        let mut reader = bytes;
        Self::read_from(&mut reader, kind, count, order)
    }
}

/// Read `count` elements straight into a typed buffer, swapping bytes when
/// `order` is not the host order.
pub fn read_elements<T: Scalar, R: Read>(
    reader: &mut R,
    count: usize,
    order: ByteOrder,
) -> Result<Vec<T>, LoadError> {
    let byte_len = count
        .checked_mul(std::mem::size_of::<T>())
        .ok_or_else(|| LoadError::invalid_dimensions(format!("{count} elements overflow")))?;

    let mut values: Vec<T> = Vec::new();
    values
        .try_reserve_exact(count)
        .map_err(LoadError::allocation(byte_len))?;
    values.resize(count, <T as bytemuck::Zeroable>::zeroed());

    reader
        .read_exact(bytemuck::cast_slice_mut(values.as_mut_slice()))
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => LoadError::corrupted(format!(
                "payload truncated: expected {} bytes of {}",
                byte_len,
                T::KIND
            )),
            _ => LoadError::read(e.to_string()),
        })?;

    if !order.is_native() {
        values.par_iter_mut().for_each(|v| *v = v.byte_swapped());
    }

    Ok(values)
}

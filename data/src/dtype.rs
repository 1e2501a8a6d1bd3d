use crate::error::{DataError, Result};
use byteorder::{ByteOrder, LittleEndian as LE};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// The element type of an on-disk array
///
/// Raw recordings are stored little-endian. The numeric codes used by the raw
/// binary header are the 1-based position of each variant in this list.
#[derive(
    Default, Display, EnumString, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    #[default]
    Float64,
}

impl DType {
    /// Number of bytes occupied by one element
    #[must_use]
    pub const fn item_size(&self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 | Self::Float64 => 8,
        }
    }

    /// Matches a raw binary header dtype code (1..=10)
    /// # Errors
    /// Will return `Err` if `code` is not a known dtype code
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            1 => Self::Int8,
            2 => Self::Uint8,
            3 => Self::Int16,
            4 => Self::Uint16,
            5 => Self::Int32,
            6 => Self::Uint32,
            7 => Self::Int64,
            8 => Self::Uint64,
            9 => Self::Float32,
            10 => Self::Float64,
            other => {
                return Err(DataError::invalid_value(
                    "dtype code",
                    "integer between 1 and 10",
                    other.to_string(),
                ));
            }
        })
    }

    /// Returns the raw binary header code of the dtype
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Int8 => 1,
            Self::Uint8 => 2,
            Self::Int16 => 3,
            Self::Uint16 => 4,
            Self::Int32 => 5,
            Self::Uint32 => 6,
            Self::Int64 => 7,
            Self::Uint64 => 8,
            Self::Float32 => 9,
            Self::Float64 => 10,
        }
    }

    /// Decodes a single little-endian element into an `f64`
    ///
    /// `bytes` must hold at least `item_size()` bytes.
    #[must_use]
    pub fn decode_f64(&self, bytes: &[u8]) -> f64 {
        match self {
            Self::Int8 => f64::from(bytes[0] as i8),
            Self::Uint8 => f64::from(bytes[0]),
            Self::Int16 => f64::from(LE::read_i16(bytes)),
            Self::Uint16 => f64::from(LE::read_u16(bytes)),
            Self::Int32 => f64::from(LE::read_i32(bytes)),
            Self::Uint32 => f64::from(LE::read_u32(bytes)),
            Self::Int64 => LE::read_i64(bytes) as f64,
            Self::Uint64 => LE::read_u64(bytes) as f64,
            Self::Float32 => f64::from(LE::read_f32(bytes)),
            Self::Float64 => LE::read_f64(bytes),
        }
    }

    /// Decodes a contiguous little-endian buffer into `f64` values
    #[must_use]
    pub fn decode_all(&self, bytes: &[u8]) -> Vec<f64> {
        bytes
            .chunks_exact(self.item_size())
            .map(|chunk| self.decode_f64(chunk))
            .collect()
    }
}

/// Rust primitives that can be written to disk as a given [`DType`]
pub trait Element: bytemuck::Pod {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DTYPE: DType = DType::$dtype;
        })*
    };
}

impl_element!(
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
);

/// Converts a typed slice into little-endian bytes
#[must_use]
pub fn to_le_bytes<T: Element>(values: &[T]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        bytemuck::cast_slice(values).to_vec()
    } else {
        let size = T::DTYPE.item_size();
        let mut out = Vec::with_capacity(values.len() * size);
        for value in values {
            let mut raw = bytemuck::bytes_of(value).to_vec();
            raw.reverse();
            out.extend_from_slice(&raw);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn codes_round_trip() {
        for code in 1..=10 {
            let dtype = DType::from_code(code).expect("valid code");
            assert_eq!(dtype.code(), code);
        }
        assert!(DType::from_code(0).is_err());
        assert!(DType::from_code(11).is_err());
    }

    #[test]
    fn names_parse() {
        assert_eq!(DType::from_str("float32").unwrap(), DType::Float32);
        assert_eq!(DType::Uint16.to_string(), "uint16");
    }

    #[test]
    fn decode_typed_bytes() {
        let bytes = to_le_bytes(&[-3_i16, 7]);
        assert_eq!(DType::Int16.decode_all(&bytes), vec![-3.0, 7.0]);

        let bytes = to_le_bytes(&[1.5_f32]);
        assert_eq!(DType::Float32.decode_f64(&bytes), 1.5);
    }
}

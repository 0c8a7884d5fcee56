//! Schema type vocabulary.
//!
//! This module contains the closed sets a schema document draws from:
//! wire data types, printf-style conversion strings and compression schemes.

use std::fmt;

/// Wire data type of a scalar field or array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean stored as a 4-byte integer.
    Bool,
    /// Signed 8-bit character.
    Char,
    /// Unsigned 8-bit value.
    UChar,
    /// Signed 16-bit integer.
    Short,
    /// Unsigned 16-bit integer.
    UShort,
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    UInt,
    /// Signed 32-bit integer.
    Long,
    /// Unsigned 32-bit integer.
    ULong,
    /// Signed 64-bit integer.
    LongLong,
    /// Unsigned 64-bit integer.
    ULongLong,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// Raw byte, printed as hex.
    HexByte,
    /// Satellite identifier: u16 PRN or slot plus i16 frequency channel.
    SatelliteId,
}

impl DataType {
    /// Returns the size of the type in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::Char | Self::UChar | Self::HexByte => 1,
            Self::Short | Self::UShort => 2,
            Self::Bool
            | Self::Int
            | Self::UInt
            | Self::Long
            | Self::ULong
            | Self::Float
            | Self::SatelliteId => 4,
            Self::LongLong | Self::ULongLong | Self::Double => 8,
        }
    }

    /// Returns the schema document name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Char => "CHAR",
            Self::UChar => "UCHAR",
            Self::Short => "SHORT",
            Self::UShort => "USHORT",
            Self::Int => "INT",
            Self::UInt => "UINT",
            Self::Long => "LONG",
            Self::ULong => "ULONG",
            Self::LongLong => "LONGLONG",
            Self::ULongLong => "ULONGLONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::HexByte => "HEXBYTE",
            Self::SatelliteId => "SATELLITEID",
        }
    }

    /// Parses a data type from its schema document name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "BOOL" => Some(Self::Bool),
            "CHAR" => Some(Self::Char),
            "UCHAR" => Some(Self::UChar),
            "SHORT" => Some(Self::Short),
            "USHORT" => Some(Self::UShort),
            "INT" => Some(Self::Int),
            "UINT" => Some(Self::UInt),
            "LONG" => Some(Self::Long),
            "ULONG" => Some(Self::ULong),
            "LONGLONG" => Some(Self::LongLong),
            "ULONGLONG" => Some(Self::ULongLong),
            "FLOAT" => Some(Self::Float),
            "DOUBLE" => Some(Self::Double),
            "HEXBYTE" => Some(Self::HexByte),
            "SATELLITEID" => Some(Self::SatelliteId),
            _ => None,
        }
    }

    /// Returns true if this is a signed integer type.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        matches!(
            self,
            Self::Char | Self::Short | Self::Int | Self::Long | Self::LongLong
        )
    }

    /// Returns true if this is an unsigned integer type.
    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Self::UChar
                | Self::UShort
                | Self::UInt
                | Self::ULong
                | Self::ULongLong
                | Self::HexByte
        )
    }

    /// Returns true if this is any integer type.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    /// Returns true if this is a floating point type.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Returns the signed integer type with the given width, used for enums.
    #[must_use]
    pub const fn enum_storage(length: usize) -> Option<Self> {
        match length {
            1 => Some(Self::Char),
            2 => Some(Self::Short),
            4 => Some(Self::Int),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Conversion character of a conversion string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionSpec {
    /// `d` or `i`: signed decimal.
    Signed,
    /// `u`: unsigned decimal.
    Unsigned,
    /// `x`: lowercase hex.
    Hex,
    /// `X`: uppercase hex.
    UpperHex,
    /// `f`: fixed-point decimal.
    Fixed,
    /// `e`: exponent notation.
    Exponent,
    /// `g`: shortest representation.
    General,
    /// `c`: single character.
    Char,
    /// `s` or `S`: character array printed as a string.
    String,
    /// `Z`: byte array printed as contiguous hex.
    HexBytes,
}

/// Parsed printf-style conversion string: `%[width][.precision][l|ll|h]spec`.
///
/// # Example
/// ```
/// use rxlog_schema::types::{Conversion, ConversionSpec};
///
/// let conv = Conversion::parse("%08lx").unwrap();
/// assert_eq!(conv.width, Some(8));
/// assert_eq!(conv.spec, ConversionSpec::Hex);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Conversion {
    /// Minimum printed width. Hex output is zero-padded to this width.
    pub width: Option<usize>,
    /// Digits after the decimal point.
    pub precision: Option<usize>,
    /// Conversion character.
    pub spec: ConversionSpec,
}

impl Conversion {
    /// Parses a conversion string.
    ///
    /// # Returns
    /// `None` if the string does not follow the grammar.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix('%')?;
        let (width, rest) = split_number(rest);
        let (precision, rest) = match rest.strip_prefix('.') {
            Some(after) => {
                let (digits, after) = split_number(after);
                (Some(digits.unwrap_or(0)), after)
            }
            None => (None, rest),
        };
        let rest = rest
            .strip_prefix("ll")
            .or_else(|| rest.strip_prefix("hh"))
            .or_else(|| rest.strip_prefix('l'))
            .or_else(|| rest.strip_prefix('h'))
            .unwrap_or(rest);

        let mut chars = rest.chars();
        let spec = match chars.next()? {
            'd' | 'i' => ConversionSpec::Signed,
            'u' => ConversionSpec::Unsigned,
            'x' => ConversionSpec::Hex,
            'X' => ConversionSpec::UpperHex,
            'f' => ConversionSpec::Fixed,
            'e' | 'E' => ConversionSpec::Exponent,
            'g' | 'G' => ConversionSpec::General,
            'c' => ConversionSpec::Char,
            's' | 'S' => ConversionSpec::String,
            'Z' => ConversionSpec::HexBytes,
            _ => return None,
        };
        if chars.next().is_some() {
            return None;
        }
        Some(Self {
            width,
            precision,
            spec,
        })
    }

    /// Returns true for hex conversions.
    #[must_use]
    pub const fn is_hex(&self) -> bool {
        matches!(self.spec, ConversionSpec::Hex | ConversionSpec::UpperHex)
    }
}

fn split_number(text: &str) -> (Option<usize>, &str) {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return (None, text);
    }
    (text[..end].parse().ok(), &text[end..])
}

/// Decompression scheme of a compressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionScheme {
    /// Satellite baseline block followed by delta-coded signal blocks.
    SatelliteSignal,
    /// Self-contained fixed-size range records.
    RangeRecord,
    /// Bit-packed per-system satellite and signal masks followed by
    /// reference or differential measurement blocks.
    BitPacked,
}

impl CompressionScheme {
    /// Parses a scheme from its schema document name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SATELLITE_SIGNAL" => Some(Self::SatelliteSignal),
            "RANGE_RECORD" => Some(Self::RangeRecord),
            "BIT_PACKED" => Some(Self::BitPacked),
            _ => None,
        }
    }

    /// Returns the schema document name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SatelliteSignal => "SATELLITE_SIGNAL",
            Self::RangeRecord => "RANGE_RECORD",
            Self::BitPacked => "BIT_PACKED",
        }
    }
}

//! Generic message model.
//!
//! A [`GenericMessage`] is the format-independent form of one log: the
//! header record plus one [`FieldValue`] per field of the message
//! definition, in definition order. Every decoder produces one and every
//! encoder consumes one.

use rxlog_core::LogHeader;
use rxlog_schema::{DataType, FieldDef, FieldKind, MessageDef};
use std::fmt;
use std::str::FromStr;

/// Satellite identifier: PRN or slot plus GLONASS frequency channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SatelliteId {
    /// PRN or slot number.
    pub prn: u16,
    /// Frequency channel, zero for systems without one.
    pub frequency: i16,
}

impl SatelliteId {
    /// Creates a satellite identifier.
    #[must_use]
    pub const fn new(prn: u16, frequency: i16) -> Self {
        Self { prn, frequency }
    }
}

impl fmt::Display for SatelliteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.frequency {
            0 => write!(f, "{}", self.prn),
            freq if freq > 0 => write!(f, "{}+{}", self.prn, freq),
            freq => write!(f, "{}-{}", self.prn, freq.unsigned_abs()),
        }
    }
}

impl FromStr for SatelliteId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("invalid satellite id '{s}'");
        let (prn, frequency) = match s.find(['+', '-']) {
            Some(pos) => {
                let magnitude: i16 = s[pos + 1..].parse().map_err(|_| bad())?;
                let frequency = if s.as_bytes()[pos] == b'-' {
                    -magnitude
                } else {
                    magnitude
                };
                (&s[..pos], frequency)
            }
            None => (s, 0),
        };
        Ok(Self {
            prn: prn.parse().map_err(|_| bad())?,
            frequency,
        })
    }
}

/// Value of one field.
///
/// Integer fields widen to 64 bits and `FLOAT` fields widen to `f64`; the
/// definition supplies the wire width when encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `BOOL` value.
    Bool(bool),
    /// Signed integer, including `CHAR`.
    Int(i64),
    /// Unsigned integer, including `HEXBYTE`.
    UInt(u64),
    /// `FLOAT` or `DOUBLE` value.
    Float(f64),
    /// Character string.
    String(String),
    /// Enumerated value.
    Enum(i32),
    /// `SATELLITEID` value.
    SatelliteId(SatelliteId),
    /// Scalar array elements, or field-array records.
    Array(Vec<FieldValue>),
    /// Field-array record or nested message, one value per sub-field.
    Record(Vec<FieldValue>),
    /// Compressed block, kept opaque until decompressed.
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Returns the zero value of a scalar type.
    #[must_use]
    pub fn zero_scalar(data_type: DataType) -> Self {
        match data_type {
            DataType::Bool => Self::Bool(false),
            DataType::Float | DataType::Double => Self::Float(0.0),
            DataType::SatelliteId => Self::SatelliteId(SatelliteId::default()),
            dt if dt.is_signed() => Self::Int(0),
            _ => Self::UInt(0),
        }
    }

    /// Returns the value an omitted field takes.
    ///
    /// Fixed arrays hold `len` zero elements and nested messages hold a
    /// zeroed record; counted arrays are empty.
    #[must_use]
    pub fn zero(def: &FieldDef) -> Self {
        match &def.kind {
            FieldKind::Simple { data_type } => Self::zero_scalar(*data_type),
            FieldKind::Enum { .. } => Self::Enum(0),
            FieldKind::String { .. } => Self::String(String::new()),
            FieldKind::FixedArray { data_type, len } => {
                Self::Array(vec![Self::zero_scalar(*data_type); *len])
            }
            FieldKind::VarArray { .. } | FieldKind::FieldArray { .. } => Self::Array(Vec::new()),
            FieldKind::Message(nested) => Self::Record(nested.fields.iter().map(Self::zero).collect()),
            FieldKind::Compressed { .. } => Self::Bytes(Vec::new()),
        }
    }

    /// Returns the value as a signed integer, if it holds an integer that fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v),
            Self::UInt(v) => i64::try_from(v).ok(),
            Self::Enum(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer, if it holds a non-negative integer.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::UInt(v) => Some(v),
            Self::Int(v) => u64::try_from(v).ok(),
            Self::Enum(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Returns the value as a float, converting integers.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(v),
            Self::Int(v) => Some(v as f64),
            Self::UInt(v) => Some(v as f64),
            _ => None,
        }
    }

    /// Returns the string, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the sub-field values, if this is a record.
    #[must_use]
    pub fn as_record(&self) -> Option<&[FieldValue]> {
        match self {
            Self::Record(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this is a compressed block.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "signed integer",
            Self::UInt(_) => "unsigned integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Enum(_) => "enum",
            Self::SatelliteId(_) => "satellite id",
            Self::Array(_) => "array",
            Self::Record(_) => "record",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// One decoded log: header plus field values in definition order.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericMessage {
    /// Header record.
    pub header: LogHeader,
    /// Field values, one per field of the definition.
    pub fields: Vec<FieldValue>,
}

impl GenericMessage {
    /// Creates a message from a header and field values.
    #[must_use]
    pub fn new(header: LogHeader, fields: Vec<FieldValue>) -> Self {
        Self { header, fields }
    }

    /// Creates a message with every field at its zero value.
    #[must_use]
    pub fn zeroed(def: &MessageDef, header: LogHeader) -> Self {
        Self {
            header,
            fields: def.fields.iter().map(FieldValue::zero).collect(),
        }
    }

    /// Returns the message ID from the header.
    #[must_use]
    pub fn message_id(&self) -> u16 {
        self.header.message_id
    }

    /// Returns the value of the named top-level field.
    #[must_use]
    pub fn field(&self, def: &MessageDef, name: &str) -> Option<&FieldValue> {
        def.field_index(name).and_then(|idx| self.fields.get(idx))
    }

    /// Returns a mutable reference to the named top-level field.
    pub fn field_mut(&mut self, def: &MessageDef, name: &str) -> Option<&mut FieldValue> {
        def.field_index(name).and_then(|idx| self.fields.get_mut(idx))
    }
}

/// Scalar checked against its wire type and ready to store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Scalar {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    SatelliteId(SatelliteId),
}

impl Scalar {
    /// Checks a value against a scalar wire type, including its range.
    pub(crate) fn from_value(data_type: DataType, value: &FieldValue) -> Result<Self, String> {
        let mismatch = || {
            format!(
                "expected a value for {}, found {}",
                data_type,
                value.kind_name()
            )
        };
        match data_type {
            DataType::Bool => match value {
                FieldValue::Bool(b) => Ok(Self::Bool(*b)),
                _ => Err(mismatch()),
            },
            DataType::Float | DataType::Double => {
                value.as_f64().map(Self::Float).ok_or_else(mismatch)
            }
            DataType::SatelliteId => match value {
                FieldValue::SatelliteId(id) => Ok(Self::SatelliteId(*id)),
                _ => Err(mismatch()),
            },
            dt if dt.is_signed() => {
                let v = match value {
                    FieldValue::Int(_) | FieldValue::UInt(_) | FieldValue::Enum(_) => {
                        value.as_i64().ok_or_else(|| format!("value out of range for {dt}"))?
                    }
                    _ => return Err(mismatch()),
                };
                check_signed(dt, v)?;
                Ok(Self::Signed(v))
            }
            dt => {
                let v = match value {
                    FieldValue::Int(_) | FieldValue::UInt(_) | FieldValue::Enum(_) => {
                        value.as_u64().ok_or_else(|| format!("value out of range for {dt}"))?
                    }
                    _ => return Err(mismatch()),
                };
                check_unsigned(dt, v)?;
                Ok(Self::Unsigned(v))
            }
        }
    }

    /// Checks an enum value against its storage type.
    pub(crate) fn from_enum(data_type: DataType, value: &FieldValue) -> Result<i64, String> {
        let v = match value {
            FieldValue::Enum(v) => i64::from(*v),
            FieldValue::Int(_) | FieldValue::UInt(_) => value
                .as_i64()
                .ok_or_else(|| format!("value out of range for {data_type}"))?,
            other => return Err(format!("expected an enum value, found {}", other.kind_name())),
        };
        check_signed(data_type, v)?;
        Ok(v)
    }

    /// Returns the integer payload for signed and unsigned scalars.
    pub(crate) fn bits(self) -> u64 {
        match self {
            Self::Bool(b) => u64::from(b),
            Self::Signed(v) => v as u64,
            Self::Unsigned(v) => v,
            Self::Float(v) => v.to_bits(),
            Self::SatelliteId(id) => u64::from(id.prn) | (u64::from(id.frequency as u16) << 16),
        }
    }
}

/// Checks that a signed value fits a signed wire type.
pub(crate) fn check_signed(data_type: DataType, value: i64) -> Result<(), String> {
    let (min, max) = match data_type {
        DataType::Char => (i64::from(i8::MIN), i64::from(i8::MAX)),
        DataType::Short => (i64::from(i16::MIN), i64::from(i16::MAX)),
        DataType::Int | DataType::Long => (i64::from(i32::MIN), i64::from(i32::MAX)),
        _ => (i64::MIN, i64::MAX),
    };
    if value < min || value > max {
        return Err(format!("value {value} out of range for {data_type}"));
    }
    Ok(())
}

/// Checks that an unsigned value fits an unsigned wire type.
pub(crate) fn check_unsigned(data_type: DataType, value: u64) -> Result<(), String> {
    let max = match data_type {
        DataType::UChar | DataType::HexByte => u64::from(u8::MAX),
        DataType::UShort => u64::from(u16::MAX),
        DataType::UInt | DataType::ULong => u64::from(u32::MAX),
        _ => u64::MAX,
    };
    if value > max {
        return Err(format!("value {value} out of range for {data_type}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxlog_schema::MessageDatabase;

    #[test]
    fn test_satellite_id_text() {
        assert_eq!(SatelliteId::new(12, 0).to_string(), "12");
        assert_eq!(SatelliteId::new(45, 3).to_string(), "45+3");
        assert_eq!(SatelliteId::new(40, -7).to_string(), "40-7");

        assert_eq!("45+3".parse::<SatelliteId>().unwrap(), SatelliteId::new(45, 3));
        assert_eq!("40-7".parse::<SatelliteId>().unwrap(), SatelliteId::new(40, -7));
        assert_eq!("8".parse::<SatelliteId>().unwrap(), SatelliteId::new(8, 0));
        assert!("x+1".parse::<SatelliteId>().is_err());
        assert!("".parse::<SatelliteId>().is_err());
    }

    #[test]
    fn test_scalar_range_checks() {
        assert_eq!(
            Scalar::from_value(DataType::UChar, &FieldValue::UInt(255)).unwrap(),
            Scalar::Unsigned(255)
        );
        assert!(Scalar::from_value(DataType::UChar, &FieldValue::UInt(256)).is_err());
        assert!(Scalar::from_value(DataType::ULong, &FieldValue::Int(-1)).is_err());
        assert!(Scalar::from_value(DataType::Short, &FieldValue::Int(-32769)).is_err());
        assert_eq!(
            Scalar::from_value(DataType::Long, &FieldValue::UInt(7)).unwrap(),
            Scalar::Signed(7)
        );
        assert!(Scalar::from_value(DataType::Bool, &FieldValue::Int(1)).is_err());
        assert_eq!(
            Scalar::from_value(DataType::Double, &FieldValue::Int(3)).unwrap(),
            Scalar::Float(3.0)
        );
        assert!(Scalar::from_value(DataType::Float, &FieldValue::String("1".into())).is_err());
        assert_eq!(Scalar::from_enum(DataType::Char, &FieldValue::Enum(-4)).unwrap(), -4);
        assert!(Scalar::from_enum(DataType::Char, &FieldValue::Enum(300)).is_err());
    }

    #[test]
    fn test_zero_values() {
        let db = MessageDatabase::from_json(
            r#"{"messages":[
                {"name":"INNER","messageID":2,"fields":[
                    {"name":"flag","type":"SIMPLE","dataType":{"name":"BOOL"}}
                ]},
                {"name":"OUTER","messageID":1,"fields":[
                    {"name":"n","type":"SIMPLE","dataType":{"name":"ULONG"}},
                    {"name":"s","type":"STRING","arrayLength":8},
                    {"name":"fix","type":"FIXED_LENGTH_ARRAY","dataType":{"name":"SHORT"},"arrayLength":3},
                    {"name":"var","type":"VARIABLE_LENGTH_ARRAY","dataType":{"name":"DOUBLE"},"arrayLength":3},
                    {"name":"inner","type":"MESSAGE","messageRef":"INNER"}
                ]}
            ]}"#,
        )
        .unwrap();
        let def = db.lookup(1).unwrap();
        let msg = GenericMessage::zeroed(def, LogHeader::new(1));
        assert_eq!(msg.fields[0], FieldValue::UInt(0));
        assert_eq!(msg.fields[1], FieldValue::String(String::new()));
        assert_eq!(msg.fields[2], FieldValue::Array(vec![FieldValue::Int(0); 3]));
        assert_eq!(msg.fields[3], FieldValue::Array(Vec::new()));
        assert_eq!(
            msg.fields[4],
            FieldValue::Record(vec![FieldValue::Bool(false)])
        );
        assert_eq!(msg.field(def, "s").and_then(FieldValue::as_str), Some(""));
        assert_eq!(msg.message_id(), 1);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(FieldValue::UInt(5).as_i64(), Some(5));
        assert_eq!(FieldValue::UInt(u64::MAX).as_i64(), None);
        assert_eq!(FieldValue::Int(-1).as_u64(), None);
        assert_eq!(FieldValue::Int(2).as_f64(), Some(2.0));
        assert_eq!(FieldValue::Bytes(vec![1]).as_bytes(), Some(&[1u8][..]));
        assert!(FieldValue::Float(1.0).as_array().is_none());
    }
}

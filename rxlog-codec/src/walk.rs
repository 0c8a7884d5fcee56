//! Helpers shared by the schema-driven field walks of every format.
//!
//! Errors raised here carry an empty field path; the record walk that owns
//! the field prefixes its name.

use crate::error::{CodecError, Result};
use crate::message::FieldValue;
use rxlog_schema::{ArrayLength, FieldDef};

/// Returns the element count held by a preceding length field.
pub(crate) fn referenced_count(preceding: &[FieldValue], index: usize, offset: usize) -> Result<usize> {
    preceding
        .get(index)
        .and_then(FieldValue::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| CodecError::field("", offset, "length field is not a valid count"))
}

/// Checks a decoded element count against the field maximum.
pub(crate) fn check_max(count: usize, max_len: usize, offset: usize) -> Result<()> {
    if count > max_len {
        return Err(CodecError::field(
            "",
            offset,
            format!("count {count} exceeds maximum {max_len}"),
        ));
    }
    Ok(())
}

/// Checks the length of an array about to be encoded.
///
/// The length may not exceed the maximum, and a length-referenced array
/// must agree with the value already written for its length field.
pub(crate) fn check_encode_count(
    length: ArrayLength,
    max_len: usize,
    actual: usize,
    preceding: &[FieldValue],
    offset: usize,
) -> Result<()> {
    check_max(actual, max_len, offset)?;
    if let ArrayLength::Field(index) = length {
        let declared = referenced_count(preceding, index, offset)?;
        if declared != actual {
            return Err(CodecError::field(
                "",
                offset,
                format!("length field says {declared} elements, array has {actual}"),
            ));
        }
    }
    Ok(())
}

/// Checks that a message or record supplies one value per field.
pub(crate) fn check_arity(defs: &[FieldDef], values: &[FieldValue], offset: usize) -> Result<()> {
    if defs.len() != values.len() {
        return Err(CodecError::field(
            "",
            offset,
            format!("expected {} field values, found {}", defs.len(), values.len()),
        ));
    }
    Ok(())
}

/// Returns the elements of an array value.
pub(crate) fn array<'v>(value: &'v FieldValue, offset: usize) -> Result<&'v [FieldValue]> {
    value.as_array().ok_or_else(|| {
        CodecError::field(
            "",
            offset,
            format!("expected an array, found {}", value.kind_name()),
        )
    })
}

/// Returns the sub-field values of a record value, checking its arity.
pub(crate) fn record<'v>(defs: &[FieldDef], value: &'v FieldValue, offset: usize) -> Result<&'v [FieldValue]> {
    let values = value.as_record().ok_or_else(|| {
        CodecError::field("", offset, format!("expected a record, found {}", value.kind_name()))
    })?;
    check_arity(defs, values, offset)?;
    Ok(values)
}

/// Returns the string of a string value.
pub(crate) fn string<'v>(value: &'v FieldValue, offset: usize) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        CodecError::field(
            "",
            offset,
            format!("expected a string, found {}", value.kind_name()),
        )
    })
}

/// Returns the bytes of a compressed block value.
pub(crate) fn bytes<'v>(value: &'v FieldValue, offset: usize) -> Result<&'v [u8]> {
    value.as_bytes().ok_or_else(|| {
        CodecError::field(
            "",
            offset,
            format!("expected bytes, found {}", value.kind_name()),
        )
    })
}

/// Decodes a UTF-8 string field.
pub(crate) fn utf8(raw: &[u8], offset: usize) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::field("", offset, "string is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxlog_schema::{DataType, FieldKind};

    #[test]
    fn test_referenced_count() {
        let preceding = [FieldValue::UInt(3)];
        assert_eq!(referenced_count(&preceding, 0, 0).unwrap(), 3);
        assert!(referenced_count(&[FieldValue::Int(-1)], 0, 0).is_err());
        assert!(referenced_count(&[], 0, 0).is_err());
    }

    #[test]
    fn test_encode_count_checks() {
        let preceding = [FieldValue::UInt(2)];
        assert!(check_encode_count(ArrayLength::Field(0), 4, 2, &preceding, 0).is_ok());
        let err = check_encode_count(ArrayLength::Field(0), 4, 3, &preceding, 9).unwrap_err();
        assert!(matches!(err, CodecError::FieldConversion { offset: 9, .. }));
        assert!(check_encode_count(ArrayLength::Prefixed, 4, 5, &[], 0).is_err());
    }

    #[test]
    fn test_shape_checks() {
        let field = FieldDef {
            name: "vals".to_string(),
            kind: FieldKind::Simple {
                data_type: DataType::Double,
            },
            conversion: None,
            description: None,
            flat_offset: 0,
            flat_size: 8,
        };
        assert!(array(&FieldValue::Array(vec![]), 0).is_ok());
        assert!(array(&FieldValue::UInt(1), 0).is_err());
        assert!(record(&[field.clone()], &FieldValue::Record(vec![]), 0).is_err());
        assert!(record(&[field], &FieldValue::Record(vec![FieldValue::Float(1.0)]), 0).is_ok());
        assert!(string(&FieldValue::String("x".into()), 0).is_ok());
        assert!(bytes(&FieldValue::Bytes(vec![1]), 0).is_ok());
        assert!(utf8(&[0xff], 0).is_err());
    }
}

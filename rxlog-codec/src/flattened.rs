//! Flattened binary format.
//!
//! Same header and CRC as [`binary`](crate::binary), but every field takes
//! its maximum size: strings are NUL-padded to `arrayLength` bytes and
//! arrays are zero-padded to `arrayLength` elements (count prefix kept when
//! the length is not referenced). Field offsets are fixed at schema load, so
//! the body length is checked once and every read is unchecked.

use crate::binary::{finish_frame, parse_frame};
use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::message::{FieldValue, GenericMessage, SatelliteId, Scalar};
use crate::walk;
use bytes::{BufMut, BytesMut};
use rxlog_core::{BinaryHeader, ReadBuffer, WriteBuffer};
use rxlog_schema::{ArrayLength, COUNT_PREFIX_SIZE, DataType, FieldDef, FieldKind, MessageDatabase};

/// Decodes a flattened binary log.
///
/// # Errors
/// - `BufferTooShort` if the body is shorter than the flattened size
/// - `MalformedHeader` if it is longer, or on header problems
/// - `CrcMismatch` under the strict CRC policy
/// - `UnknownMessageId` if the ID has no definition
/// - `FieldConversion` if a count exceeds its maximum or a string is not UTF-8
pub fn decode(db: &MessageDatabase, config: &CodecConfig, input: &[u8]) -> Result<GenericMessage> {
    let frame = parse_frame(config, input)?;
    let def = db.lookup(frame.header.log.message_id)?;

    if frame.body.len() < def.flat_size {
        return Err(CodecError::BufferTooShort {
            required: frame.body_offset + def.flat_size,
            available: frame.body_offset + frame.body.len(),
        });
    }
    if frame.body.len() > def.flat_size {
        return Err(CodecError::malformed(
            frame.body_offset + def.flat_size,
            format!(
                "body of {} bytes exceeds the flattened size {}",
                frame.body.len(),
                def.flat_size
            ),
        ));
    }

    let fields = read_record(&def.fields, frame.body, 0).map_err(|e| e.offset_by(frame.body_offset))?;
    Ok(GenericMessage::new(frame.header.log, fields))
}

fn read_record<B: ReadBuffer + ?Sized>(defs: &[FieldDef], buf: &B, base: usize) -> Result<Vec<FieldValue>> {
    let mut values = Vec::with_capacity(defs.len());
    for field in defs {
        let value = read_field(field, buf, base + field.flat_offset, &values).map_err(|e| e.nest(&field.name))?;
        values.push(value);
    }
    Ok(values)
}

/// Reads the element count and returns it with the offset of the first element.
fn read_count<B: ReadBuffer + ?Sized>(
    buf: &B,
    offset: usize,
    length: ArrayLength,
    max_len: usize,
    preceding: &[FieldValue],
) -> Result<(usize, usize)> {
    let (count, start) = match length {
        ArrayLength::Prefixed => (buf.get_u32_le(offset) as usize, offset + COUNT_PREFIX_SIZE),
        ArrayLength::Field(index) => (walk::referenced_count(preceding, index, offset)?, offset),
    };
    walk::check_max(count, max_len, offset)?;
    Ok((count, start))
}

fn read_field<B: ReadBuffer + ?Sized>(
    field: &FieldDef,
    buf: &B,
    offset: usize,
    preceding: &[FieldValue],
) -> Result<FieldValue> {
    Ok(match &field.kind {
        FieldKind::Simple { data_type } => read_scalar(buf, offset, *data_type),
        FieldKind::Enum { data_type, .. } => FieldValue::Enum(match data_type {
            DataType::Char => i32::from(buf.get_i8(offset)),
            DataType::Short => i32::from(buf.get_i16_le(offset)),
            _ => buf.get_i32_le(offset),
        }),
        FieldKind::String { max_len } => FieldValue::String(walk::utf8(buf.get_cstr(offset, *max_len), offset)?),
        FieldKind::FixedArray { data_type, len } => read_scalars(buf, offset, *data_type, *len),
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            let (count, start) = read_count(buf, offset, *length, *max_len, preceding)?;
            read_scalars(buf, start, *data_type, count)
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            record_size,
        } => {
            let (count, start) = read_count(buf, offset, *length, *max_len, preceding)?;
            let mut records = Vec::with_capacity(count);
            for idx in 0..count {
                let record = read_record(fields, buf, start + idx * record_size).map_err(|e| e.nest_index(idx))?;
                records.push(FieldValue::Record(record));
            }
            FieldValue::Array(records)
        }
        FieldKind::Message(nested) => FieldValue::Record(read_record(&nested.fields, buf, offset)?),
        FieldKind::Compressed { max_len, length, .. } => {
            let (count, start) = read_count(buf, offset, *length, *max_len, preceding)?;
            FieldValue::Bytes(buf.get_bytes(start, count).to_vec())
        }
    })
}

fn read_scalars<B: ReadBuffer + ?Sized>(buf: &B, offset: usize, data_type: DataType, count: usize) -> FieldValue {
    let size = data_type.size();
    FieldValue::Array(
        (0..count)
            .map(|idx| read_scalar(buf, offset + idx * size, data_type))
            .collect(),
    )
}

#[inline]
fn read_scalar<B: ReadBuffer + ?Sized>(buf: &B, offset: usize, data_type: DataType) -> FieldValue {
    match data_type {
        DataType::Bool => FieldValue::Bool(buf.get_u32_le(offset) != 0),
        DataType::Char => FieldValue::Int(i64::from(buf.get_i8(offset))),
        DataType::UChar | DataType::HexByte => FieldValue::UInt(u64::from(buf.get_u8(offset))),
        DataType::Short => FieldValue::Int(i64::from(buf.get_i16_le(offset))),
        DataType::UShort => FieldValue::UInt(u64::from(buf.get_u16_le(offset))),
        DataType::Int | DataType::Long => FieldValue::Int(i64::from(buf.get_i32_le(offset))),
        DataType::UInt | DataType::ULong => FieldValue::UInt(u64::from(buf.get_u32_le(offset))),
        DataType::LongLong => FieldValue::Int(buf.get_i64_le(offset)),
        DataType::ULongLong => FieldValue::UInt(buf.get_u64_le(offset)),
        DataType::Float => FieldValue::Float(f64::from(buf.get_f32_le(offset))),
        DataType::Double => FieldValue::Float(buf.get_f64_le(offset)),
        DataType::SatelliteId => FieldValue::SatelliteId(SatelliteId {
            prn: buf.get_u16_le(offset),
            frequency: buf.get_i16_le(offset + 2),
        }),
    }
}

/// Encodes a message as a flattened binary log, appending to `out`.
///
/// Strings and arrays longer than their maximum are truncated, strings at a
/// character boundary. A length field that counts a truncated array is
/// rewritten to the stored count; any other counted array must agree with
/// its length field.
///
/// # Errors
/// - `UnknownMessageId` if the header's ID has no definition
/// - `FieldConversion` if a value does not fit its field
/// - `MalformedHeader` if the flattened body exceeds the 16-bit length field
pub fn encode(db: &MessageDatabase, msg: &GenericMessage, out: &mut BytesMut) -> Result<usize> {
    let def = db.lookup(msg.header.message_id)?;
    walk::check_arity(&def.fields, &msg.fields, 0)?;

    let mut body = vec![0u8; def.flat_size];
    write_record(&def.fields, &msg.fields, &mut body, 0)?;

    let start = out.len();
    let header_length = BinaryHeader::encoded_length(msg.header.kind);
    out.reserve(header_length + body.len() + BinaryHeader::CRC_LENGTH);
    out.put_bytes(0, header_length);
    out.put_slice(&body);
    let result = finish_frame(out, start, msg);
    if result.is_err() {
        out.truncate(start);
    }
    result
}

fn write_record<B: WriteBuffer + ?Sized>(
    defs: &[FieldDef],
    values: &[FieldValue],
    buf: &mut B,
    base: usize,
) -> Result<()> {
    for (idx, (field, value)) in defs.iter().zip(values).enumerate() {
        let offset = base + field.flat_offset;
        let written = write_field(field, value, &values[..idx], buf, offset).map_err(|e| e.nest(&field.name))?;
        if let Some((ArrayLength::Field(index), count)) = written {
            // keep the length field consistent with a truncated array
            let source = &defs[index];
            if let Some(data_type) = source.scalar_type() {
                put_scalar(buf, base + source.flat_offset, data_type, Scalar::Unsigned(count as u64));
            }
        }
    }
    Ok(())
}

/// Writes one field; returns the count source and stored count of counted
/// fields that were truncated.
fn write_field<B: WriteBuffer + ?Sized>(
    field: &FieldDef,
    value: &FieldValue,
    preceding: &[FieldValue],
    buf: &mut B,
    offset: usize,
) -> Result<Option<(ArrayLength, usize)>> {
    let invalid = |reason: String| CodecError::field("", offset, reason);
    match &field.kind {
        FieldKind::Simple { data_type } => {
            let scalar = Scalar::from_value(*data_type, value).map_err(invalid)?;
            put_scalar(buf, offset, *data_type, scalar);
        }
        FieldKind::Enum { data_type, .. } => {
            let v = Scalar::from_enum(*data_type, value).map_err(invalid)?;
            put_scalar(buf, offset, *data_type, Scalar::Signed(v));
        }
        FieldKind::String { max_len } => {
            let text = walk::string(value, offset)?;
            let mut end = text.len().min(*max_len);
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            buf.put_padded(offset, &text.as_bytes()[..end], *max_len);
        }
        FieldKind::FixedArray { data_type, len } => {
            let items = walk::array(value, offset)?;
            put_scalars(buf, offset, *data_type, &items[..items.len().min(*len)])?;
        }
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            let items = walk::array(value, offset)?;
            let count = stored_count(*length, *max_len, items.len(), preceding, offset)?;
            let start = put_count(buf, offset, *length, count);
            put_scalars(buf, start, *data_type, &items[..count])?;
            return Ok(truncated(*length, items.len(), count));
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            record_size,
        } => {
            let items = walk::array(value, offset)?;
            let count = stored_count(*length, *max_len, items.len(), preceding, offset)?;
            let start = put_count(buf, offset, *length, count);
            for (idx, item) in items[..count].iter().enumerate() {
                let record_offset = start + idx * record_size;
                let record = walk::record(fields, item, record_offset).map_err(|e| e.nest_index(idx))?;
                write_record(fields, record, buf, record_offset).map_err(|e| e.nest_index(idx))?;
            }
            return Ok(truncated(*length, items.len(), count));
        }
        FieldKind::Message(def) => {
            let record = walk::record(&def.fields, value, offset)?;
            write_record(&def.fields, record, buf, offset)?;
        }
        FieldKind::Compressed { max_len, length, .. } => {
            let block = walk::bytes(value, offset)?;
            let count = stored_count(*length, *max_len, block.len(), preceding, offset)?;
            let start = put_count(buf, offset, *length, count);
            buf.put_bytes(start, &block[..count]);
            return Ok(truncated(*length, block.len(), count));
        }
    }
    Ok(None)
}

/// Clamps a count to the maximum. An array that fits must agree with its
/// length field.
fn stored_count(
    length: ArrayLength,
    max_len: usize,
    actual: usize,
    preceding: &[FieldValue],
    offset: usize,
) -> Result<usize> {
    if actual > max_len {
        return Ok(max_len);
    }
    walk::check_encode_count(length, max_len, actual, preceding, offset)?;
    Ok(actual)
}

fn truncated(length: ArrayLength, actual: usize, stored: usize) -> Option<(ArrayLength, usize)> {
    (actual != stored).then_some((length, stored))
}

/// Writes the count prefix if there is one; returns the first element offset.
fn put_count<B: WriteBuffer + ?Sized>(buf: &mut B, offset: usize, length: ArrayLength, count: usize) -> usize {
    match length {
        ArrayLength::Prefixed => {
            buf.put_u32_le(offset, count as u32);
            offset + COUNT_PREFIX_SIZE
        }
        ArrayLength::Field(_) => offset,
    }
}

fn put_scalars<B: WriteBuffer + ?Sized>(
    buf: &mut B,
    offset: usize,
    data_type: DataType,
    items: &[FieldValue],
) -> Result<()> {
    let size = data_type.size();
    for (idx, item) in items.iter().enumerate() {
        let at = offset + idx * size;
        let scalar = Scalar::from_value(data_type, item).map_err(|r| CodecError::field("", at, r).nest_index(idx))?;
        put_scalar(buf, at, data_type, scalar);
    }
    Ok(())
}

#[inline]
fn put_scalar<B: WriteBuffer + ?Sized>(buf: &mut B, offset: usize, data_type: DataType, scalar: Scalar) {
    let bits = scalar.bits();
    match data_type {
        DataType::Char | DataType::UChar | DataType::HexByte => buf.put_u8(offset, bits as u8),
        DataType::Short | DataType::UShort => buf.put_u16_le(offset, bits as u16),
        DataType::Bool | DataType::Int | DataType::UInt | DataType::Long | DataType::ULong => {
            buf.put_u32_le(offset, bits as u32)
        }
        DataType::LongLong | DataType::ULongLong | DataType::Double => buf.put_u64_le(offset, bits),
        DataType::Float => match scalar {
            Scalar::Float(v) => buf.put_f32_le(offset, v as f32),
            _ => buf.put_u32_le(offset, bits as u32),
        },
        DataType::SatelliteId => buf.put_u32_le(offset, bits as u32),
    }
}

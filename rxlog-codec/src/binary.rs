//! Binary format.
//!
//! A 28-byte header (12 bytes when short), a body whose layout follows the
//! message definition, and a little-endian CRC-32 over header and body.
//! Counted arrays carry a
//! `u32` count unless their length comes from an earlier field; strings are
//! NUL-terminated and padded to a 4-byte boundary.

use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::message::{FieldValue, GenericMessage, SatelliteId, Scalar};
use crate::walk;
use bytes::{BufMut, BytesMut};
use rxlog_core::{BinaryHeader, ByteReader, crc32};
use rxlog_schema::{ArrayLength, DataType, FieldDef, FieldKind, MessageDatabase};

const STRING_ALIGNMENT: usize = 4;

/// Validated frame: header, definition body slice and the body's offset.
pub(crate) struct Frame<'a> {
    pub header: BinaryHeader,
    pub body: &'a [u8],
    pub body_offset: usize,
}

/// Parses the header, checks the frame length and applies the CRC policy.
///
/// Bytes after the CRC trailer are ignored.
pub(crate) fn parse_frame<'a>(config: &CodecConfig, input: &'a [u8]) -> Result<Frame<'a>> {
    let header = BinaryHeader::parse(input)?;
    let frame_length = header.frame_length();
    if input.len() < frame_length {
        return Err(CodecError::BufferTooShort {
            required: frame_length,
            available: input.len(),
        });
    }
    config.check_length(frame_length)?;

    let crc_offset = frame_length - BinaryHeader::CRC_LENGTH;
    let mut trailer = [0u8; BinaryHeader::CRC_LENGTH];
    trailer.copy_from_slice(&input[crc_offset..frame_length]);
    config.check_crc(u32::from_le_bytes(trailer), crc32(&input[..crc_offset]))?;

    let body_offset = usize::from(header.header_length);
    Ok(Frame {
        header,
        body: &input[body_offset..crc_offset],
        body_offset,
    })
}

/// Writes header and CRC around a body already appended after the space
/// reserved for the header.
pub(crate) fn finish_frame(out: &mut BytesMut, start: usize, msg: &GenericMessage) -> Result<usize> {
    let body_length = out.len() - start - BinaryHeader::encoded_length(msg.header.kind);
    let (limit, length_offset) = if msg.header.is_short() {
        (BinaryHeader::SHORT_MAX_BODY, 3)
    } else {
        (usize::from(u16::MAX), 8)
    };
    let body_length = u16::try_from(body_length)
        .ok()
        .filter(|len| usize::from(*len) <= limit)
        .ok_or_else(|| {
            CodecError::malformed(
                start + length_offset,
                format!("body of {body_length} bytes does not fit the length field"),
            )
        })?;
    BinaryHeader::new(msg.header, body_length).encode(&mut out[start..], 0);
    let crc = crc32(&out[start..]);
    out.put_u32_le(crc);
    Ok(out.len() - start)
}

/// Decodes a binary log.
///
/// # Errors
/// - `MalformedHeader` on a bad sync, a short header length or unread body bytes
/// - `BufferTooShort` if the input or the body is shorter than required
/// - `CrcMismatch` under the strict CRC policy
/// - `UnknownMessageId` if the ID has no definition
/// - `FieldConversion` on counts above a field's maximum or invalid strings
pub fn decode(db: &MessageDatabase, config: &CodecConfig, input: &[u8]) -> Result<GenericMessage> {
    let frame = parse_frame(config, input)?;
    let def = db.lookup(frame.header.log.message_id)?;

    let mut reader = ByteReader::new(frame.body);
    let fields = read_record(&def.fields, &mut reader).map_err(|e| e.offset_by(frame.body_offset))?;
    if !reader.is_exhausted() {
        return Err(CodecError::malformed(
            frame.body_offset + reader.position(),
            format!("{} body bytes left after the last field", reader.remaining()),
        ));
    }
    Ok(GenericMessage::new(frame.header.log, fields))
}

fn read_record(defs: &[FieldDef], reader: &mut ByteReader<'_>) -> Result<Vec<FieldValue>> {
    let mut values = Vec::with_capacity(defs.len());
    for field in defs {
        let value = read_field(field, reader, &values).map_err(|e| e.nest(&field.name))?;
        values.push(value);
    }
    Ok(values)
}

fn read_count(
    length: ArrayLength,
    max_len: usize,
    reader: &mut ByteReader<'_>,
    preceding: &[FieldValue],
) -> Result<usize> {
    let offset = reader.position();
    let count = match length {
        ArrayLength::Prefixed => reader.read_u32()? as usize,
        ArrayLength::Field(index) => walk::referenced_count(preceding, index, offset)?,
    };
    walk::check_max(count, max_len, offset)?;
    Ok(count)
}

fn read_field(field: &FieldDef, reader: &mut ByteReader<'_>, preceding: &[FieldValue]) -> Result<FieldValue> {
    match &field.kind {
        FieldKind::Simple { data_type } => read_scalar(*data_type, reader),
        FieldKind::Enum { data_type, .. } => {
            let v = match data_type {
                DataType::Char => i32::from(reader.read_i8()?),
                DataType::Short => i32::from(reader.read_i16()?),
                _ => reader.read_i32()?,
            };
            Ok(FieldValue::Enum(v))
        }
        FieldKind::String { max_len } => {
            let offset = reader.position();
            let raw = reader.read_cstr()?;
            if raw.len() > *max_len {
                return Err(CodecError::field(
                    "",
                    offset,
                    format!("string of {} bytes exceeds maximum {max_len}", raw.len()),
                ));
            }
            reader.align_to(STRING_ALIGNMENT)?;
            Ok(FieldValue::String(walk::utf8(raw, offset)?))
        }
        FieldKind::FixedArray { data_type, len } => read_scalars(*data_type, *len, reader),
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            let count = read_count(*length, *max_len, reader, preceding)?;
            read_scalars(*data_type, count, reader)
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            ..
        } => {
            let count = read_count(*length, *max_len, reader, preceding)?;
            let mut records = Vec::with_capacity(count);
            for idx in 0..count {
                let record = read_record(fields, reader).map_err(|e| e.nest_index(idx))?;
                records.push(FieldValue::Record(record));
            }
            Ok(FieldValue::Array(records))
        }
        FieldKind::Message(nested) => read_record(&nested.fields, reader).map(FieldValue::Record),
        FieldKind::Compressed { max_len, length, .. } => {
            let count = read_count(*length, *max_len, reader, preceding)?;
            Ok(FieldValue::Bytes(reader.read_bytes(count)?.to_vec()))
        }
    }
}

fn read_scalars(data_type: DataType, count: usize, reader: &mut ByteReader<'_>) -> Result<FieldValue> {
    reader.ensure(count * data_type.size())?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(read_scalar(data_type, reader)?);
    }
    Ok(FieldValue::Array(items))
}

fn read_scalar(data_type: DataType, reader: &mut ByteReader<'_>) -> Result<FieldValue> {
    Ok(match data_type {
        DataType::Bool => FieldValue::Bool(reader.read_u32()? != 0),
        DataType::Char => FieldValue::Int(i64::from(reader.read_i8()?)),
        DataType::UChar | DataType::HexByte => FieldValue::UInt(u64::from(reader.read_u8()?)),
        DataType::Short => FieldValue::Int(i64::from(reader.read_i16()?)),
        DataType::UShort => FieldValue::UInt(u64::from(reader.read_u16()?)),
        DataType::Int | DataType::Long => FieldValue::Int(i64::from(reader.read_i32()?)),
        DataType::UInt | DataType::ULong => FieldValue::UInt(u64::from(reader.read_u32()?)),
        DataType::LongLong => FieldValue::Int(reader.read_i64()?),
        DataType::ULongLong => FieldValue::UInt(reader.read_u64()?),
        DataType::Float => FieldValue::Float(f64::from(reader.read_f32()?)),
        DataType::Double => FieldValue::Float(reader.read_f64()?),
        DataType::SatelliteId => {
            reader.ensure(4)?;
            let prn = reader.read_u16()?;
            let frequency = reader.read_i16()?;
            FieldValue::SatelliteId(SatelliteId { prn, frequency })
        }
    })
}

/// Encodes a message as a binary log, appending to `out`.
///
/// Returns the number of bytes written. On error `out` is left as it was.
///
/// # Errors
/// - `UnknownMessageId` if the header's ID has no definition
/// - `FieldConversion` if a value does not fit its field
/// - `MalformedHeader` if the body exceeds the length field, 16 bits wide
///   or 8 bits for a short header
pub fn encode(db: &MessageDatabase, msg: &GenericMessage, out: &mut BytesMut) -> Result<usize> {
    let def = db.lookup(msg.header.message_id)?;
    walk::check_arity(&def.fields, &msg.fields, 0)?;
    let start = out.len();
    let result = encode_frame(&def.fields, msg, out, start);
    if result.is_err() {
        out.truncate(start);
    }
    result
}

fn encode_frame(defs: &[FieldDef], msg: &GenericMessage, out: &mut BytesMut, start: usize) -> Result<usize> {
    out.put_bytes(0, BinaryHeader::encoded_length(msg.header.kind));
    let body_start = out.len();
    write_record(defs, &msg.fields, out, body_start)?;
    finish_frame(out, start, msg)
}

fn write_record(defs: &[FieldDef], values: &[FieldValue], out: &mut BytesMut, body_start: usize) -> Result<()> {
    for (idx, (field, value)) in defs.iter().zip(values).enumerate() {
        write_field(field, value, &values[..idx], out, body_start).map_err(|e| e.nest(&field.name))?;
    }
    Ok(())
}

fn write_field(
    field: &FieldDef,
    value: &FieldValue,
    preceding: &[FieldValue],
    out: &mut BytesMut,
    body_start: usize,
) -> Result<()> {
    let offset = out.len() - body_start;
    match &field.kind {
        FieldKind::Simple { data_type } => {
            let scalar = Scalar::from_value(*data_type, value).map_err(|r| CodecError::field("", offset, r))?;
            put_scalar(out, *data_type, scalar);
        }
        FieldKind::Enum { data_type, .. } => {
            let v = Scalar::from_enum(*data_type, value).map_err(|r| CodecError::field("", offset, r))?;
            put_scalar(out, *data_type, Scalar::Signed(v));
        }
        FieldKind::String { max_len } => {
            let text = walk::string(value, offset)?;
            if text.len() > *max_len || text.as_bytes().contains(&0) {
                return Err(CodecError::field(
                    "",
                    offset,
                    format!("string must be at most {max_len} bytes without NULs"),
                ));
            }
            out.put_slice(text.as_bytes());
            out.put_u8(0);
            while (out.len() - body_start) % STRING_ALIGNMENT != 0 {
                out.put_u8(0);
            }
        }
        FieldKind::FixedArray { data_type, len } => {
            let items = walk::array(value, offset)?;
            if items.len() != *len {
                return Err(CodecError::field(
                    "",
                    offset,
                    format!("expected {len} elements, found {}", items.len()),
                ));
            }
            put_scalars(out, *data_type, items, body_start)?;
        }
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            let items = walk::array(value, offset)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, offset)?;
            put_count(out, *length, items.len());
            put_scalars(out, *data_type, items, body_start)?;
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            ..
        } => {
            let items = walk::array(value, offset)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, offset)?;
            put_count(out, *length, items.len());
            for (idx, item) in items.iter().enumerate() {
                let record_offset = out.len() - body_start;
                let record = walk::record(fields, item, record_offset).map_err(|e| e.nest_index(idx))?;
                write_record(fields, record, out, body_start).map_err(|e| e.nest_index(idx))?;
            }
        }
        FieldKind::Message(def) => {
            let record = walk::record(&def.fields, value, offset)?;
            write_record(&def.fields, record, out, body_start)?;
        }
        FieldKind::Compressed { max_len, length, .. } => {
            let block = walk::bytes(value, offset)?;
            walk::check_encode_count(*length, *max_len, block.len(), preceding, offset)?;
            put_count(out, *length, block.len());
            out.put_slice(block);
        }
    }
    Ok(())
}

fn put_count(out: &mut BytesMut, length: ArrayLength, count: usize) {
    if length == ArrayLength::Prefixed {
        out.put_u32_le(count as u32);
    }
}

fn put_scalars(out: &mut BytesMut, data_type: DataType, items: &[FieldValue], body_start: usize) -> Result<()> {
    out.reserve(items.len() * data_type.size());
    for (idx, item) in items.iter().enumerate() {
        let offset = out.len() - body_start;
        let scalar = Scalar::from_value(data_type, item)
            .map_err(|r| CodecError::field("", offset, r).nest_index(idx))?;
        put_scalar(out, data_type, scalar);
    }
    Ok(())
}

fn put_scalar(out: &mut BytesMut, data_type: DataType, scalar: Scalar) {
    let bits = scalar.bits();
    match data_type {
        DataType::Char | DataType::UChar | DataType::HexByte => out.put_u8(bits as u8),
        DataType::Short | DataType::UShort => out.put_u16_le(bits as u16),
        DataType::Bool | DataType::Int | DataType::UInt | DataType::Long | DataType::ULong => {
            out.put_u32_le(bits as u32)
        }
        DataType::LongLong | DataType::ULongLong => out.put_u64_le(bits),
        DataType::Float => match scalar {
            Scalar::Float(v) => out.put_f32_le(v as f32),
            _ => out.put_u32_le(bits as u32),
        },
        DataType::Double => out.put_u64_le(bits),
        DataType::SatelliteId => out.put_u32_le(bits as u32),
    }
}

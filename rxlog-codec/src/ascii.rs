//! ASCII format.
//!
//! A `#` sync opens a full header and `%` opens a short one.
//! Body values are comma-separated in definition order. Counted arrays
//! print their count first unless it comes from an earlier field; strings
//! are quoted; `%Z` byte arrays and compressed blocks print as one hex token.

use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::header::{finish_line, parse_frame, parse_header, write_header};
use crate::message::{FieldValue, GenericMessage};
use crate::text::{self, Token};
use crate::walk;
use rxlog_core::HeaderKind;
use rxlog_core::types::{ASCII_SYNC, SHORT_ASCII_SYNC};
use rxlog_schema::{ArrayLength, Conversion, DataType, FieldDef, FieldKind, MessageDatabase};
use std::fmt::Write;

/// Suffix marking an ASCII message name.
pub const NAME_SUFFIX: char = 'A';

/// Decodes an ASCII log line.
///
/// # Errors
/// - `MalformedHeader` on a bad sentinel, header field or CRC trailer
/// - `CrcMismatch` under the strict CRC policy
/// - `UnknownMessageId` if the name has no definition
/// - `FieldConversion` on missing, extra or unparsable values
pub fn decode(db: &MessageDatabase, config: &CodecConfig, input: &[u8]) -> Result<GenericMessage> {
    let (sync, kind) = match input.first() {
        Some(&SHORT_ASCII_SYNC) => (SHORT_ASCII_SYNC, HeaderKind::Short),
        _ => (ASCII_SYNC, HeaderKind::Full),
    };
    let frame = parse_frame(config, input, sync)?;
    if frame.kind != kind {
        return Err(CodecError::malformed(
            0,
            format!("sync '{}' does not match a {:?} header", char::from(sync), frame.kind),
        ));
    }
    let (def, header) = parse_header(db, &frame.header, Some(NAME_SUFFIX))?;
    let fields = decode_positional(&def.fields, frame.body, frame.body_offset)?;
    Ok(GenericMessage::new(header, fields))
}

/// Decodes a positional body.
pub(crate) fn decode_positional(defs: &[FieldDef], body: &str, body_offset: usize) -> Result<Vec<FieldValue>> {
    let mut tokens = text::split_tokens(body, body_offset);
    if tokens.is_empty() && !defs.is_empty() {
        // a body holding one empty value
        tokens.push(Token {
            text: "",
            offset: body_offset,
        });
    }
    let mut cursor = Cursor {
        tokens,
        next: 0,
        end: body_offset + body.len(),
    };
    let fields = read_record(defs, &mut cursor)?;
    if let Some(extra) = cursor.tokens.get(cursor.next) {
        return Err(CodecError::field(
            "",
            extra.offset,
            format!("{} unexpected trailing values", cursor.tokens.len() - cursor.next),
        ));
    }
    Ok(fields)
}

struct Cursor<'a> {
    tokens: Vec<Token<'a>>,
    next: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self) -> Result<Token<'a>> {
        let token = self
            .tokens
            .get(self.next)
            .copied()
            .ok_or_else(|| CodecError::field("", self.end, "missing value"))?;
        self.next += 1;
        Ok(token)
    }

    fn count(&mut self, length: ArrayLength, max_len: usize, preceding: &[FieldValue]) -> Result<usize> {
        let count = match length {
            ArrayLength::Prefixed => {
                let token = self.take()?;
                token
                    .text
                    .parse::<usize>()
                    .map_err(|_| CodecError::field("", token.offset, format!("bad count '{}'", token.text)))?
            }
            ArrayLength::Field(index) => {
                let offset = self.tokens.get(self.next).map_or(self.end, |t| t.offset);
                walk::referenced_count(preceding, index, offset)?
            }
        };
        walk::check_max(count, max_len, self.tokens.get(self.next).map_or(self.end, |t| t.offset))?;
        Ok(count)
    }
}

fn read_record(defs: &[FieldDef], cursor: &mut Cursor<'_>) -> Result<Vec<FieldValue>> {
    let mut values = Vec::with_capacity(defs.len());
    for field in defs {
        let value = read_field(field, cursor, &values).map_err(|e| e.nest(&field.name))?;
        values.push(value);
    }
    Ok(values)
}

fn convert<T>(token: Token<'_>, result: std::result::Result<T, String>) -> Result<T> {
    result.map_err(|reason| CodecError::field("", token.offset, reason))
}

fn read_field(field: &FieldDef, cursor: &mut Cursor<'_>, preceding: &[FieldValue]) -> Result<FieldValue> {
    let conversion = field.conversion.as_ref();
    Ok(match &field.kind {
        FieldKind::Simple { data_type } => {
            let token = cursor.take()?;
            convert(token, text::parse_scalar(token.text, *data_type, conversion))?
        }
        FieldKind::Enum { def, data_type } => {
            let token = cursor.take()?;
            convert(token, text::parse_enum(token.text, def, *data_type))?
        }
        FieldKind::String { max_len } => {
            let token = cursor.take()?;
            let value = convert(token, text::parse_quoted(token.text))?;
            if value.len() > *max_len {
                return Err(CodecError::field(
                    "",
                    token.offset,
                    format!("string of {} bytes exceeds maximum {max_len}", value.len()),
                ));
            }
            FieldValue::String(value)
        }
        FieldKind::FixedArray { data_type, len } => {
            if text::is_char_string(*data_type, conversion) {
                let token = cursor.take()?;
                let value = convert(token, text::parse_quoted(token.text))?;
                if value.len() > *len {
                    return Err(CodecError::field(
                        "",
                        token.offset,
                        format!("string of {} bytes exceeds array length {len}", value.len()),
                    ));
                }
                let mut raw = value.into_bytes();
                raw.resize(*len, 0);
                FieldValue::Array(text::bytes_to_elements(*data_type, &raw))
            } else {
                read_elements(cursor, *data_type, conversion, *len)?
            }
        }
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            let count = cursor.count(*length, *max_len, preceding)?;
            read_elements(cursor, *data_type, conversion, count)?
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            ..
        } => {
            let count = cursor.count(*length, *max_len, preceding)?;
            let mut records = Vec::with_capacity(count);
            for idx in 0..count {
                let record = read_record(fields, cursor).map_err(|e| e.nest_index(idx))?;
                records.push(FieldValue::Record(record));
            }
            FieldValue::Array(records)
        }
        FieldKind::Message(nested) => FieldValue::Record(read_record(&nested.fields, cursor)?),
        FieldKind::Compressed { max_len, length, .. } => {
            let count = cursor.count(*length, *max_len, preceding)?;
            let token = cursor.take()?;
            FieldValue::Bytes(read_hex(token, count)?)
        }
    })
}

fn read_hex(token: Token<'_>, count: usize) -> Result<Vec<u8>> {
    let raw = hex::decode(token.text)
        .map_err(|e| CodecError::field("", token.offset, format!("bad hex value: {e}")))?;
    if raw.len() != count {
        return Err(CodecError::field(
            "",
            token.offset,
            format!("hex value holds {} bytes, expected {count}", raw.len()),
        ));
    }
    Ok(raw)
}

fn read_elements(
    cursor: &mut Cursor<'_>,
    data_type: DataType,
    conversion: Option<&Conversion>,
    count: usize,
) -> Result<FieldValue> {
    if text::is_hex_array(data_type, conversion) {
        let token = cursor.take()?;
        let raw = read_hex(token, count)?;
        return Ok(FieldValue::Array(text::bytes_to_elements(data_type, &raw)));
    }
    let mut items = Vec::with_capacity(count);
    for idx in 0..count {
        let token = cursor.take().map_err(|e| e.nest_index(idx))?;
        let item = convert(token, text::parse_scalar(token.text, data_type, conversion)).map_err(|e| e.nest_index(idx))?;
        items.push(item);
    }
    Ok(FieldValue::Array(items))
}

/// Encodes a message as an ASCII log line, appending to `out`.
///
/// # Errors
/// - `UnknownMessageId` if the header's ID has no definition
/// - `FieldConversion` if a value does not fit its field or a counted
///   array disagrees with its length field
pub fn encode(db: &MessageDatabase, msg: &GenericMessage, out: &mut String) -> Result<usize> {
    let def = db.lookup(msg.header.message_id)?;
    walk::check_arity(&def.fields, &msg.fields, 0)?;

    let mut body = String::new();
    encode_positional(&def.fields, &msg.fields, &mut body)?;

    let start = out.len();
    let sync = if msg.header.is_short() { SHORT_ASCII_SYNC } else { ASCII_SYNC };
    write_header(out, db, def, &msg.header, sync, Some(NAME_SUFFIX));
    out.push_str(&body);
    finish_line(out, start);
    Ok(out.len() - start)
}

/// Writes a positional body.
pub(crate) fn encode_positional(defs: &[FieldDef], values: &[FieldValue], out: &mut String) -> Result<()> {
    let mut writer = Writer { out, first: true };
    write_record(defs, values, &mut writer)
}

struct Writer<'a> {
    out: &'a mut String,
    first: bool,
}

impl Writer<'_> {
    /// Starts a new value and returns the buffer to write it into.
    fn value(&mut self) -> &mut String {
        if !self.first {
            self.out.push(',');
        }
        self.first = false;
        &mut *self.out
    }

    fn offset(&self) -> usize {
        self.out.len()
    }
}

fn write_record(defs: &[FieldDef], values: &[FieldValue], writer: &mut Writer<'_>) -> Result<()> {
    for (idx, (field, value)) in defs.iter().zip(values).enumerate() {
        write_field(field, value, &values[..idx], writer).map_err(|e| e.nest(&field.name))?;
    }
    Ok(())
}

fn write_field(field: &FieldDef, value: &FieldValue, preceding: &[FieldValue], writer: &mut Writer<'_>) -> Result<()> {
    let offset = writer.offset();
    let invalid = |reason: String| CodecError::field("", offset, reason);
    let conversion = field.conversion.as_ref();
    match &field.kind {
        FieldKind::Simple { data_type } => {
            text::write_scalar(writer.value(), *data_type, conversion, value).map_err(invalid)?;
        }
        FieldKind::Enum { def, data_type } => {
            text::write_enum(writer.value(), def, *data_type, value).map_err(invalid)?;
        }
        FieldKind::String { max_len } => {
            let s = walk::string(value, offset)?;
            if s.len() > *max_len {
                return Err(invalid(format!("string of {} bytes exceeds maximum {max_len}", s.len())));
            }
            text::write_quoted(writer.value(), s).map_err(invalid)?;
        }
        FieldKind::FixedArray { data_type, len } => {
            let items = walk::array(value, offset)?;
            if items.len() != *len {
                return Err(invalid(format!("expected {len} elements, found {}", items.len())));
            }
            if text::is_char_string(*data_type, conversion) {
                let raw = text::elements_to_bytes(*data_type, items).map_err(invalid)?;
                let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
                let s = std::str::from_utf8(&raw[..end])
                    .ok()
                    .filter(|s| !s.contains('\0'))
                    .ok_or_else(|| invalid("character array is not a printable string".to_string()))?;
                text::write_quoted(writer.value(), s).map_err(invalid)?;
            } else {
                write_elements(items, *data_type, conversion, writer)?;
            }
        }
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            let items = walk::array(value, offset)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, offset)?;
            write_count(*length, items.len(), writer);
            write_elements(items, *data_type, conversion, writer)?;
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            ..
        } => {
            let items = walk::array(value, offset)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, offset)?;
            write_count(*length, items.len(), writer);
            for (idx, item) in items.iter().enumerate() {
                let record = walk::record(fields, item, writer.offset()).map_err(|e| e.nest_index(idx))?;
                write_record(fields, record, writer).map_err(|e| e.nest_index(idx))?;
            }
        }
        FieldKind::Message(def) => {
            let record = walk::record(&def.fields, value, offset)?;
            write_record(&def.fields, record, writer)?;
        }
        FieldKind::Compressed { max_len, length, .. } => {
            let block = walk::bytes(value, offset)?;
            walk::check_encode_count(*length, *max_len, block.len(), preceding, offset)?;
            write_count(*length, block.len(), writer);
            writer.value().push_str(&hex::encode(block));
        }
    }
    Ok(())
}

fn write_count(length: ArrayLength, count: usize, writer: &mut Writer<'_>) {
    if length == ArrayLength::Prefixed {
        let _ = write!(writer.value(), "{count}");
    }
}

fn write_elements(
    items: &[FieldValue],
    data_type: DataType,
    conversion: Option<&Conversion>,
    writer: &mut Writer<'_>,
) -> Result<()> {
    if text::is_hex_array(data_type, conversion) {
        let offset = writer.offset();
        let raw = text::elements_to_bytes(data_type, items).map_err(|r| CodecError::field("", offset, r))?;
        writer.value().push_str(&hex::encode(raw));
        return Ok(());
    }
    for (idx, item) in items.iter().enumerate() {
        let offset = writer.offset();
        text::write_scalar(writer.value(), data_type, conversion, item)
            .map_err(|r| CodecError::field("", offset, r).nest_index(idx))?;
    }
    Ok(())
}

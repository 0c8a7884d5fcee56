//! Abbreviated ASCII format.
//!
//! Same header and CRC trailer as ASCII, with a `<` sync character and no
//! `A` name suffix. A header of only name, week and seconds is short.
//! A body without `=` is positional, exactly like ASCII.
//! Otherwise it is a list of `path=value` entries:
//!
//! ```text
//! <POSX,COM1,0,0.0,FINESTEERING,2163,329760.000,00000000,0000,0;lat=51.1,sats[0].id=5,sats[0].used=TRUE*xxxxxxxx
//! ```
//!
//! Entries may come in any order and may be omitted; omitted fields take
//! their zero value. An array's length is one past its highest index, or
//! the value of its length field when that field is given.

use crate::ascii;
use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::header::{finish_line, parse_frame, parse_header, write_header};
use crate::message::{FieldValue, GenericMessage, check_signed, check_unsigned};
use crate::text::{self, Token};
use crate::walk;
use rxlog_core::types::ABBREV_ASCII_SYNC;
use rxlog_schema::{ArrayLength, Conversion, DataType, FieldDef, FieldKind, MessageDatabase};
use std::collections::BTreeMap;

/// Decodes an abbreviated ASCII log line.
///
/// # Errors
/// - `MalformedHeader` on a bad sentinel, header field or CRC trailer
/// - `CrcMismatch` under the strict CRC policy
/// - `UnknownMessageId` if the name has no definition
/// - `FieldConversion` on unparsable values, unknown or duplicate paths and
///   indices beyond a field's maximum
pub fn decode(db: &MessageDatabase, config: &CodecConfig, input: &[u8]) -> Result<GenericMessage> {
    let frame = parse_frame(config, input, ABBREV_ASCII_SYNC)?;
    let (def, header) = parse_header(db, &frame.header, None)?;

    let fields = if frame.body.is_empty() || text::find_unquoted(frame.body, b'=').is_some() {
        let mut root = parse_entries(frame.body, frame.body_offset)?;
        read_record(&def.fields, &mut root)?
    } else {
        ascii::decode_positional(&def.fields, frame.body, frame.body_offset)?
    };
    Ok(GenericMessage::new(header, fields))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Name(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = path;
    let mut expect_name = true;
    loop {
        if expect_name {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            if end == 0 {
                return None;
            }
            segments.push(Segment::Name(&rest[..end]));
            rest = &rest[end..];
            expect_name = false;
        } else if rest.is_empty() {
            return Some(segments);
        } else if let Some(after) = rest.strip_prefix('.') {
            rest = after;
            expect_name = true;
        } else {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            segments.push(Segment::Index(inner[..close].parse().ok()?));
            rest = &inner[close + 1..];
        }
    }
}

/// Entry tree keyed by path segment.
#[derive(Debug)]
struct Node<'a> {
    value: Option<Token<'a>>,
    named: BTreeMap<&'a str, Node<'a>>,
    indexed: BTreeMap<usize, Node<'a>>,
    offset: usize,
}

impl<'a> Node<'a> {
    fn new(offset: usize) -> Self {
        Self {
            value: None,
            named: BTreeMap::new(),
            indexed: BTreeMap::new(),
            offset,
        }
    }

    fn has_children(&self) -> bool {
        !self.named.is_empty() || !self.indexed.is_empty()
    }

    /// Returns the value of a leaf entry.
    fn leaf(self) -> Result<Option<Token<'a>>> {
        if self.has_children() {
            return Err(CodecError::field("", self.offset, "field takes a single value"));
        }
        Ok(self.value)
    }

    /// Rejects a value on a node that should only hold children.
    fn branch(&self) -> Result<()> {
        match self.value {
            Some(token) => Err(CodecError::field("", token.offset, "field takes sub-entries, not a value")),
            None => Ok(()),
        }
    }

    fn highest_index(&self) -> usize {
        self.indexed.keys().next_back().map_or(0, |idx| idx + 1)
    }
}

fn parse_entries(body: &str, body_offset: usize) -> Result<Node<'_>> {
    let mut root = Node::new(body_offset);
    for entry in text::split_tokens(body, body_offset) {
        let eq = text::find_unquoted(entry.text, b'=')
            .ok_or_else(|| CodecError::field(entry.text, entry.offset, "expected path=value"))?;
        let path = &entry.text[..eq];
        let segments = parse_path(path).ok_or_else(|| CodecError::field(path, entry.offset, "malformed path"))?;

        let mut node = &mut root;
        for segment in segments {
            node = match segment {
                Segment::Name(name) => node.named.entry(name).or_insert_with(|| Node::new(entry.offset)),
                Segment::Index(idx) => node.indexed.entry(idx).or_insert_with(|| Node::new(entry.offset)),
            };
        }
        if node.value.is_some() {
            return Err(CodecError::field(path, entry.offset, "duplicate entry"));
        }
        node.value = Some(Token {
            text: &entry.text[eq + 1..],
            offset: entry.offset + eq + 1,
        });
    }
    Ok(root)
}

/// Length field to rewrite once an array's count is known.
type CountPatch = Option<(usize, usize)>;

fn read_record(defs: &[FieldDef], node: &mut Node<'_>) -> Result<Vec<FieldValue>> {
    node.branch()?;
    let mut values: Vec<FieldValue> = Vec::with_capacity(defs.len());
    let mut explicit = Vec::with_capacity(defs.len());
    for field in defs {
        let child = node.named.remove(field.name.as_str());
        explicit.push(child.is_some());
        let child = child.unwrap_or_else(|| Node::new(node.offset));
        let offset = child.offset;
        let (value, patch) = read_field(field, child, &values, &explicit).map_err(|e| e.nest(&field.name))?;
        if let Some((index, count)) = patch {
            values[index] = count_value(&defs[index], count, offset).map_err(|e| e.nest(&defs[index].name))?;
        }
        values.push(value);
    }

    if let Some((name, child)) = node.named.iter().next() {
        return Err(CodecError::field(*name, child.offset, "unknown field"));
    }
    if let Some((idx, child)) = node.indexed.iter().next() {
        return Err(CodecError::field(format!("[{idx}]"), child.offset, "unexpected index"));
    }
    Ok(values)
}

fn count_value(field: &FieldDef, count: usize, offset: usize) -> Result<FieldValue> {
    let invalid = |reason: String| CodecError::field("", offset, reason);
    let data_type = field
        .scalar_type()
        .ok_or_else(|| invalid("length field is not an integer".to_string()))?;
    if data_type.is_signed() {
        let v = i64::try_from(count).map_err(|_| invalid(format!("count {count} out of range")))?;
        check_signed(data_type, v).map_err(invalid)?;
        Ok(FieldValue::Int(v))
    } else {
        check_unsigned(data_type, count as u64).map_err(invalid)?;
        Ok(FieldValue::UInt(count as u64))
    }
}

/// Settles an array count from its entries and length source.
///
/// `implied` is the count the entries describe; `exact` requires it to
/// equal a given length field instead of merely fitting in it.
fn resolve_count(
    length: ArrayLength,
    max_len: usize,
    implied: usize,
    exact: bool,
    preceding: &[FieldValue],
    explicit: &[bool],
    offset: usize,
) -> Result<(usize, CountPatch)> {
    walk::check_max(implied, max_len, offset)?;
    match length {
        ArrayLength::Prefixed => Ok((implied, None)),
        ArrayLength::Field(index) if explicit[index] => {
            let declared = walk::referenced_count(preceding, index, offset)?;
            walk::check_max(declared, max_len, offset)?;
            if implied > declared || (exact && implied != declared) {
                return Err(CodecError::field(
                    "",
                    offset,
                    format!("entries describe {implied} elements, length field says {declared}"),
                ));
            }
            Ok((declared, None))
        }
        ArrayLength::Field(index) => Ok((implied, Some((index, implied)))),
    }
}

fn parse_token<T>(token: Token<'_>, result: std::result::Result<T, String>) -> Result<T> {
    result.map_err(|reason| CodecError::field("", token.offset, reason))
}

fn read_hex(token: Token<'_>) -> Result<Vec<u8>> {
    hex::decode(token.text).map_err(|e| CodecError::field("", token.offset, format!("bad hex value: {e}")))
}

fn read_field(
    field: &FieldDef,
    mut node: Node<'_>,
    preceding: &[FieldValue],
    explicit: &[bool],
) -> Result<(FieldValue, CountPatch)> {
    let conversion = field.conversion.as_ref();
    let offset = node.offset;
    let value = match &field.kind {
        FieldKind::Simple { data_type } => match node.leaf()? {
            Some(token) => parse_token(token, text::parse_scalar(token.text, *data_type, conversion))?,
            None => FieldValue::zero(field),
        },
        FieldKind::Enum { def, data_type } => match node.leaf()? {
            Some(token) => parse_token(token, text::parse_enum(token.text, def, *data_type))?,
            None => FieldValue::zero(field),
        },
        FieldKind::String { max_len } => match node.leaf()? {
            Some(token) => {
                let value = parse_token(token, text::parse_quoted(token.text))?;
                if value.len() > *max_len {
                    return Err(CodecError::field(
                        "",
                        token.offset,
                        format!("string of {} bytes exceeds maximum {max_len}", value.len()),
                    ));
                }
                FieldValue::String(value)
            }
            None => FieldValue::zero(field),
        },
        FieldKind::FixedArray { data_type, len } => {
            if text::is_char_string(*data_type, conversion) || text::is_hex_array(*data_type, conversion) {
                let Some(token) = node.leaf()? else {
                    return Ok((FieldValue::zero(field), None));
                };
                let mut raw = if text::is_char_string(*data_type, conversion) {
                    parse_token(token, text::parse_quoted(token.text))?.into_bytes()
                } else {
                    read_hex(token)?
                };
                if raw.len() > *len || (text::is_hex_array(*data_type, conversion) && raw.len() != *len) {
                    return Err(CodecError::field(
                        "",
                        token.offset,
                        format!("{} bytes do not fit array length {len}", raw.len()),
                    ));
                }
                raw.resize(*len, 0);
                FieldValue::Array(text::bytes_to_elements(*data_type, &raw))
            } else {
                node.branch()?;
                walk::check_max(node.highest_index(), *len, offset)?;
                read_elements(&mut node, *data_type, conversion, *len)?
            }
        }
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            if text::is_hex_array(*data_type, conversion) {
                let raw = match node.leaf()? {
                    Some(token) => Some(read_hex(token)?),
                    None => None,
                };
                let implied = raw.as_ref().map_or(0, Vec::len);
                let (count, patch) =
                    resolve_count(*length, *max_len, implied, raw.is_some(), preceding, explicit, offset)?;
                let mut raw = raw.unwrap_or_default();
                raw.resize(count, 0);
                return Ok((FieldValue::Array(text::bytes_to_elements(*data_type, &raw)), patch));
            }
            node.branch()?;
            let implied = node.highest_index();
            let (count, patch) = resolve_count(*length, *max_len, implied, false, preceding, explicit, offset)?;
            return Ok((read_elements(&mut node, *data_type, conversion, count)?, patch));
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            ..
        } => {
            node.branch()?;
            let implied = node.highest_index();
            let (count, patch) = resolve_count(*length, *max_len, implied, false, preceding, explicit, offset)?;
            let mut records = Vec::with_capacity(count);
            for idx in 0..count {
                let mut child = node.indexed.remove(&idx).unwrap_or_else(|| Node::new(offset));
                let record = read_record(fields, &mut child).map_err(|e| e.nest_index(idx))?;
                records.push(FieldValue::Record(record));
            }
            if !node.named.is_empty() {
                return Err(CodecError::field("", offset, "array takes indexed entries"));
            }
            return Ok((FieldValue::Array(records), patch));
        }
        FieldKind::Message(nested) => FieldValue::Record(read_record(&nested.fields, &mut node)?),
        FieldKind::Compressed { max_len, length, .. } => {
            let raw = match node.leaf()? {
                Some(token) => Some(read_hex(token)?),
                None => None,
            };
            let implied = raw.as_ref().map_or(0, Vec::len);
            let (count, patch) = resolve_count(*length, *max_len, implied, raw.is_some(), preceding, explicit, offset)?;
            let mut raw = raw.unwrap_or_default();
            raw.resize(count, 0);
            return Ok((FieldValue::Bytes(raw), patch));
        }
    };
    Ok((value, None))
}

/// Reads `count` indexed scalar entries; missing indices are zero.
fn read_elements(
    node: &mut Node<'_>,
    data_type: DataType,
    conversion: Option<&Conversion>,
    count: usize,
) -> Result<FieldValue> {
    if !node.named.is_empty() {
        return Err(CodecError::field("", node.offset, "array takes indexed entries"));
    }
    let mut items = Vec::with_capacity(count);
    for idx in 0..count {
        let item = match node.indexed.remove(&idx) {
            Some(child) => {
                let token = child.leaf().map_err(|e| e.nest_index(idx))?;
                match token {
                    Some(token) => parse_token(token, text::parse_scalar(token.text, data_type, conversion))
                        .map_err(|e| e.nest_index(idx))?,
                    None => FieldValue::zero_scalar(data_type),
                }
            }
            None => FieldValue::zero_scalar(data_type),
        };
        items.push(item);
    }
    Ok(FieldValue::Array(items))
}

/// Encodes a message as an abbreviated ASCII log line in keyed form,
/// appending to `out`.
///
/// A message whose keyed entries cannot carry an array length (a counted
/// record array ending in a record that writes no entries) is written in
/// positional form instead.
///
/// # Errors
/// - `UnknownMessageId` if the header's ID has no definition
/// - `FieldConversion` if a value does not fit its field or a counted
///   array disagrees with its length field
pub fn encode(db: &MessageDatabase, msg: &GenericMessage, out: &mut String) -> Result<usize> {
    let def = db.lookup(msg.header.message_id)?;
    walk::check_arity(&def.fields, &msg.fields, 0)?;

    let mut body = String::new();
    let mut writer = Writer {
        out: &mut body,
        first: true,
        entries: 0,
        lossy: false,
    };
    write_record(&def.fields, &msg.fields, "", &mut writer)?;
    if writer.lossy {
        body.clear();
        ascii::encode_positional(&def.fields, &msg.fields, &mut body)?;
    }

    let start = out.len();
    write_header(out, db, def, &msg.header, ABBREV_ASCII_SYNC, None);
    out.push_str(&body);
    finish_line(out, start);
    Ok(out.len() - start)
}

struct Writer<'a> {
    out: &'a mut String,
    first: bool,
    entries: usize,
    /// Set when the keyed form cannot carry an array's length.
    lossy: bool,
}

impl Writer<'_> {
    /// Starts a `path=` entry and returns the buffer for its value.
    fn entry(&mut self, path: &str) -> &mut String {
        if !self.first {
            self.out.push(',');
        }
        self.first = false;
        self.entries += 1;
        self.out.push_str(path);
        self.out.push('=');
        &mut *self.out
    }

    fn offset(&self) -> usize {
        self.out.len()
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn write_record(defs: &[FieldDef], values: &[FieldValue], prefix: &str, writer: &mut Writer<'_>) -> Result<()> {
    for (idx, (field, value)) in defs.iter().zip(values).enumerate() {
        let path = join(prefix, &field.name);
        write_field(field, value, &path, &values[..idx], writer).map_err(|e| e.nest(&field.name))?;
    }
    Ok(())
}

fn write_field(
    field: &FieldDef,
    value: &FieldValue,
    path: &str,
    preceding: &[FieldValue],
    writer: &mut Writer<'_>,
) -> Result<()> {
    let offset = writer.offset();
    let invalid = |reason: String| CodecError::field("", offset, reason);
    let conversion = field.conversion.as_ref();
    match &field.kind {
        FieldKind::Simple { data_type } => {
            text::write_scalar(writer.entry(path), *data_type, conversion, value).map_err(invalid)?;
        }
        FieldKind::Enum { def, data_type } => {
            text::write_enum(writer.entry(path), def, *data_type, value).map_err(invalid)?;
        }
        FieldKind::String { max_len } => {
            let s = walk::string(value, offset)?;
            if s.len() > *max_len {
                return Err(invalid(format!("string of {} bytes exceeds maximum {max_len}", s.len())));
            }
            text::write_quoted(writer.entry(path), s).map_err(invalid)?;
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
                text::write_quoted(writer.entry(path), s).map_err(invalid)?;
            } else {
                write_elements(items, *data_type, conversion, path, writer)?;
            }
        }
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            let items = walk::array(value, offset)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, offset)?;
            write_elements(items, *data_type, conversion, path, writer)?;
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            ..
        } => {
            let items = walk::array(value, offset)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, offset)?;
            let mut last_entries = 0;
            for (idx, item) in items.iter().enumerate() {
                let before = writer.entries;
                let record = walk::record(fields, item, writer.offset()).map_err(|e| e.nest_index(idx))?;
                write_record(fields, record, &format!("{path}[{idx}]"), writer).map_err(|e| e.nest_index(idx))?;
                last_entries = writer.entries - before;
            }
            // the highest index gives the count; an empty last record drops out
            if *length == ArrayLength::Prefixed && !items.is_empty() && last_entries == 0 {
                writer.lossy = true;
            }
        }
        FieldKind::Message(def) => {
            let record = walk::record(&def.fields, value, offset)?;
            write_record(&def.fields, record, path, writer)?;
        }
        FieldKind::Compressed { max_len, length, .. } => {
            let block = walk::bytes(value, offset)?;
            walk::check_encode_count(*length, *max_len, block.len(), preceding, offset)?;
            writer.entry(path).push_str(&hex::encode(block));
        }
    }
    Ok(())
}

fn write_elements(
    items: &[FieldValue],
    data_type: DataType,
    conversion: Option<&Conversion>,
    path: &str,
    writer: &mut Writer<'_>,
) -> Result<()> {
    if text::is_hex_array(data_type, conversion) {
        let offset = writer.offset();
        let raw = text::elements_to_bytes(data_type, items).map_err(|r| CodecError::field("", offset, r))?;
        writer.entry(path).push_str(&hex::encode(raw));
        return Ok(());
    }
    for (idx, item) in items.iter().enumerate() {
        let offset = writer.offset();
        text::write_scalar(writer.entry(&format!("{path}[{idx}]")), data_type, conversion, item)
            .map_err(|r| CodecError::field("", offset, r).nest_index(idx))?;
    }
    Ok(())
}

//! JSON format.
//!
//! ```json
//! {"header":{"message":"BESTPOS","id":42,"port":"COM1",...},"body":{"field":value,...}}
//! ```
//!
//! A header without `port` and `sequence_num` is short and carries only
//! the name, ID, time and measurement source.
//!
//! Body keys follow definition order. Records and nested messages are
//! objects, `%Z` byte arrays and compressed blocks are hex strings and
//! non-finite floats are the strings `"NaN"`, `"inf"` and `"-inf"`.
//! Field errors carry offset 0; parsed JSON keeps no byte positions.

use crate::config::CodecConfig;
use crate::error::{CodecError, MessageKey, Result};
use crate::header::PORT_ENUM;
use crate::message::{FieldValue, GenericMessage, SatelliteId, Scalar, check_signed, check_unsigned};
use crate::text;
use crate::walk;
use bytes::{BufMut, BytesMut};
use rxlog_core::{HeaderKind, LogHeader, TimeStatus};
use rxlog_schema::{Conversion, DataType, EnumDef, FieldDef, FieldKind, MessageDatabase, MessageDef};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

const MAX_SOURCE: u64 = 0x1f;

/// Decodes a JSON log.
///
/// # Errors
/// - `MalformedHeader` on invalid JSON or a missing or bad header key
/// - `UnknownMessageId` if the message name has no definition
/// - `FieldConversion` on missing, unknown or mistyped body keys
pub fn decode(db: &MessageDatabase, _config: &CodecConfig, input: &[u8]) -> Result<GenericMessage> {
    let root: Value = serde_json::from_slice(input)
        .map_err(|e| CodecError::malformed(error_offset(input, &e), format!("invalid JSON: {e}")))?;
    let root = root
        .as_object()
        .ok_or_else(|| CodecError::malformed(0, "log is not a JSON object"))?;
    let header = root
        .get("header")
        .and_then(Value::as_object)
        .ok_or_else(|| CodecError::malformed(0, "missing header object"))?;
    let (def, log) = parse_header(db, header)?;
    let body = root
        .get("body")
        .and_then(Value::as_object)
        .ok_or_else(|| CodecError::malformed(0, "missing body object"))?;
    let fields = read_record(&def.fields, body)?;
    Ok(GenericMessage::new(log, fields))
}

fn error_offset(input: &[u8], err: &serde_json::Error) -> usize {
    let line_start: usize = input
        .split(|&b| b == b'\n')
        .take(err.line().saturating_sub(1))
        .map(|line| line.len() + 1)
        .sum();
    (line_start + err.column().saturating_sub(1)).min(input.len())
}

fn header_value<'v>(header: &'v Map<String, Value>, key: &str) -> Result<&'v Value> {
    header
        .get(key)
        .ok_or_else(|| CodecError::malformed(0, format!("missing header key '{key}'")))
}

fn bad_header(key: &str) -> CodecError {
    CodecError::malformed(0, format!("bad value for header key '{key}'"))
}

fn header_int<T: TryFrom<u64>>(header: &Map<String, Value>, key: &str) -> Result<T> {
    header_value(header, key)?
        .as_u64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| bad_header(key))
}

fn header_float(header: &Map<String, Value>, key: &str) -> Result<f64> {
    header_value(header, key)?.as_f64().ok_or_else(|| bad_header(key))
}

fn parse_header(db: &MessageDatabase, header: &Map<String, Value>) -> Result<(Arc<MessageDef>, LogHeader)> {
    let name = header_value(header, "message")?
        .as_str()
        .ok_or_else(|| bad_header("message"))?;
    let def = db.lookup_name(name).ok_or_else(|| CodecError::UnknownMessageId {
        key: MessageKey::Name(name.to_string()),
    })?;
    let id: u16 = header_int(header, "id")?;
    if id != def.id {
        return Err(CodecError::malformed(
            0,
            format!("message '{name}' has ID {}, header says {id}", def.id),
        ));
    }

    let mut log = LogHeader::new(def.id);
    if header.contains_key("measurement_source") {
        log.measurement_source = header_int::<u8>(header, "measurement_source")
            .ok()
            .filter(|s| u64::from(*s) <= MAX_SOURCE)
            .ok_or_else(|| bad_header("measurement_source"))?;
    }
    if !header.contains_key("port") && !header.contains_key("sequence_num") {
        log.kind = HeaderKind::Short;
        log.week = header_int(header, "week")?;
        log.set_seconds(header_float(header, "seconds")?);
        return Ok((Arc::clone(def), log));
    }
    log.port = match header_value(header, "port")? {
        Value::String(port) => db
            .enum_by_name(PORT_ENUM)
            .and_then(|ports| ports.value_of(port))
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| bad_header("port"))?,
        _ => header_int(header, "port")?,
    };
    log.sequence = header_int(header, "sequence_num")?;
    log.set_idle_percent(header_float(header, "percent_idle_time")?);
    log.time_status = match header_value(header, "time_status")? {
        Value::String(status) => TimeStatus::from_name(status).ok_or_else(|| bad_header("time_status"))? as u8,
        _ => header_int(header, "time_status")?,
    };
    log.week = header_int(header, "week")?;
    log.set_seconds(header_float(header, "seconds")?);
    log.receiver_status = header_int(header, "receiver_status")?;
    log.message_definition_crc = header_int(header, "HEADER_reserved1")?;
    log.receiver_sw_version = header_int(header, "receiver_sw_version")?;
    if let Some(response) = header.get("response") {
        log.response = response.as_bool().ok_or_else(|| bad_header("response"))?;
    }
    Ok((Arc::clone(def), log))
}

fn conversion_error(reason: impl Into<String>) -> CodecError {
    CodecError::field("", 0, reason)
}

fn expected(what: &str, value: &Value) -> String {
    let found = match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    format!("expected {what}, found {found}")
}

fn read_record(defs: &[FieldDef], object: &Map<String, Value>) -> Result<Vec<FieldValue>> {
    if let Some(unknown) = object.keys().find(|key| !defs.iter().any(|f| &f.name == *key)) {
        return Err(CodecError::field(unknown.as_str(), 0, "unknown field"));
    }
    let mut values = Vec::with_capacity(defs.len());
    for field in defs {
        let value = object
            .get(&field.name)
            .ok_or_else(|| conversion_error("missing field"))
            .and_then(|value| read_field(field, value, &values))
            .map_err(|e| e.nest(&field.name))?;
        values.push(value);
    }
    Ok(values)
}

fn json_array(value: &Value) -> Result<&Vec<Value>> {
    value.as_array().ok_or_else(|| conversion_error(expected("an array", value)))
}

fn json_str(value: &Value) -> Result<&str> {
    value.as_str().ok_or_else(|| conversion_error(expected("a string", value)))
}

fn json_hex(value: &Value) -> Result<Vec<u8>> {
    hex::decode(json_str(value)?).map_err(|e| conversion_error(format!("bad hex value: {e}")))
}

fn read_field(field: &FieldDef, value: &Value, preceding: &[FieldValue]) -> Result<FieldValue> {
    let conversion = field.conversion.as_ref();
    Ok(match &field.kind {
        FieldKind::Simple { data_type } => read_scalar(*data_type, value).map_err(conversion_error)?,
        FieldKind::Enum { def, data_type } => read_enum(def, *data_type, value).map_err(conversion_error)?,
        FieldKind::String { max_len } => {
            let s = json_str(value)?;
            if s.len() > *max_len {
                return Err(conversion_error(format!(
                    "string of {} bytes exceeds maximum {max_len}",
                    s.len()
                )));
            }
            FieldValue::String(s.to_string())
        }
        FieldKind::FixedArray { data_type, len } => {
            if text::is_char_string(*data_type, conversion) {
                let mut raw = json_str(value)?.as_bytes().to_vec();
                if raw.len() > *len {
                    return Err(conversion_error(format!(
                        "string of {} bytes exceeds array length {len}",
                        raw.len()
                    )));
                }
                raw.resize(*len, 0);
                FieldValue::Array(text::bytes_to_elements(*data_type, &raw))
            } else {
                let items = read_elements(*data_type, conversion, value)?;
                if items.len() != *len {
                    return Err(conversion_error(format!("expected {len} elements, found {}", items.len())));
                }
                FieldValue::Array(items)
            }
        }
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            let items = read_elements(*data_type, conversion, value)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, 0)?;
            FieldValue::Array(items)
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            ..
        } => {
            let items = json_array(value)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, 0)?;
            let mut records = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                let object = item
                    .as_object()
                    .ok_or_else(|| conversion_error(expected("an object", item)).nest_index(idx))?;
                let record = read_record(fields, object).map_err(|e| e.nest_index(idx))?;
                records.push(FieldValue::Record(record));
            }
            FieldValue::Array(records)
        }
        FieldKind::Message(nested) => {
            let object = value
                .as_object()
                .ok_or_else(|| conversion_error(expected("an object", value)))?;
            FieldValue::Record(read_record(&nested.fields, object)?)
        }
        FieldKind::Compressed { max_len, length, .. } => {
            let block = json_hex(value)?;
            walk::check_encode_count(*length, *max_len, block.len(), preceding, 0)?;
            FieldValue::Bytes(block)
        }
    })
}

fn read_elements(data_type: DataType, conversion: Option<&Conversion>, value: &Value) -> Result<Vec<FieldValue>> {
    if text::is_hex_array(data_type, conversion) {
        return Ok(text::bytes_to_elements(data_type, &json_hex(value)?));
    }
    json_array(value)?
        .iter()
        .enumerate()
        .map(|(idx, item)| read_scalar(data_type, item).map_err(|r| conversion_error(r).nest_index(idx)))
        .collect()
}

fn read_float(data_type: DataType, value: &Value) -> std::result::Result<f64, String> {
    let v = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| expected("a float", value))?,
        Value::String(s) => match s.as_str() {
            "NaN" | "nan" => f64::NAN,
            "inf" | "Infinity" => f64::INFINITY,
            "-inf" | "-Infinity" => f64::NEG_INFINITY,
            _ => return Err(format!("'{s}' is not a number")),
        },
        _ => return Err(expected("a float", value)),
    };
    Ok(if data_type == DataType::Float {
        f64::from(v as f32)
    } else {
        v
    })
}

fn read_scalar(data_type: DataType, value: &Value) -> std::result::Result<FieldValue, String> {
    match data_type {
        DataType::Bool => value
            .as_bool()
            .map(FieldValue::Bool)
            .ok_or_else(|| expected("a boolean", value)),
        DataType::Float | DataType::Double => read_float(data_type, value).map(FieldValue::Float),
        DataType::SatelliteId => value
            .as_str()
            .ok_or_else(|| expected("a satellite ID string", value))?
            .parse::<SatelliteId>()
            .map(FieldValue::SatelliteId),
        dt if dt.is_signed() => {
            let v = value.as_i64().ok_or_else(|| expected("an integer", value))?;
            check_signed(dt, v)?;
            Ok(FieldValue::Int(v))
        }
        dt => {
            let v = value.as_u64().ok_or_else(|| expected("an unsigned integer", value))?;
            check_unsigned(dt, v)?;
            Ok(FieldValue::UInt(v))
        }
    }
}

fn read_enum(def: &EnumDef, data_type: DataType, value: &Value) -> std::result::Result<FieldValue, String> {
    match value {
        Value::String(name) => def
            .value_of(name)
            .map(FieldValue::Enum)
            .ok_or_else(|| format!("'{name}' is not a value of enum {}", def.name)),
        _ => {
            let v = value.as_i64().ok_or_else(|| expected("an enum name", value))?;
            check_signed(data_type, v)?;
            i32::try_from(v)
                .map(FieldValue::Enum)
                .map_err(|_| format!("enum value {v} out of range"))
        }
    }
}

/// Encodes a message as a JSON log, appending to `out`.
///
/// # Errors
/// - `UnknownMessageId` if the header's ID has no definition
/// - `FieldConversion` if a value does not fit its field or a counted
///   array disagrees with its length field
pub fn encode(db: &MessageDatabase, msg: &GenericMessage, out: &mut BytesMut) -> Result<usize> {
    let value = to_value(db, msg)?;
    let start = out.len();
    serde_json::to_writer((&mut *out).writer(), &value).map_err(|e| CodecError::malformed(0, e.to_string()))?;
    Ok(out.len() - start)
}

/// Builds the JSON document for a message.
///
/// # Errors
/// Same as [`encode`].
pub fn to_value(db: &MessageDatabase, msg: &GenericMessage) -> Result<Value> {
    let def = db.lookup(msg.header.message_id)?;
    walk::check_arity(&def.fields, &msg.fields, 0)?;
    let mut root = Map::new();
    root.insert("header".to_string(), Value::Object(write_header(db, def, &msg.header)));
    root.insert("body".to_string(), Value::Object(write_record(&def.fields, &msg.fields)?));
    Ok(Value::Object(root))
}

fn write_header(db: &MessageDatabase, def: &MessageDef, log: &LogHeader) -> Map<String, Value> {
    let mut header = Map::new();
    header.insert("message".to_string(), Value::from(def.name.as_str()));
    header.insert("id".to_string(), Value::from(def.id));
    if log.is_short() {
        header.insert("week".to_string(), Value::from(log.week));
        header.insert("seconds".to_string(), Value::from(log.seconds()));
        if log.measurement_source != 0 {
            header.insert("measurement_source".to_string(), Value::from(log.measurement_source));
        }
        return header;
    }
    let port = db
        .enum_by_name(PORT_ENUM)
        .and_then(|ports| ports.name_of(i32::from(log.port)))
        .map_or_else(|| Value::from(log.port), Value::from);
    header.insert("port".to_string(), port);
    header.insert("sequence_num".to_string(), Value::from(log.sequence));
    header.insert("percent_idle_time".to_string(), Value::from(log.idle_percent()));
    let time_status = log
        .time_status()
        .map_or_else(|| Value::from(log.time_status), |status| Value::from(status.as_str()));
    header.insert("time_status".to_string(), time_status);
    header.insert("week".to_string(), Value::from(log.week));
    header.insert("seconds".to_string(), Value::from(log.seconds()));
    header.insert("receiver_status".to_string(), Value::from(log.receiver_status));
    header.insert("HEADER_reserved1".to_string(), Value::from(log.message_definition_crc));
    header.insert("receiver_sw_version".to_string(), Value::from(log.receiver_sw_version));
    if log.measurement_source != 0 {
        header.insert("measurement_source".to_string(), Value::from(log.measurement_source));
    }
    if log.response {
        header.insert("response".to_string(), Value::Bool(true));
    }
    header
}

fn write_record(defs: &[FieldDef], values: &[FieldValue]) -> Result<Map<String, Value>> {
    let mut object = Map::new();
    for (idx, (field, value)) in defs.iter().zip(values).enumerate() {
        let json = write_field(field, value, &values[..idx]).map_err(|e| e.nest(&field.name))?;
        object.insert(field.name.clone(), json);
    }
    Ok(object)
}

fn write_field(field: &FieldDef, value: &FieldValue, preceding: &[FieldValue]) -> Result<Value> {
    let conversion = field.conversion.as_ref();
    Ok(match &field.kind {
        FieldKind::Simple { data_type } => write_scalar(*data_type, value).map_err(conversion_error)?,
        FieldKind::Enum { def, data_type } => {
            let v = Scalar::from_enum(*data_type, value).map_err(conversion_error)?;
            match i32::try_from(v).ok().and_then(|v| def.name_of(v)) {
                Some(name) => Value::from(name),
                None => Value::from(v),
            }
        }
        FieldKind::String { max_len } => {
            let s = walk::string(value, 0)?;
            if s.len() > *max_len {
                return Err(conversion_error(format!(
                    "string of {} bytes exceeds maximum {max_len}",
                    s.len()
                )));
            }
            Value::from(s)
        }
        FieldKind::FixedArray { data_type, len } => {
            let items = walk::array(value, 0)?;
            if items.len() != *len {
                return Err(conversion_error(format!("expected {len} elements, found {}", items.len())));
            }
            if text::is_char_string(*data_type, conversion) {
                let raw = text::elements_to_bytes(*data_type, items).map_err(conversion_error)?;
                let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
                let s = std::str::from_utf8(&raw[..end])
                    .ok()
                    .filter(|s| !s.contains('\0'))
                    .ok_or_else(|| conversion_error("character array is not a printable string"))?;
                Value::from(s)
            } else {
                write_elements(*data_type, conversion, items)?
            }
        }
        FieldKind::VarArray {
            data_type,
            max_len,
            length,
        } => {
            let items = walk::array(value, 0)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, 0)?;
            write_elements(*data_type, conversion, items)?
        }
        FieldKind::FieldArray {
            fields,
            max_len,
            length,
            ..
        } => {
            let items = walk::array(value, 0)?;
            walk::check_encode_count(*length, *max_len, items.len(), preceding, 0)?;
            let mut records = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                let record = walk::record(fields, item, 0).map_err(|e| e.nest_index(idx))?;
                records.push(Value::Object(write_record(fields, record).map_err(|e| e.nest_index(idx))?));
            }
            Value::Array(records)
        }
        FieldKind::Message(def) => {
            let record = walk::record(&def.fields, value, 0)?;
            Value::Object(write_record(&def.fields, record)?)
        }
        FieldKind::Compressed { max_len, length, .. } => {
            let block = walk::bytes(value, 0)?;
            walk::check_encode_count(*length, *max_len, block.len(), preceding, 0)?;
            Value::from(hex::encode(block))
        }
    })
}

fn write_elements(data_type: DataType, conversion: Option<&Conversion>, items: &[FieldValue]) -> Result<Value> {
    if text::is_hex_array(data_type, conversion) {
        let raw = text::elements_to_bytes(data_type, items).map_err(conversion_error)?;
        return Ok(Value::from(hex::encode(raw)));
    }
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| write_scalar(data_type, item).map_err(|r| conversion_error(r).nest_index(idx)))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

fn write_float(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::from("NaN"),
        None if v > 0.0 => Value::from("inf"),
        None => Value::from("-inf"),
    }
}

fn write_scalar(data_type: DataType, value: &FieldValue) -> std::result::Result<Value, String> {
    Ok(match Scalar::from_value(data_type, value)? {
        Scalar::Bool(b) => Value::Bool(b),
        Scalar::Signed(v) => Value::from(v),
        Scalar::Unsigned(v) => Value::from(v),
        Scalar::Float(v) => write_float(v),
        Scalar::SatelliteId(id) => Value::from(id.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxlog_core::TimeStatus;

    const SCHEMA: &str = r#"{
        "enums": [
            {"_id": "1", "name": "SolStatus", "enumerators": [{"name": "SOL_COMPUTED", "value": 0}]},
            {"_id": "2", "name": "PortAddress", "enumerators": [{"name": "COM1", "value": 32}]}
        ],
        "messages": [
            {"name": "BESTX", "messageID": 42, "fields": [
                {"name": "status", "type": "ENUM", "dataType": {"name": "ENUM", "length": 4}, "enumID": "1"},
                {"name": "lat", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}},
                {"name": "und", "type": "SIMPLE", "dataType": {"name": "FLOAT"}},
                {"name": "stn", "type": "STRING", "arrayLength": 4},
                {"name": "num", "type": "SIMPLE", "dataType": {"name": "UCHAR"}},
                {"name": "sv", "type": "FIELD_ARRAY", "arrayLength": 4, "arrayLengthRef": "num", "fields": [
                    {"name": "id", "type": "SIMPLE", "dataType": {"name": "SATELLITEID"}},
                    {"name": "ok", "type": "SIMPLE", "dataType": {"name": "BOOL"}}
                ]},
                {"name": "key", "type": "FIXED_LENGTH_ARRAY", "dataType": {"name": "HEXBYTE"}, "arrayLength": 2, "conversionString": "%Z"},
                {"name": "block", "type": "COMPRESSED", "arrayLength": 8,
                    "compression": {"scheme": "RANGE_RECORD", "scale": 1.0}}
            ]}
        ]
    }"#;

    fn db() -> MessageDatabase {
        MessageDatabase::from_json(SCHEMA).unwrap()
    }

    fn sample() -> GenericMessage {
        let mut header = LogHeader::new(42)
            .with_time(2163, 329_760_000)
            .with_time_status(TimeStatus::FineSteering)
            .with_port(32);
        header.idle_time = 167;
        header.receiver_status = 37_748_736;
        header.message_definition_crc = 45_558;
        header.receiver_sw_version = 65_535;
        GenericMessage::new(
            header,
            vec![
                FieldValue::Enum(0),
                FieldValue::Float(51.116),
                FieldValue::Float(f64::from(-17.25f32)),
                FieldValue::String("0".to_string()),
                FieldValue::UInt(1),
                FieldValue::Array(vec![FieldValue::Record(vec![
                    FieldValue::SatelliteId(SatelliteId::new(40, -7)),
                    FieldValue::Bool(true),
                ])]),
                FieldValue::Array(vec![FieldValue::UInt(1), FieldValue::UInt(0xff)]),
                FieldValue::Bytes(vec![0xab, 0xcd]),
            ],
        )
    }

    fn encode_text(msg: &GenericMessage) -> String {
        let mut out = BytesMut::new();
        encode(&db(), msg, &mut out).unwrap();
        String::from_utf8(out.to_vec()).unwrap()
    }

    fn decode_text(text: &str) -> Result<GenericMessage> {
        decode(&db(), &CodecConfig::default(), text.as_bytes())
    }

    #[test]
    fn test_document_shape() {
        let text = encode_text(&sample());
        assert_eq!(
            text,
            concat!(
                r#"{"header":{"message":"BESTX","id":42,"port":"COM1","sequence_num":0,"#,
                r#""percent_idle_time":83.5,"time_status":"FINESTEERING","week":2163,"seconds":329760.0,"#,
                r#""receiver_status":37748736,"HEADER_reserved1":45558,"receiver_sw_version":65535},"#,
                r#""body":{"status":"SOL_COMPUTED","lat":51.116,"und":-17.25,"stn":"0","num":1,"#,
                r#""sv":[{"id":"40-7","ok":true}],"key":"01ff","block":"abcd"}}"#
            )
        );
    }

    #[test]
    fn test_round_trip() {
        let msg = sample();
        assert_eq!(decode_text(&encode_text(&msg)).unwrap(), msg);

        let mut flagged = sample();
        flagged.header.measurement_source = 3;
        flagged.header.response = true;
        let text = encode_text(&flagged);
        assert!(text.contains(r#""measurement_source":3,"response":true"#));
        assert_eq!(decode_text(&text).unwrap(), flagged);
    }

    #[test]
    fn test_short_header() {
        let mut msg = sample();
        msg.header = LogHeader::new(42).with_time(2163, 329_760_125).with_kind(HeaderKind::Short);
        msg.header.measurement_source = 1;
        let text = encode_text(&msg);
        assert!(
            text.starts_with(
                r#"{"header":{"message":"BESTX","id":42,"week":2163,"seconds":329760.125,"measurement_source":1},"#
            ),
            "{text}"
        );
        assert_eq!(decode_text(&text).unwrap(), msg);

        // a lone sequence number still asks for every full header key
        let partial = text.replacen(r#""week""#, r#""sequence_num":0,"week""#, 1);
        assert!(matches!(decode_text(&partial), Err(CodecError::MalformedHeader { .. })));
    }

    #[test]
    fn test_non_finite_floats() {
        let mut msg = sample();
        msg.fields[1] = FieldValue::Float(f64::INFINITY);
        let text = encode_text(&msg);
        assert!(text.contains(r#""lat":"inf""#));
        assert_eq!(decode_text(&text).unwrap().fields[1], FieldValue::Float(f64::INFINITY));

        msg.fields[1] = FieldValue::Float(f64::NAN);
        let decoded = decode_text(&encode_text(&msg)).unwrap();
        assert!(decoded.fields[1].as_f64().unwrap().is_nan());
    }

    #[test]
    fn test_body_key_errors() {
        let text = encode_text(&sample());

        let missing = text.replace(r#""lat":51.116,"#, "");
        match decode_text(&missing).unwrap_err() {
            CodecError::FieldConversion { field, offset, .. } => {
                assert_eq!(field, "lat");
                assert_eq!(offset, 0);
            }
            other => panic!("unexpected error: {other}"),
        }

        let unknown = text.replace(r#""ok":true"#, r#""ok":true,"extra":1"#);
        match decode_text(&unknown).unwrap_err() {
            CodecError::FieldConversion { field, .. } => assert_eq!(field, "sv[0].extra"),
            other => panic!("unexpected error: {other}"),
        }

        let mistyped = text.replace(r#""num":1"#, r#""num":"one""#);
        assert!(matches!(decode_text(&mistyped), Err(CodecError::FieldConversion { .. })));

        let miscounted = text.replace(r#""num":1"#, r#""num":2"#);
        match decode_text(&miscounted).unwrap_err() {
            CodecError::FieldConversion { field, .. } => assert_eq!(field, "sv"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_header_errors() {
        let text = encode_text(&sample());
        assert!(matches!(
            decode_text(&text[..text.len() - 1]),
            Err(CodecError::MalformedHeader { .. })
        ));
        assert!(matches!(
            decode_text(&text.replace(r#""week":2163,"#, "")),
            Err(CodecError::MalformedHeader { .. })
        ));
        assert!(matches!(
            decode_text(&text.replace(r#""id":42"#, r#""id":43"#)),
            Err(CodecError::MalformedHeader { .. })
        ));
        assert!(matches!(
            decode_text(&text.replace("BESTX", "WORSTX")),
            Err(CodecError::UnknownMessageId {
                key: MessageKey::Name(_)
            })
        ));
    }

    #[test]
    fn test_error_offset() {
        let input = b"{\"header\":\n  [}";
        let err = serde_json::from_slice::<Value>(input).unwrap_err();
        let offset = error_offset(input, &err);
        assert!((11..=input.len()).contains(&offset), "offset {offset}");
    }
}

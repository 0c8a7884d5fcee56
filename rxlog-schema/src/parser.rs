//! JSON schema document reader.
//!
//! This module deserializes the schema document into plain document
//! structures. Names are not resolved here; see [`crate::resolve`].

use crate::error::ParseError;
use serde::Deserialize;
use std::io::Read;

/// Top-level schema document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaDocument {
    /// Enumerations.
    #[serde(default)]
    pub enums: Vec<EnumEntry>,
    /// Message definitions.
    #[serde(default)]
    pub messages: Vec<MessageEntry>,
}

/// Enumeration entry.
#[derive(Debug, Clone, Deserialize)]
pub struct EnumEntry {
    /// Enum identifier referenced by `enumID`.
    #[serde(rename = "_id")]
    pub id: String,
    /// Enum name.
    pub name: String,
    /// Enumerators.
    #[serde(default)]
    pub enumerators: Vec<EnumeratorEntry>,
}

/// Enumerator entry.
#[derive(Debug, Clone, Deserialize)]
pub struct EnumeratorEntry {
    /// Symbolic name.
    pub name: String,
    /// Numeric value.
    pub value: i32,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Message entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    /// Message name.
    pub name: String,
    /// Message ID.
    #[serde(rename = "messageID")]
    pub message_id: u16,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// CRC of the latest definition revision.
    #[serde(default)]
    pub latest_msg_def_crc: u32,
    /// Fields in wire order.
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
}

/// Field entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEntry {
    /// Field name.
    pub name: String,
    /// Field type tag, e.g. `SIMPLE` or `FIELD_ARRAY`.
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    /// Wire data type.
    #[serde(default)]
    pub data_type: Option<DataTypeEntry>,
    /// Text conversion string.
    #[serde(default)]
    pub conversion_string: Option<String>,
    /// Referenced enum ID (or name).
    #[serde(rename = "enumID", default)]
    pub enum_id: Option<String>,
    /// Fixed or maximum element count.
    #[serde(default)]
    pub array_length: Option<u64>,
    /// Name of an earlier integer field holding the element count.
    #[serde(default)]
    pub array_length_ref: Option<String>,
    /// Record fields of a field array.
    #[serde(default)]
    pub fields: Option<Vec<FieldEntry>>,
    /// Name of a nested message.
    #[serde(default)]
    pub message_ref: Option<String>,
    /// Compression parameters.
    #[serde(default)]
    pub compression: Option<CompressionEntry>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Data type entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DataTypeEntry {
    /// Type name, e.g. `ULONG`.
    pub name: String,
    /// Declared size in bytes.
    #[serde(default)]
    pub length: Option<usize>,
}

/// Compression entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CompressionEntry {
    /// Scheme name.
    pub scheme: String,
    /// Scale factor.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// Parses a schema document from a JSON string.
///
/// # Errors
/// Returns `ParseError::Json` if the JSON is malformed or misshapen.
pub fn parse_schema(json: &str) -> Result<SchemaDocument, ParseError> {
    Ok(serde_json::from_str(json)?)
}

/// Parses a schema document from a reader.
///
/// # Errors
/// Returns `ParseError` on I/O or JSON failures.
pub fn parse_schema_reader<R: Read>(reader: R) -> Result<SchemaDocument, ParseError> {
    Ok(serde_json::from_reader(std::io::BufReader::new(reader))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let json = r#"{
            "enums": [
                {"_id": "e1", "name": "SolStatus", "enumerators": [
                    {"name": "SOL_COMPUTED", "value": 0, "description": "solved"}
                ]}
            ],
            "messages": [
                {"name": "BESTPOS", "messageID": 42, "latestMsgDefCrc": 45558, "fields": [
                    {"name": "sol_stat", "type": "ENUM", "dataType": {"name": "ENUM", "length": 4}, "enumID": "e1"},
                    {"name": "lat", "type": "SIMPLE", "dataType": {"name": "DOUBLE", "length": 8}, "conversionString": "%.11lf"},
                    {"name": "obs", "type": "FIELD_ARRAY", "arrayLength": 4, "arrayLengthRef": "num", "fields": []}
                ]}
            ]
        }"#;

        let doc = parse_schema(json).unwrap();
        assert_eq!(doc.enums.len(), 1);
        assert_eq!(doc.enums[0].enumerators[0].name, "SOL_COMPUTED");

        let msg = &doc.messages[0];
        assert_eq!(msg.message_id, 42);
        assert_eq!(msg.latest_msg_def_crc, 45558);
        assert_eq!(msg.fields[0].enum_id.as_deref(), Some("e1"));
        assert_eq!(msg.fields[1].conversion_string.as_deref(), Some("%.11lf"));
        assert_eq!(msg.fields[2].array_length, Some(4));
        assert_eq!(msg.fields[2].array_length_ref.as_deref(), Some("num"));
    }

    #[test]
    fn test_missing_sections_default() {
        let doc = parse_schema("{}").unwrap();
        assert!(doc.enums.is_empty());
        assert!(doc.messages.is_empty());
    }

    #[test]
    fn test_missing_type_is_not_a_parse_error() {
        let doc = parse_schema(
            r#"{"messages":[{"name":"X","messageID":1,"fields":[{"name":"a"}]}]}"#,
        )
        .unwrap();
        assert!(doc.messages[0].fields[0].field_type.is_none());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_schema("{\"messages\": ["), Err(ParseError::Json(_))));
        assert!(matches!(
            parse_schema(r#"{"messages":[{"name":"X","messageID":70000}]}"#),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_compression_default_scale() {
        let doc = parse_schema(
            r#"{"messages":[{"name":"X","messageID":1,"fields":[
                {"name":"blk","type":"COMPRESSED","arrayLength":64,"compression":{"scheme":"RANGE_RECORD"}}
            ]}]}"#,
        )
        .unwrap();
        let compression = doc.messages[0].fields[0].compression.as_ref().unwrap();
        assert_eq!(compression.scheme, "RANGE_RECORD");
        assert_eq!(compression.scale, 1.0);
    }
}

//! The message definition database.

use crate::error::SchemaError;
use crate::messages::{EnumDef, MessageDef};
use crate::parser::{SchemaDocument, parse_schema, parse_schema_reader};
use crate::resolve::resolve_document;
use crate::validation::validate_document;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Immutable lookup of message and enum definitions.
///
/// Built once from a JSON schema document and shared by reference (usually
/// behind an `Arc`) across every decode and encode call. All lookups take
/// `&self`, so concurrent readers need no locking.
#[derive(Debug, Clone, Default)]
pub struct MessageDatabase {
    messages: Vec<Arc<MessageDef>>,
    enums: Vec<Arc<EnumDef>>,
    by_id: HashMap<u16, Arc<MessageDef>>,
    by_name: HashMap<String, Arc<MessageDef>>,
    enums_by_id: HashMap<String, Arc<EnumDef>>,
    enums_by_name: HashMap<String, Arc<EnumDef>>,
}

impl MessageDatabase {
    /// Loads a database from a JSON schema string.
    ///
    /// # Errors
    /// Returns `SchemaError` if the document is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let start = Instant::now();
        let doc = parse_schema(json)?;
        let db = Self::from_document(&doc)?;
        tracing::debug!(
            messages = db.messages.len(),
            enums = db.enums.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "loaded message database"
        );
        Ok(db)
    }

    /// Loads a database from a reader yielding a JSON schema document.
    ///
    /// # Errors
    /// Returns `SchemaError` on I/O, JSON or validation failures.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SchemaError> {
        let start = Instant::now();
        let doc = parse_schema_reader(reader)?;
        let db = Self::from_document(&doc)?;
        tracing::debug!(
            messages = db.messages.len(),
            enums = db.enums.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "loaded message database"
        );
        Ok(db)
    }

    /// Loads a database from a JSON schema file.
    ///
    /// # Errors
    /// Returns `SchemaError` if the file cannot be read or fails validation.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let file = std::fs::File::open(path.as_ref()).map_err(crate::error::ParseError::from)?;
        Self::from_reader(file)
    }

    /// Validates and resolves a parsed document.
    ///
    /// # Errors
    /// Returns `SchemaError` if the document fails validation.
    pub fn from_document(doc: &SchemaDocument) -> Result<Self, SchemaError> {
        validate_document(doc)?;
        let resolved = resolve_document(doc)?;
        Ok(Self::from_parts(resolved.messages, resolved.enums))
    }

    fn from_parts(messages: Vec<Arc<MessageDef>>, enums: Vec<Arc<EnumDef>>) -> Self {
        let by_id = messages.iter().map(|m| (m.id, Arc::clone(m))).collect();
        let by_name = messages
            .iter()
            .map(|m| (m.name.clone(), Arc::clone(m)))
            .collect();
        let enums_by_id = enums.iter().map(|e| (e.id.clone(), Arc::clone(e))).collect();
        let enums_by_name = enums
            .iter()
            .map(|e| (e.name.clone(), Arc::clone(e)))
            .collect();
        Self {
            messages,
            enums,
            by_id,
            by_name,
            enums_by_id,
            enums_by_name,
        }
    }

    /// Returns the definition for a message ID.
    ///
    /// # Errors
    /// Returns `SchemaError::UnknownMessageId` if no definition is registered.
    pub fn lookup(&self, id: u16) -> Result<&Arc<MessageDef>, SchemaError> {
        self.by_id
            .get(&id)
            .ok_or(SchemaError::UnknownMessageId { id })
    }

    /// Returns the definition for a message ID, if any.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<&Arc<MessageDef>> {
        self.by_id.get(&id)
    }

    /// Returns the definition for a message name, if any.
    #[must_use]
    pub fn lookup_name(&self, name: &str) -> Option<&Arc<MessageDef>> {
        self.by_name.get(name)
    }

    /// Returns the enum with the given schema ID.
    #[must_use]
    pub fn enum_by_id(&self, id: &str) -> Option<&Arc<EnumDef>> {
        self.enums_by_id.get(id)
    }

    /// Returns the enum with the given name.
    #[must_use]
    pub fn enum_by_name(&self, name: &str) -> Option<&Arc<EnumDef>> {
        self.enums_by_name.get(name)
    }

    /// Returns every message definition in load order.
    pub fn messages(&self) -> impl Iterator<Item = &Arc<MessageDef>> {
        self.messages.iter()
    }

    /// Returns every enum definition in load order.
    pub fn enums(&self) -> impl Iterator<Item = &Arc<EnumDef>> {
        self.enums.iter()
    }

    /// Returns the number of message definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if no messages are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns a new database combining `self` with `other`.
    ///
    /// Definitions in `other` replace those in `self` with the same message
    /// ID or name (enums: same ID or name). Messages kept from `self` still
    /// reference the enums and nested messages they were resolved against.
    #[must_use]
    pub fn merge(&self, other: &MessageDatabase) -> MessageDatabase {
        let messages = self
            .messages
            .iter()
            .filter(|m| !other.by_id.contains_key(&m.id) && !other.by_name.contains_key(&m.name))
            .chain(other.messages.iter())
            .cloned()
            .collect();
        let enums = self
            .enums
            .iter()
            .filter(|e| {
                !other.enums_by_id.contains_key(&e.id) && !other.enums_by_name.contains_key(&e.name)
            })
            .chain(other.enums.iter())
            .cloned()
            .collect();
        tracing::debug!(
            base = self.messages.len(),
            overlay = other.messages.len(),
            "merged message databases"
        );
        Self::from_parts(messages, enums)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::FieldKind;

    const BASE: &str = r#"{
        "enums": [{"_id": "1", "name": "PortAddress", "enumerators": [
            {"name": "COM1", "value": 32}, {"name": "COM2", "value": 64}
        ]}],
        "messages": [
            {"name": "VERSION", "messageID": 37, "fields": [
                {"name": "num_comp", "type": "SIMPLE", "dataType": {"name": "LONG", "length": 4}}
            ]},
            {"name": "TIME", "messageID": 101, "fields": [
                {"name": "offset", "type": "SIMPLE", "dataType": {"name": "DOUBLE", "length": 8}}
            ]}
        ]
    }"#;

    #[test]
    fn test_load_and_lookup() {
        let db = MessageDatabase::from_json(BASE).unwrap();
        assert_eq!(db.len(), 2);
        assert!(!db.is_empty());

        let version = db.lookup(37).unwrap();
        assert_eq!(version.name, "VERSION");
        assert!(Arc::ptr_eq(version, db.lookup_name("VERSION").unwrap()));
        assert!(db.get(999).is_none());

        let port = db.enum_by_name("PortAddress").unwrap();
        assert_eq!(port.value_of("COM2"), Some(64));
        assert!(Arc::ptr_eq(port, db.enum_by_id("1").unwrap()));
    }

    #[test]
    fn test_unknown_message_id() {
        let db = MessageDatabase::from_json(BASE).unwrap();
        assert!(matches!(
            db.lookup(4242),
            Err(SchemaError::UnknownMessageId { id: 4242 })
        ));
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dup = r#"{"messages":[
            {"name":"A","messageID":1,"fields":[]},
            {"name":"B","messageID":1,"fields":[]}
        ]}"#;
        assert!(matches!(
            MessageDatabase::from_json(dup),
            Err(SchemaError::DuplicateMessageId { .. })
        ));
        assert!(matches!(
            MessageDatabase::from_json("not json"),
            Err(SchemaError::Parse(_))
        ));
    }

    #[test]
    fn test_from_reader() {
        let db = MessageDatabase::from_reader(BASE.as_bytes()).unwrap();
        assert_eq!(db.lookup(101).unwrap().name, "TIME");
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = MessageDatabase::from_path("/nonexistent/rxlog/schema.json").unwrap_err();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_merge_replaces_by_id_and_name() {
        let base = MessageDatabase::from_json(BASE).unwrap();
        let overlay = MessageDatabase::from_json(
            r#"{"messages":[
                {"name": "VERSION", "messageID": 37, "fields": [
                    {"name": "num_comp", "type": "SIMPLE", "dataType": {"name": "ULONG", "length": 4}},
                    {"name": "extra", "type": "SIMPLE", "dataType": {"name": "UCHAR", "length": 1}}
                ]},
                {"name": "NEW", "messageID": 500, "fields": []}
            ]}"#,
        )
        .unwrap();

        let merged = base.merge(&overlay);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.lookup(37).unwrap().fields.len(), 2);
        assert!(matches!(
            merged.lookup(37).unwrap().fields[0].kind,
            FieldKind::Simple { .. }
        ));
        assert!(merged.lookup(101).is_ok());
        assert!(merged.lookup(500).is_ok());
        assert!(merged.enum_by_name("PortAddress").is_some());
        // the originals are untouched
        assert_eq!(base.lookup(37).unwrap().fields.len(), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let db = Arc::new(MessageDatabase::from_json(BASE).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || db.lookup(37).map(|m| m.fields.len()).unwrap_or(0))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
    }
}

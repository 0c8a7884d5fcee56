//! Schema document validation.
//!
//! Structural checks that need the whole document: duplicate identifiers,
//! duplicate field names and nested message references. Per-field type
//! checks happen during resolution.

use crate::error::{ParseError, SchemaError};
use crate::parser::{FieldEntry, MessageEntry, SchemaDocument};
use std::collections::{HashMap, HashSet};

/// Validates a parsed schema document.
///
/// # Errors
/// Returns `SchemaError` describing the first problem found.
pub fn validate_document(doc: &SchemaDocument) -> Result<(), SchemaError> {
    validate_enums(doc)?;
    validate_messages(doc)?;
    validate_message_refs(doc)?;
    Ok(())
}

fn validate_enums(doc: &SchemaDocument) -> Result<(), SchemaError> {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();

    for enum_def in &doc.enums {
        if !seen_ids.insert(enum_def.id.as_str()) {
            return Err(SchemaError::validation(format!(
                "Duplicate enum id '{}'",
                enum_def.id
            )));
        }
        if !seen_names.insert(enum_def.name.as_str()) {
            return Err(SchemaError::validation(format!(
                "Duplicate enum name '{}'",
                enum_def.name
            )));
        }

        let mut names = HashSet::new();
        for e in &enum_def.enumerators {
            if !names.insert(e.name.as_str()) {
                return Err(SchemaError::validation(format!(
                    "Duplicate enumerator '{}' in enum '{}'",
                    e.name, enum_def.name
                )));
            }
        }
    }

    Ok(())
}

fn validate_messages(doc: &SchemaDocument) -> Result<(), SchemaError> {
    let mut ids: HashMap<u16, &str> = HashMap::new();
    let mut names = HashSet::new();

    for msg in &doc.messages {
        if let Some(first) = ids.insert(msg.message_id, &msg.name) {
            return Err(SchemaError::DuplicateMessageId {
                id: msg.message_id,
                first: first.to_string(),
                second: msg.name.clone(),
            });
        }
        if !names.insert(msg.name.as_str()) {
            return Err(SchemaError::validation(format!(
                "Duplicate message name '{}'",
                msg.name
            )));
        }
        validate_record(&msg.fields, &msg.name)?;
    }

    Ok(())
}

fn validate_record(fields: &[FieldEntry], owner: &str) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();

    for field in fields {
        if field.name.is_empty() {
            return Err(SchemaError::validation(format!(
                "Field with empty name in '{owner}'"
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::validation(format!(
                "Duplicate field name '{}' in '{owner}'",
                field.name
            )));
        }
        if field.field_type.is_none() {
            let element = format!("field '{}' of '{owner}'", field.name);
            return Err(ParseError::missing(element, "type").into());
        }
        if let Some(sub) = &field.fields {
            validate_record(sub, &format!("{owner}.{}", field.name))?;
        }
    }

    Ok(())
}

/// Checks that every `messageRef` names a known message and that nesting
/// never loops back on itself.
fn validate_message_refs(doc: &SchemaDocument) -> Result<(), SchemaError> {
    let by_name: HashMap<&str, &MessageEntry> =
        doc.messages.iter().map(|m| (m.name.as_str(), m)).collect();

    let mut done = HashSet::new();
    for msg in &doc.messages {
        let mut path = Vec::new();
        visit(msg, &by_name, &mut path, &mut done)?;
    }
    Ok(())
}

fn visit<'a>(
    msg: &'a MessageEntry,
    by_name: &HashMap<&str, &'a MessageEntry>,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Result<(), SchemaError> {
    if done.contains(msg.name.as_str()) {
        return Ok(());
    }
    if path.contains(&msg.name.as_str()) {
        path.push(&msg.name);
        return Err(SchemaError::CircularReference {
            path: path.join(" -> "),
        });
    }

    path.push(&msg.name);
    let mut refs = Vec::new();
    collect_refs(&msg.fields, &mut refs);
    for (field, target) in refs {
        let Some(next) = by_name.get(target) else {
            return Err(SchemaError::MessageNotFound {
                name: target.to_string(),
                field: field.to_string(),
            });
        };
        visit(next, by_name, path, done)?;
    }
    path.pop();
    done.insert(&msg.name);
    Ok(())
}

fn collect_refs<'a>(fields: &'a [FieldEntry], out: &mut Vec<(&'a str, &'a str)>) {
    for field in fields {
        if let Some(target) = &field.message_ref {
            out.push((field.name.as_str(), target.as_str()));
        }
        if let Some(sub) = &field.fields {
            collect_refs(sub, out);
        }
    }
}

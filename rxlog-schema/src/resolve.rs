//! Resolution of a validated schema document into linked definitions.
//!
//! Turns document entries into [`MessageDef`]/[`EnumDef`] values: type names
//! become [`DataType`]s, enum and message references become shared `Arc`s,
//! length references become field indices, and flattened offsets are
//! computed for every record.

use crate::error::{ParseError, SchemaError};
use crate::messages::{ArrayLength, EnumDef, Enumerator, FieldDef, FieldKind, MessageDef};
use crate::parser::{FieldEntry, MessageEntry, SchemaDocument};
use crate::types::{CompressionScheme, Conversion, DataType};
use std::collections::HashMap;
use std::sync::Arc;

/// Size of the element count written before non-referenced arrays.
pub const COUNT_PREFIX_SIZE: usize = 4;

/// Resolved definitions, in document order.
#[derive(Debug, Default)]
pub struct ResolvedSchema {
    /// Message definitions.
    pub messages: Vec<Arc<MessageDef>>,
    /// Enum definitions.
    pub enums: Vec<Arc<EnumDef>>,
}

/// Resolves every entry of a document.
///
/// The document should have passed
/// [`validate_document`](crate::validation::validate_document).
///
/// # Errors
/// Returns `SchemaError` for unknown types, bad lengths, unknown enums,
/// bad length references, bad conversion strings or cyclic nesting.
pub fn resolve_document(doc: &SchemaDocument) -> Result<ResolvedSchema, SchemaError> {
    let enums: Vec<Arc<EnumDef>> = doc
        .enums
        .iter()
        .map(|e| {
            Arc::new(EnumDef::new(
                e.id.clone(),
                e.name.clone(),
                e.enumerators
                    .iter()
                    .map(|v| Enumerator {
                        name: v.name.clone(),
                        value: v.value,
                        description: v.description.clone(),
                    })
                    .collect(),
            ))
        })
        .collect();

    let mut resolver = Resolver {
        entries: doc.messages.iter().map(|m| (m.name.as_str(), m)).collect(),
        enums: &enums,
        resolved: HashMap::new(),
        in_progress: Vec::new(),
    };

    let mut messages = Vec::with_capacity(doc.messages.len());
    for entry in &doc.messages {
        messages.push(resolver.message(&entry.name, &entry.name)?);
    }

    Ok(ResolvedSchema { messages, enums })
}

struct Resolver<'a> {
    entries: HashMap<&'a str, &'a MessageEntry>,
    enums: &'a [Arc<EnumDef>],
    resolved: HashMap<String, Arc<MessageDef>>,
    in_progress: Vec<String>,
}

impl Resolver<'_> {
    fn message(&mut self, name: &str, referrer: &str) -> Result<Arc<MessageDef>, SchemaError> {
        if let Some(def) = self.resolved.get(name) {
            return Ok(Arc::clone(def));
        }
        if self.in_progress.iter().any(|n| n == name) {
            let mut path = self.in_progress.clone();
            path.push(name.to_string());
            return Err(SchemaError::CircularReference {
                path: path.join(" -> "),
            });
        }
        let entry = *self
            .entries
            .get(name)
            .ok_or_else(|| SchemaError::MessageNotFound {
                name: name.to_string(),
                field: referrer.to_string(),
            })?;

        self.in_progress.push(name.to_string());
        let (fields, flat_size) = self.record(&entry.fields, &entry.name)?;
        self.in_progress.pop();

        let def = Arc::new(MessageDef {
            name: entry.name.clone(),
            id: entry.message_id,
            description: entry.description.clone(),
            definition_crc: entry.latest_msg_def_crc,
            fields,
            flat_size,
        });
        self.resolved.insert(entry.name.clone(), Arc::clone(&def));
        Ok(def)
    }

    fn record(
        &mut self,
        entries: &[FieldEntry],
        owner: &str,
    ) -> Result<(Vec<FieldDef>, usize), SchemaError> {
        let mut fields: Vec<FieldDef> = Vec::with_capacity(entries.len());
        let mut offset = 0;
        for entry in entries {
            let field = self.field(entry, &fields, owner, offset)?;
            offset += field.flat_size;
            fields.push(field);
        }
        Ok((fields, offset))
    }

    fn field(
        &mut self,
        entry: &FieldEntry,
        preceding: &[FieldDef],
        owner: &str,
        flat_offset: usize,
    ) -> Result<FieldDef, SchemaError> {
        let element = format!("field '{}' of '{owner}'", entry.name);
        let field_type = entry
            .field_type
            .as_deref()
            .ok_or_else(|| ParseError::missing(&element, "type"))?;

        let (kind, flat_size) = match field_type {
            "SIMPLE" => {
                let data_type = data_type(entry, &element)?;
                (FieldKind::Simple { data_type }, data_type.size())
            }
            "ENUM" => {
                let def = self.enum_ref(entry)?;
                let data_type = enum_storage(entry, &element)?;
                (FieldKind::Enum { def, data_type }, data_type.size())
            }
            "STRING" => {
                let max_len = array_length(entry, &element)?;
                (FieldKind::String { max_len }, max_len)
            }
            "FIXED_LENGTH_ARRAY" => {
                let data_type = data_type(entry, &element)?;
                let len = array_length(entry, &element)?;
                (FieldKind::FixedArray { data_type, len }, len * data_type.size())
            }
            "VARIABLE_LENGTH_ARRAY" => {
                let data_type = data_type(entry, &element)?;
                let max_len = array_length(entry, &element)?;
                let length = length_source(entry, preceding)?;
                (
                    FieldKind::VarArray {
                        data_type,
                        max_len,
                        length,
                    },
                    prefix_size(length) + max_len * data_type.size(),
                )
            }
            "FIELD_ARRAY" => {
                let max_len = array_length(entry, &element)?;
                let length = length_source(entry, preceding)?;
                let sub = entry
                    .fields
                    .as_deref()
                    .ok_or_else(|| ParseError::missing(&element, "fields"))?;
                let (fields, record_size) =
                    self.record(sub, &format!("{owner}.{}", entry.name))?;
                (
                    FieldKind::FieldArray {
                        fields,
                        max_len,
                        length,
                        record_size,
                    },
                    prefix_size(length) + max_len * record_size,
                )
            }
            "MESSAGE" => {
                let target = entry
                    .message_ref
                    .as_deref()
                    .ok_or_else(|| ParseError::missing(&element, "messageRef"))?;
                let def = self.message(target, &entry.name)?;
                let size = def.flat_size;
                (FieldKind::Message(def), size)
            }
            "COMPRESSED" => {
                let compression = entry
                    .compression
                    .as_ref()
                    .ok_or_else(|| ParseError::missing(&element, "compression"))?;
                let scheme = CompressionScheme::from_name(&compression.scheme).ok_or_else(
                    || ParseError::invalid(&element, "compression.scheme", &compression.scheme),
                )?;
                if !compression.scale.is_finite() || compression.scale == 0.0 {
                    return Err(ParseError::invalid(
                        &element,
                        "compression.scale",
                        compression.scale.to_string(),
                    )
                    .into());
                }
                let max_len = array_length(entry, &element)?;
                let length = length_source(entry, preceding)?;
                (
                    FieldKind::Compressed {
                        scheme,
                        scale: compression.scale,
                        max_len,
                        length,
                    },
                    prefix_size(length) + max_len,
                )
            }
            other => return Err(ParseError::invalid(&element, "type", other).into()),
        };

        let conversion = match entry.conversion_string.as_deref() {
            None | Some("") => None,
            Some(text) => Some(
                Conversion::parse(text)
                    .ok_or_else(|| ParseError::invalid(&element, "conversionString", text))?,
            ),
        };

        Ok(FieldDef {
            name: entry.name.clone(),
            kind,
            conversion,
            description: entry.description.clone(),
            flat_offset,
            flat_size,
        })
    }

    fn enum_ref(&self, entry: &FieldEntry) -> Result<Arc<EnumDef>, SchemaError> {
        let id = entry.enum_id.as_deref().unwrap_or_default();
        self.enums
            .iter()
            .find(|e| e.id == id || e.name == id)
            .cloned()
            .ok_or_else(|| SchemaError::EnumNotFound {
                enum_id: id.to_string(),
                field: entry.name.clone(),
            })
    }
}

fn data_type(entry: &FieldEntry, element: &str) -> Result<DataType, SchemaError> {
    let raw = entry
        .data_type
        .as_ref()
        .ok_or_else(|| ParseError::missing(element, "dataType"))?;
    let data_type = DataType::from_name(&raw.name)
        .ok_or_else(|| ParseError::invalid(element, "dataType.name", &raw.name))?;
    if let Some(length) = raw.length {
        if length != data_type.size() {
            return Err(SchemaError::validation(format!(
                "{element}: declared length {length} does not match {} ({} bytes)",
                data_type,
                data_type.size()
            )));
        }
    }
    Ok(data_type)
}

/// Enum fields accept a dataType named `ENUM` or any integer type; the
/// declared or implied width picks the signed storage type.
fn enum_storage(entry: &FieldEntry, element: &str) -> Result<DataType, SchemaError> {
    let width = match entry.data_type.as_ref() {
        None => 4,
        Some(raw) if raw.name == "ENUM" => raw.length.unwrap_or(4),
        Some(_) => {
            let declared = data_type(entry, element)?;
            if !declared.is_integer() {
                return Err(SchemaError::validation(format!(
                    "{element}: enum storage must be an integer, found {declared}"
                )));
            }
            declared.size()
        }
    };
    DataType::enum_storage(width).ok_or_else(|| {
        SchemaError::validation(format!("{element}: unsupported enum width {width}"))
    })
}

fn array_length(entry: &FieldEntry, element: &str) -> Result<usize, SchemaError> {
    match entry.array_length {
        Some(len) if len > 0 => usize::try_from(len).map_err(|_| {
            ParseError::invalid(element, "arrayLength", len.to_string()).into()
        }),
        Some(len) => Err(ParseError::invalid(element, "arrayLength", len.to_string()).into()),
        None => Err(ParseError::missing(element, "arrayLength").into()),
    }
}

fn length_source(entry: &FieldEntry, preceding: &[FieldDef]) -> Result<ArrayLength, SchemaError> {
    let Some(reference) = entry.array_length_ref.as_deref() else {
        return Ok(ArrayLength::Prefixed);
    };
    let invalid = |reason: &str| SchemaError::InvalidLengthRef {
        field: entry.name.clone(),
        reference: reference.to_string(),
        reason: reason.to_string(),
    };
    let index = preceding
        .iter()
        .position(|f| f.name == reference)
        .ok_or_else(|| invalid("no earlier field with that name in the same record"))?;
    if !preceding[index].is_length_source() {
        return Err(invalid("referenced field is not an integer"));
    }
    Ok(ArrayLength::Field(index))
}

const fn prefix_size(length: ArrayLength) -> usize {
    match length {
        ArrayLength::Prefixed => COUNT_PREFIX_SIZE,
        ArrayLength::Field(_) => 0,
    }
}

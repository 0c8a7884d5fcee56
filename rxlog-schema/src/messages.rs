//! Resolved message and enum definitions.
//!
//! These are the immutable, fully linked structures held by the
//! [`MessageDatabase`](crate::MessageDatabase). Enum and nested message
//! references are shared through `Arc`, and every field carries its static
//! offset in the flattened binary layout.

use crate::types::{CompressionScheme, Conversion, DataType};
use std::collections::HashMap;
use std::sync::Arc;

/// Named enumeration shared by fields across messages.
#[derive(Debug, Clone)]
pub struct EnumDef {
    /// Enum identifier from the schema document.
    pub id: String,
    /// Enum name.
    pub name: String,
    /// Enumerators in document order.
    pub enumerators: Vec<Enumerator>,
    by_value: HashMap<i32, usize>,
    by_name: HashMap<String, usize>,
}

/// One named value of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator {
    /// Symbolic name printed in text formats.
    pub name: String,
    /// Numeric value stored in binary formats.
    pub value: i32,
    /// Description.
    pub description: Option<String>,
}

impl EnumDef {
    /// Creates an enum definition and indexes its enumerators.
    ///
    /// When two enumerators share a value, the first one wins for
    /// value-to-name lookups.
    #[must_use]
    pub fn new(id: String, name: String, enumerators: Vec<Enumerator>) -> Self {
        let mut by_value = HashMap::with_capacity(enumerators.len());
        let mut by_name = HashMap::with_capacity(enumerators.len());
        for (idx, e) in enumerators.iter().enumerate() {
            by_value.entry(e.value).or_insert(idx);
            by_name.entry(e.name.clone()).or_insert(idx);
        }
        Self {
            id,
            name,
            enumerators,
            by_value,
            by_name,
        }
    }

    /// Returns the name of a value, if it has one.
    #[must_use]
    pub fn name_of(&self, value: i32) -> Option<&str> {
        self.by_value
            .get(&value)
            .map(|&idx| self.enumerators[idx].name.as_str())
    }

    /// Returns the value of a name.
    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).map(|&idx| self.enumerators[idx].value)
    }
}

/// Message definition.
#[derive(Debug, Clone)]
pub struct MessageDef {
    /// Message name.
    pub name: String,
    /// Message ID.
    pub id: u16,
    /// Description.
    pub description: Option<String>,
    /// CRC of the latest message definition revision.
    pub definition_crc: u32,
    /// Fields in wire order.
    pub fields: Vec<FieldDef>,
    /// Body size in the flattened binary layout.
    pub flat_size: usize,
}

impl MessageDef {
    /// Returns the field with the given name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the position of the field with the given name.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Where the element count of an array comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayLength {
    /// A u32 count precedes the elements.
    Prefixed,
    /// The count is the value of an earlier integer field in the same record.
    Field(usize),
}

/// Field layout variants.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Single scalar value.
    Simple {
        /// Wire type.
        data_type: DataType,
    },
    /// Integer mapped through an enumeration.
    Enum {
        /// Linked enumeration.
        def: Arc<EnumDef>,
        /// Signed storage type.
        data_type: DataType,
    },
    /// Character string.
    String {
        /// Maximum length in bytes, the flattened field width.
        max_len: usize,
    },
    /// Array of exactly `len` scalars.
    FixedArray {
        /// Element type.
        data_type: DataType,
        /// Element count.
        len: usize,
    },
    /// Array of up to `max_len` scalars.
    VarArray {
        /// Element type.
        data_type: DataType,
        /// Maximum element count.
        max_len: usize,
        /// Count source.
        length: ArrayLength,
    },
    /// Array of up to `max_len` records.
    FieldArray {
        /// Record fields in wire order.
        fields: Vec<FieldDef>,
        /// Maximum record count.
        max_len: usize,
        /// Count source.
        length: ArrayLength,
        /// Record size in the flattened layout.
        record_size: usize,
    },
    /// Another message's fields inline.
    Message(Arc<MessageDef>),
    /// Opaque compressed byte block, decompressed on request.
    Compressed {
        /// Decompression scheme.
        scheme: CompressionScheme,
        /// Scale factor applied by the decompressor.
        scale: f64,
        /// Maximum block size in bytes.
        max_len: usize,
        /// Count source.
        length: ArrayLength,
    },
}

/// Field definition within a message or field array record.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Layout.
    pub kind: FieldKind,
    /// Text conversion, if declared.
    pub conversion: Option<Conversion>,
    /// Description.
    pub description: Option<String>,
    /// Offset from the start of the enclosing record in the flattened layout.
    pub flat_offset: usize,
    /// Size in the flattened layout.
    pub flat_size: usize,
}

impl FieldDef {
    /// Returns the scalar type of simple and enum fields.
    #[must_use]
    pub fn scalar_type(&self) -> Option<DataType> {
        match &self.kind {
            FieldKind::Simple { data_type } | FieldKind::Enum { data_type, .. } => {
                Some(*data_type)
            }
            _ => None,
        }
    }

    /// Returns true when the field can act as an array length source.
    #[must_use]
    pub fn is_length_source(&self) -> bool {
        matches!(&self.kind, FieldKind::Simple { data_type } if data_type.is_integer())
    }

    /// Returns the maximum element count of array-like fields.
    #[must_use]
    pub fn max_len(&self) -> Option<usize> {
        match &self.kind {
            FieldKind::String { max_len }
            | FieldKind::VarArray { max_len, .. }
            | FieldKind::FieldArray { max_len, .. }
            | FieldKind::Compressed { max_len, .. } => Some(*max_len),
            FieldKind::FixedArray { len, .. } => Some(*len),
            _ => None,
        }
    }

    /// Returns the count source of counted fields.
    #[must_use]
    pub fn array_length(&self) -> Option<ArrayLength> {
        match &self.kind {
            FieldKind::VarArray { length, .. }
            | FieldKind::FieldArray { length, .. }
            | FieldKind::Compressed { length, .. } => Some(*length),
            _ => None,
        }
    }
}

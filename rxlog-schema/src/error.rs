//! Error types for schema loading and validation.

use thiserror::Error;

/// Error type for reading a schema document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON syntax or shape error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing required member.
    #[error("missing required member '{member}' on {element}")]
    MissingMember {
        /// Element description, e.g. `field 'x' of message 'Y'`.
        element: String,
        /// Member name.
        member: String,
    },

    /// Invalid member value.
    #[error("invalid value '{value}' for member '{member}' on {element}")]
    InvalidValue {
        /// Element description.
        element: String,
        /// Member name.
        member: String,
        /// Offending value.
        value: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for schema validation and lookup.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Parsing error.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// No definition registered for a message ID.
    #[error("unknown message id {id}")]
    UnknownMessageId {
        /// Requested message ID.
        id: u16,
    },

    /// Enum referenced by a field is not defined.
    #[error("enum '{enum_id}' referenced by field '{field}' not found")]
    EnumNotFound {
        /// Enum ID or name.
        enum_id: String,
        /// Field name.
        field: String,
    },

    /// Nested message referenced by a field is not defined.
    #[error("message '{name}' referenced by field '{field}' not found")]
    MessageNotFound {
        /// Message name.
        name: String,
        /// Field name.
        field: String,
    },

    /// Duplicate message ID.
    #[error("duplicate message id {id}: '{first}' and '{second}'")]
    DuplicateMessageId {
        /// Message ID.
        id: u16,
        /// Name of the first definition.
        first: String,
        /// Name of the second definition.
        second: String,
    },

    /// Circular nested message reference.
    #[error("circular message reference detected: {path}")]
    CircularReference {
        /// Path of the circular reference.
        path: String,
    },

    /// Array length reference does not name a usable field.
    #[error("field '{field}' has invalid arrayLengthRef '{reference}': {reason}")]
    InvalidLengthRef {
        /// Array field name.
        field: String,
        /// Referenced field name.
        reference: String,
        /// Why the reference was rejected.
        reason: String,
    },

    /// Validation error.
    #[error("validation error: {message}")]
    Validation {
        /// Error message.
        message: String,
    },
}

impl ParseError {
    /// Creates a missing member error.
    pub fn missing(element: impl Into<String>, member: impl Into<String>) -> Self {
        Self::MissingMember {
            element: element.into(),
            member: member.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid(
        element: impl Into<String>,
        member: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            element: element.into(),
            member: member.into(),
            value: value.into(),
        }
    }
}

impl SchemaError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

//! Error types for decode and encode operations.

use rxlog_core::{Format, FormatFamily};
use rxlog_schema::SchemaError;
use std::fmt;
use thiserror::Error;

/// Key used to look a message definition up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKey {
    /// Numeric message ID from a binary or JSON header.
    Id(u16),
    /// Message name from a text header.
    Name(String),
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// Error type for codec operations.
///
/// Every field-level failure aborts the call. Variants that concern a
/// single field carry its path (e.g. `obs[3].psr`) and the byte offset in
/// the input where the problem was found.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No definition is registered for the message.
    #[error("unknown message {key}")]
    UnknownMessageId {
        /// ID or name that failed to resolve.
        key: MessageKey,
    },

    /// The message database rejected the request.
    #[error("schema error: {0}")]
    Schema(SchemaError),

    /// Sync pattern, sentinel, declared length or header field is invalid.
    #[error("malformed header at offset {offset}: {reason}")]
    MalformedHeader {
        /// Byte offset where parsing stopped.
        offset: usize,
        /// What was wrong.
        reason: String,
    },

    /// Trailer CRC does not match the recomputed CRC.
    #[error("crc mismatch: expected {expected:08x}, computed {computed:08x}")]
    CrcMismatch {
        /// CRC carried by the input.
        expected: u32,
        /// CRC computed over the covered bytes.
        computed: u32,
    },

    /// A field value could not be converted to or from its declared type.
    #[error("field '{field}' at offset {offset}: {reason}")]
    FieldConversion {
        /// Field path, e.g. `obs[3].psr`.
        field: String,
        /// Byte offset in the input, or in the output when encoding.
        offset: usize,
        /// What was wrong.
        reason: String,
    },

    /// Input ended before the definition was satisfied.
    #[error("buffer too short: required {required} bytes, available {available} bytes")]
    BufferTooShort {
        /// Required length in bytes.
        required: usize,
        /// Available length in bytes.
        available: usize,
    },

    /// The requested format cannot handle the input's sync pattern.
    #[error("format {requested} cannot decode input with {found:?} sync")]
    UnsupportedFormatCombination {
        /// Format asked for by the caller.
        requested: Format,
        /// Family detected from the input.
        found: FormatFamily,
    },
}

impl CodecError {
    /// Creates a field conversion error.
    ///
    /// # Arguments
    /// * `field` - Field name or path
    /// * `offset` - Byte offset of the offending value
    /// * `reason` - Description of the problem
    pub fn field(field: impl Into<String>, offset: usize, reason: impl Into<String>) -> Self {
        Self::FieldConversion {
            field: field.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a malformed header error.
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Prefixes the field path with the name of an enclosing field.
    #[must_use]
    pub fn nest(self, name: &str) -> Self {
        match self {
            Self::FieldConversion {
                field,
                offset,
                reason,
            } => {
                let field = if field.is_empty() {
                    name.to_string()
                } else if field.starts_with('[') {
                    format!("{name}{field}")
                } else {
                    format!("{name}.{field}")
                };
                Self::FieldConversion {
                    field,
                    offset,
                    reason,
                }
            }
            other => other,
        }
    }

    /// Prefixes the field path with an array index.
    #[must_use]
    pub fn nest_index(self, index: usize) -> Self {
        match self {
            Self::FieldConversion {
                field,
                offset,
                reason,
            } => {
                let field = if field.is_empty() || field.starts_with('[') {
                    format!("[{index}]{field}")
                } else {
                    format!("[{index}].{field}")
                };
                Self::FieldConversion {
                    field,
                    offset,
                    reason,
                }
            }
            other => other,
        }
    }

    /// Shifts the offsets carried by the error by `base` bytes.
    ///
    /// Used when a sub-slice was decoded on its own.
    #[must_use]
    pub fn offset_by(self, base: usize) -> Self {
        match self {
            Self::FieldConversion {
                field,
                offset,
                reason,
            } => Self::FieldConversion {
                field,
                offset: offset + base,
                reason,
            },
            Self::MalformedHeader { offset, reason } => Self::MalformedHeader {
                offset: offset + base,
                reason,
            },
            Self::BufferTooShort {
                required,
                available,
            } => Self::BufferTooShort {
                required: required + base,
                available: available + base,
            },
            other => other,
        }
    }
}

impl From<SchemaError> for CodecError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::UnknownMessageId { id } => Self::UnknownMessageId {
                key: MessageKey::Id(id),
            },
            other => Self::Schema(other),
        }
    }
}

impl From<rxlog_core::Error> for CodecError {
    fn from(err: rxlog_core::Error) -> Self {
        match err {
            rxlog_core::Error::BufferTooShort {
                required,
                available,
            } => Self::BufferTooShort {
                required,
                available,
            },
            rxlog_core::Error::MalformedHeader { offset, reason } => {
                Self::MalformedHeader { offset, reason }
            }
            rxlog_core::Error::CrcMismatch { expected, computed } => {
                Self::CrcMismatch { expected, computed }
            }
        }
    }
}

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_field_path() {
        let err = CodecError::field("psr", 40, "not a number")
            .nest_index(3)
            .nest("obs");
        match err {
            CodecError::FieldConversion { field, offset, .. } => {
                assert_eq!(field, "obs[3].psr");
                assert_eq!(offset, 40);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = CodecError::field("", 0, "bad").nest_index(1).nest("vals");
        assert!(err.to_string().starts_with("field 'vals[1]'"));
    }

    #[test]
    fn test_nest_leaves_other_kinds() {
        let err = CodecError::CrcMismatch {
            expected: 1,
            computed: 2,
        }
        .nest("x");
        assert!(matches!(err, CodecError::CrcMismatch { .. }));
    }

    #[test]
    fn test_from_schema_error() {
        let err: CodecError = SchemaError::UnknownMessageId { id: 42 }.into();
        assert!(matches!(
            err,
            CodecError::UnknownMessageId {
                key: MessageKey::Id(42)
            }
        ));
        assert_eq!(err.to_string(), "unknown message id 42");

        let err: CodecError = SchemaError::validation("bad").into();
        assert!(matches!(err, CodecError::Schema(_)));
    }

    #[test]
    fn test_from_core_error() {
        let err: CodecError = rxlog_core::Error::malformed(2, "bad sync").into();
        assert!(matches!(err, CodecError::MalformedHeader { offset: 2, .. }));

        let err = CodecError::from(rxlog_core::Error::BufferTooShort {
            required: 8,
            available: 4,
        })
        .offset_by(28);
        assert!(matches!(
            err,
            CodecError::BufferTooShort {
                required: 36,
                available: 32
            }
        ));
    }

    #[test]
    fn test_unsupported_combination_display() {
        let err = CodecError::UnsupportedFormatCombination {
            requested: Format::Json,
            found: FormatFamily::Binary,
        };
        assert_eq!(err.to_string(), "format JSON cannot decode input with Binary sync");
    }
}

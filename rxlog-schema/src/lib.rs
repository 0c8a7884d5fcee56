//! # rxlog schema
//!
//! Message definition database for receiver logs.
//!
//! This crate provides:
//! - JSON schema document parsing
//! - Validation of identifiers, references and field layouts
//! - Resolution into linked, immutable message and enum definitions
//! - [`MessageDatabase`], the shared lookup used by every codec path

pub mod database;
pub mod error;
pub mod messages;
pub mod parser;
pub mod resolve;
pub mod types;
pub mod validation;

pub use database::MessageDatabase;
pub use error::{ParseError, SchemaError};
pub use messages::{ArrayLength, EnumDef, Enumerator, FieldDef, FieldKind, MessageDef};
pub use parser::{SchemaDocument, parse_schema};
pub use resolve::COUNT_PREFIX_SIZE;
pub use types::{CompressionScheme, Conversion, ConversionSpec, DataType};

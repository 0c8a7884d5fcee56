//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and traits.
//!
//! ```
//! use rxlog::prelude::*;
//! ```

// Core types
pub use rxlog_core::error::{Error as CoreError, Result as CoreResult};
pub use rxlog_core::{Format, FormatFamily, LogHeader, TimeStatus, crc32};

// Schema types
pub use rxlog_schema::{EnumDef, FieldDef, FieldKind, MessageDatabase, MessageDef, SchemaError};

// Codec types
pub use rxlog_codec::{
    BatchSize, Codec, CodecBuilder, CodecConfig, CodecError, CrcPolicy, FieldValue,
    GenericMessage, RangeCompressor, RangeDecompressor, RangeObservation, ReferenceStore, SatelliteId,
};

//! # rxlog codec
//!
//! Schema-driven encoding and decoding of receiver logs.
//!
//! This crate provides:
//! - [`GenericMessage`], a dynamically typed log whose fields follow its definition
//! - Decoders and encoders for binary, flattened binary, ASCII, abbreviated ASCII and JSON
//! - [`Codec`], which sniffs formats and dispatches over a shared database
//! - Lazy range decompression with selectable batch sizes
//! - [`CodecConfig`] for CRC strictness and size limits

pub mod abbrev;
pub mod ascii;
pub mod binary;
pub mod codec;
pub mod config;
pub mod error;
pub mod flattened;
mod header;
pub mod json;
pub mod message;
pub mod rangecmp;
mod text;
mod walk;

pub use codec::{Codec, CodecBuilder};
pub use config::{CodecConfig, CrcPolicy};
pub use error::{CodecError, MessageKey, Result};
pub use header::PORT_ENUM;
pub use message::{FieldValue, GenericMessage, SatelliteId};
pub use rangecmp::{
    BatchSize, RangeCompressor, RangeDecompressor, RangeObservation, ReferenceStore, carrier_wavelength,
};
pub use rxlog_core::{Format, FormatFamily, LogHeader, TimeStatus};

//! # rxlog
//!
//! Schema-driven codec for GNSS receiver logs.
//!
//! Every log is described by a message definition loaded from a JSON schema
//! document. One [`GenericMessage`] model is decoded from and encoded to five
//! wire formats, so any log can be transcoded between them.
//!
//! ## Features
//!
//! - **Five wire formats** - Binary, flattened binary, ASCII, abbreviated ASCII and JSON
//! - **Format sniffing** - Detect the format family from the leading sync pattern
//! - **CRC-32 trailers** - Verified on decode, stamped on encode, with a configurable policy
//! - **Range decompression** - Lazy unpacking of compressed observation blocks in batches
//!
//! ## Quick Start
//!
//! ```
//! use rxlog::prelude::*;
//! use std::sync::Arc;
//!
//! let db = MessageDatabase::from_json(
//!     r#"{"messages":[{"name":"PING","messageID":7,"fields":[
//!         {"name":"count","type":"SIMPLE","dataType":{"name":"ULONG"}}
//!     ]}]}"#,
//! )?;
//! let codec = Codec::new(Arc::new(db));
//!
//! let msg = GenericMessage::new(LogHeader::new(7), vec![FieldValue::UInt(3)]);
//! let line = codec.encode(&msg, Format::Ascii)?;
//! assert!(line.starts_with(b"#PINGA,"));
//!
//! let (format, decoded) = codec.decode_auto(&line)?;
//! assert_eq!(format, Format::Ascii);
//! assert_eq!(decoded, msg);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`] - Byte buffers, CRC-32, log header and format tags
//! - [`schema`] - Message definition database
//! - [`codec`] - Generic messages, format decoders and encoders, range decompression

pub mod prelude;

/// Byte buffers, CRC-32, log header and format tags.
pub mod core {
    pub use rxlog_core::*;
}

/// Message definition database.
pub mod schema {
    pub use rxlog_schema::*;
}

/// Generic messages, format decoders and encoders, range decompression.
pub mod codec {
    pub use rxlog_codec::*;
}

// Re-export commonly used items at the crate root
pub use rxlog_codec::{
    Codec, CodecBuilder, CodecConfig, CodecError, CrcPolicy, FieldValue, GenericMessage,
    SatelliteId,
};
pub use rxlog_core::{Format, FormatFamily, LogHeader, TimeStatus, crc32};
pub use rxlog_schema::MessageDatabase;

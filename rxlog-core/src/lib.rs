//! # rxlog core
//!
//! Core types shared by every receiver log codec path.
//!
//! This crate provides:
//! - Buffer traits for fixed-offset little-endian access and a bounds-checked reader
//! - The table-driven CRC-32 used to stamp and verify log trailers
//! - The fixed-layout log header record and the full and short binary header layouts
//! - The closed set of wire formats and format sniffing
//! - Error types for buffer, header and checksum failures

pub mod buffer;
pub mod crc;
pub mod error;
pub mod header;
pub mod types;

pub use buffer::{ByteReader, ReadBuffer, WriteBuffer};
pub use crc::{Crc32, crc32};
pub use error::{Error, Result};
pub use header::{BinaryHeader, HeaderKind, LogHeader, MessageType};
pub use types::{Format, FormatFamily, TimeStatus};

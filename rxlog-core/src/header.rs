//! Log header types.
//!
//! This module provides:
//! - [`LogHeader`] - format-independent header record shared by every codec
//! - [`HeaderKind`] - full or short header layout
//! - [`MessageType`] - the packed message type byte of the binary header
//! - [`BinaryHeader`] - the 28-byte and 12-byte binary header wire layouts

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{Error, Result};
use crate::types::{BINARY_SYNC, SHORT_BINARY_SYNC, TimeStatus};

/// Header layout of a log.
///
/// A short header carries the message, the GPS week and the time of week.
/// Text and JSON short headers also carry the measurement source. Encoding
/// a short header drops every other field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeaderKind {
    /// Every header field.
    #[default]
    Full,
    /// Message, week and time of week only.
    Short,
}

/// Format-independent log header.
///
/// Every decoder produces one and every encoder consumes one. The wire
/// format is not stored here; it is chosen by the encode target.
/// [`kind`](Self::kind) records whether the full or short layout is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogHeader {
    /// Full or short header layout.
    pub kind: HeaderKind,
    /// Message identifier, the schema lookup key.
    pub message_id: u16,
    /// Antenna or measurement source (0 = primary).
    pub measurement_source: u8,
    /// True when the log is a command response.
    pub response: bool,
    /// Receiver port the log was generated on.
    pub port: u8,
    /// Remaining logs of the same ID in this epoch.
    pub sequence: u16,
    /// Processor idle time in half-percent units.
    pub idle_time: u8,
    /// Raw time status byte, see [`TimeStatus`].
    pub time_status: u8,
    /// GPS reference week.
    pub week: u16,
    /// Milliseconds into the GPS week.
    pub milliseconds: u32,
    /// Receiver status word.
    pub receiver_status: u32,
    /// CRC of the message definition the log was produced against.
    pub message_definition_crc: u16,
    /// Receiver software build number.
    pub receiver_sw_version: u16,
}

impl LogHeader {
    /// Creates a header for the given message ID with every other field zeroed.
    #[must_use]
    pub fn new(message_id: u16) -> Self {
        Self {
            message_id,
            time_status: TimeStatus::Unknown as u8,
            ..Self::default()
        }
    }

    /// Sets the reference time.
    #[must_use]
    pub fn with_time(mut self, week: u16, milliseconds: u32) -> Self {
        self.week = week;
        self.milliseconds = milliseconds;
        self
    }

    /// Sets the time status.
    #[must_use]
    pub fn with_time_status(mut self, status: TimeStatus) -> Self {
        self.time_status = status as u8;
        self
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u8) -> Self {
        self.port = port;
        self
    }

    /// Sets the header layout.
    #[must_use]
    pub fn with_kind(mut self, kind: HeaderKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns true for a short header.
    #[must_use]
    pub fn is_short(&self) -> bool {
        self.kind == HeaderKind::Short
    }

    /// Returns idle time as a percentage.
    #[must_use]
    pub fn idle_percent(&self) -> f64 {
        f64::from(self.idle_time) * 0.5
    }

    /// Sets idle time from a percentage, rounding to the half-percent unit.
    pub fn set_idle_percent(&mut self, percent: f64) {
        self.idle_time = (percent * 2.0).round().clamp(0.0, 255.0) as u8;
    }

    /// Returns the time of week in seconds.
    #[must_use]
    pub fn seconds(&self) -> f64 {
        f64::from(self.milliseconds) / 1000.0
    }

    /// Sets the time of week from seconds, rounding to milliseconds.
    pub fn set_seconds(&mut self, seconds: f64) {
        self.milliseconds = (seconds * 1000.0).round().clamp(0.0, f64::from(u32::MAX)) as u32;
    }

    /// Returns the time status if the raw byte is a known value.
    #[must_use]
    pub fn time_status(&self) -> Option<TimeStatus> {
        TimeStatus::from_u8(self.time_status)
    }
}

/// Packed message type byte of the binary header.
///
/// # Bit Layout
/// ```text
/// bits 0-4: measurement source
/// bits 5-6: format (0 binary, 1 ascii, 2 abbreviated ascii, 3 nmea)
/// bit  7  : response flag
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageType {
    /// Measurement source, 5 bits.
    pub measurement_source: u8,
    /// Format bits, 2 bits.
    pub format: u8,
    /// Response flag.
    pub response: bool,
}

impl MessageType {
    const SOURCE_MASK: u8 = 0x1F;
    const FORMAT_SHIFT: u8 = 5;
    const FORMAT_MASK: u8 = 0x03;
    const RESPONSE_BIT: u8 = 0x80;

    /// Unpacks the raw byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            measurement_source: byte & Self::SOURCE_MASK,
            format: (byte >> Self::FORMAT_SHIFT) & Self::FORMAT_MASK,
            response: byte & Self::RESPONSE_BIT != 0,
        }
    }

    /// Packs into the raw byte. Out-of-range sources are masked.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        let mut byte = (self.measurement_source & Self::SOURCE_MASK)
            | ((self.format & Self::FORMAT_MASK) << Self::FORMAT_SHIFT);
        if self.response {
            byte |= Self::RESPONSE_BIT;
        }
        byte
    }
}

/// Binary log header (28 bytes).
///
/// # Wire Format
/// ```text
/// +0:  sync               (3 bytes, AA 44 12)
/// +3:  header length      (u8)
/// +4:  message id         (u16)
/// +6:  message type       (u8)
/// +7:  port address       (u8)
/// +8:  message length     (u16, body only)
/// +10: sequence           (u16)
/// +12: idle time          (u8, half-percent)
/// +13: time status        (u8)
/// +14: week               (u16)
/// +16: milliseconds       (u32)
/// +20: receiver status    (u32)
/// +24: msg definition crc (u16)
/// +26: receiver sw version(u16)
/// ```
///
/// The short layout (12 bytes) has no header length byte; its body length
/// is one byte:
/// ```text
/// +0:  sync               (3 bytes, AA 44 13)
/// +3:  message length     (u8, body only)
/// +4:  message id         (u16)
/// +6:  week               (u16)
/// +8:  milliseconds       (u32)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinaryHeader {
    /// Declared header length; bytes past 28 are skipped. Always 12 for a
    /// short header.
    pub header_length: u8,
    /// Packed message type byte.
    pub message_type: MessageType,
    /// Declared body length in bytes.
    pub body_length: u16,
    /// Remaining header fields.
    pub log: LogHeader,
}

impl BinaryHeader {
    /// Encoded length of the header in bytes.
    pub const ENCODED_LENGTH: usize = 28;

    /// Encoded length of the short header in bytes.
    pub const SHORT_ENCODED_LENGTH: usize = 12;

    /// Largest body a short header can declare.
    pub const SHORT_MAX_BODY: usize = u8::MAX as usize;

    /// Length of the CRC trailer that follows the body.
    pub const CRC_LENGTH: usize = 4;

    /// Returns the encoded header length for a header layout.
    #[must_use]
    pub const fn encoded_length(kind: HeaderKind) -> usize {
        match kind {
            HeaderKind::Full => Self::ENCODED_LENGTH,
            HeaderKind::Short => Self::SHORT_ENCODED_LENGTH,
        }
    }

    /// Builds a binary header around a log header.
    ///
    /// # Arguments
    /// * `log` - Header fields; `log.kind` picks the layout
    /// * `body_length` - Body length in bytes
    #[must_use]
    pub fn new(log: LogHeader, body_length: u16) -> Self {
        Self {
            header_length: Self::encoded_length(log.kind) as u8,
            message_type: MessageType {
                measurement_source: log.measurement_source,
                format: 0,
                response: log.response,
            },
            body_length,
            log,
        }
    }

    /// Wraps a buffer and decodes the header at the given offset.
    ///
    /// # Panics
    /// Panics if fewer than 28 bytes follow `offset`. Use [`BinaryHeader::parse`]
    /// for untrusted input.
    #[inline]
    #[must_use]
    pub fn wrap<B: ReadBuffer + ?Sized>(buffer: &B, offset: usize) -> Self {
        let message_type = MessageType::from_byte(buffer.get_u8(offset + 6));
        Self {
            header_length: buffer.get_u8(offset + 3),
            message_type,
            body_length: buffer.get_u16_le(offset + 8),
            log: LogHeader {
                kind: HeaderKind::Full,
                message_id: buffer.get_u16_le(offset + 4),
                measurement_source: message_type.measurement_source,
                response: message_type.response,
                port: buffer.get_u8(offset + 7),
                sequence: buffer.get_u16_le(offset + 10),
                idle_time: buffer.get_u8(offset + 12),
                time_status: buffer.get_u8(offset + 13),
                week: buffer.get_u16_le(offset + 14),
                milliseconds: buffer.get_u32_le(offset + 16),
                receiver_status: buffer.get_u32_le(offset + 20),
                message_definition_crc: buffer.get_u16_le(offset + 24),
                receiver_sw_version: buffer.get_u16_le(offset + 26),
            },
        }
    }

    /// Wraps a buffer and decodes a short header at the given offset.
    ///
    /// # Panics
    /// Panics if fewer than 12 bytes follow `offset`.
    #[inline]
    #[must_use]
    pub fn wrap_short<B: ReadBuffer + ?Sized>(buffer: &B, offset: usize) -> Self {
        let log = LogHeader::new(buffer.get_u16_le(offset + 4))
            .with_time(buffer.get_u16_le(offset + 6), buffer.get_u32_le(offset + 8))
            .with_kind(HeaderKind::Short);
        Self {
            header_length: Self::SHORT_ENCODED_LENGTH as u8,
            message_type: MessageType::default(),
            body_length: u16::from(buffer.get_u8(offset + 3)),
            log,
        }
    }

    /// Encodes the header into the buffer at the given offset.
    ///
    /// Writes the 28-byte layout with a header length of 28, or the 12-byte
    /// layout for a short header. A short body length is truncated to one
    /// byte; callers check it against [`Self::SHORT_MAX_BODY`].
    #[inline]
    pub fn encode<B: WriteBuffer + ?Sized>(&self, buffer: &mut B, offset: usize) {
        if self.log.is_short() {
            buffer.put_bytes(offset, &SHORT_BINARY_SYNC);
            buffer.put_u8(offset + 3, self.body_length as u8);
            buffer.put_u16_le(offset + 4, self.log.message_id);
            buffer.put_u16_le(offset + 6, self.log.week);
            buffer.put_u32_le(offset + 8, self.log.milliseconds);
            return;
        }
        buffer.put_bytes(offset, &BINARY_SYNC);
        buffer.put_u8(offset + 3, Self::ENCODED_LENGTH as u8);
        buffer.put_u16_le(offset + 4, self.log.message_id);
        buffer.put_u8(offset + 6, self.message_type.to_byte());
        buffer.put_u8(offset + 7, self.log.port);
        buffer.put_u16_le(offset + 8, self.body_length);
        buffer.put_u16_le(offset + 10, self.log.sequence);
        buffer.put_u8(offset + 12, self.log.idle_time);
        buffer.put_u8(offset + 13, self.log.time_status);
        buffer.put_u16_le(offset + 14, self.log.week);
        buffer.put_u32_le(offset + 16, self.log.milliseconds);
        buffer.put_u32_le(offset + 20, self.log.receiver_status);
        buffer.put_u16_le(offset + 24, self.log.message_definition_crc);
        buffer.put_u16_le(offset + 26, self.log.receiver_sw_version);
    }

    /// Validates and decodes the full or short header at the start of
    /// `bytes`.
    ///
    /// # Errors
    /// - [`Error::BufferTooShort`] if fewer than 28 bytes (12 for a short
    ///   header, or the declared header length) are available
    /// - [`Error::MalformedHeader`] on a bad sync or a declared header
    ///   length below 28
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() >= SHORT_BINARY_SYNC.len() && bytes[..SHORT_BINARY_SYNC.len()] == SHORT_BINARY_SYNC {
            if bytes.len() < Self::SHORT_ENCODED_LENGTH {
                return Err(Error::BufferTooShort {
                    required: Self::SHORT_ENCODED_LENGTH,
                    available: bytes.len(),
                });
            }
            return Ok(Self::wrap_short(bytes, 0));
        }
        if bytes.len() < Self::ENCODED_LENGTH {
            return Err(Error::BufferTooShort {
                required: Self::ENCODED_LENGTH,
                available: bytes.len(),
            });
        }
        if bytes[..BINARY_SYNC.len()] != BINARY_SYNC {
            return Err(Error::malformed(0, "missing binary sync bytes"));
        }
        let header = Self::wrap(bytes, 0);
        if usize::from(header.header_length) < Self::ENCODED_LENGTH {
            return Err(Error::malformed(
                3,
                format!("header length {} is below 28", header.header_length),
            ));
        }
        if usize::from(header.header_length) > bytes.len() {
            return Err(Error::BufferTooShort {
                required: usize::from(header.header_length),
                available: bytes.len(),
            });
        }
        Ok(header)
    }

    /// Returns the total frame length: header, body and CRC trailer.
    #[must_use]
    pub const fn frame_length(&self) -> usize {
        self.header_length as usize + self.body_length as usize + Self::CRC_LENGTH
    }
}

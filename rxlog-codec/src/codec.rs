//! Format dispatch over a shared message database.

use crate::config::{CodecConfig, CrcPolicy};
use crate::error::{CodecError, Result};
use crate::message::GenericMessage;
use crate::rangecmp::RangeDecompressor;
use crate::{abbrev, ascii, binary, flattened, json, walk};
use bytes::{Bytes, BytesMut};
use rxlog_core::{Format, FormatFamily};
use rxlog_schema::{FieldKind, MessageDatabase, MessageDef};
use std::sync::Arc;

/// Builder for configuring and creating a [`Codec`].
#[derive(Debug, Clone)]
pub struct CodecBuilder {
    db: Arc<MessageDatabase>,
    config: CodecConfig,
}

impl CodecBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new(db: Arc<MessageDatabase>) -> Self {
        Self {
            db,
            config: CodecConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: CodecConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the CRC policy.
    #[must_use]
    pub fn crc_policy(mut self, policy: CrcPolicy) -> Self {
        self.config.crc_policy = policy;
        self
    }

    /// Requires text logs to end in `\r\n`.
    #[must_use]
    pub fn require_line_terminator(mut self, required: bool) -> Self {
        self.config.require_line_terminator = required;
        self
    }

    /// Sets the largest accepted or produced binary frame.
    #[must_use]
    pub fn max_message_length(mut self, len: usize) -> Self {
        self.config.max_message_length = len;
        self
    }

    /// Builds the codec.
    #[must_use]
    pub fn build(self) -> Codec {
        Codec {
            db: self.db,
            config: self.config,
        }
    }
}

/// Decodes and encodes logs in every supported format.
///
/// A codec is immutable after construction and can be shared across
/// threads; clones share the database.
#[derive(Debug, Clone)]
pub struct Codec {
    db: Arc<MessageDatabase>,
    config: CodecConfig,
}

impl Codec {
    /// Creates a codec with the default configuration.
    #[must_use]
    pub fn new(db: Arc<MessageDatabase>) -> Self {
        CodecBuilder::new(db).build()
    }

    /// Returns a builder over `db`.
    #[must_use]
    pub fn builder(db: Arc<MessageDatabase>) -> CodecBuilder {
        CodecBuilder::new(db)
    }

    /// Returns the message database.
    #[must_use]
    pub fn database(&self) -> &Arc<MessageDatabase> {
        &self.db
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Returns the definition of a message ID.
    ///
    /// # Errors
    /// Returns `UnknownMessageId` if the ID is not registered.
    pub fn definition(&self, id: u16) -> Result<&Arc<MessageDef>> {
        Ok(self.db.lookup(id)?)
    }

    /// Decodes `input` as `format`.
    ///
    /// The input's sync pattern must belong to the format's family.
    ///
    /// # Errors
    /// - `UnsupportedFormatCombination` if the sync belongs to another family
    /// - any error of the format's decoder
    pub fn decode(&self, input: &[u8], format: Format) -> Result<GenericMessage> {
        let found = Format::sniff(input)?;
        if found != format.family() {
            return Err(CodecError::UnsupportedFormatCombination {
                requested: format,
                found,
            });
        }
        let msg = match format {
            Format::Binary => binary::decode(&self.db, &self.config, input),
            Format::FlattenedBinary => flattened::decode(&self.db, &self.config, input),
            Format::Ascii => ascii::decode(&self.db, &self.config, input),
            Format::AbbreviatedAscii => abbrev::decode(&self.db, &self.config, input),
            Format::Json => json::decode(&self.db, &self.config, input),
        }?;
        tracing::trace!(
            id = msg.message_id(),
            format = %format,
            len = input.len(),
            "decoded message"
        );
        Ok(msg)
    }

    /// Sniffs the format of `input` and decodes it.
    ///
    /// Binary input decodes as [`Format::Binary`]; flattened binary has to
    /// be requested through [`Codec::decode`].
    ///
    /// # Errors
    /// - `MalformedHeader` or `BufferTooShort` if no sync pattern matches
    /// - any error of the detected format's decoder
    pub fn decode_auto(&self, input: &[u8]) -> Result<(Format, GenericMessage)> {
        let format = match Format::sniff(input)? {
            FormatFamily::Binary => Format::Binary,
            FormatFamily::Ascii => Format::Ascii,
            FormatFamily::AbbreviatedAscii => Format::AbbreviatedAscii,
            FormatFamily::Json => Format::Json,
        };
        Ok((format, self.decode(input, format)?))
    }

    /// Encodes `msg` as `format` into a new buffer.
    ///
    /// # Errors
    /// See [`Codec::encode_into`].
    pub fn encode(&self, msg: &GenericMessage, format: Format) -> Result<Bytes> {
        let mut out = BytesMut::new();
        self.encode_into(msg, format, &mut out)?;
        Ok(out.freeze())
    }

    /// Encodes `msg` as `format`, appending to `out`.
    ///
    /// Returns the number of bytes written. On error `out` is left as it
    /// was.
    ///
    /// # Errors
    /// - `UnknownMessageId` if the header's ID has no definition
    /// - `FieldConversion` if a value does not fit its field
    /// - `MalformedHeader` if a binary frame exceeds the configured maximum
    pub fn encode_into(&self, msg: &GenericMessage, format: Format, out: &mut BytesMut) -> Result<usize> {
        let start = out.len();
        let written = match format {
            Format::Binary => binary::encode(&self.db, msg, out),
            Format::FlattenedBinary => flattened::encode(&self.db, msg, out),
            Format::Json => json::encode(&self.db, msg, out),
            Format::Ascii | Format::AbbreviatedAscii => {
                let mut line = String::new();
                let written = if format == Format::Ascii {
                    ascii::encode(&self.db, msg, &mut line)
                } else {
                    abbrev::encode(&self.db, msg, &mut line)
                }?;
                out.extend_from_slice(line.as_bytes());
                Ok(written)
            }
        };
        let written = written.and_then(|written| {
            if format.family() == FormatFamily::Binary {
                self.config.check_length(written)?;
            }
            Ok(written)
        });
        match written {
            Ok(written) => {
                tracing::trace!(id = msg.message_id(), format = %format, len = written, "encoded message");
                Ok(written)
            }
            Err(err) => {
                out.truncate(start);
                Err(err)
            }
        }
    }

    /// Decodes `input` as `from` and re-encodes it as `to`.
    ///
    /// # Errors
    /// Any error of [`Codec::decode`] or [`Codec::encode`].
    pub fn transcode(&self, input: &[u8], from: Format, to: Format) -> Result<Bytes> {
        let msg = self.decode(input, from)?;
        self.encode(&msg, to)
    }

    /// Returns a lazy decompressor over a compressed top-level field.
    ///
    /// # Errors
    /// - `UnknownMessageId` if the header's ID has no definition
    /// - `FieldConversion` if the field is missing, not compressed or holds
    ///   no byte block
    pub fn decompress_field<'a>(&'a self, msg: &'a GenericMessage, name: &str) -> Result<RangeDecompressor<'a>> {
        let def = self.db.lookup(msg.header.message_id)?;
        let index = def
            .field_index(name)
            .ok_or_else(|| CodecError::field(name, 0, "no such field"))?;
        let field = &def.fields[index];
        let FieldKind::Compressed { scheme, scale, .. } = &field.kind else {
            return Err(CodecError::field(name, 0, "field is not compressed"));
        };
        let value = msg
            .fields
            .get(index)
            .ok_or_else(|| CodecError::field(name, 0, "message has no value for the field"))?;
        let block = walk::bytes(value, 0).map_err(|e| e.nest(name))?;
        Ok(RangeDecompressor::new(block, *scheme, *scale).with_field(&field.name))
    }
}

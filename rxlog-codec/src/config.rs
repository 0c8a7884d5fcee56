//! Codec configuration.

use crate::error::{CodecError, Result};
use rxlog_core::BinaryHeader;
use serde::{Deserialize, Serialize};

/// What to do when a trailer CRC does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrcPolicy {
    /// Fail the decode with `CrcMismatch`.
    #[default]
    Strict,
    /// Log a warning and keep decoding.
    Warn,
}

/// Options shared by every decode and encode call.
///
/// # Example
/// ```
/// use rxlog_codec::{CodecConfig, CrcPolicy};
///
/// let config: CodecConfig = serde_json::from_str(r#"{"crc_policy": "warn"}"#).unwrap();
/// assert_eq!(config.crc_policy, CrcPolicy::Warn);
/// assert!(!config.require_line_terminator);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// CRC strictness.
    pub crc_policy: CrcPolicy,
    /// Require text formats to end in `\r\n`.
    pub require_line_terminator: bool,
    /// Largest binary or flattened binary frame in bytes. Text and JSON
    /// logs are not bound by it.
    pub max_message_length: usize,
}

impl CodecConfig {
    /// Default maximum message length: the binary body length range plus
    /// header and CRC trailer.
    pub const DEFAULT_MAX_MESSAGE_LENGTH: usize =
        u16::MAX as usize + BinaryHeader::ENCODED_LENGTH + BinaryHeader::CRC_LENGTH;

    /// Applies the CRC policy to a trailer comparison.
    ///
    /// # Errors
    /// Returns `CodecError::CrcMismatch` under [`CrcPolicy::Strict`] when the
    /// values differ.
    pub fn check_crc(&self, expected: u32, computed: u32) -> Result<()> {
        if expected == computed {
            return Ok(());
        }
        match self.crc_policy {
            CrcPolicy::Strict => Err(CodecError::CrcMismatch { expected, computed }),
            CrcPolicy::Warn => {
                tracing::warn!(
                    expected = format_args!("{expected:08x}"),
                    computed = format_args!("{computed:08x}"),
                    "crc mismatch tolerated"
                );
                Ok(())
            }
        }
    }

    /// Checks a binary frame length against `max_message_length`.
    ///
    /// # Errors
    /// Returns `CodecError::MalformedHeader` if the frame is longer.
    pub fn check_length(&self, len: usize) -> Result<()> {
        if len > self.max_message_length {
            return Err(CodecError::malformed(
                self.max_message_length,
                format!(
                    "message of {len} bytes exceeds the {} byte limit",
                    self.max_message_length
                ),
            ));
        }
        Ok(())
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            crc_policy: CrcPolicy::Strict,
            require_line_terminator: false,
            max_message_length: Self::DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

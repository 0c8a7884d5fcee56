//! Error types for rxlog core operations.

use thiserror::Error;

/// Core error type for buffer, header and checksum handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Buffer is too short for the requested operation.
    #[error("buffer too short: required {required} bytes, available {available} bytes")]
    BufferTooShort {
        /// Required buffer size in bytes.
        required: usize,
        /// Available buffer size in bytes.
        available: usize,
    },

    /// Log header could not be recognised or parsed.
    #[error("malformed header at offset {offset}: {reason}")]
    MalformedHeader {
        /// Byte offset where parsing stopped.
        offset: usize,
        /// What was wrong with the header.
        reason: String,
    },

    /// Checksum stored in the log does not match the computed one.
    #[error("crc mismatch: expected {expected:08x}, computed {computed:08x}")]
    CrcMismatch {
        /// CRC carried by the log.
        expected: u32,
        /// CRC computed over the covered bytes.
        computed: u32,
    },
}

impl Error {
    /// Creates a malformed header error.
    ///
    /// # Arguments
    /// * `offset` - Byte offset where parsing stopped
    /// * `reason` - Description of the problem
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            offset,
            reason: reason.into(),
        }
    }
}

/// Result type alias for rxlog core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BufferTooShort {
            required: 28,
            available: 10,
        };
        assert_eq!(
            err.to_string(),
            "buffer too short: required 28 bytes, available 10 bytes"
        );

        let err = Error::CrcMismatch {
            expected: 0x3989_c2ac,
            computed: 0x0000_00ff,
        };
        assert_eq!(err.to_string(), "crc mismatch: expected 3989c2ac, computed 000000ff");
    }

    #[test]
    fn test_malformed_helper() {
        let err = Error::malformed(3, "bad sync");
        assert_eq!(
            err,
            Error::MalformedHeader {
                offset: 3,
                reason: "bad sync".to_string()
            }
        );
    }
}

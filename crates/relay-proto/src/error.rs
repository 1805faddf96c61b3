//! Error types for the relay protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors produced while encoding or decoding relay protocol data.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The input ended before a complete value could be read.
    #[error("truncated frame: {needed} more bytes needed for {what}")]
    Truncated {
        /// What was being decoded.
        what: &'static str,
        /// How many additional bytes were required.
        needed: usize,
    },

    /// A 3-byte object type code that this implementation does not know.
    #[error("unknown object type {0:?}")]
    UnknownType([u8; 3]),

    /// A declared length field was out of range.
    #[error("invalid {what} length: {len}")]
    InvalidLength {
        /// What carried the length field.
        what: &'static str,
        /// The declared length.
        len: i64,
    },

    /// String payload was not valid UTF-8.
    #[error("invalid utf-8 in {0} payload")]
    InvalidUtf8(&'static str),

    /// A decimal-digit payload (`lon`/`tim`) did not parse as an integer.
    #[error("invalid number in {0} payload")]
    InvalidNumber(&'static str),

    /// A frame declared a total length beyond the configured limit.
    #[error("frame too large: {actual} bytes (limit: {limit})")]
    FrameTooLarge {
        /// Declared frame length.
        actual: usize,
        /// Maximum allowed frame length.
        limit: usize,
    },

    /// The compression flag was set; compressed bodies are not supported.
    #[error("unsupported compression flag: {0:#04x}")]
    UnsupportedCompression(u8),

    /// A command line opened a `(id)` section without closing it.
    #[error("unterminated message id")]
    UnterminatedId,

    /// A recognized command was missing required arguments.
    #[error("malformed {0} command")]
    MalformedCommand(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::Truncated {
            what: "str",
            needed: 4,
        };
        assert_eq!(
            err.to_string(),
            "truncated frame: 4 more bytes needed for str"
        );

        let err = ProtocolError::FrameTooLarge {
            actual: 1 << 30,
            limit: 1 << 24,
        };
        assert!(err.to_string().contains("frame too large"));
    }
}

//! WebCodecs error type.
//!
//! Every failure observable at the API boundary is a [`WebCodecsError`]
//! tagged with one of the DOMException-style kinds. The same type travels
//! both channels: synchronous `Result`s from the submitting call, and the
//! asynchronous error callback. A given failure uses exactly one of the two.

use crate::codec::CodecError;

/// Error kinds observable at the API boundary, named after their
/// DOMException counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed argument shape or value
    Type,
    /// Unsupported codec or configuration
    NotSupported,
    /// Wrong state (e.g., operating on a closed object)
    InvalidState,
    /// Invalid input data (e.g., a delta chunk with no reference)
    Data,
    /// Encoding or decoding operation failed
    Encoding,
    /// Out-of-range value
    Range,
    /// Operation was aborted
    Abort,
    /// Resource quota exhausted
    QuotaExceeded,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Type => "TypeError",
            ErrorKind::NotSupported => "NotSupportedError",
            ErrorKind::InvalidState => "InvalidStateError",
            ErrorKind::Data => "DataError",
            ErrorKind::Encoding => "EncodingError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Abort => "AbortError",
            ErrorKind::QuotaExceeded => "QuotaExceededError",
        }
    }
}

/// A WebCodecs failure: a kind plus a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {}", .kind.as_str(), .message)]
pub struct WebCodecsError {
    kind: ErrorKind,
    message: String,
}

impl WebCodecsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Helper to create a TypeError for malformed arguments.
pub fn type_error(message: impl Into<String>) -> WebCodecsError {
    WebCodecsError::new(ErrorKind::Type, message)
}

/// Helper to create a NotSupportedError for unsupported codecs/configs.
pub fn not_supported_error(message: impl Into<String>) -> WebCodecsError {
    WebCodecsError::new(ErrorKind::NotSupported, message)
}

/// Helper to create an InvalidStateError for closed objects or wrong state.
pub fn invalid_state_error(message: impl Into<String>) -> WebCodecsError {
    WebCodecsError::new(ErrorKind::InvalidState, message)
}

/// Helper to create a DataError for invalid input data.
pub fn data_error(message: impl Into<String>) -> WebCodecsError {
    WebCodecsError::new(ErrorKind::Data, message)
}

/// Helper to create an EncodingError for encode/decode failures.
pub fn encoding_error(message: impl Into<String>) -> WebCodecsError {
    WebCodecsError::new(ErrorKind::Encoding, message)
}

/// Helper to create a RangeError for out-of-range values.
pub fn range_error(message: impl Into<String>) -> WebCodecsError {
    WebCodecsError::new(ErrorKind::Range, message)
}

/// Helper to create an AbortError for aborted operations.
pub fn abort_error(message: impl Into<String>) -> WebCodecsError {
    WebCodecsError::new(ErrorKind::Abort, message)
}

/// Helper to create a QuotaExceededError for exhausted quotas.
pub fn quota_exceeded_error(message: impl Into<String>) -> WebCodecsError {
    WebCodecsError::new(ErrorKind::QuotaExceeded, message)
}

impl From<CodecError> for WebCodecsError {
    fn from(err: CodecError) -> Self {
        let kind = match &err {
            CodecError::EncoderNotFound(_)
            | CodecError::DecoderNotFound(_)
            | CodecError::UnsupportedPixelFormat(_)
            | CodecError::UnsupportedImage(_) => ErrorKind::NotSupported,
            CodecError::InvalidConfig(_) => ErrorKind::NotSupported,
            CodecError::NotConfigured | CodecError::InvalidState(_) => ErrorKind::InvalidState,
            CodecError::InvalidData(_) => ErrorKind::Data,
        };
        WebCodecsError::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_kind_name() {
        let err = data_error("first chunk must be a key chunk");
        assert_eq!(
            err.to_string(),
            "DataError: first chunk must be a key chunk"
        );
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn test_codec_error_mapping() {
        let err: WebCodecsError = CodecError::InvalidData("bad packet".into()).into();
        assert_eq!(err.kind(), ErrorKind::Data);
        let err: WebCodecsError =
            CodecError::EncoderNotFound(crate::codec::CodecId::Hevc).into();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }
}

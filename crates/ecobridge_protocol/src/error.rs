use thiserror::Error;

/// Error type for characteristic decoding and chunk assembly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed {record} payload: {reason}")]
    MalformedPayload {
        record: &'static str,
        reason: String,
    },

    #[error("{record} payload too short: need {needed} bytes, got {actual}")]
    TooShort {
        record: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("empty characteristic frame")]
    EmptyFrame,

    #[error("chunked transfer exceeded {limit} frames")]
    TooManyChunks { limit: usize },
}

impl CodecError {
    pub(crate) fn malformed(record: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            record,
            reason: reason.into(),
        }
    }

    /// True for the decode failures a caller should report as a malformed payload,
    /// false for framing faults in the chunked transfer itself.
    pub fn is_malformed_payload(&self) -> bool {
        matches!(self, Self::MalformedPayload { .. } | Self::TooShort { .. })
    }
}

pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::TooShort {
            record: "realtime state",
            needed: 21,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "realtime state payload too short: need 21 bytes, got 4"
        );

        let err = CodecError::malformed("sensor type", "unknown code 9");
        assert_eq!(err.to_string(), "malformed sensor type payload: unknown code 9");
        assert!(err.is_malformed_payload());

        assert!(!CodecError::EmptyFrame.is_malformed_payload());
        assert_eq!(
            CodecError::TooManyChunks { limit: 256 }.to_string(),
            "chunked transfer exceeded 256 frames"
        );
    }
}

//! Error types for the protocol layer.
//!
//! Two enums live here. [`DecodeError`] is what a single decompression
//! adapter reports; [`ProtocolError`] is what the frame codec and the
//! JSON codec report to their callers. A `DecodeError` converts into a
//! `ProtocolError` with `?`.

/// Errors produced by a [`Decompressor`](crate::Decompressor).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The compressed stream is corrupt or truncated.
    #[error("malformed compressed body: {0}")]
    Malformed(#[source] std::io::Error),

    /// The decompressed output would exceed the configured ceiling.
    ///
    /// A tiny frame can expand into gigabytes; the adapters stop reading
    /// once `limit` bytes have been produced.
    #[error("decompressed body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated messages.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The buffer does not hold a well-formed frame.
    ///
    /// Raised for truncated headers, a `header_len` that does not fit in
    /// `pack_len`, or a `pack_len` running past the end of the buffer.
    /// Frames after the broken one can't be located, so the whole receive
    /// event is rejected.
    #[error("malformed frame at offset {offset}: {reason}")]
    MalformedFrame { offset: usize, reason: &'static str },

    /// A compressed body failed to decompress.
    #[error(transparent)]
    Decompress(#[from] DecodeError),

    /// Compressed bodies nested deeper than the decoder allows.
    #[error("compressed frames nested deeper than {0} levels")]
    NestingTooDeep(usize),

    /// The message is invalid at the protocol level.
    ///
    /// Used for payloads that are well-formed bytes but violate protocol
    /// rules, e.g. an auth reply without a `code` field.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_converts_into_protocol_error() {
        let err: ProtocolError = DecodeError::TooLarge { limit: 16 }.into();
        assert!(matches!(err, ProtocolError::Decompress(_)));
        assert!(err.to_string().contains("16 bytes"));
    }

    #[test]
    fn test_malformed_frame_message_names_offset() {
        let err = ProtocolError::MalformedFrame {
            offset: 32,
            reason: "truncated header",
        };
        assert_eq!(
            err.to_string(),
            "malformed frame at offset 32: truncated header"
        );
    }
}

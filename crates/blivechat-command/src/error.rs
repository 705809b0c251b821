//! Error types for the normalizer.

/// Why a business payload could not be turned into a chat message.
///
/// These never leave the normalizer: [`CommandTable`](crate::CommandTable)
/// logs them and drops the offending command, so one odd payload can't
/// take a healthy stream down.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// A required field or array slot is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field is present but holds the wrong JSON type.
    #[error("field `{field}` is not {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    /// A numeric code falls outside its enum.
    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: i64 },

    /// A payload did not match the expected object shape.
    #[error("unexpected payload shape: {0}")]
    Shape(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_type_message() {
        let err = NormalizeError::WrongType {
            field: "info[1]",
            expected: "a string",
        };
        assert_eq!(err.to_string(), "field `info[1]` is not a string");
    }

    #[test]
    fn test_serde_error_converts() {
        let serde_err = serde_json::from_str::<u8>("\"x\"").unwrap_err();
        let err: NormalizeError = serde_err.into();
        assert!(matches!(err, NormalizeError::Shape(_)));
    }
}

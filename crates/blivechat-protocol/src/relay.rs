//! Envelope for the relay protocol.
//!
//! The relay speaks JSON text frames shaped `{"cmd": <int>, "data": ...}`.
//! There is no binary framing and no compression. This module only knows
//! the envelope; the meaning of each command's `data` lives with the
//! normalizer and the relay client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Codec, JsonCodec, ProtocolError};

/// Relay command codes.
///
/// Codes the client does not know deserialize to [`RelayCommand::Unknown`]
/// instead of failing, so a newer relay server can add commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum RelayCommand {
    Heartbeat,
    JoinRoom,
    AddText,
    AddGift,
    AddMember,
    AddSuperChat,
    DelSuperChat,
    UpdateTranslation,
    FatalError,
    Unknown(i64),
}

impl From<i64> for RelayCommand {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::Heartbeat,
            1 => Self::JoinRoom,
            2 => Self::AddText,
            3 => Self::AddGift,
            4 => Self::AddMember,
            5 => Self::AddSuperChat,
            6 => Self::DelSuperChat,
            7 => Self::UpdateTranslation,
            8 => Self::FatalError,
            other => Self::Unknown(other),
        }
    }
}

impl From<RelayCommand> for i64 {
    fn from(cmd: RelayCommand) -> Self {
        match cmd {
            RelayCommand::Heartbeat => 0,
            RelayCommand::JoinRoom => 1,
            RelayCommand::AddText => 2,
            RelayCommand::AddGift => 3,
            RelayCommand::AddMember => 4,
            RelayCommand::AddSuperChat => 5,
            RelayCommand::DelSuperChat => 6,
            RelayCommand::UpdateTranslation => 7,
            RelayCommand::FatalError => 8,
            RelayCommand::Unknown(code) => code,
        }
    }
}

/// One relay message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub cmd: RelayCommand,
    #[serde(default)]
    pub data: Value,
}

impl RelayEnvelope {
    pub fn new(cmd: RelayCommand, data: Value) -> Self {
        Self { cmd, data }
    }

    /// Parses a text frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the text is not an envelope.
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        JsonCodec.decode(text.as_bytes())
    }

    /// Serializes to a text frame.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        JsonCodec.encode_text(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_add_text_envelope() {
        let env = RelayEnvelope::from_text(r#"{"cmd":2,"data":["a",1]}"#).unwrap();
        assert_eq!(env.cmd, RelayCommand::AddText);
        assert_eq!(env.data, json!(["a", 1]));
    }

    #[test]
    fn test_unknown_command_is_preserved() {
        let env = RelayEnvelope::from_text(r#"{"cmd":42,"data":{}}"#).unwrap();
        assert_eq!(env.cmd, RelayCommand::Unknown(42));
    }

    #[test]
    fn test_missing_data_defaults_to_null() {
        let env = RelayEnvelope::from_text(r#"{"cmd":0}"#).unwrap();
        assert_eq!(env, RelayEnvelope::new(RelayCommand::Heartbeat, Value::Null));
    }

    #[test]
    fn test_heartbeat_reply_text() {
        let text = RelayEnvelope::new(RelayCommand::Heartbeat, Value::Null)
            .to_text()
            .unwrap();
        assert_eq!(text, r#"{"cmd":0,"data":null}"#);
    }

    #[test]
    fn test_rejects_non_envelope() {
        assert!(RelayEnvelope::from_text("[1,2]").is_err());
    }
}

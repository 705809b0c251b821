//! How a client names the room it wants.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A room, identified either by its id or by the owner's open-platform
/// auth code.
///
/// Serializes as `{"type": 1, "value": <id>}` or
/// `{"type": 2, "value": "<code>"}`, the shape the relay's `joinRoom`
/// expects. `Display` masks auth codes so they never reach logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "RawRoomKey", try_from = "RawRoomKey")]
pub enum RoomKey {
    RoomId(u64),
    AuthCode(String),
}

impl RoomKey {
    pub fn room_id(&self) -> Option<u64> {
        match self {
            Self::RoomId(id) => Some(*id),
            Self::AuthCode(_) => None,
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomId(id) => write!(f, "room {id}"),
            Self::AuthCode(code) => write!(f, "auth code {}", mask(code)),
        }
    }
}

impl fmt::Debug for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomId(id) => f.debug_tuple("RoomId").field(id).finish(),
            Self::AuthCode(code) => f.debug_tuple("AuthCode").field(&mask(code)).finish(),
        }
    }
}

/// `***` followed by the last three characters.
pub fn mask(secret: &str) -> String {
    let tail: String = {
        let mut chars: Vec<char> = secret.chars().rev().take(3).collect();
        chars.reverse();
        chars.into_iter().collect()
    };
    format!("***{tail}")
}

#[derive(Serialize, Deserialize)]
struct RawRoomKey {
    #[serde(rename = "type")]
    kind: u8,
    value: serde_json::Value,
}

impl From<RoomKey> for RawRoomKey {
    fn from(key: RoomKey) -> Self {
        match key {
            RoomKey::RoomId(id) => Self {
                kind: 1,
                value: id.into(),
            },
            RoomKey::AuthCode(code) => Self {
                kind: 2,
                value: code.into(),
            },
        }
    }
}

impl TryFrom<RawRoomKey> for RoomKey {
    type Error = String;

    fn try_from(raw: RawRoomKey) -> Result<Self, Self::Error> {
        match (raw.kind, raw.value) {
            (1, serde_json::Value::Number(n)) => n
                .as_u64()
                .map(Self::RoomId)
                .ok_or_else(|| format!("invalid room id {n}")),
            (2, serde_json::Value::String(code)) => Ok(Self::AuthCode(code)),
            (kind, value) => Err(format!("invalid room key type {kind} with value {value}")),
        }
    }
}

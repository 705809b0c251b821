//! The canonical chat message model.
//!
//! Every transport variant, however its wire payloads look, ends up
//! producing these types. The rendering layer only ever sees a
//! [`ChatMessage`].
//!
//! Field names serialize in camelCase, matching what overlay templates
//! already consume.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::avatar::DEFAULT_AVATAR_URL;
use crate::NormalizeError;

// ---------------------------------------------------------------------------
// Ids and timestamps
// ---------------------------------------------------------------------------

/// A fresh locally generated message id: 128 random bits as 32 lowercase
/// hex characters.
pub fn random_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Seconds since the Unix epoch, for messages that carry no timestamp.
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Who wrote a text message, as far as the room is concerned.
///
/// Precedence when several apply: owner, then admin, then guard member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AuthorType {
    #[default]
    Normal,
    GuardMember,
    Admin,
    Owner,
}

impl From<AuthorType> for u8 {
    fn from(t: AuthorType) -> Self {
        match t {
            AuthorType::Normal => 0,
            AuthorType::GuardMember => 1,
            AuthorType::Admin => 2,
            AuthorType::Owner => 3,
        }
    }
}

impl TryFrom<u8> for AuthorType {
    type Error = NormalizeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::Normal,
            1 => Self::GuardMember,
            2 => Self::Admin,
            3 => Self::Owner,
            other => {
                return Err(NormalizeError::OutOfRange {
                    what: "author type",
                    value: other.into(),
                });
            }
        })
    }
}

/// Paid membership tier. Level 1 is the most expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum GuardLevel {
    #[default]
    None,
    /// Level 1.
    Governor,
    /// Level 2.
    Admiral,
    /// Level 3.
    Captain,
}

impl GuardLevel {
    /// Maps a raw wire value, treating anything outside `0..=3` as
    /// [`GuardLevel::None`].
    pub fn from_raw(raw: i64) -> Self {
        u8::try_from(raw)
            .ok()
            .and_then(|v| Self::try_from(v).ok())
            .unwrap_or_default()
    }

    pub fn is_member(self) -> bool {
        self != Self::None
    }
}

impl From<GuardLevel> for u8 {
    fn from(g: GuardLevel) -> Self {
        match g {
            GuardLevel::None => 0,
            GuardLevel::Governor => 1,
            GuardLevel::Admiral => 2,
            GuardLevel::Captain => 3,
        }
    }
}

impl TryFrom<u8> for GuardLevel {
    type Error = NormalizeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::None,
            1 => Self::Governor,
            2 => Self::Admiral,
            3 => Self::Captain,
            other => {
                return Err(NormalizeError::OutOfRange {
                    what: "guard level",
                    value: other.into(),
                });
            }
        })
    }
}

/// Why a client gave up for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum FatalErrorKind {
    /// The room owner's auth code was rejected.
    AuthCodeInvalid,
    /// The reconnect ceiling was exceeded.
    TooManyRetries,
    /// The room already has too many concurrent connections.
    TooManyConnections,
}

impl From<FatalErrorKind> for u8 {
    fn from(k: FatalErrorKind) -> Self {
        match k {
            FatalErrorKind::AuthCodeInvalid => 1,
            FatalErrorKind::TooManyRetries => 2,
            FatalErrorKind::TooManyConnections => 3,
        }
    }
}

impl TryFrom<u8> for FatalErrorKind {
    type Error = NormalizeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            1 => Self::AuthCodeInvalid,
            2 => Self::TooManyRetries,
            3 => Self::TooManyConnections,
            other => {
                return Err(NormalizeError::OutOfRange {
                    what: "fatal error type",
                    value: other.into(),
                });
            }
        })
    }
}

impl fmt::Display for FatalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AuthCodeInvalid => "auth code invalid",
            Self::TooManyRetries => "too many retries",
            Self::TooManyConnections => "too many connections",
        })
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// An inline emoticon referenced from a text message, e.g. `[dog]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEmoticon {
    pub keyword: String,
    pub url: String,
}

/// A chat line (danmaku).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub id: String,
    pub avatar_url: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub author_name: String,
    pub author_type: AuthorType,
    pub content: String,
    pub guard_level: GuardLevel,
    /// Sent automatically by the platform on the author's behalf, e.g. as
    /// part of a red-packet lottery.
    pub is_gift_triggered: bool,
    pub author_level: u32,
    pub is_new_account: bool,
    pub is_phone_verified: bool,
    /// Zero unless the medal belongs to the current room.
    pub medal_level: u32,
    pub medal_name: String,
    /// May be filled later by a [`TranslationUpdate`].
    pub translation: String,
    /// Set when the whole message is a single sticker.
    pub emoticon_image_url: Option<String>,
    pub text_emoticons: Vec<TextEmoticon>,
    pub author_uid: String,
}

impl Default for TextMessage {
    fn default() -> Self {
        Self {
            id: random_id(),
            avatar_url: DEFAULT_AVATAR_URL.to_owned(),
            timestamp: now_timestamp(),
            author_name: String::new(),
            author_type: AuthorType::Normal,
            content: String::new(),
            guard_level: GuardLevel::None,
            is_gift_triggered: false,
            author_level: 1,
            is_new_account: false,
            is_phone_verified: true,
            medal_level: 0,
            medal_name: String::new(),
            translation: String::new(),
            emoticon_image_url: None,
            text_emoticons: Vec::new(),
            author_uid: String::new(),
        }
    }
}

/// A paid gift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftMessage {
    pub id: String,
    pub avatar_url: String,
    pub timestamp: f64,
    pub author_name: String,
    /// Total value in gold coins (1000 = 1 CNY).
    pub paid_coin_total: u64,
    pub free_coin_total: u64,
    pub gift_name: String,
    pub gift_icon_url: String,
    pub count: u32,
    pub guard_level: GuardLevel,
    pub medal_level: u32,
    pub medal_name: String,
    pub author_uid: String,
}

impl Default for GiftMessage {
    fn default() -> Self {
        Self {
            id: random_id(),
            avatar_url: DEFAULT_AVATAR_URL.to_owned(),
            timestamp: now_timestamp(),
            author_name: String::new(),
            paid_coin_total: 0,
            free_coin_total: 0,
            gift_name: String::new(),
            gift_icon_url: String::new(),
            count: 1,
            guard_level: GuardLevel::None,
            medal_level: 0,
            medal_name: String::new(),
            author_uid: String::new(),
        }
    }
}

/// A guard (membership) purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipMessage {
    pub id: String,
    pub avatar_url: String,
    pub timestamp: f64,
    pub author_name: String,
    pub guard_level: GuardLevel,
    pub quantity: u32,
    pub unit: String,
    /// Gold coins paid in total.
    pub total_price: u64,
    pub medal_level: u32,
    pub medal_name: String,
    pub author_uid: String,
}

/// Unit used when a payload does not name one.
pub const DEFAULT_MEMBERSHIP_UNIT: &str = "month";

impl Default for MembershipMessage {
    fn default() -> Self {
        Self {
            id: random_id(),
            avatar_url: DEFAULT_AVATAR_URL.to_owned(),
            timestamp: now_timestamp(),
            author_name: String::new(),
            guard_level: GuardLevel::Captain,
            quantity: 1,
            unit: DEFAULT_MEMBERSHIP_UNIT.to_owned(),
            total_price: 0,
            medal_level: 0,
            medal_name: String::new(),
            author_uid: String::new(),
        }
    }
}

/// A paid, pinned message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperChatMessage {
    pub id: String,
    pub avatar_url: String,
    pub timestamp: f64,
    pub author_name: String,
    /// Price in CNY.
    pub price: f64,
    pub content: String,
    pub translation: String,
    pub guard_level: GuardLevel,
    pub medal_level: u32,
    pub medal_name: String,
    pub author_uid: String,
}

impl Default for SuperChatMessage {
    fn default() -> Self {
        Self {
            id: random_id(),
            avatar_url: DEFAULT_AVATAR_URL.to_owned(),
            timestamp: now_timestamp(),
            author_name: String::new(),
            price: 0.0,
            content: String::new(),
            translation: String::new(),
            guard_level: GuardLevel::None,
            medal_level: 0,
            medal_name: String::new(),
            author_uid: String::new(),
        }
    }
}

/// Removes previously delivered super chats.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuperChatDelete {
    pub ids: Vec<String>,
}

/// Fills in the translation of a previously delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUpdate {
    pub id: String,
    pub translation: String,
}

/// Free-text diagnostic for developer-facing display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugMessage {
    pub text: String,
}

/// Terminal failure. Delivered at most once per client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    #[serde(rename = "type")]
    pub kind: FatalErrorKind,
    #[serde(rename = "msg")]
    pub message: String,
}

impl FatalError {
    pub fn new(kind: FatalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Any message a chat client can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ChatMessage {
    AddText(TextMessage),
    AddGift(GiftMessage),
    AddMember(MembershipMessage),
    AddSuperChat(SuperChatMessage),
    DelSuperChat(SuperChatDelete),
    UpdateTranslation(TranslationUpdate),
    Debug(DebugMessage),
    Fatal(FatalError),
}

impl ChatMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddText(_) => "text",
            Self::AddGift(_) => "gift",
            Self::AddMember(_) => "member",
            Self::AddSuperChat(_) => "super_chat",
            Self::DelSuperChat(_) => "del_super_chat",
            Self::UpdateTranslation(_) => "update_translation",
            Self::Debug(_) => "debug",
            Self::Fatal(_) => "fatal",
        }
    }

    /// The id of the message itself, for the variants that have one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::AddText(m) => Some(&m.id),
            Self::AddGift(m) => Some(&m.id),
            Self::AddMember(m) => Some(&m.id),
            Self::AddSuperChat(m) => Some(&m.id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Gift-triggered danmaku
// ---------------------------------------------------------------------------

/// Contents the platform posts on a viewer's behalf when they join a
/// red-packet or lottery event.
const GIFT_DANMAKU_CONTENTS: &[&str] = &[
    "老板大气！点点红包抽礼物",
    "老板大气！点点红包抽礼物！",
    "点点红包，关注主播抽礼物～",
    "喜欢主播加关注，点点红包抽礼物",
    "红包抽礼物，开启今日好运！",
    "中奖喷雾！中奖喷雾！",
];

/// Whether `content` is one of the known auto-posted lottery lines.
pub fn is_gift_danmaku_content(content: &str) -> bool {
    GIFT_DANMAKU_CONTENTS.contains(&content)
}

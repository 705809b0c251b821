//! Normalizer for the relay connection.
//!
//! The relay server has already normalized upstream events, so most
//! payloads are camelCase objects close to the canonical model. Text
//! messages are the exception: they arrive as a positional array to keep
//! the hottest message small.
//!
//! Handlers here receive the envelope's `data`, not the whole envelope.

use blivechat_protocol::RelayCommand;
use serde::Deserialize;
use serde_json::Value;

use crate::avatar::DEFAULT_AVATAR_URL;
use crate::fields::{as_array, as_f64, as_i64, as_str, at, id_string, non_negative, truthy};
use crate::model::{random_id, DEFAULT_MEMBERSHIP_UNIT};
use crate::{
    AuthorType, ChatMessage, CommandTable, FatalError, GiftMessage, GuardLevel,
    MembershipMessage, NormalizeError, RoomContext, SuperChatDelete, SuperChatMessage,
    TextEmoticon, TextMessage, TranslationUpdate,
};

/// `ADD_TEXT[13]` value of a sticker-only message.
const CONTENT_TYPE_EMOTICON: i64 = 1;

/// Builds the command table for the relay connection.
///
/// `Heartbeat` and `JoinRoom` are connection-level and handled by the
/// relay client itself.
pub fn relay_table() -> CommandTable<RelayCommand> {
    CommandTable::new("relay")
        .with(RelayCommand::AddText, add_text)
        .with(RelayCommand::AddGift, add_gift)
        .with(RelayCommand::AddMember, add_member)
        .with(RelayCommand::AddSuperChat, add_super_chat)
        .with(RelayCommand::DelSuperChat, del_super_chat)
        .with(RelayCommand::UpdateTranslation, update_translation)
        .with(RelayCommand::FatalError, fatal_error)
}

fn avatar(url: &str) -> String {
    if url.is_empty() {
        DEFAULT_AVATAR_URL.to_owned()
    } else {
        url.to_owned()
    }
}

fn id_or_random(id: &Value) -> String {
    match id_string(id) {
        id if id.is_empty() => random_id(),
        id => id,
    }
}

// ---------------------------------------------------------------------------
// ADD_TEXT
// ---------------------------------------------------------------------------

fn add_text(data: &Value, _ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    as_array(data, "data")?;
    let author_type = non_negative(as_i64(at(data, 3, "data[3]")?, "data[3]")?);
    let author_type = u8::try_from(author_type)
        .map_err(|_| NormalizeError::OutOfRange {
            what: "author type",
            value: author_type.into(),
        })
        .and_then(AuthorType::try_from)?;

    let emoticon_image_url = if data.get(13).and_then(Value::as_i64) == Some(CONTENT_TYPE_EMOTICON) {
        data.get(14)
            .and_then(|p| p.get(0))
            .and_then(Value::as_str)
            .map(str::to_owned)
    } else {
        None
    };

    let text_emoticons = data
        .get(15)
        .and_then(Value::as_array)
        .map(|pairs| {
            pairs
                .iter()
                .filter_map(|pair| {
                    Some(TextEmoticon {
                        keyword: pair.get(0)?.as_str()?.to_owned(),
                        url: pair.get(1)?.as_str()?.to_owned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let flag = |idx: usize| data.get(idx).is_some_and(truthy);

    Ok(Some(ChatMessage::AddText(TextMessage {
        id: id_or_random(data.get(11).unwrap_or(&Value::Null)),
        avatar_url: avatar(data.get(0).and_then(Value::as_str).unwrap_or_default()),
        timestamp: as_f64(at(data, 1, "data[1]")?, "data[1]")?,
        author_name: as_str(at(data, 2, "data[2]")?, "data[2]")?.to_owned(),
        author_type,
        content: as_str(at(data, 4, "data[4]")?, "data[4]")?.to_owned(),
        guard_level: GuardLevel::from_raw(data.get(5).and_then(Value::as_i64).unwrap_or(0)),
        is_gift_triggered: flag(6),
        author_level: non_negative(data.get(7).and_then(Value::as_i64).unwrap_or(0)),
        is_new_account: flag(8),
        is_phone_verified: flag(9),
        medal_level: non_negative(data.get(10).and_then(Value::as_i64).unwrap_or(0)),
        medal_name: String::new(),
        translation: data.get(12).and_then(Value::as_str).unwrap_or_default().to_owned(),
        emoticon_image_url,
        text_emoticons,
        author_uid: String::new(),
    })))
}

// ---------------------------------------------------------------------------
// Object-shaped commands
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayGift {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    avatar_url: String,
    timestamp: f64,
    author_name: String,
    #[serde(default)]
    total_coin: u64,
    #[serde(default)]
    total_free_coin: u64,
    gift_name: String,
    #[serde(default)]
    gift_icon_url: String,
    #[serde(default = "one")]
    num: u32,
    #[serde(default)]
    privilege_type: i64,
    #[serde(default)]
    medal_level: u32,
    #[serde(default)]
    medal_name: String,
    #[serde(default)]
    uid: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayMember {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    avatar_url: String,
    timestamp: f64,
    author_name: String,
    privilege_type: i64,
    #[serde(default = "one")]
    num: u32,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    total_coin: u64,
    #[serde(default)]
    medal_level: u32,
    #[serde(default)]
    medal_name: String,
    #[serde(default)]
    uid: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelaySuperChat {
    id: Value,
    #[serde(default)]
    avatar_url: String,
    timestamp: f64,
    author_name: String,
    price: f64,
    content: String,
    #[serde(default)]
    translation: String,
    #[serde(default)]
    privilege_type: i64,
    #[serde(default)]
    medal_level: u32,
    #[serde(default)]
    medal_name: String,
    #[serde(default)]
    uid: Value,
}

#[derive(Debug, Deserialize)]
struct RelayDelSuperChat {
    ids: Vec<Value>,
}

fn one() -> u32 {
    1
}

fn add_gift(data: &Value, _ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    let gift = RelayGift::deserialize(data)?;
    if gift.total_coin == 0 {
        return Ok(None);
    }
    Ok(Some(ChatMessage::AddGift(GiftMessage {
        id: id_or_random(&gift.id),
        avatar_url: avatar(&gift.avatar_url),
        timestamp: gift.timestamp,
        author_name: gift.author_name,
        paid_coin_total: gift.total_coin,
        free_coin_total: gift.total_free_coin,
        gift_name: gift.gift_name,
        gift_icon_url: gift.gift_icon_url,
        count: gift.num,
        guard_level: GuardLevel::from_raw(gift.privilege_type),
        medal_level: gift.medal_level,
        medal_name: gift.medal_name,
        author_uid: id_string(&gift.uid),
    })))
}

fn add_member(data: &Value, _ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    let member = RelayMember::deserialize(data)?;
    Ok(Some(ChatMessage::AddMember(MembershipMessage {
        id: id_or_random(&member.id),
        avatar_url: avatar(&member.avatar_url),
        timestamp: member.timestamp,
        author_name: member.author_name,
        guard_level: GuardLevel::from_raw(member.privilege_type),
        quantity: member.num,
        unit: if member.unit.is_empty() {
            DEFAULT_MEMBERSHIP_UNIT.to_owned()
        } else {
            member.unit
        },
        total_price: member.total_coin,
        medal_level: member.medal_level,
        medal_name: member.medal_name,
        author_uid: id_string(&member.uid),
    })))
}

fn add_super_chat(
    data: &Value,
    _ctx: &RoomContext,
) -> Result<Option<ChatMessage>, NormalizeError> {
    let sc = RelaySuperChat::deserialize(data)?;
    Ok(Some(ChatMessage::AddSuperChat(SuperChatMessage {
        id: id_or_random(&sc.id),
        avatar_url: avatar(&sc.avatar_url),
        timestamp: sc.timestamp,
        author_name: sc.author_name,
        price: sc.price,
        content: sc.content,
        translation: sc.translation,
        guard_level: GuardLevel::from_raw(sc.privilege_type),
        medal_level: sc.medal_level,
        medal_name: sc.medal_name,
        author_uid: id_string(&sc.uid),
    })))
}

fn del_super_chat(
    data: &Value,
    _ctx: &RoomContext,
) -> Result<Option<ChatMessage>, NormalizeError> {
    let del = RelayDelSuperChat::deserialize(data)?;
    Ok(Some(ChatMessage::DelSuperChat(SuperChatDelete {
        ids: del.ids.iter().map(id_string).collect(),
    })))
}

/// `[id, translation]`.
fn update_translation(
    data: &Value,
    _ctx: &RoomContext,
) -> Result<Option<ChatMessage>, NormalizeError> {
    Ok(Some(ChatMessage::UpdateTranslation(TranslationUpdate {
        id: id_string(at(data, 0, "data[0]")?),
        translation: as_str(at(data, 1, "data[1]")?, "data[1]")?.to_owned(),
    })))
}

fn fatal_error(data: &Value, _ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    Ok(Some(ChatMessage::Fatal(FatalError::deserialize(data)?)))
}

//! Normalizer for the open-platform connection.
//!
//! Open-platform payloads are flat objects under `data` and already carry
//! a message id, so ids are taken from the wire instead of generated.
//! Medals on this connection always belong to the anchor's room; the
//! only question is whether the viewer is currently wearing it.

use serde_json::Value;

use crate::avatar::avatar_or_default;
use crate::fields::{as_array, as_f64, get, id_string, non_negative, opt_f64, opt_i64, opt_str, truthy};
use crate::model::{is_gift_danmaku_content, DEFAULT_MEMBERSHIP_UNIT};
use crate::{
    AuthorType, ChatMessage, CommandTable, GiftMessage, GuardLevel, MembershipMessage,
    NormalizeError, RoomContext, SuperChatDelete, SuperChatMessage, TextMessage,
};

const DM_TYPE_EMOTICON: i64 = 1;

/// Builds the command table for the open-platform connection.
pub fn open_live_table() -> CommandTable<&'static str> {
    CommandTable::new("open_live")
        .with("LIVE_OPEN_PLATFORM_DM", dm)
        .with("LIVE_OPEN_PLATFORM_SEND_GIFT", send_gift)
        .with("LIVE_OPEN_PLATFORM_GUARD", guard)
        .with("LIVE_OPEN_PLATFORM_SUPER_CHAT", super_chat)
        .with("LIVE_OPEN_PLATFORM_SUPER_CHAT_DEL", super_chat_del)
}

/// The platform is migrating from numeric uids to opaque `open_id`s;
/// prefer the latter when present.
fn author_id(user: &Value) -> String {
    match opt_str(user, "open_id") {
        "" => match user.get("uid") {
            Some(uid) if truthy(uid) => id_string(uid),
            _ => String::new(),
        },
        open_id => open_id.to_owned(),
    }
}

/// Falls back to a generated id when the payload has none.
fn message_id(data: &Value, key: &str) -> String {
    match data.get(key).map(id_string) {
        Some(id) if !id.is_empty() => id,
        _ => crate::model::random_id(),
    }
}

fn medal(data: &Value) -> (u32, String) {
    if !data.get("fans_medal_wearing_status").is_some_and(truthy) {
        return (0, String::new());
    }
    (
        non_negative(opt_i64(data, "fans_medal_level")),
        opt_str(data, "fans_medal_name").to_owned(),
    )
}

fn dm(command: &Value, ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    let data = get(command, "data")?;
    let uid = author_id(data);
    let guard_level = GuardLevel::from_raw(opt_i64(data, "guard_level"));
    let author_type = if !uid.is_empty() && ctx.is_owner(&uid) {
        AuthorType::Owner
    } else if data.get("is_admin").is_some_and(truthy) {
        AuthorType::Admin
    } else if guard_level.is_member() {
        AuthorType::GuardMember
    } else {
        AuthorType::Normal
    };

    let content = opt_str(data, "msg").to_owned();
    let emoticon_image_url = (opt_i64(data, "dm_type") == DM_TYPE_EMOTICON)
        .then(|| opt_str(data, "emoji_img_url").to_owned())
        .filter(|url| !url.is_empty());
    let (medal_level, medal_name) = medal(data);

    Ok(Some(ChatMessage::AddText(TextMessage {
        id: message_id(data, "msg_id"),
        avatar_url: avatar_or_default(opt_str(data, "uface")),
        timestamp: as_f64(get(data, "timestamp")?, "data.timestamp")?,
        author_name: opt_str(data, "uname").to_owned(),
        author_type,
        is_gift_triggered: is_gift_danmaku_content(&content),
        content,
        guard_level,
        // Not exposed on this connection.
        author_level: 1,
        is_new_account: false,
        is_phone_verified: true,
        medal_level,
        medal_name,
        translation: String::new(),
        emoticon_image_url,
        text_emoticons: Vec::new(),
        author_uid: uid,
    })))
}

fn send_gift(command: &Value, _ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    let data = get(command, "data")?;
    if !data.get("paid").is_some_and(truthy) {
        return Ok(None);
    }
    let count = non_negative(opt_i64(data, "gift_num")).max(1);
    let (medal_level, medal_name) = medal(data);
    Ok(Some(ChatMessage::AddGift(GiftMessage {
        id: message_id(data, "msg_id"),
        avatar_url: avatar_or_default(opt_str(data, "uface")),
        timestamp: as_f64(get(data, "timestamp")?, "data.timestamp")?,
        author_name: opt_str(data, "uname").to_owned(),
        paid_coin_total: (opt_i64(data, "price").max(0) as u64).saturating_mul(u64::from(count)),
        free_coin_total: 0,
        gift_name: opt_str(data, "gift_name").to_owned(),
        gift_icon_url: opt_str(data, "gift_icon").to_owned(),
        count,
        guard_level: GuardLevel::from_raw(opt_i64(data, "guard_level")),
        medal_level,
        medal_name,
        author_uid: author_id(data),
    })))
}

fn guard(command: &Value, _ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    let data = get(command, "data")?;
    let user = get(data, "user_info")?;
    let unit = match opt_str(data, "guard_unit") {
        "" => DEFAULT_MEMBERSHIP_UNIT,
        unit => unit,
    };
    let (medal_level, medal_name) = medal(data);
    Ok(Some(ChatMessage::AddMember(MembershipMessage {
        id: message_id(data, "msg_id"),
        avatar_url: avatar_or_default(opt_str(user, "uface")),
        timestamp: as_f64(get(data, "timestamp")?, "data.timestamp")?,
        author_name: opt_str(user, "uname").to_owned(),
        guard_level: GuardLevel::from_raw(opt_i64(data, "guard_level")),
        quantity: non_negative(opt_i64(data, "guard_num")).max(1),
        unit: unit.to_owned(),
        // Already the total for the whole purchase.
        total_price: opt_i64(data, "price").max(0) as u64,
        medal_level,
        medal_name,
        author_uid: author_id(user),
    })))
}

fn super_chat(command: &Value, _ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    let data = get(command, "data")?;
    let (medal_level, medal_name) = medal(data);
    Ok(Some(ChatMessage::AddSuperChat(SuperChatMessage {
        id: id_string(get(data, "message_id")?),
        avatar_url: avatar_or_default(opt_str(data, "uface")),
        timestamp: as_f64(get(data, "start_time")?, "data.start_time")?,
        author_name: opt_str(data, "uname").to_owned(),
        price: opt_f64(data, "rmb"),
        content: opt_str(data, "message").to_owned(),
        translation: String::new(),
        guard_level: GuardLevel::from_raw(opt_i64(data, "guard_level")),
        medal_level,
        medal_name,
        author_uid: author_id(data),
    })))
}

fn super_chat_del(
    command: &Value,
    _ctx: &RoomContext,
) -> Result<Option<ChatMessage>, NormalizeError> {
    let ids = as_array(
        get(get(command, "data")?, "message_ids")?,
        "data.message_ids",
    )?;
    Ok(Some(ChatMessage::DelSuperChat(SuperChatDelete {
        ids: ids.iter().map(id_string).collect(),
    })))
}

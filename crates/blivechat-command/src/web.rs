//! Normalizer for the direct web connection.
//!
//! Web payloads are the least regular: `DANMU_MSG` is a positional array
//! under `info`, while gifts, guards and super chats are objects under
//! `data`. Positions used here:
//!
//! ```text
//! info[0][4]   send time (ms)          info[2][0] uid
//! info[0][9]   gift-triggered flag     info[2][1] user name
//! info[0][12]  1 = sticker message     info[2][2] is admin
//! info[0][13]  sticker {url}           info[2][5] user rank (< 10000: new)
//! info[0][15]  mode info {extra, user} info[2][6] phone verified
//! info[1]      content                 info[3]    medal [level, name, _, room]
//! info[4][0]   user level              info[7]    guard level
//! ```

use serde_json::Value;

use crate::avatar::{avatar_or_default, DEFAULT_AVATAR_URL};
use crate::fields::{
    as_array, as_f64, as_i64, as_str, at, get, id_string, non_negative, opt_f64, opt_i64, opt_str,
    truthy,
};
use crate::model::{is_gift_danmaku_content, random_id, DEFAULT_MEMBERSHIP_UNIT};
use crate::{
    AuthorType, ChatMessage, CommandTable, GiftMessage, GuardLevel, MembershipMessage,
    NormalizeError, RoomContext, SuperChatDelete, SuperChatMessage, TextEmoticon, TextMessage,
};

/// Gifts paid in this currency are real money; everything else is dropped.
const PAID_COIN_TYPE: &str = "gold";

/// `dm_type` of a sticker-only message.
const DM_TYPE_EMOTICON: i64 = 1;

/// Users below this rank registered recently.
const NEW_ACCOUNT_RANK: i64 = 10000;

/// Builds the command table for the direct web connection.
pub fn web_table() -> CommandTable<&'static str> {
    CommandTable::new("web")
        .with("DANMU_MSG", danmu_msg)
        .with("SEND_GIFT", send_gift)
        .with("GUARD_BUY", guard_buy)
        .with("SUPER_CHAT_MESSAGE", super_chat_message)
        .with("SUPER_CHAT_MESSAGE_DELETE", super_chat_message_delete)
}

fn danmu_msg(command: &Value, ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    let info = get(command, "info")?;
    let meta = at(info, 0, "info[0]")?;
    let user = at(info, 2, "info[2]")?;

    let content = as_str(at(info, 1, "info[1]")?, "info[1]")?.to_owned();
    let uid = id_string(at(user, 0, "info[2][0]")?);
    let author_name = as_str(at(user, 1, "info[2][1]")?, "info[2][1]")?.to_owned();
    let is_admin = user.get(2).is_some_and(truthy);
    let guard_level = GuardLevel::from_raw(info.get(7).map_or(Ok(0), |v| as_i64(v, "info[7]"))?);

    let author_type = if ctx.is_owner(&uid) {
        AuthorType::Owner
    } else if is_admin {
        AuthorType::Admin
    } else if guard_level.is_member() {
        AuthorType::GuardMember
    } else {
        AuthorType::Normal
    };

    let (medal_level, medal_name) = medal_from_info(info.get(3), ctx);

    let emoticon_image_url = if meta.get(12).and_then(Value::as_i64) == Some(DM_TYPE_EMOTICON) {
        meta.get(13)
            .and_then(|e| e.get("url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_owned)
    } else {
        None
    };

    let mode_info = meta.get(15);
    let face = mode_info
        .and_then(|m| m.pointer("/user/base/face"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(Some(ChatMessage::AddText(TextMessage {
        id: random_id(),
        avatar_url: avatar_or_default(face),
        timestamp: as_f64(at(meta, 4, "info[0][4]")?, "info[0][4]")? / 1000.0,
        author_name,
        author_type,
        is_gift_triggered: meta.get(9).is_some_and(truthy) || is_gift_danmaku_content(&content),
        content,
        guard_level,
        author_level: non_negative(info.get(4).and_then(|l| l.get(0)).and_then(Value::as_i64).unwrap_or(0)),
        is_new_account: user.get(5).and_then(Value::as_i64).unwrap_or(NEW_ACCOUNT_RANK) < NEW_ACCOUNT_RANK,
        is_phone_verified: user.get(6).is_some_and(truthy),
        medal_level,
        medal_name,
        translation: String::new(),
        emoticon_image_url,
        text_emoticons: mode_info.map(parse_text_emoticons).unwrap_or_default(),
        author_uid: uid,
    })))
}

/// `info[3]` is `[level, name, anchor name, room id, ...]` or empty.
fn medal_from_info(medal: Option<&Value>, ctx: &RoomContext) -> (u32, String) {
    let Some(medal) = medal.and_then(Value::as_array).filter(|m| !m.is_empty()) else {
        return (0, String::new());
    };
    let room_id = medal.get(3).and_then(Value::as_u64).unwrap_or(0);
    if room_id != ctx.room_id {
        return (0, String::new());
    }
    let level = non_negative(medal.first().and_then(Value::as_i64).unwrap_or(0));
    let name = medal.get(1).and_then(Value::as_str).unwrap_or_default().to_owned();
    (level, name)
}

/// Reads the inline emoticons out of `mode_info.extra`, which is itself a
/// JSON document in a string. Anything unexpected yields no emoticons.
fn parse_text_emoticons(mode_info: &Value) -> Vec<TextEmoticon> {
    let Some(extra) = mode_info.get("extra").and_then(Value::as_str) else {
        return Vec::new();
    };
    let Ok(extra) = serde_json::from_str::<Value>(extra) else {
        return Vec::new();
    };
    let Some(emots) = extra.get("emots").and_then(Value::as_object) else {
        return Vec::new();
    };
    emots
        .values()
        .filter_map(|e| {
            Some(TextEmoticon {
                keyword: e.get("descript")?.as_str()?.to_owned(),
                url: e.get("url")?.as_str()?.to_owned(),
            })
        })
        .collect()
}

/// `data.medal_info` on gifts and super chats.
fn medal_from_object(data: &Value, ctx: &RoomContext) -> (u32, String) {
    let Some(medal) = data.get("medal_info").filter(|m| m.is_object()) else {
        return (0, String::new());
    };
    if opt_i64(medal, "anchor_roomid") as u64 != ctx.room_id {
        return (0, String::new());
    }
    (
        non_negative(opt_i64(medal, "medal_level")),
        opt_str(medal, "medal_name").to_owned(),
    )
}

fn send_gift(command: &Value, ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    let data = get(command, "data")?;
    if opt_str(data, "coin_type") != PAID_COIN_TYPE {
        return Ok(None);
    }
    let (medal_level, medal_name) = medal_from_object(data, ctx);
    Ok(Some(ChatMessage::AddGift(GiftMessage {
        id: random_id(),
        avatar_url: avatar_or_default(opt_str(data, "face")),
        timestamp: as_f64(get(data, "timestamp")?, "data.timestamp")?,
        author_name: as_str(get(data, "uname")?, "data.uname")?.to_owned(),
        paid_coin_total: opt_i64(data, "total_coin").max(0) as u64,
        free_coin_total: 0,
        gift_name: as_str(get(data, "giftName")?, "data.giftName")?.to_owned(),
        gift_icon_url: data
            .pointer("/gift_info/webp")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        count: non_negative(opt_i64(data, "num")),
        guard_level: GuardLevel::from_raw(opt_i64(data, "guard_level")),
        medal_level,
        medal_name,
        author_uid: id_string(data.get("uid").unwrap_or(&Value::Null)),
    })))
}

fn guard_buy(command: &Value, _ctx: &RoomContext) -> Result<Option<ChatMessage>, NormalizeError> {
    let data = get(command, "data")?;
    let quantity = non_negative(opt_i64(data, "num")).max(1);
    let unit = match opt_str(data, "unit") {
        "" => DEFAULT_MEMBERSHIP_UNIT,
        unit => unit,
    };
    Ok(Some(ChatMessage::AddMember(MembershipMessage {
        id: random_id(),
        // Guard purchases carry no face; the avatar resolver fills it in.
        avatar_url: DEFAULT_AVATAR_URL.to_owned(),
        timestamp: as_f64(get(data, "start_time")?, "data.start_time")?,
        author_name: as_str(get(data, "username")?, "data.username")?.to_owned(),
        guard_level: GuardLevel::from_raw(as_i64(get(data, "guard_level")?, "data.guard_level")?),
        quantity,
        unit: unit.to_owned(),
        total_price: (opt_i64(data, "price").max(0) as u64).saturating_mul(u64::from(quantity)),
        medal_level: 0,
        medal_name: String::new(),
        author_uid: id_string(data.get("uid").unwrap_or(&Value::Null)),
    })))
}

fn super_chat_message(
    command: &Value,
    ctx: &RoomContext,
) -> Result<Option<ChatMessage>, NormalizeError> {
    let data = get(command, "data")?;
    let user_info = get(data, "user_info")?;
    let (medal_level, medal_name) = medal_from_object(data, ctx);
    Ok(Some(ChatMessage::AddSuperChat(SuperChatMessage {
        id: id_string(get(data, "id")?),
        avatar_url: avatar_or_default(opt_str(user_info, "face")),
        timestamp: as_f64(get(data, "start_time")?, "data.start_time")?,
        author_name: as_str(get(user_info, "uname")?, "data.user_info.uname")?.to_owned(),
        price: opt_f64(data, "price"),
        content: as_str(get(data, "message")?, "data.message")?.to_owned(),
        translation: opt_str(data, "message_trans").to_owned(),
        guard_level: GuardLevel::from_raw(opt_i64(user_info, "guard_level")),
        medal_level,
        medal_name,
        author_uid: id_string(data.get("uid").unwrap_or(&Value::Null)),
    })))
}

fn super_chat_message_delete(
    command: &Value,
    _ctx: &RoomContext,
) -> Result<Option<ChatMessage>, NormalizeError> {
    let ids = as_array(get(get(command, "data")?, "ids")?, "data.ids")?;
    Ok(Some(ChatMessage::DelSuperChat(SuperChatDelete {
        ids: ids.iter().map(id_string).collect(),
    })))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ROOM: u64 = 21_396_545;

    fn ctx() -> RoomContext {
        RoomContext::new(ROOM).with_owner("100")
    }

    /// A trimmed real-world `DANMU_MSG`.
    fn danmu(uid: u64, admin: u8, guard: u8, medal_room: u64) -> Value {
        json!({
            "cmd": "DANMU_MSG:4:0:2:2:2:0",
            "info": [
                [0, 1, 25, 16777215, 1_700_000_000_123_i64, 0, 0, "", 0, 0, 0, "", 0,
                 "{}", "{}",
                 {"extra": "{\"emots\":{\"[dog]\":{\"descript\":\"[dog]\",\"url\":\"http://i0.hdslb.com/dog.png\"}}}",
                  "user": {"base": {"face": "https://i0.hdslb.com/bfs/face/u.jpg"}}}],
                "hello [dog]",
                [uid, "viewer", admin, 0, 0, 10000, 1, ""],
                [12, "fans", "anchor", medal_room, 0, "", 0],
                [25, 0, 0, ">50000", 0],
                ["", ""],
                0,
                guard,
            ]
        })
    }

    fn text(msg: Option<ChatMessage>) -> TextMessage {
        match msg {
            Some(ChatMessage::AddText(t)) => t,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_danmu_msg_fields() {
        let t = text(web_table().normalize(&danmu(5, 0, 0, ROOM), &ctx()));
        assert_eq!(t.author_uid, "5");
        assert_eq!(t.author_name, "viewer");
        assert_eq!(t.content, "hello [dog]");
        assert_eq!(t.timestamp, 1_700_000_000.123);
        assert_eq!(t.author_type, AuthorType::Normal);
        assert_eq!(t.author_level, 25);
        assert!(!t.is_new_account);
        assert!(t.is_phone_verified);
        assert!(!t.is_gift_triggered);
        assert_eq!(t.medal_level, 12);
        assert_eq!(t.medal_name, "fans");
        assert_eq!(t.avatar_url, "//i0.hdslb.com/bfs/face/u.jpg@48w_48h");
        assert_eq!(t.emoticon_image_url, None);
        assert_eq!(
            t.text_emoticons,
            vec![TextEmoticon {
                keyword: "[dog]".into(),
                url: "http://i0.hdslb.com/dog.png".into()
            }]
        );
        assert_eq!(t.id.len(), 32);
    }

    #[test]
    fn test_danmu_medal_zeroed_for_other_room() {
        let t = text(web_table().normalize(&danmu(5, 0, 0, 1), &ctx()));
        assert_eq!(t.medal_level, 0);
        assert_eq!(t.medal_name, "");
    }

    #[test]
    fn test_danmu_author_type_precedence() {
        let owner = text(web_table().normalize(&danmu(100, 1, 3, ROOM), &ctx()));
        assert_eq!(owner.author_type, AuthorType::Owner);
        let admin = text(web_table().normalize(&danmu(5, 1, 3, ROOM), &ctx()));
        assert_eq!(admin.author_type, AuthorType::Admin);
        let member = text(web_table().normalize(&danmu(5, 0, 3, ROOM), &ctx()));
        assert_eq!(member.author_type, AuthorType::GuardMember);
        assert_eq!(member.guard_level, GuardLevel::Captain);
    }

    #[test]
    fn test_danmu_gift_triggered_by_flag_or_content() {
        let mut cmd = danmu(5, 0, 0, ROOM);
        cmd["info"][0][9] = json!(2);
        assert!(text(web_table().normalize(&cmd, &ctx())).is_gift_triggered);

        let mut cmd = danmu(5, 0, 0, ROOM);
        cmd["info"][1] = json!("老板大气！点点红包抽礼物");
        assert!(text(web_table().normalize(&cmd, &ctx())).is_gift_triggered);
    }

    #[test]
    fn test_danmu_emoticon_and_missing_face() {
        let mut cmd = danmu(5, 0, 0, ROOM);
        cmd["info"][0][12] = json!(1);
        cmd["info"][0][13] = json!({"url": "http://i0.hdslb.com/sticker.png"});
        cmd["info"][0][15] = json!({});
        let t = text(web_table().normalize(&cmd, &ctx()));
        assert_eq!(
            t.emoticon_image_url.as_deref(),
            Some("http://i0.hdslb.com/sticker.png")
        );
        assert_eq!(t.avatar_url, DEFAULT_AVATAR_URL);
        assert!(t.text_emoticons.is_empty());
    }

    #[test]
    fn test_danmu_new_account_and_empty_medal() {
        let mut cmd = danmu(5, 0, 0, ROOM);
        cmd["info"][2][5] = json!(5000);
        cmd["info"][3] = json!([]);
        let t = text(web_table().normalize(&cmd, &ctx()));
        assert!(t.is_new_account);
        assert_eq!(t.medal_level, 0);
    }

    #[test]
    fn test_danmu_malformed_is_dropped() {
        let cmd = json!({"cmd": "DANMU_MSG", "info": [[], 5]});
        assert_eq!(web_table().normalize(&cmd, &ctx()), None);
    }

    fn gift(coin_type: &str) -> Value {
        json!({
            "cmd": "SEND_GIFT",
            "data": {
                "giftName": "小电视飞船",
                "num": 2,
                "uname": "giver",
                "face": "http://i0.hdslb.com/g.jpg",
                "uid": 77,
                "timestamp": 1_700_000_000,
                "coin_type": coin_type,
                "total_coin": 2_490_000,
                "guard_level": 2,
                "medal_info": {"medal_level": 8, "medal_name": "fans", "anchor_roomid": ROOM},
                "gift_info": {"webp": "https://i0.hdslb.com/tv.webp"}
            }
        })
    }

    #[test]
    fn test_send_gift_paid() {
        let Some(ChatMessage::AddGift(g)) = web_table().normalize(&gift("gold"), &ctx()) else {
            panic!("expected gift");
        };
        assert_eq!(g.gift_name, "小电视飞船");
        assert_eq!(g.count, 2);
        assert_eq!(g.paid_coin_total, 2_490_000);
        assert_eq!(g.free_coin_total, 0);
        assert_eq!(g.author_uid, "77");
        assert_eq!(g.avatar_url, "//i0.hdslb.com/g.jpg@48w_48h");
        assert_eq!(g.guard_level, GuardLevel::Admiral);
        assert_eq!(g.medal_level, 8);
        assert_eq!(g.gift_icon_url, "https://i0.hdslb.com/tv.webp");
        assert_eq!(g.timestamp, 1_700_000_000.0);
    }

    #[test]
    fn test_send_gift_free_currency_dropped() {
        assert_eq!(web_table().normalize(&gift("silver"), &ctx()), None);
    }

    #[test]
    fn test_guard_buy() {
        let cmd = json!({
            "cmd": "GUARD_BUY",
            "data": {"uid": 9, "username": "cap", "guard_level": 3, "num": 2,
                     "price": 198_000, "start_time": 1_700_000_100}
        });
        let Some(ChatMessage::AddMember(m)) = web_table().normalize(&cmd, &ctx()) else {
            panic!("expected member");
        };
        assert_eq!(m.author_name, "cap");
        assert_eq!(m.guard_level, GuardLevel::Captain);
        assert_eq!(m.quantity, 2);
        assert_eq!(m.unit, "month");
        assert_eq!(m.total_price, 396_000);
        assert_eq!(m.avatar_url, DEFAULT_AVATAR_URL);
        assert_eq!(m.author_uid, "9");
    }

    #[test]
    fn test_super_chat_message() {
        let cmd = json!({
            "cmd": "SUPER_CHAT_MESSAGE",
            "data": {
                "id": 3_456_789, "uid": 11, "price": 30, "message": "nice",
                "message_trans": "", "start_time": 1_700_000_200,
                "user_info": {"uname": "sc", "face": "https://i0.hdslb.com/s.jpg", "guard_level": 1},
                "medal_info": {"medal_level": 20, "medal_name": "m", "anchor_roomid": 1}
            }
        });
        let Some(ChatMessage::AddSuperChat(sc)) = web_table().normalize(&cmd, &ctx()) else {
            panic!("expected super chat");
        };
        assert_eq!(sc.id, "3456789");
        assert_eq!(sc.price, 30.0);
        assert_eq!(sc.content, "nice");
        assert_eq!(sc.author_name, "sc");
        assert_eq!(sc.guard_level, GuardLevel::Governor);
        assert_eq!(sc.medal_level, 0, "medal from another room");
    }

    #[test]
    fn test_super_chat_delete() {
        let cmd = json!({"cmd": "SUPER_CHAT_MESSAGE_DELETE", "data": {"ids": [1, "2"]}});
        assert_eq!(
            web_table().normalize(&cmd, &ctx()),
            Some(ChatMessage::DelSuperChat(SuperChatDelete {
                ids: vec!["1".into(), "2".into()]
            }))
        );
    }

    #[test]
    fn test_unknown_web_command_ignored() {
        let cmd = json!({"cmd": "INTERACT_WORD", "data": {}});
        assert_eq!(web_table().normalize(&cmd, &ctx()), None);
    }
}

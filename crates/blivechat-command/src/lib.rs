//! Command normalization for blivechat.
//!
//! Upstream speaks three dialects: the direct web connection, the
//! open-platform connection and the relay. Each describes the same events
//! (a chat line, a gift, a guard purchase, a super chat) with a different
//! payload shape. This crate turns all of them into one canonical
//! [`ChatMessage`] and hands it to a [`MessageHandler`].
//!
//! # Key types
//!
//! - [`ChatMessage`] and its payload structs: the canonical model
//! - [`CommandTable`]: an immutable tag → normalizer map, one per dialect
//! - [`web_table`], [`open_live_table`], [`relay_table`]: the three tables
//! - [`MessageHandler`]: the rendering-side callback interface
//!
//! Unknown command tags are ignored, and a malformed payload drops just
//! that one command. Normalization never fails the connection.

mod avatar;
mod error;
mod fields;
mod handler;
mod model;
mod open_live;
mod relay;
mod table;
mod web;

pub use avatar::{avatar_or_default, process_avatar_url, DEFAULT_AVATAR_URL};
pub use error::NormalizeError;
pub use handler::{channel_handler, dispatch, ChannelHandler, MessageHandler};
pub use model::{
    is_gift_danmaku_content, now_timestamp, random_id, AuthorType, ChatMessage, DebugMessage,
    FatalError, FatalErrorKind, GiftMessage, GuardLevel, MembershipMessage, SuperChatDelete,
    SuperChatMessage, TextEmoticon, TextMessage, TranslationUpdate, DEFAULT_MEMBERSHIP_UNIT,
};
pub use open_live::open_live_table;
pub use relay::relay_table;
pub use table::{command_tag, CommandFn, CommandTable, RoomContext};
pub use web::web_table;

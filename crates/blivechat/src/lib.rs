//! # blivechat
//!
//! Live-chat clients for bilibili rooms.
//!
//! A client keeps one chat connection alive for as long as the caller
//! wants it: it bootstraps the room, authenticates, heartbeats, watches
//! for silence and reconnects with backoff. Every upstream event is
//! normalized into a [`ChatMessage`](command::ChatMessage) and handed to a
//! [`MessageHandler`](command::MessageHandler).
//!
//! Four kinds of client share that contract:
//!
//! - **Direct web** ([`DirectWebVariant`]): the platform's own chat servers
//! - **Open platform** ([`OpenLiveVariant`]): authorized by the room
//!   owner's auth code, with a game session kept alive on the side
//! - **Relay**: a relay server that speaks JSON text frames
//! - **Synthetic**: made-up traffic for working offline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blivechat::prelude::*;
//!
//! # async fn run() -> Result<(), ChatError> {
//! let (handler, mut messages) = channel_handler();
//! let client = ChatClient::builder().synthetic(SyntheticConfig::default(), handler);
//! while let Some(msg) = messages.recv().await {
//!     println!("{}", msg.kind());
//! #   break;
//! }
//! client.stop();
//! client.join().await
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod avatar;
mod client;
mod config;
mod direct_web;
mod driver;
mod error;
mod link;
mod open_live;
mod relay;
mod state;
mod synthetic;
mod variant;

pub use avatar::AvatarResolver;
pub use client::{ChatClient, ChatClientBuilder};
pub use config::{
    ClientConfig, DirectWebConfig, OpenLiveConfig, RelayConfig, SyntheticConfig,
    DEFAULT_MAX_TOTAL_RETRIES,
};
pub use direct_web::DirectWebVariant;
pub use error::{BootstrapError, ChatError};
pub use open_live::OpenLiveVariant;
pub use state::{ClientStats, LinkState};
pub use variant::{
    AuthPayloadBuilder, AuxAction, AuxResult, CommandHandlerTable, Enrichment, RoomBootstrapper,
    UrlSelector, Variant,
};

pub use blivechat_command as command;
pub use blivechat_protocol as protocol;
pub use blivechat_session as session;
pub use blivechat_timer as timer;
pub use blivechat_transport as transport;

pub mod prelude {
    pub use crate::{
        ChatClient, ChatClientBuilder, ChatError, ClientConfig, ClientStats, DirectWebConfig,
        LinkState, OpenLiveConfig, RelayConfig, SyntheticConfig,
    };
    pub use blivechat_command::{
        channel_handler, ChatMessage, FatalError, FatalErrorKind, GiftMessage, MembershipMessage,
        MessageHandler, SuperChatDelete, SuperChatMessage, TextMessage, TranslationUpdate,
    };
    pub use blivechat_session::{ApiConfig, HttpLiveApi, LiveApi, RoomKey};
    pub use blivechat_timer::{visibility, BackoffConfig, VisibilityHandle};
    pub use blivechat_transport::WebSocketConnector;
}

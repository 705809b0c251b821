//! Everything a chat client needs from outside the socket.
//!
//! Before it can connect, a client has to know where to connect and how
//! to authenticate. That knowledge comes from the backend HTTP API:
//!
//! 1. **Room bootstrap**: `room_info` resolves the real room id, the
//!    owner and the chat servers ([`LiveApi`])
//! 2. **Game sessions**: the open platform authorizes connections through
//!    a start/heartbeat/end session ([`GameSession`], [`GameHeartbeatTracker`])
//! 3. **Endpoint health**: requests go to the first backend whose circuit
//!    breaker is closed ([`EndpointSelector`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Client Layer (above)  ← bootstraps rooms, keeps game sessions alive
//!     ↕
//! Session Layer (this crate)  ← talks HTTP to the backend
//! ```

#![allow(async_fn_in_trait)]

mod api;
mod config;
mod endpoint;
mod error;
mod game;
mod room_key;

pub use api::{
    AnchorInfo, ApiStatus, GameInfo, HostServer, HttpLiveApi, LiveApi, RoomInfo, StartGameData,
    StartGameResponse, TextEmoticonMapping, WebsocketInfo,
};
pub use config::ApiConfig;
pub use endpoint::{BreakerState, EndpointSelector};
pub use error::SessionError;
pub use game::{
    end_game_succeeded, GameHeartbeatPolicy, GameHeartbeatTracker, GameSession, HeartbeatVerdict,
    CODE_AUTH_CODE_INVALID, CODE_GAME_ALREADY_ENDED, CODE_GAME_EXPIRED,
    DEFAULT_GAME_HEARTBEAT_INTERVAL,
};
pub use room_key::{mask, RoomKey};

//! The direct web connection: the same socket the live room's web page
//! opens, authenticated anonymously.

use std::sync::Arc;

use blivechat_command::{web_table, ChatMessage, CommandTable, RoomContext};
use blivechat_protocol::{Codec, JsonCodec, ProtocolError};
use blivechat_session::{HostServer, LiveApi};
use futures_util::FutureExt;
use serde::Serialize;
use tracing::{info, warn};

use crate::variant::{
    AuthPayloadBuilder, CommandHandlerTable, Enrichment, RoomBootstrapper, UrlSelector, Variant,
};
use crate::{AvatarResolver, BootstrapError, DirectWebConfig};

/// Body of the web auth frame.
#[derive(Debug, Serialize)]
struct WebAuthPayload<'a> {
    uid: u64,
    roomid: u64,
    protover: u8,
    platform: &'static str,
    #[serde(rename = "type")]
    kind: u8,
    buvid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
}

/// [`Variant`] for the direct web connection.
///
/// Bootstrap asks the backend for the real room id, the owner and the
/// chat servers. If that fails the public load-balanced host and the
/// requested room id are used, so bootstrap itself never fails.
pub struct DirectWebVariant<A> {
    api: Arc<A>,
    config: DirectWebConfig,
    room: RoomContext,
    host_servers: Vec<HostServer>,
    host_server_token: Option<String>,
    buvid: String,
    table: CommandTable<&'static str>,
    avatars: Option<Arc<AvatarResolver<A>>>,
}

impl<A: LiveApi> DirectWebVariant<A> {
    pub fn new(config: DirectWebConfig, api: Arc<A>) -> Self {
        let avatars = config
            .resolve_avatars
            .then(|| Arc::new(AvatarResolver::new(Arc::clone(&api))));
        Self {
            room: RoomContext::new(config.room_id),
            host_servers: vec![HostServer::fallback()],
            host_server_token: None,
            buvid: String::new(),
            table: web_table(),
            api,
            config,
            avatars,
        }
    }
}

impl<A: LiveApi> RoomBootstrapper for DirectWebVariant<A> {
    async fn bootstrap(&mut self) -> Result<(), BootstrapError> {
        let info = match self.api.room_info(self.config.room_id).await {
            Ok(info) => info,
            Err(e) => {
                warn!(room_id = self.config.room_id, error = %e, "room_info failed, using defaults");
                return Ok(());
            }
        };
        let mut room = RoomContext::new(info.room_id);
        if info.owner_uid != 0 {
            room = room.with_owner(info.owner_uid.to_string());
        }
        self.room = room;
        if !info.host_server_list.is_empty() {
            self.host_servers = info.host_server_list;
        }
        self.host_server_token = info.host_server_token;
        self.buvid = info.buvid.unwrap_or_default();
        info!(
            requested = self.config.room_id,
            room_id = self.room.room_id,
            hosts = self.host_servers.len(),
            "room info loaded"
        );
        Ok(())
    }
}

impl<A> AuthPayloadBuilder for DirectWebVariant<A> {
    fn auth_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        JsonCodec.encode(&WebAuthPayload {
            uid: 0,
            roomid: self.room.room_id,
            protover: 3,
            platform: "web",
            kind: 2,
            buvid: &self.buvid,
            key: self.host_server_token.as_deref(),
        })
    }
}

impl<A> UrlSelector for DirectWebVariant<A> {
    fn candidate_count(&self) -> usize {
        self.host_servers.len()
    }

    fn url(&self, retry_count: u32) -> Option<String> {
        if self.host_servers.is_empty() {
            return None;
        }
        let server = &self.host_servers[retry_count as usize % self.host_servers.len()];
        Some(server.wss_url())
    }
}

impl<A> CommandHandlerTable for DirectWebVariant<A> {
    fn command_table(&self) -> &CommandTable<&'static str> {
        &self.table
    }

    fn room_context(&self) -> &RoomContext {
        &self.room
    }
}

impl<A: LiveApi> Variant for DirectWebVariant<A> {
    fn name(&self) -> &'static str {
        "direct_web"
    }

    fn reinit_period(&self) -> Option<u32> {
        Some(self.host_servers.len().max(3) as u32)
    }

    fn is_fatal_auth_code(&self, code: i64) -> bool {
        self.config.fatal_auth_codes.contains(&code)
    }

    fn enrich(&self, mut msg: ChatMessage) -> Enrichment {
        let Some(avatars) = &self.avatars else {
            return Enrichment::Ready(msg);
        };
        if avatars.fill_cached(&mut msg) {
            return Enrichment::Ready(msg);
        }
        let avatars = Arc::clone(avatars);
        Enrichment::Pending(async move { avatars.fill(msg).await }.boxed())
    }
}

#[cfg(test)]
mod tests {
    use blivechat_session::{
        ApiStatus, RoomInfo, SessionError, StartGameResponse, TextEmoticonMapping,
    };
    use serde_json::{json, Value};

    use super::*;

    /// `room_info` answers from a fixed result; everything else fails.
    struct FixedRoom(Option<RoomInfo>);

    impl LiveApi for FixedRoom {
        async fn room_info(&self, _room_id: u64) -> Result<RoomInfo, SessionError> {
            self.0.clone().ok_or(SessionError::NoEndpoint)
        }

        async fn avatar_url(&self, _uid: u64, _name: Option<&str>) -> Result<String, SessionError> {
            Err(SessionError::NoEndpoint)
        }

        async fn text_emoticon_mappings(&self) -> Result<Vec<TextEmoticonMapping>, SessionError> {
            Err(SessionError::NoEndpoint)
        }

        async fn start_game(&self, _code: &str, _app_id: u64) -> Result<StartGameResponse, SessionError> {
            Err(SessionError::NoEndpoint)
        }

        async fn end_game(&self, _app_id: u64, _game_id: &str) -> Result<ApiStatus, SessionError> {
            Err(SessionError::NoEndpoint)
        }

        async fn game_heartbeat(&self, _game_id: &str) -> Result<ApiStatus, SessionError> {
            Err(SessionError::NoEndpoint)
        }
    }

    fn host(name: &str) -> HostServer {
        HostServer {
            host: name.into(),
            port: 2243,
            wss_port: 443,
            ws_port: 2244,
        }
    }

    fn variant(info: Option<RoomInfo>) -> DirectWebVariant<FixedRoom> {
        DirectWebVariant::new(DirectWebConfig::new(123), Arc::new(FixedRoom(info)))
    }

    fn auth_json(v: &DirectWebVariant<FixedRoom>) -> Value {
        serde_json::from_slice(&v.auth_payload().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_failure_keeps_defaults() {
        let mut v = variant(None);
        v.bootstrap().await.unwrap();
        assert_eq!(v.room_context().room_id, 123);
        assert_eq!(
            v.url(0).as_deref(),
            Some("wss://broadcastlv.chat.bilibili.com:443/sub")
        );
        assert_eq!(
            auth_json(&v),
            json!({"uid": 0, "roomid": 123, "protover": 3, "platform": "web", "type": 2, "buvid": ""})
        );
    }

    #[tokio::test]
    async fn test_bootstrap_applies_room_info() {
        let mut v = variant(Some(RoomInfo {
            room_id: 21396545,
            owner_uid: 7,
            host_server_list: vec![host("a"), host("b")],
            host_server_token: Some("tok".into()),
            buvid: Some("bv".into()),
        }));
        v.bootstrap().await.unwrap();

        assert_eq!(v.room_context().room_id, 21396545);
        assert!(v.room_context().is_owner("7"));
        assert_eq!(v.candidate_count(), 2);
        assert_eq!(v.url(0).as_deref(), Some("wss://a:443/sub"));
        assert_eq!(v.url(1).as_deref(), Some("wss://b:443/sub"));
        assert_eq!(v.url(2).as_deref(), Some("wss://a:443/sub"));

        let auth = auth_json(&v);
        assert_eq!(auth["roomid"], 21396545);
        assert_eq!(auth["key"], "tok");
        assert_eq!(auth["buvid"], "bv");
    }

    #[tokio::test]
    async fn test_empty_host_list_keeps_fallback() {
        let mut v = variant(Some(RoomInfo {
            room_id: 5,
            owner_uid: 0,
            host_server_list: Vec::new(),
            host_server_token: None,
            buvid: None,
        }));
        v.bootstrap().await.unwrap();
        assert_eq!(v.candidate_count(), 1);
        assert_eq!(v.room_context().owner_uid, None);
        assert!(auth_json(&v).get("key").is_none());
    }

    #[test]
    fn test_reinit_period_at_least_three() {
        let mut v = variant(None);
        assert_eq!(v.reinit_period(), Some(3));
        v.host_servers = (0..5).map(|i| host(&i.to_string())).collect();
        assert_eq!(v.reinit_period(), Some(5));
    }

    #[test]
    fn test_fatal_auth_codes_from_config() {
        let mut config = DirectWebConfig::new(1);
        config.fatal_auth_codes = vec![-101];
        let v = DirectWebVariant::new(config, Arc::new(FixedRoom(None)));
        assert!(v.is_fatal_auth_code(-101));
        assert!(!v.is_fatal_auth_code(-1));
    }
}

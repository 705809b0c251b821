//! The backend HTTP API the chat clients depend on.
//!
//! [`LiveApi`] is the seam: the state machine only ever talks to the
//! trait, production wires in [`HttpLiveApi`], and tests use an in-memory
//! fake. Response shapes mirror the backend's JSON exactly.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{ApiConfig, EndpointSelector, SessionError};

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// One chat-casting server the direct web connection can use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostServer {
    pub host: String,
    pub port: u16,
    pub wss_port: u16,
    pub ws_port: u16,
}

impl HostServer {
    /// The public load-balanced host, used when bootstrap fails.
    pub fn fallback() -> Self {
        Self {
            host: "broadcastlv.chat.bilibili.com".to_owned(),
            port: 2243,
            wss_port: 443,
            ws_port: 2244,
        }
    }

    pub fn wss_url(&self) -> String {
        format!("wss://{}:{}/sub", self.host, self.wss_port)
    }
}

/// `GET /api/room_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    /// The real room id; the requested one may be a short alias.
    pub room_id: u64,
    /// `0` when the backend could not find out.
    #[serde(default)]
    pub owner_uid: u64,
    #[serde(default)]
    pub host_server_list: Vec<HostServer>,
    #[serde(default)]
    pub host_server_token: Option<String>,
    #[serde(default)]
    pub buvid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvatarUrlResponse {
    avatar_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextEmoticonsResponse {
    #[serde(default)]
    text_emoticons: Vec<TextEmoticonMapping>,
}

/// A `[keyword, url]` pair from `GET /api/text_emoticon_mappings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEmoticonMapping(pub String, pub String);

/// The status part every open-platform response carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: String,
}

impl ApiStatus {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_code(code: i64) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// `POST /api/open_live/start_game`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGameResponse {
    #[serde(flatten)]
    pub status: ApiStatus,
    #[serde(default)]
    pub data: Option<StartGameData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGameData {
    pub game_info: GameInfo,
    pub websocket_info: WebsocketInfo,
    pub anchor_info: AnchorInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    /// Empty when the app is not a "game" and needs no heartbeat.
    #[serde(default)]
    pub game_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsocketInfo {
    pub auth_body: String,
    pub wss_link: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorInfo {
    #[serde(default)]
    pub room_id: u64,
    #[serde(default)]
    pub uid: u64,
    #[serde(default)]
    pub open_id: String,
}

// ---------------------------------------------------------------------------
// LiveApi
// ---------------------------------------------------------------------------

/// The backend endpoints the chat clients call.
///
/// Implementations must be shareable between the client task and the
/// auxiliary tasks it spawns, hence `Send + Sync + 'static`.
pub trait LiveApi: Send + Sync + 'static {
    /// Resolves a (possibly short) room id to its real id, owner and
    /// chat servers.
    fn room_info(&self, room_id: u64)
    -> impl Future<Output = Result<RoomInfo, SessionError>> + Send;

    /// Looks up a user's avatar.
    fn avatar_url(
        &self,
        uid: u64,
        username: Option<&str>,
    ) -> impl Future<Output = Result<String, SessionError>> + Send;

    fn text_emoticon_mappings(
        &self,
    ) -> impl Future<Output = Result<Vec<TextEmoticonMapping>, SessionError>> + Send;

    /// Opens an open-platform game session with the room owner's auth
    /// code. Business codes are returned in the response, not as errors.
    fn start_game(
        &self,
        code: &str,
        app_id: u64,
    ) -> impl Future<Output = Result<StartGameResponse, SessionError>> + Send;

    fn end_game(
        &self,
        app_id: u64,
        game_id: &str,
    ) -> impl Future<Output = Result<ApiStatus, SessionError>> + Send;

    fn game_heartbeat(
        &self,
        game_id: &str,
    ) -> impl Future<Output = Result<ApiStatus, SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// HttpLiveApi
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct StartGameRequest<'a> {
    code: &'a str,
    app_id: u64,
}

#[derive(Serialize)]
struct EndGameRequest<'a> {
    app_id: u64,
    game_id: &'a str,
}

#[derive(Serialize)]
struct GameHeartbeatRequest<'a> {
    game_id: &'a str,
}

/// [`LiveApi`] over HTTP, spreading requests across the configured base
/// URLs with an [`EndpointSelector`].
#[derive(Debug)]
pub struct HttpLiveApi {
    client: reqwest::Client,
    endpoints: Mutex<EndpointSelector>,
}

impl HttpLiveApi {
    pub fn new(config: ApiConfig) -> Result<Self, SessionError> {
        let config = config.validated();
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| SessionError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self {
            client,
            endpoints: Mutex::new(EndpointSelector::new(
                config.base_urls,
                config.breaker_threshold,
                config.breaker_cooldown,
            )),
        })
    }

    fn select_endpoint(&self) -> Result<String, SessionError> {
        self.endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .select()
            .ok_or(SessionError::NoEndpoint)
    }

    fn report(&self, base: &str, ok: bool) {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
        if ok {
            endpoints.report_success(base);
        } else {
            endpoints.report_failure(base);
        }
    }

    /// Sends `request` against the selected endpoint and decodes the JSON
    /// body, feeding the outcome back into the endpoint's breaker.
    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        build: impl FnOnce(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    ) -> Result<T, SessionError> {
        let base = self.select_endpoint()?;
        let url = format!("{base}{path}");
        let result = async {
            build(&self.client, &url)
                .send()
                .await?
                .error_for_status()?
                .json::<T>()
                .await
        }
        .await;
        self.report(&base, result.is_ok());
        result.map_err(|source| {
            tracing::warn!(%url, error = %source, "API request failed");
            SessionError::Http { url, source }
        })
    }
}

impl LiveApi for HttpLiveApi {
    async fn room_info(&self, room_id: u64) -> Result<RoomInfo, SessionError> {
        self.send("/api/room_info", |client, url| {
            client.get(url).query(&[("roomId", room_id)])
        })
        .await
    }

    async fn avatar_url(&self, uid: u64, username: Option<&str>) -> Result<String, SessionError> {
        let mut query = vec![("uid", uid.to_string())];
        if let Some(username) = username {
            query.push(("username", username.to_owned()));
        }
        let res: AvatarUrlResponse = self
            .send("/api/avatar_url", |client, url| client.get(url).query(&query))
            .await?;
        Ok(res.avatar_url)
    }

    async fn text_emoticon_mappings(&self) -> Result<Vec<TextEmoticonMapping>, SessionError> {
        let res: TextEmoticonsResponse = self
            .send("/api/text_emoticon_mappings", |client, url| client.get(url))
            .await?;
        Ok(res.text_emoticons)
    }

    async fn start_game(&self, code: &str, app_id: u64) -> Result<StartGameResponse, SessionError> {
        self.send("/api/open_live/start_game", |client, url| {
            client.post(url).json(&StartGameRequest { code, app_id })
        })
        .await
    }

    async fn end_game(&self, app_id: u64, game_id: &str) -> Result<ApiStatus, SessionError> {
        self.send("/api/open_live/end_game", |client, url| {
            client.post(url).json(&EndGameRequest { app_id, game_id })
        })
        .await
    }

    async fn game_heartbeat(&self, game_id: &str) -> Result<ApiStatus, SessionError> {
        self.send("/api/open_live/game_heartbeat", |client, url| {
            client.post(url).json(&GameHeartbeatRequest { game_id })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_room_info_shape() {
        let info: RoomInfo = serde_json::from_value(json!({
            "roomId": 21396545,
            "ownerUid": 1,
            "hostServerList": [
                {"host": "a.chat.bilibili.com", "port": 2243, "wss_port": 443, "ws_port": 2244}
            ],
            "hostServerToken": "tok"
        }))
        .unwrap();
        assert_eq!(info.room_id, 21396545);
        assert_eq!(info.host_server_list[0].wss_url(), "wss://a.chat.bilibili.com:443/sub");
        assert_eq!(info.host_server_token.as_deref(), Some("tok"));
        assert_eq!(info.buvid, None);
    }

    #[test]
    fn test_fallback_host() {
        assert_eq!(
            HostServer::fallback().wss_url(),
            "wss://broadcastlv.chat.bilibili.com:443/sub"
        );
    }

    #[test]
    fn test_start_game_shape() {
        let res: StartGameResponse = serde_json::from_value(json!({
            "code": 0,
            "message": "0",
            "request_id": "r1",
            "data": {
                "game_info": {"game_id": "g-1"},
                "websocket_info": {"auth_body": "{\"k\":1}", "wss_link": ["wss://x/sub"]},
                "anchor_info": {"room_id": 5, "uid": 0, "open_id": "anchor"}
            }
        }))
        .unwrap();
        assert!(res.status.is_ok());
        let data = res.data.unwrap();
        assert_eq!(data.game_info.game_id, "g-1");
        assert_eq!(data.websocket_info.wss_link, vec!["wss://x/sub"]);
        assert_eq!(data.anchor_info.open_id, "anchor");
    }

    #[test]
    fn test_start_game_error_has_no_data() {
        let res: StartGameResponse =
            serde_json::from_value(json!({"code": 7007, "message": "bad code", "data": null}))
                .unwrap();
        assert_eq!(res.status.code, 7007);
        assert!(res.data.is_none());
    }

    #[test]
    fn test_text_emoticon_mappings_shape() {
        let res: TextEmoticonsResponse = serde_json::from_value(json!({
            "textEmoticons": [["[dog]", "//i0.hdslb.com/dog.png"]]
        }))
        .unwrap();
        assert_eq!(
            res.text_emoticons,
            vec![TextEmoticonMapping("[dog]".into(), "//i0.hdslb.com/dog.png".into())]
        );
    }

    #[tokio::test]
    async fn test_http_api_without_endpoints_fails_fast() {
        let api = HttpLiveApi::new(ApiConfig {
            base_urls: Vec::new(),
            ..ApiConfig::default()
        })
        .unwrap();
        assert!(matches!(api.room_info(1).await, Err(SessionError::NoEndpoint)));
    }
}

//! The open-platform connection, authorized by a game session.
//!
//! Bootstrap starts a game with the room owner's auth code and receives
//! the socket URLs plus an opaque auth body. While the game runs it must
//! be kept alive with game heartbeats every 20 s; those run as the
//! driver's auxiliary calls, and an expired game forces a full rebuild.
//! The game is ended when the client terminates.

use std::sync::Arc;

use blivechat_command::{open_live_table, ChatMessage, CommandTable, RoomContext, TextEmoticon};
use blivechat_protocol::ProtocolError;
use blivechat_session::{
    end_game_succeeded, mask, GameHeartbeatTracker, GameSession, HeartbeatVerdict, LiveApi,
};
use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use crate::variant::{
    AuthPayloadBuilder, AuxAction, AuxResult, CommandHandlerTable, Enrichment, RoomBootstrapper,
    UrlSelector, Variant,
};
use crate::{BootstrapError, OpenLiveConfig};

/// [`Variant`] for the open platform.
pub struct OpenLiveVariant<A> {
    api: Arc<A>,
    config: OpenLiveConfig,
    game: Option<GameSession>,
    room: RoomContext,
    tracker: GameHeartbeatTracker,
    table: CommandTable<&'static str>,
    /// `None` until the first attempt to load them.
    text_emoticons: Option<Vec<TextEmoticon>>,
}

impl<A: LiveApi> OpenLiveVariant<A> {
    pub fn new(config: OpenLiveConfig, api: Arc<A>) -> Self {
        let config = config.validated();
        Self {
            api,
            tracker: GameHeartbeatTracker::new(config.heartbeat_policy),
            config,
            game: None,
            room: RoomContext::default(),
            table: open_live_table(),
            text_emoticons: None,
        }
    }

    /// The running game, if bootstrap succeeded.
    pub fn game(&self) -> Option<&GameSession> {
        self.game.as_ref()
    }

    async fn load_text_emoticons(&mut self) {
        if !self.config.load_text_emoticons || self.text_emoticons.is_some() {
            return;
        }
        let emoticons = match self.api.text_emoticon_mappings().await {
            Ok(mappings) => mappings
                .into_iter()
                .map(|m| TextEmoticon {
                    keyword: m.0,
                    url: m.1,
                })
                .collect(),
            Err(e) => {
                debug!(error = %e, "text emoticons unavailable");
                Vec::new()
            }
        };
        self.text_emoticons = Some(emoticons);
    }
}

impl<A: LiveApi> RoomBootstrapper for OpenLiveVariant<A> {
    async fn bootstrap(&mut self) -> Result<(), BootstrapError> {
        let res = self
            .api
            .start_game(&self.config.auth_code, self.config.app_id)
            .await?;
        let game = GameSession::from_start_response(res)?;

        let mut room = RoomContext::new(game.room_id);
        if !game.anchor_uid.is_empty() {
            room = room.with_owner(game.anchor_uid.clone());
        }
        info!(
            auth_code = %mask(&self.config.auth_code),
            game_id = %game.game_id,
            room_id = game.room_id,
            links = game.wss_links.len(),
            "game started"
        );
        self.room = room;
        self.game = Some(game);
        self.tracker.reset();

        self.load_text_emoticons().await;
        Ok(())
    }
}

impl<A> AuthPayloadBuilder for OpenLiveVariant<A> {
    fn auth_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        match &self.game {
            Some(game) => Ok(game.auth_body.as_bytes().to_vec()),
            None => Err(ProtocolError::InvalidMessage("no game session".into())),
        }
    }
}

impl<A> UrlSelector for OpenLiveVariant<A> {
    fn candidate_count(&self) -> usize {
        self.game.as_ref().map_or(0, |g| g.wss_links.len())
    }

    fn url(&self, retry_count: u32) -> Option<String> {
        let links = &self.game.as_ref()?.wss_links;
        if links.is_empty() {
            return None;
        }
        Some(links[retry_count as usize % links.len()].clone())
    }
}

impl<A> CommandHandlerTable for OpenLiveVariant<A> {
    fn command_table(&self) -> &CommandTable<&'static str> {
        &self.table
    }

    fn room_context(&self) -> &RoomContext {
        &self.room
    }
}

impl<A: LiveApi> Variant for OpenLiveVariant<A> {
    fn name(&self) -> &'static str {
        "open_live"
    }

    fn reinit_period(&self) -> Option<u32> {
        Some(self.candidate_count().max(3) as u32)
    }

    fn is_fatal_auth_code(&self, code: i64) -> bool {
        self.config.fatal_auth_codes.contains(&code)
    }

    fn enrich(&self, mut msg: ChatMessage) -> Enrichment {
        if let (ChatMessage::AddText(text), Some(emoticons)) = (&mut msg, &self.text_emoticons) {
            if text.text_emoticons.is_empty() && text.emoticon_image_url.is_none() {
                text.text_emoticons = emoticons
                    .iter()
                    .filter(|e| text.content.contains(e.keyword.as_str()))
                    .cloned()
                    .collect();
            }
        }
        Enrichment::Ready(msg)
    }

    fn aux_interval(&self) -> Option<std::time::Duration> {
        self.game
            .as_ref()
            .filter(|g| g.needs_heartbeat())
            .map(|_| self.config.game_heartbeat_interval)
    }

    fn aux_call(&self) -> Option<BoxFuture<'static, AuxResult>> {
        let game_id = self.game.as_ref().filter(|g| g.needs_heartbeat())?.game_id.clone();
        let api = Arc::clone(&self.api);
        Some(async move { api.game_heartbeat(&game_id).await }.boxed())
    }

    fn on_aux_result(&mut self, result: AuxResult) -> AuxAction {
        let verdict = self.tracker.record(&result);
        match (&result, verdict) {
            (_, HeartbeatVerdict::Healthy) => {
                debug!("game heartbeat ok");
                AuxAction::Continue
            }
            (Ok(status), HeartbeatVerdict::Tolerated) => {
                warn!(code = status.code, message = %status.message, failures = self.tracker.consecutive_failures(), "game heartbeat rejected");
                AuxAction::Continue
            }
            (Err(e), HeartbeatVerdict::Tolerated) => {
                warn!(error = %e, failures = self.tracker.consecutive_failures(), "game heartbeat failed");
                AuxAction::Continue
            }
            (_, HeartbeatVerdict::Rebuild) => AuxAction::Rebuild,
        }
    }

    async fn shutdown(&mut self) {
        let Some(game) = self.game.take() else {
            return;
        };
        if !game.needs_heartbeat() {
            return;
        }
        match self.api.end_game(self.config.app_id, &game.game_id).await {
            Ok(status) if end_game_succeeded(&status) => {
                info!(game_id = %game.game_id, "game ended");
            }
            Ok(status) => {
                warn!(game_id = %game.game_id, code = status.code, message = %status.message, "end_game rejected");
            }
            Err(e) => warn!(game_id = %game.game_id, error = %e, "end_game failed"),
        }
    }
}

//! The relay client: JSON text frames instead of the binary protocol.
//!
//! The relay server has already normalized upstream traffic. It drives
//! liveness itself by sending heartbeats, which the client answers at
//! once; a client-side timer would be throttled in a background tab.
//! Silence longer than the receive timeout drops the socket, and
//! reconnects follow the same backoff and retry ceiling as the binary
//! clients.

use blivechat_command::{relay_table, ChatMessage, CommandTable, MessageHandler, RoomContext};
use blivechat_protocol::{ProtocolError, RelayCommand, RelayEnvelope};
use blivechat_session::RoomKey;
use blivechat_timer::{Backoff, Watchdog};
use blivechat_transport::{Connection, Connector, WireMessage};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::link::{CloseVerdict, Link};
use crate::{LinkState, RelayConfig};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoom<'a> {
    room_key: &'a RoomKey,
    config: JoinRoomOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomOptions {
    auto_translate: bool,
}

/// How one relay connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    /// Socket lost or never opened; take the close path.
    Closed,
    /// `stop()` was requested.
    Stopped,
    /// A fatal error was delivered.
    Fatal,
}

pub(crate) struct RelayDriver<C, H> {
    config: RelayConfig,
    connector: C,
    link: Link<H>,
    table: CommandTable<RelayCommand>,
    room: RoomContext,
    backoff: Backoff,
    watchdog: Watchdog,
}

impl<C, H> RelayDriver<C, H>
where
    C: Connector,
    H: MessageHandler,
{
    pub(crate) fn new(config: RelayConfig, connector: C, link: Link<H>) -> Self {
        let config = config.validated();
        Self {
            room: RoomContext::new(config.room.room_id().unwrap_or(0)),
            backoff: Backoff::new(config.backoff.clone()),
            watchdog: Watchdog::new(config.receive_timeout),
            table: relay_table(),
            config,
            connector,
            link,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(client = self.link.name(), room = %self.config.room, url = %self.config.url, "client started");
        self.link.set_state(LinkState::Connecting);
        loop {
            match self.connect_once().await {
                Ended::Stopped | Ended::Fatal => break,
                Ended::Closed => {}
            }

            self.watchdog.disarm();
            match self.link.record_close(self.config.max_total_retries) {
                CloseVerdict::Stopped => break,
                CloseVerdict::GiveUp(fatal) => {
                    self.link.deliver_fatal(fatal);
                    break;
                }
                CloseVerdict::Retry => {}
            }
            let delay = self.backoff.delay(self.link.stats.total_retry_count);
            if !self.link.wait_reconnect(delay).await {
                break;
            }
            self.link.set_state(LinkState::Connecting);
        }
        self.watchdog.disarm();
        self.link.terminate();
    }

    async fn connect_once(&mut self) -> Ended {
        if self.link.is_stopping() {
            return Ended::Stopped;
        }
        let result = tokio::select! {
            result = self.connector.connect(&self.config.url) => result,
            () = self.link.stopped() => return Ended::Stopped,
        };
        match result {
            Ok(conn) => self.run_connection(conn).await,
            Err(e) => {
                warn!(client = self.link.name(), url = %self.config.url, error = %e, "connect failed");
                Ended::Closed
            }
        }
    }

    async fn run_connection(&mut self, conn: C::Connection) -> Ended {
        self.link.stats.connections_opened += 1;
        self.link.reset_retry_count();
        self.link.set_state(LinkState::Live);
        info!(client = self.link.name(), connection = %conn.id(), "socket open");

        let join = JoinRoom {
            room_key: &self.config.room,
            config: JoinRoomOptions {
                auto_translate: self.config.auto_translate,
            },
        };
        let join = serde_json::to_value(&join)
            .map_err(ProtocolError::Encode)
            .and_then(|data| RelayEnvelope::new(RelayCommand::JoinRoom, data).to_text());
        let join = match join {
            Ok(text) => text,
            Err(e) => {
                warn!(client = self.link.name(), error = %e, "cannot build joinRoom");
                return Ended::Closed;
            }
        };
        if let Err(e) = conn.send(WireMessage::Text(join)).await {
            warn!(client = self.link.name(), error = %e, "sending joinRoom failed");
            return Ended::Closed;
        }
        self.reset_watchdog();

        loop {
            tokio::select! {
                () = self.link.stopped() => {
                    let _ = conn.close().await;
                    return Ended::Stopped;
                }
                msg = conn.recv() => match msg {
                    Ok(Some(WireMessage::Text(text))) => {
                        if let Some(end) = self.on_text(&conn, &text).await {
                            return end;
                        }
                    }
                    Ok(Some(WireMessage::Binary(buf))) => {
                        debug!(client = self.link.name(), len = buf.len(), "ignoring binary message");
                    }
                    Ok(None) => {
                        info!(client = self.link.name(), "socket closed by peer");
                        return Ended::Closed;
                    }
                    Err(e) => {
                        warn!(client = self.link.name(), error = %e, "socket error");
                        return Ended::Closed;
                    }
                },
                () = self.watchdog.expired() => {
                    warn!(
                        client = self.link.name(),
                        timeout_ms = self.watchdog.timeout().as_millis() as u64,
                        "receive timeout, discarding socket"
                    );
                    return Ended::Closed;
                }
            }
        }
    }

    /// Handles one text frame. `Some` ends the connection.
    async fn on_text(&mut self, conn: &C::Connection, text: &str) -> Option<Ended> {
        self.reset_watchdog();
        let envelope = match RelayEnvelope::from_text(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(client = self.link.name(), error = %e, len = text.len(), "dropping malformed relay message");
                return None;
            }
        };

        match envelope.cmd {
            RelayCommand::Heartbeat => {
                let reply = RelayEnvelope::new(RelayCommand::Heartbeat, Value::Null).to_text();
                match reply {
                    Ok(reply) => {
                        if let Err(e) = conn.send(WireMessage::Text(reply)).await {
                            warn!(client = self.link.name(), error = %e, "heartbeat reply failed");
                            return Some(Ended::Closed);
                        }
                    }
                    Err(e) => warn!(client = self.link.name(), error = %e, "cannot encode heartbeat"),
                }
            }
            RelayCommand::JoinRoom => {
                debug!(client = self.link.name(), "ignoring joinRoom from server");
            }
            cmd => {
                let msg = self.table.dispatch(&cmd, &envelope.data, &self.room)?;
                if let ChatMessage::Fatal(fatal) = msg {
                    self.link.deliver_fatal(fatal);
                    return Some(Ended::Fatal);
                }
                self.link.deliver(msg);
                self.link.publish();
            }
        }
        None
    }

    fn reset_watchdog(&mut self) {
        self.watchdog.reset();
        self.link.count_watchdog_reset();
    }
}

//! The connection driver shared by the binary-protocol variants.
//!
//! One driver runs as one tokio task and owns everything mutable about a
//! client: the socket, the heartbeat interval, the receive watchdog, the
//! auxiliary timer and the retry counters. `tokio::select!` loops
//! multiplex them, which keeps the original event-loop model: only one
//! thing happens at a time and nothing needs a lock.
//!
//! ```text
//!            ┌────────── retry (backoff, visibility) ──────────┐
//!            ▼                                                 │
//! Idle → Connecting ──bootstrap?──► connect ──► Authenticating ┤
//!            │                                      │ code 0   │
//!            │ fatal                                ▼          │
//!            └──────────► Terminated ◄──────────── Live ───────┘
//! ```
//!
//! Every inbound frame resets the watchdog, including frames that decode
//! to nothing. A business packet resets `retry_count`, which picks the
//! next endpoint, but never `total_retry_count`, which drives the backoff
//! and the retry ceiling.
//!
//! Two kinds of work outlive a single socket and live in the [`Sidecar`]:
//!
//! - Auxiliary calls (the open platform's game heartbeat). They keep
//!   ticking while the socket is down, during backoff, connect attempts
//!   and a hidden host, since the game expires upstream regardless. Each
//!   call runs as a spawned task tagged with the bootstrap epoch it
//!   belongs to; a result from before the latest bootstrap is dropped.
//! - Messages waiting on a lookup (a missing avatar). They are polled
//!   alongside the socket instead of inline, and delivered in arrival
//!   order.
//!
//! Bootstrap itself holds the variant, so sidecar work waits for it.

use std::time::Duration;

use blivechat_command::{ChatMessage, FatalError, FatalErrorKind, MessageHandler};
use blivechat_protocol::{
    encode_frame, heartbeat_frame, FrameDecoder, Operation, Packet, AUTH_REPLY_CODE_OK,
};
use blivechat_timer::{Backoff, Interval, Watchdog};
use blivechat_transport::{Connection, Connector, WireMessage};
use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{FuturesOrdered, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::link::{CloseVerdict, Link};
use crate::variant::{AuxAction, AuxResult, Enrichment, Variant};
use crate::{BootstrapError, ClientConfig, LinkState};

/// How one connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    /// Socket lost or never opened; take the close path.
    Closed,
    /// `stop()` was requested.
    Stopped,
    /// A fatal error was delivered.
    Fatal,
}

// ---------------------------------------------------------------------------
// Sidecar
// ---------------------------------------------------------------------------

enum SideEvent {
    AuxDue,
    AuxDone(u64, AuxResult),
    Enriched(ChatMessage),
}

/// Auxiliary calls and pending enrichments.
struct Sidecar {
    /// Bumped by every successful bootstrap.
    epoch: u64,
    timer: Interval,
    tx: mpsc::UnboundedSender<(u64, AuxResult)>,
    rx: mpsc::UnboundedReceiver<(u64, AuxResult)>,
    enriching: FuturesOrdered<BoxFuture<'static, ChatMessage>>,
}

impl Sidecar {
    fn new(period: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            epoch: 0,
            timer: Interval::new(period),
            tx,
            rx,
            enriching: FuturesOrdered::new(),
        }
    }

    /// Waits for the next event. Cancel-safe.
    async fn next(&mut self) -> SideEvent {
        tokio::select! {
            Some(msg) = self.enriching.next(), if !self.enriching.is_empty() => SideEvent::Enriched(msg),
            Some((epoch, result)) = self.rx.recv() => SideEvent::AuxDone(epoch, result),
            _ = self.timer.tick() => SideEvent::AuxDue,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub(crate) struct Driver<V, C, H> {
    variant: V,
    connector: C,
    link: Link<H>,
    config: ClientConfig,
    decoder: FrameDecoder,
    backoff: Backoff,
    heartbeat: Interval,
    watchdog: Watchdog,
    side: Sidecar,
    needs_bootstrap: bool,
}

impl<V, C, H> Driver<V, C, H>
where
    V: Variant,
    C: Connector,
    H: MessageHandler,
{
    pub(crate) fn new(variant: V, connector: C, link: Link<H>, config: ClientConfig) -> Self {
        let config = config.validated();
        Self {
            variant,
            connector,
            link,
            decoder: FrameDecoder::default(),
            backoff: Backoff::new(config.backoff.clone()),
            heartbeat: Interval::new(config.heartbeat_interval),
            watchdog: Watchdog::new(config.receive_timeout()),
            side: Sidecar::new(config.heartbeat_interval),
            needs_bootstrap: true,
            config,
        }
    }

    /// Runs until stopped or until a fatal error.
    pub(crate) async fn run(mut self) {
        info!(client = self.link.name(), "client started");
        self.link.set_state(LinkState::Connecting);
        loop {
            match self.connect_once().await {
                Ended::Stopped | Ended::Fatal => break,
                Ended::Closed => {}
            }

            self.clear_socket_timers();
            match self.link.record_close(self.config.max_total_retries) {
                CloseVerdict::Stopped => break,
                CloseVerdict::GiveUp(fatal) => {
                    self.link.deliver_fatal(fatal);
                    break;
                }
                CloseVerdict::Retry => {}
            }
            let delay = self.backoff.delay(self.link.stats.total_retry_count);
            if !self.wait_reconnect(delay).await {
                break;
            }
            self.link.set_state(LinkState::Connecting);
        }

        self.clear_socket_timers();
        self.side.timer.disarm();
        if !self.side.enriching.is_empty() {
            debug!(client = self.link.name(), pending = self.side.enriching.len(), "dropping messages awaiting lookup");
        }
        self.variant.shutdown().await;
        self.link.terminate();
    }

    /// Backoff, then the visibility deferral, with sidecar work running
    /// throughout. Returns `false` if stopped meanwhile.
    async fn wait_reconnect(&mut self, delay: Duration) -> bool {
        self.link.begin_reconnect(delay);
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => break,
                () = self.link.stopped() => return false,
                event = self.side.next() => {
                    self.on_side_event(event);
                }
            }
        }

        if let Some(mut gate) = self.link.hidden_gate() {
            loop {
                tokio::select! {
                    () = gate.wait_visible() => break,
                    () = self.link.stopped() => return false,
                    event = self.side.next() => {
                        self.on_side_event(event);
                    }
                }
            }
        }
        !self.link.is_stopping()
    }

    // -----------------------------------------------------------------------
    // Connecting
    // -----------------------------------------------------------------------

    async fn connect_once(&mut self) -> Ended {
        if self.link.is_stopping() {
            return Ended::Stopped;
        }
        let retry_count = self.link.stats.retry_count;
        if let Some(period) = self.variant.reinit_period() {
            if retry_count > 0 && retry_count % period.max(1) == 0 {
                debug!(client = self.link.name(), retry_count, "room info is stale");
                self.needs_bootstrap = true;
            }
        }

        if self.needs_bootstrap {
            let result = tokio::select! {
                result = self.variant.bootstrap() => result,
                () = self.link.stopped() => return Ended::Stopped,
            };
            // A stop during the await wins over whatever bootstrap returned.
            if self.link.is_stopping() {
                return Ended::Stopped;
            }
            match result {
                Ok(()) => self.on_bootstrapped(),
                Err(BootstrapError::Fatal(fatal)) => {
                    self.link.deliver_fatal(fatal);
                    return Ended::Fatal;
                }
                Err(err) => {
                    warn!(client = self.link.name(), error = %err, "bootstrap failed");
                    return Ended::Closed;
                }
            }
        }

        let Some(url) = self.variant.url(retry_count) else {
            warn!(client = self.link.name(), "no socket url known");
            self.needs_bootstrap = true;
            return Ended::Closed;
        };
        debug!(client = self.link.name(), url = %url, retry_count, "connecting");
        let result = {
            let connect = self.connector.connect(&url);
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    result = &mut connect => break result,
                    () = self.link.stopped() => return Ended::Stopped,
                    event = self.side.next() => {
                        let action = Self::apply_side_event(
                            &mut self.side,
                            &mut self.variant,
                            &mut self.link,
                            event,
                        );
                        if action == AuxAction::Rebuild {
                            self.needs_bootstrap = true;
                            return Ended::Closed;
                        }
                    }
                }
            }
        };
        match result {
            Ok(conn) => self.run_connection(conn).await,
            Err(e) => {
                warn!(client = self.link.name(), url = %url, error = %e, "connect failed");
                Ended::Closed
            }
        }
    }

    fn on_bootstrapped(&mut self) {
        self.needs_bootstrap = false;
        self.side.epoch += 1;
        match self.variant.aux_interval() {
            Some(period) => {
                self.side.timer = Interval::new(period);
                self.side.timer.arm();
            }
            None => self.side.timer.disarm(),
        }
        debug!(
            client = self.link.name(),
            epoch = self.side.epoch,
            room_id = self.variant.room_context().room_id,
            candidates = self.variant.candidate_count(),
            "bootstrap complete"
        );
    }

    // -----------------------------------------------------------------------
    // Connected
    // -----------------------------------------------------------------------

    async fn run_connection(&mut self, conn: C::Connection) -> Ended {
        self.link.stats.connections_opened += 1;
        self.link.set_state(LinkState::Authenticating);
        info!(client = self.link.name(), connection = %conn.id(), "socket open");

        let auth = match self.variant.auth_payload() {
            Ok(body) => encode_frame(Operation::Auth, &body),
            Err(e) => {
                warn!(client = self.link.name(), error = %e, "cannot build auth payload");
                return Ended::Closed;
            }
        };
        if let Err(e) = conn.send(WireMessage::Binary(auth)).await {
            warn!(client = self.link.name(), error = %e, "sending auth failed");
            return Ended::Closed;
        }
        self.heartbeat.arm();
        self.reset_watchdog();

        // Returning drops `conn`. A dead peer would stall a close
        // handshake, so only a requested stop closes gracefully.
        loop {
            tokio::select! {
                () = self.link.stopped() => {
                    let _ = conn.close().await;
                    return Ended::Stopped;
                }
                msg = conn.recv() => match msg {
                    Ok(Some(WireMessage::Binary(buf))) => {
                        if let Some(end) = self.on_buffer(&conn, &buf).await {
                            return end;
                        }
                    }
                    Ok(Some(WireMessage::Text(text))) => {
                        debug!(client = self.link.name(), len = text.len(), "ignoring text message");
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
                _ = self.heartbeat.tick() => {
                    if let Err(e) = conn.send(WireMessage::Binary(heartbeat_frame())).await {
                        warn!(client = self.link.name(), error = %e, "sending heartbeat failed");
                        return Ended::Closed;
                    }
                }
                () = self.watchdog.expired() => {
                    warn!(
                        client = self.link.name(),
                        timeout_ms = self.watchdog.timeout().as_millis() as u64,
                        "receive timeout, discarding socket"
                    );
                    return Ended::Closed;
                }
                event = self.side.next() => {
                    if self.on_side_event(event) == AuxAction::Rebuild {
                        return Ended::Closed;
                    }
                }
            }
        }
    }

    /// Handles one receive event. `Some` ends the connection.
    async fn on_buffer(&mut self, conn: &C::Connection, buf: &[u8]) -> Option<Ended> {
        let batch = match self.decoder.decode_batch(buf) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(client = self.link.name(), error = %e, len = buf.len(), "undecodable buffer, discarding socket");
                return Some(Ended::Closed);
            }
        };

        // Frames that decoded to nothing still prove the peer is alive.
        for _ in batch.packets.len()..batch.frames {
            self.reset_watchdog();
        }
        for packet in batch.packets {
            self.reset_watchdog();
            match packet {
                Packet::HeartbeatReply { popularity } => {
                    trace!(client = self.link.name(), ?popularity, "heartbeat reply");
                }
                Packet::AuthReply { code } if code == AUTH_REPLY_CODE_OK => {
                    self.link.set_state(LinkState::Live);
                    info!(client = self.link.name(), "authenticated");
                    if let Err(e) = conn.send(WireMessage::Binary(heartbeat_frame())).await {
                        warn!(client = self.link.name(), error = %e, "sending heartbeat failed");
                        return Some(Ended::Closed);
                    }
                    self.heartbeat.arm();
                }
                Packet::AuthReply { code } => {
                    if self.variant.is_fatal_auth_code(code) {
                        self.link.deliver_fatal(FatalError::new(
                            FatalErrorKind::AuthCodeInvalid,
                            format!("auth rejected with code {code}"),
                        ));
                        return Some(Ended::Fatal);
                    }
                    warn!(client = self.link.name(), code, "auth rejected, bootstrapping again");
                    self.needs_bootstrap = true;
                    return Some(Ended::Closed);
                }
                Packet::Business(command) => {
                    self.link.reset_retry_count();
                    let msg = self
                        .variant
                        .command_table()
                        .normalize(&command, self.variant.room_context());
                    if let Some(msg) = msg {
                        self.submit(msg);
                    }
                }
            }
        }
        self.link.publish();
        None
    }

    /// Delivers `msg` now, or queues it behind earlier messages still
    /// waiting on a lookup.
    fn submit(&mut self, msg: ChatMessage) {
        match self.variant.enrich(msg) {
            Enrichment::Ready(msg) if self.side.enriching.is_empty() => self.link.deliver(msg),
            Enrichment::Ready(msg) => self.side.enriching.push_back(future::ready(msg).boxed()),
            Enrichment::Pending(lookup) => {
                trace!(client = self.link.name(), queued = self.side.enriching.len(), "message waits on lookup");
                self.side.enriching.push_back(lookup);
            }
        }
    }

    fn reset_watchdog(&mut self) {
        self.watchdog.reset();
        self.link.count_watchdog_reset();
    }

    fn clear_socket_timers(&mut self) {
        self.heartbeat.disarm();
        self.watchdog.disarm();
    }

    // -----------------------------------------------------------------------
    // Sidecar events
    // -----------------------------------------------------------------------

    fn on_side_event(&mut self, event: SideEvent) -> AuxAction {
        let action = Self::apply_side_event(&mut self.side, &mut self.variant, &mut self.link, event);
        if action == AuxAction::Rebuild {
            self.needs_bootstrap = true;
        }
        action
    }

    /// Takes fields rather than `self` so it can run while a connect
    /// attempt borrows the connector.
    fn apply_side_event(
        side: &mut Sidecar,
        variant: &mut V,
        link: &mut Link<H>,
        event: SideEvent,
    ) -> AuxAction {
        match event {
            SideEvent::Enriched(msg) => {
                link.deliver(msg);
                link.publish();
                AuxAction::Continue
            }
            SideEvent::AuxDue => {
                if let Some(call) = variant.aux_call() {
                    let epoch = side.epoch;
                    let tx = side.tx.clone();
                    tokio::spawn(async move {
                        let result = call.await;
                        let _ = tx.send((epoch, result));
                    });
                }
                AuxAction::Continue
            }
            SideEvent::AuxDone(epoch, _) if epoch != side.epoch => {
                debug!(client = link.name(), epoch, current = side.epoch, "dropping stale auxiliary result");
                AuxAction::Continue
            }
            SideEvent::AuxDone(epoch, result) => {
                let action = variant.on_aux_result(result);
                if action == AuxAction::Rebuild {
                    warn!(client = link.name(), epoch, "auxiliary session lost, rebuilding");
                    // Nothing left to keep alive until the next bootstrap.
                    side.timer.disarm();
                }
                action
            }
        }
    }
}

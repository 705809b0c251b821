//! `ChatClient` handle and its builder.
//!
//! Building a client spawns its task right away; the returned handle is
//! the only way to talk to it. Dropping the handle stops the client as
//! well, so a caller that wants it to outlive the handle should `join()`.

use std::sync::Arc;

use blivechat_command::MessageHandler;
use blivechat_session::LiveApi;
use blivechat_timer::VisibilityGate;
use blivechat_transport::Connector;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::driver::Driver;
use crate::link::Link;
use crate::relay::RelayDriver;
use crate::synthetic::SyntheticDriver;
use crate::variant::Variant;
use crate::{
    ChatError, ClientConfig, ClientStats, DirectWebConfig, DirectWebVariant, OpenLiveConfig,
    OpenLiveVariant, RelayConfig, SyntheticConfig,
};

/// A running chat client.
///
/// # Example
///
/// ```rust,ignore
/// use blivechat::prelude::*;
///
/// let client = ChatClient::builder().direct_web(
///     DirectWebConfig::new(21396545),
///     api,
///     WebSocketConnector::default(),
///     my_handler,
/// );
/// // later
/// client.stop();
/// client.join().await?;
/// ```
#[derive(Debug)]
pub struct ChatClient {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    stats: watch::Receiver<ClientStats>,
    task: JoinHandle<()>,
}

impl ChatClient {
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::new()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Asks the client to stop. Safe to call in any state, any number of
    /// times. Returns without waiting; use [`join`](Self::join) for that.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            debug!(client = self.name, "stop requested");
        }
    }

    /// Whether the task has ended, by `stop()` or by a fatal error.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// The latest statistics snapshot.
    pub fn stats(&self) -> ClientStats {
        self.stats.borrow().clone()
    }

    /// A receiver notified on every statistics change.
    pub fn watch_stats(&self) -> watch::Receiver<ClientStats> {
        self.stats.clone()
    }

    /// Waits for the task to end.
    ///
    /// Does not stop the client by itself: a client that never hits a
    /// fatal error runs until [`stop`](Self::stop) is called elsewhere.
    ///
    /// # Errors
    /// Returns [`ChatError::Task`] if the task panicked.
    pub async fn join(self) -> Result<(), ChatError> {
        let Self {
            shutdown: _shutdown,
            task,
            ..
        } = self;
        task.await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and spawns a [`ChatClient`].
///
/// Every terminal method spawns onto the current tokio runtime and panics
/// outside of one, like `tokio::spawn`.
#[derive(Debug, Clone, Default)]
pub struct ChatClientBuilder {
    config: ClientConfig,
    visibility: VisibilityGate,
}

impl ChatClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Heartbeat, receive timeout, backoff and retry ceiling for the
    /// binary-protocol variants.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Holds reconnects while the host is in the background.
    pub fn visibility(mut self, gate: VisibilityGate) -> Self {
        self.visibility = gate;
        self
    }

    /// Runs any binary-protocol [`Variant`].
    pub fn variant<V, C, H>(self, variant: V, connector: C, handler: H) -> ChatClient
    where
        V: Variant,
        C: Connector,
        H: MessageHandler,
    {
        let name = variant.name();
        let config = self.config.clone();
        self.spawn(name, handler, move |link| {
            Driver::new(variant, connector, link, config).run()
        })
    }

    /// Connects straight to the platform's chat servers.
    pub fn direct_web<A, C, H>(
        self,
        config: DirectWebConfig,
        api: Arc<A>,
        connector: C,
        handler: H,
    ) -> ChatClient
    where
        A: LiveApi,
        C: Connector,
        H: MessageHandler,
    {
        self.variant(DirectWebVariant::new(config, api), connector, handler)
    }

    /// Connects through the open platform, authorized by the room
    /// owner's auth code.
    pub fn open_live<A, C, H>(
        self,
        config: OpenLiveConfig,
        api: Arc<A>,
        connector: C,
        handler: H,
    ) -> ChatClient
    where
        A: LiveApi,
        C: Connector,
        H: MessageHandler,
    {
        self.variant(OpenLiveVariant::new(config, api), connector, handler)
    }

    /// Connects to a relay server that already normalizes upstream
    /// traffic. The relay carries its own timeouts and backoff.
    pub fn relay<C, H>(self, config: RelayConfig, connector: C, handler: H) -> ChatClient
    where
        C: Connector,
        H: MessageHandler,
    {
        self.spawn("relay", handler, move |link| {
            RelayDriver::new(config, connector, link).run()
        })
    }

    /// Makes up traffic locally. Never touches the network.
    pub fn synthetic<H>(self, config: SyntheticConfig, handler: H) -> ChatClient
    where
        H: MessageHandler,
    {
        self.spawn("synthetic", handler, move |link| {
            SyntheticDriver::new(config, link).run()
        })
    }

    fn spawn<H, F, Fut>(self, name: &'static str, handler: H, run: F) -> ChatClient
    where
        H: MessageHandler,
        F: FnOnce(Link<H>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (stats_tx, stats) = watch::channel(ClientStats::default());
        let link = Link::new(name, shutdown_rx, self.visibility, stats_tx, handler);
        let task = tokio::spawn(run(link));
        ChatClient {
            name,
            shutdown,
            stats,
            task,
        }
    }
}

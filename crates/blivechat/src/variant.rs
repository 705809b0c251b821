//! What a transport variant plugs into the shared connection driver.
//!
//! The driver in [`crate::driver`] knows the binary protocol's lifecycle:
//! connect, authenticate, heartbeat, watch for silence, reconnect with
//! backoff. What differs between the direct web connection and the open
//! platform is captured by four small capabilities:
//!
//! | trait | answers |
//! |---|---|
//! | [`RoomBootstrapper`] | what must be learned over HTTP before connecting? |
//! | [`AuthPayloadBuilder`] | what goes in the auth frame? |
//! | [`UrlSelector`] | which socket URL for this attempt? |
//! | [`CommandHandlerTable`] | how are business commands normalized? |
//!
//! [`Variant`] bundles them and adds optional hooks with no-op defaults,
//! the same way a `MessageHandler` only overrides what it needs.

use std::future::Future;
use std::time::Duration;

use blivechat_command::{ChatMessage, CommandTable, RoomContext};
use blivechat_protocol::ProtocolError;
use blivechat_session::{ApiStatus, SessionError};
use futures_util::future::BoxFuture;

use crate::BootstrapError;

/// Result of one auxiliary call, e.g. a game heartbeat.
pub type AuxResult = Result<ApiStatus, SessionError>;

/// What the driver should do after an auxiliary result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxAction {
    Continue,
    /// Drop the socket, bootstrap again and reconnect.
    Rebuild,
}

/// A normalized message on its way to the handler.
pub enum Enrichment {
    /// Complete; deliver as is.
    Ready(ChatMessage),
    /// Still needs a lookup. The driver polls it off the socket loop and
    /// delivers the result in arrival order.
    Pending(BoxFuture<'static, ChatMessage>),
}

impl std::fmt::Debug for Enrichment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(msg) => f.debug_tuple("Ready").field(&msg.kind()).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Prepares a room before the socket opens.
pub trait RoomBootstrapper: Send {
    /// Runs before the first connect and whenever the driver decides the
    /// previous bootstrap is stale.
    ///
    /// # Errors
    /// [`BootstrapError::Fatal`] terminates the client; anything else is
    /// treated as a failed connect attempt.
    fn bootstrap(&mut self) -> impl Future<Output = Result<(), BootstrapError>> + Send;
}

/// Builds the body of the auth frame.
pub trait AuthPayloadBuilder {
    fn auth_payload(&self) -> Result<Vec<u8>, ProtocolError>;
}

/// Picks socket URLs.
pub trait UrlSelector {
    /// How many distinct URLs are known.
    fn candidate_count(&self) -> usize;

    /// URL for an attempt, rotating through candidates by `retry_count`.
    /// `None` if bootstrap yielded nothing to connect to.
    fn url(&self, retry_count: u32) -> Option<String>;
}

/// Supplies the per-variant normalizer.
pub trait CommandHandlerTable {
    fn command_table(&self) -> &CommandTable<&'static str>;

    /// The room as currently known. Refreshed by bootstrap.
    fn room_context(&self) -> &RoomContext;
}

/// A complete binary-protocol variant.
pub trait Variant:
    RoomBootstrapper + AuthPayloadBuilder + UrlSelector + CommandHandlerTable + Send + Sync + 'static
{
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Re-run bootstrap every this many consecutive failed attempts.
    fn reinit_period(&self) -> Option<u32> {
        None
    }

    /// Whether an auth reply code ends the client for good.
    fn is_fatal_auth_code(&self, _code: i64) -> bool {
        false
    }

    /// Last chance to fill in a normalized message before delivery. Must
    /// not wait: anything slow goes into [`Enrichment::Pending`].
    fn enrich(&self, msg: ChatMessage) -> Enrichment {
        Enrichment::Ready(msg)
    }

    /// Period of the auxiliary call, if this variant has one. Asked after
    /// every successful bootstrap.
    fn aux_interval(&self) -> Option<Duration> {
        None
    }

    /// One auxiliary call. The driver spawns it, so it must own its data.
    fn aux_call(&self) -> Option<BoxFuture<'static, AuxResult>> {
        None
    }

    /// Judges a finished auxiliary call. Results from before the latest
    /// bootstrap never reach this.
    fn on_aux_result(&mut self, _result: AuxResult) -> AuxAction {
        AuxAction::Continue
    }

    /// Releases server-side resources once the client terminates.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

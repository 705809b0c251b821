//! Timers for the chat connection state machine.
//!
//! A live connection juggles several clocks at once:
//!
//! - [`Interval`] — the client heartbeat (every 10 s on the direct
//!   connection) and the open-platform game heartbeat (every 20 s).
//! - [`Watchdog`] — the receive timeout. Every inbound frame pushes the
//!   deadline back; if it ever fires, the socket is considered dead.
//! - [`Backoff`] — how long to wait before the next reconnect attempt.
//! - [`VisibilityGate`] — holds reconnects while the host reports it is
//!   not in the foreground.
//!
//! # Disarmed timers
//!
//! `Interval::tick` and `Watchdog::expired` pend forever while disarmed.
//! That lets them sit in a `tokio::select!` unconditionally; a disarmed
//! branch simply never wins.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         msg = conn.recv() => { watchdog.reset(); /* decode */ }
//!         _ = heartbeat.tick() => { conn.send(heartbeat_frame()).await?; }
//!         () = watchdog.expired() => { /* drop socket, reconnect */ }
//!     }
//! }
//! ```
//!
//! All deadlines use `tokio::time`, so tests can pause and advance the
//! clock deterministically.

mod backoff;
mod interval;
mod visibility;
mod watchdog;

pub use backoff::{Backoff, BackoffConfig};
pub use interval::Interval;
pub use visibility::{visibility, VisibilityGate, VisibilityHandle};
pub use watchdog::Watchdog;

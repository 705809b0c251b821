//! Wire protocol for blivechat.
//!
//! This crate defines what travels over a chat connection:
//!
//! - **Frames** ([`encode_frame`], [`frames`], [`FrameDecoder`]) — the
//!   16-byte-header binary packets of the direct connection, including
//!   multi-frame batches and recursively compressed bodies.
//! - **Decompression** ([`Decompressor`], [`Deflate`], [`Brotli`]) — the
//!   adapters behind body protocols 2 and 3.
//! - **Relay envelopes** ([`RelayEnvelope`], [`RelayCommand`]) — the JSON
//!   text protocol spoken with a relay server.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how JSON bodies are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`], [`DecodeError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw WebSocket messages)
//! and the command normalizer (typed chat messages). It does not know
//! about sockets, timers or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (Packet / RelayEnvelope) → Command (ChatMessage)
//! ```

mod codec;
mod compression;
mod error;
mod frame;
mod relay;

pub use codec::{Codec, JsonCodec};
pub use compression::{brotli_decode, inflate, Brotli, Decompressor, Deflate, DEFAULT_MAX_OUTPUT};
pub use error::{DecodeError, ProtocolError};
pub use frame::{
    encode_frame, encode_json_frame, frames, heartbeat_frame, BodyProtocol, DecodedBatch,
    FrameDecoder, FrameHeader, Frames, Operation, Packet, RawFrame, AUTH_REPLY_CODE_OK,
    AUTH_REPLY_CODE_TOKEN_ERROR, DEFAULT_MAX_DEPTH, HEADER_SIZE, SEQUENCE_ID,
};
pub use relay::{RelayCommand, RelayEnvelope};

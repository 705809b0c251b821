//! Binary frame codec for the chat-casting protocol.
//!
//! Every message on the direct connection is one or more frames:
//!
//! ```text
//! 0       4        6        8          12       16
//! +-------+--------+--------+----------+--------+-------------+
//! |pack   |header  |body    |operation |seq     | body ...    |
//! |len u32|len u16 |ver u16 |u32       |u32     |             |
//! +-------+--------+--------+----------+--------+-------------+
//! ```
//!
//! All integers are big-endian. `pack_len` covers header and body, so the
//! next frame in the same buffer starts at `offset + pack_len`. A single
//! WebSocket message routinely carries several frames back to back, and a
//! compressed body is itself a buffer of frames, so decoding is a loop
//! nested inside a recursion.
//!
//! [`frames`] walks one buffer and yields [`RawFrame`]s. [`FrameDecoder`]
//! builds on it, expanding compressed bodies and parsing JSON, and hands
//! back a flat, ordered list of [`Packet`]s.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::{Brotli, Codec, Decompressor, Deflate, JsonCodec, ProtocolError};

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 16;

/// Sequence id written into every outgoing frame. The server ignores it.
pub const SEQUENCE_ID: u32 = 1;

/// How many compressed layers [`FrameDecoder`] will unwrap by default.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// `code` value of a successful auth reply.
pub const AUTH_REPLY_CODE_OK: i64 = 0;

/// `code` value of an auth reply rejecting the token.
pub const AUTH_REPLY_CODE_TOKEN_ERROR: i64 = -101;

// ---------------------------------------------------------------------------
// Header fields
// ---------------------------------------------------------------------------

/// Frame operation code.
///
/// Only the codes this client sends or understands get their own variant.
/// Everything else round-trips through [`Operation::Other`] so unknown
/// frames can be logged with their raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Client → server keepalive.
    Heartbeat,
    /// Server → client keepalive answer (body carries a popularity counter).
    HeartbeatReply,
    /// Server → client business payload.
    SendMsgReply,
    /// Client → server authentication, always the first frame.
    Auth,
    /// Server → client authentication result.
    AuthReply,
    /// Any code not listed above.
    Other(u32),
}

impl From<u32> for Operation {
    fn from(code: u32) -> Self {
        match code {
            2 => Self::Heartbeat,
            3 => Self::HeartbeatReply,
            5 => Self::SendMsgReply,
            7 => Self::Auth,
            8 => Self::AuthReply,
            other => Self::Other(other),
        }
    }
}

impl From<Operation> for u32 {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Heartbeat => 2,
            Operation::HeartbeatReply => 3,
            Operation::SendMsgReply => 5,
            Operation::Auth => 7,
            Operation::AuthReply => 8,
            Operation::Other(code) => code,
        }
    }
}

/// Body protocol version, which doubles as the compression tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyProtocol {
    /// Plain JSON.
    Normal,
    /// Plain body; also what clients write on outgoing frames.
    Heartbeat,
    /// zlib-compressed buffer of frames.
    Deflate,
    /// brotli-compressed buffer of frames.
    Brotli,
    /// Unrecognised tag; treated as plain.
    Other(u16),
}

impl From<u16> for BodyProtocol {
    fn from(ver: u16) -> Self {
        match ver {
            0 => Self::Normal,
            1 => Self::Heartbeat,
            2 => Self::Deflate,
            3 => Self::Brotli,
            other => Self::Other(other),
        }
    }
}

impl From<BodyProtocol> for u16 {
    fn from(ver: BodyProtocol) -> Self {
        match ver {
            BodyProtocol::Normal => 0,
            BodyProtocol::Heartbeat => 1,
            BodyProtocol::Deflate => 2,
            BodyProtocol::Brotli => 3,
            BodyProtocol::Other(v) => v,
        }
    }
}

/// The 16-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Header plus body length in bytes.
    pub pack_len: u32,
    /// Header length; always 16 on frames we write.
    pub header_len: u16,
    /// Body protocol / compression tag.
    pub protocol: BodyProtocol,
    /// What the frame means.
    pub operation: Operation,
    /// Sequence id; informational only.
    pub seq: u32,
}

impl FrameHeader {
    /// Builds the header for an outgoing frame with a `body_len`-byte body.
    pub fn outgoing(operation: Operation, body_len: usize) -> Self {
        Self {
            pack_len: (HEADER_SIZE + body_len) as u32,
            header_len: HEADER_SIZE as u16,
            protocol: BodyProtocol::Heartbeat,
            operation,
            seq: SEQUENCE_ID,
        }
    }

    /// Reads a header from the first 16 bytes of `buf`.
    ///
    /// Returns `None` if `buf` is shorter than a header. Field consistency
    /// (e.g. `header_len <= pack_len`) is checked by [`frames`], not here.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let h: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self {
            pack_len: u32::from_be_bytes([h[0], h[1], h[2], h[3]]),
            header_len: u16::from_be_bytes([h[4], h[5]]),
            protocol: u16::from_be_bytes([h[6], h[7]]).into(),
            operation: u32::from_be_bytes([h[8], h[9], h[10], h[11]]).into(),
            seq: u32::from_be_bytes([h[12], h[13], h[14], h[15]]),
        })
    }

    /// Appends the big-endian encoding of this header to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.pack_len.to_be_bytes());
        out.extend_from_slice(&self.header_len.to_be_bytes());
        out.extend_from_slice(&u16::from(self.protocol).to_be_bytes());
        out.extend_from_slice(&u32::from(self.operation).to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes one outgoing frame around a raw body.
///
/// Used directly for auth payloads that are already strings.
pub fn encode_frame(operation: Operation, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    FrameHeader::outgoing(operation, body.len()).write_to(&mut out);
    out.extend_from_slice(body);
    out
}

/// Encodes one outgoing frame whose body is `value` serialized as JSON.
///
/// # Errors
/// Returns [`ProtocolError::Encode`] if `value` cannot be serialized.
pub fn encode_json_frame<T: Serialize>(
    operation: Operation,
    value: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let body = JsonCodec.encode(value)?;
    Ok(encode_frame(operation, &body))
}

/// The heartbeat frame: operation 2 with an empty JSON object as body.
pub fn heartbeat_frame() -> Vec<u8> {
    encode_frame(Operation::Heartbeat, b"{}")
}

// ---------------------------------------------------------------------------
// Frame walking
// ---------------------------------------------------------------------------

/// One frame borrowed from a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    pub header: FrameHeader,
    pub body: &'a [u8],
}

/// Iterator over the frames packed into one buffer. See [`frames`].
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

/// Walks the concatenated frames in `buf`, in order.
///
/// Yields an error and then stops if a frame's lengths are inconsistent,
/// since nothing after a bad `pack_len` can be located.
pub fn frames(buf: &[u8]) -> Frames<'_> {
    Frames {
        buf,
        offset: 0,
        failed: false,
    }
}

impl<'a> Frames<'a> {
    fn fail(&mut self, reason: &'static str) -> Option<Result<RawFrame<'a>, ProtocolError>> {
        self.failed = true;
        Some(Err(ProtocolError::MalformedFrame {
            offset: self.offset,
            reason,
        }))
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<RawFrame<'a>, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.offset..];
        let Some(header) = FrameHeader::parse(rest) else {
            return self.fail("truncated header");
        };
        let pack_len = header.pack_len as usize;
        let header_len = header.header_len as usize;
        if header_len < HEADER_SIZE {
            return self.fail("header_len smaller than header");
        }
        if pack_len < header_len {
            return self.fail("pack_len smaller than header_len");
        }
        if pack_len > rest.len() {
            return self.fail("pack_len runs past end of buffer");
        }
        self.offset += pack_len;
        Some(Ok(RawFrame {
            header,
            body: &rest[header_len..pack_len],
        }))
    }
}

// ---------------------------------------------------------------------------
// Decoding to packets
// ---------------------------------------------------------------------------

/// A decoded inbound frame, after decompression and JSON parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Liveness answer. The popularity counter is carried for logging only.
    HeartbeatReply { popularity: Option<u32> },
    /// Result of the auth frame.
    AuthReply { code: i64 },
    /// A business command: a JSON object with a `cmd` tag.
    Business(Value),
}

/// Everything one receive buffer decoded to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedBatch {
    /// Packets in arrival order.
    pub packets: Vec<Packet>,
    /// Frames seen, including those that produced no packet (unknown
    /// operations, empty or unparsable bodies). Compressed frames are not
    /// counted themselves; the frames inside them are.
    pub frames: usize,
}

/// Decodes receive buffers into ordered [`Packet`]s.
///
/// Cheap to clone; the decompressors are shared.
#[derive(Clone)]
pub struct FrameDecoder {
    deflate: Arc<dyn Decompressor>,
    brotli: Arc<dyn Decompressor>,
    max_depth: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            deflate: Arc::new(Deflate::default()),
            brotli: Arc::new(Brotli::default()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl FrameDecoder {
    /// Replaces the adapter used for body protocol 2.
    pub fn with_deflate(mut self, d: impl Decompressor) -> Self {
        self.deflate = Arc::new(d);
        self
    }

    /// Replaces the adapter used for body protocol 3.
    pub fn with_brotli(mut self, d: impl Decompressor) -> Self {
        self.brotli = Arc::new(d);
        self
    }

    /// Sets how many compressed layers may be nested.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Decodes every frame in `buf`, depth first, preserving arrival order.
    ///
    /// A business body that is not valid JSON is logged and skipped; the
    /// rest of the batch still decodes. Unknown operations are skipped too.
    ///
    /// # Errors
    /// Structural problems (bad lengths, corrupt compression, nesting past
    /// the limit, an auth reply without a code) reject the whole buffer.
    pub fn decode(&self, buf: &[u8]) -> Result<Vec<Packet>, ProtocolError> {
        self.decode_batch(buf).map(|batch| batch.packets)
    }

    /// Like [`decode`](Self::decode), but also reports how many frames the
    /// buffer held, so liveness can be tracked per frame rather than per
    /// packet.
    ///
    /// # Errors
    /// Same as [`decode`](Self::decode).
    pub fn decode_batch(&self, buf: &[u8]) -> Result<DecodedBatch, ProtocolError> {
        let mut batch = DecodedBatch::default();
        self.decode_into(buf, 0, &mut batch)?;
        Ok(batch)
    }

    fn decode_into(
        &self,
        buf: &[u8],
        depth: usize,
        batch: &mut DecodedBatch,
    ) -> Result<(), ProtocolError> {
        for frame in frames(buf) {
            let RawFrame { header, body } = frame?;
            let compressed = header.operation == Operation::SendMsgReply
                && matches!(header.protocol, BodyProtocol::Deflate | BodyProtocol::Brotli);
            if !compressed {
                batch.frames += 1;
            }
            match header.operation {
                Operation::HeartbeatReply => {
                    let popularity = body
                        .get(..4)
                        .and_then(|b| b.try_into().ok())
                        .map(u32::from_be_bytes);
                    batch.packets.push(Packet::HeartbeatReply { popularity });
                }
                Operation::AuthReply => {
                    batch.packets.push(Packet::AuthReply {
                        code: parse_auth_code(body)?,
                    });
                }
                Operation::SendMsgReply => match header.protocol {
                    BodyProtocol::Deflate | BodyProtocol::Brotli => {
                        if depth >= self.max_depth {
                            return Err(ProtocolError::NestingTooDeep(self.max_depth));
                        }
                        let adapter = if header.protocol == BodyProtocol::Deflate {
                            &self.deflate
                        } else {
                            &self.brotli
                        };
                        let inner = adapter.decompress(body)?;
                        tracing::trace!(
                            protocol = ?header.protocol,
                            compressed = body.len(),
                            plain = inner.len(),
                            depth,
                            "expanded compressed frame"
                        );
                        self.decode_into(&inner, depth + 1, batch)?;
                    }
                    _ => {
                        if body.is_empty() {
                            continue;
                        }
                        match serde_json::from_slice::<Value>(body) {
                            Ok(value) => batch.packets.push(Packet::Business(value)),
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    len = body.len(),
                                    "dropping business frame with malformed JSON"
                                );
                            }
                        }
                    }
                },
                op => {
                    tracing::debug!(operation = ?op, len = body.len(), "ignoring frame with unknown operation");
                }
            }
        }
        Ok(())
    }
}

fn parse_auth_code(body: &[u8]) -> Result<i64, ProtocolError> {
    let value: Value = serde_json::from_slice(body).map_err(ProtocolError::Decode)?;
    value
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| ProtocolError::InvalidMessage(format!("auth reply without code: {value}")))
}

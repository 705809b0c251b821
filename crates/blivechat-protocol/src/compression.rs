//! Decompression adapters for compressed frame bodies.
//!
//! The chat-casting service tags each frame with a body protocol
//! version. Versions 2 and 3 mean the body is itself a sequence of frames,
//! compressed with zlib or brotli respectively. Both adapters share one
//! contract, `bytes -> bytes`, expressed by the [`Decompressor`] trait so
//! the frame decoder can be handed substitutes in tests.
//!
//! Neither adapter does any framing work. They only turn a compressed
//! buffer back into the bytes it was made from.

use std::io::Read;

use crate::DecodeError;

/// Upper bound on the size of one decompressed body (16 MiB).
///
/// Real batches are a few kilobytes; anything near this is either a bug
/// upstream or a decompression bomb.
pub const DEFAULT_MAX_OUTPUT: usize = 16 * 1024 * 1024;

/// Turns a compressed body back into plain bytes.
pub trait Decompressor: Send + Sync + 'static {
    /// Decompresses `input`.
    ///
    /// # Errors
    /// Returns [`DecodeError::Malformed`] on corrupt input and
    /// [`DecodeError::TooLarge`] when the output would exceed the
    /// adapter's ceiling.
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError>;
}

// ---------------------------------------------------------------------------
// Deflate (zlib stream, body protocol 2)
// ---------------------------------------------------------------------------

/// zlib decoder backed by `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct Deflate {
    max_output: usize,
}

impl Deflate {
    /// Creates a decoder that refuses outputs larger than `max_output` bytes.
    pub fn with_limit(max_output: usize) -> Self {
        Self { max_output }
    }
}

impl Default for Deflate {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_OUTPUT)
    }
}

impl Decompressor for Deflate {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        read_bounded(flate2::read::ZlibDecoder::new(input), self.max_output)
    }
}

/// Inflates a zlib stream with the default output ceiling.
pub fn inflate(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    Deflate::default().decompress(input)
}

// ---------------------------------------------------------------------------
// Brotli (body protocol 3)
// ---------------------------------------------------------------------------

/// Brotli decoder backed by the `brotli` crate.
///
/// The upstream encoder relies on brotli's built-in static dictionary,
/// which the crate embeds, so output is bit-exact with what the service
/// compressed.
#[derive(Debug, Clone, Copy)]
pub struct Brotli {
    max_output: usize,
}

impl Brotli {
    /// Internal read buffer for the streaming decoder.
    const BUFFER_SIZE: usize = 4096;

    /// Creates a decoder that refuses outputs larger than `max_output` bytes.
    pub fn with_limit(max_output: usize) -> Self {
        Self { max_output }
    }
}

impl Default for Brotli {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_OUTPUT)
    }
}

impl Decompressor for Brotli {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        read_bounded(
            brotli::Decompressor::new(input, Self::BUFFER_SIZE),
            self.max_output,
        )
    }
}

/// Decodes a brotli stream with the default output ceiling.
pub fn brotli_decode(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    Brotli::default().decompress(input)
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// Reads `reader` to the end, failing once more than `limit` bytes appear.
fn read_bounded<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    // One extra byte tells "exactly at the limit" apart from "over it".
    let read = reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(DecodeError::Malformed)?;
    if read > limit {
        return Err(DecodeError::TooLarge { limit });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    /// `zlib.compress(b"hello")`
    const ZLIB_HELLO: [u8; 13] = [
        0x78, 0x9c, 0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x07, 0x00, 0x06, 0x2c, 0x02, 0x15,
    ];

    /// `brotli.compress(b"hello")`
    const BROTLI_HELLO: [u8; 9] = [0x0b, 0x02, 0x80, 0x68, 0x65, 0x6c, 0x6c, 0x6f, 0x03];

    #[test]
    fn test_inflate_known_fixture() {
        assert_eq!(inflate(&ZLIB_HELLO).unwrap(), b"hello");
    }

    #[test]
    fn test_brotli_known_fixture() {
        assert_eq!(brotli_decode(&BROTLI_HELLO).unwrap(), b"hello");
    }

    #[test]
    fn test_inflate_rejects_garbage() {
        let err = inflate(b"definitely not zlib").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_brotli_truncated_stream_never_yields_plaintext() {
        // Depending on where the cut lands the decoder either errors or
        // stops short; it must not report the original bytes.
        let result = brotli_decode(&BROTLI_HELLO[..4]);
        assert!(result.map(|out| out != b"hello").unwrap_or(true));
    }

    #[test]
    fn test_inflate_enforces_output_limit() {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        enc.write_all(&[b'a'; 4096]).unwrap();
        let compressed = enc.finish().unwrap();

        let err = Deflate::with_limit(1024).decompress(&compressed).unwrap_err();
        assert!(matches!(err, DecodeError::TooLarge { limit: 1024 }));

        let ok = Deflate::with_limit(4096).decompress(&compressed).unwrap();
        assert_eq!(ok.len(), 4096);
    }

    #[test]
    fn test_brotli_round_trips_larger_payload() {
        let plain = br#"{"cmd":"DANMU_MSG","info":[[0,1,25,16777215,1700000000000]]}"#.repeat(20);
        let mut compressed = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut compressed, 4096, 9, 22);
            w.write_all(&plain).unwrap();
        }
        assert_eq!(brotli_decode(&compressed).unwrap(), plain);
    }
}

//! Continuous zlib-stream decompression
//!
//! The gateway can compress the whole connection with one shared zlib
//! context: the dictionary persists across messages, and each logical
//! message ends with a 4-byte sync-flush marker (`00 00 FF FF`). A message
//! may also be spread over several WebSocket binary frames, so input is
//! accumulated until the marker shows up at the tail, and only then run
//! through the (stateful) inflater.

use flate2::{Decompress, FlushDecompress, Status};
use tracing::trace;

use crate::error::{GatewayError, Result};

/// Sync-flush marker terminating one compressed logical message
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Stateful inflater for one gateway connection
///
/// Must live exactly as long as the connection: the compression dictionary
/// carries over between messages, so a reconnect needs [`reset`].
///
/// [`reset`]: ZlibStreamInflater::reset
pub struct ZlibStreamInflater {
    decompress: Decompress,
    /// Compressed fragments accumulated until the suffix arrives.
    pending: Vec<u8>,
}

impl ZlibStreamInflater {
    pub fn new() -> Self {
        Self {
            decompress: Decompress::new(true),
            pending: Vec::new(),
        }
    }

    /// Drop all per-connection state (call on reconnect)
    pub fn reset(&mut self) {
        self.decompress.reset(true);
        self.pending.clear();
    }

    /// Feed one binary frame's payload
    ///
    /// Returns `Ok(None)` while the logical message is still incomplete,
    /// `Ok(Some(text))` once the suffix is seen and the whole message
    /// inflates cleanly.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<Option<String>> {
        self.pending.extend_from_slice(bytes);

        if self.pending.len() < ZLIB_SUFFIX.len() || !self.pending.ends_with(&ZLIB_SUFFIX) {
            trace!(buffered = self.pending.len(), "message fragment buffered");
            return Ok(None);
        }

        let text = self.inflate_pending()?;
        self.pending.clear();
        Ok(Some(text))
    }

    fn inflate_pending(&mut self) -> Result<String> {
        let mut out = Vec::with_capacity(self.pending.len().saturating_mul(4));
        let mut chunk = [0u8; 16 * 1024];
        let mut offset = 0usize;

        while offset < self.pending.len() {
            let in_before = self.decompress.total_in();
            let out_before = self.decompress.total_out();

            let status = self
                .decompress
                .decompress(&self.pending[offset..], &mut chunk, FlushDecompress::Sync)
                .map_err(|e| GatewayError::Decompress(e.to_string()))?;

            let consumed = (self.decompress.total_in() - in_before) as usize;
            let produced = (self.decompress.total_out() - out_before) as usize;
            offset += consumed;
            out.extend_from_slice(&chunk[..produced]);

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if consumed == 0 && produced == 0 {
                        // No forward progress; everything decodable is out.
                        break;
                    }
                }
            }
        }

        // The payload is protocol JSON; invalid sequences are replaced
        // rather than crashing the receive loop.
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

impl Default for ZlibStreamInflater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compress, Compression, FlushCompress};

    /// Compress one logical message with a shared context, sync-flushed the
    /// way the gateway does it (output ends with the 00 00 FF FF marker).
    fn compress_message(ctx: &mut Compress, text: &str) -> Vec<u8> {
        let mut out = vec![0u8; text.len() * 2 + 128];
        let before = ctx.total_out();
        ctx.compress(text.as_bytes(), &mut out, FlushCompress::Sync)
            .unwrap();
        let produced = (ctx.total_out() - before) as usize;
        out.truncate(produced);
        assert!(out.ends_with(&ZLIB_SUFFIX));
        out
    }

    #[test]
    fn test_round_trip_single_frame() {
        let mut ctx = Compress::new(Compression::default(), true);
        let mut inflater = ZlibStreamInflater::new();

        let payload = r#"{"op":10,"d":{"heartbeat_interval":41250}}"#;
        let compressed = compress_message(&mut ctx, payload);

        let text = inflater.extend(&compressed).unwrap();
        assert_eq!(text.as_deref(), Some(payload));
    }

    #[test]
    fn test_round_trip_split_fragments() {
        let mut ctx = Compress::new(Compression::default(), true);
        let mut inflater = ZlibStreamInflater::new();

        let payload = r#"{"op":0,"t":"MESSAGE_CREATE","s":7,"d":{"content":"fragmented"}}"#;
        let compressed = compress_message(&mut ctx, payload);

        // Split arbitrarily; only the fragment completing the suffix yields.
        let mut result = None;
        for fragment in compressed.chunks(3) {
            let step = inflater.extend(fragment).unwrap();
            if step.is_some() {
                result = step;
            }
        }
        assert_eq!(result.as_deref(), Some(payload));
    }

    #[test]
    fn test_dictionary_persists_across_messages() {
        let mut ctx = Compress::new(Compression::default(), true);
        let mut inflater = ZlibStreamInflater::new();

        let first = r#"{"op":0,"t":"TYPING_START","s":1,"d":{"channel_id":"42"}}"#;
        let second = r#"{"op":0,"t":"TYPING_START","s":2,"d":{"channel_id":"42"}}"#;

        let a = compress_message(&mut ctx, first);
        let b = compress_message(&mut ctx, second);

        assert_eq!(inflater.extend(&a).unwrap().as_deref(), Some(first));
        // The second message only decodes against the live dictionary.
        assert_eq!(inflater.extend(&b).unwrap().as_deref(), Some(second));
    }

    #[test]
    fn test_incomplete_message_stays_buffered() {
        let mut ctx = Compress::new(Compression::default(), true);
        let mut inflater = ZlibStreamInflater::new();

        let compressed = compress_message(&mut ctx, r#"{"op":11}"#);
        let cut = compressed.len() - 2;
        assert_eq!(inflater.extend(&compressed[..cut]).unwrap(), None);
        assert!(inflater.extend(&compressed[cut..]).unwrap().is_some());
    }
}

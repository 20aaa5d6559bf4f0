//! Mux frames and their byte-level framing.
//!
//! Wire format: a 4-byte little-endian length prefix followed by the JSON
//! body of one [`Frame`]. Channel ids are allocated by the supervisor side
//! and are never reused within a worker lifetime.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of one logical channel multiplexed over the worker pipe.
pub type ChannelId = u32;

/// Size of the little-endian length prefix preceding every frame body.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Upper bound on a single frame body. Anything larger is a protocol
/// violation, not a legitimate payload.
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

/// One frame on the worker pipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    /// A new channel was opened by the sending side.
    Open { channel: ChannelId },
    /// The channel is retired; the receiving side must release any resource
    /// backing it.
    Close { channel: ChannelId },
    /// Opaque payload for one channel.
    Data { channel: ChannelId, payload: Value },
}

impl Frame {
    /// The channel this frame concerns.
    pub fn channel(&self) -> ChannelId {
        match self {
            Frame::Open { channel } | Frame::Close { channel } | Frame::Data { channel, .. } => {
                *channel
            }
        }
    }
}

/// Encodes a frame as length prefix + JSON body.
pub fn encode_frame(frame: &Frame) -> serde_json::Result<Vec<u8>> {
    let body = serde_json::to_vec(frame)?;
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_BYTES + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Parses one frame body (the bytes after the length prefix).
pub fn parse_frame(body: &[u8]) -> serde_json::Result<Frame> {
    serde_json::from_slice(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_is_little_endian() {
        let frame = Frame::Open { channel: 7 };
        let bytes = encode_frame(&frame).unwrap();
        let body_len = bytes.len() - LENGTH_PREFIX_BYTES;
        assert_eq!(u32::from_le_bytes(bytes[..4].try_into().unwrap()), body_len as u32);
    }

    #[test]
    fn data_frame_carries_channel_and_payload() {
        let frame = Frame::Data {
            channel: 3,
            payload: serde_json::json!({"method": "ping"}),
        };
        let bytes = encode_frame(&frame).unwrap();
        let parsed = parse_frame(&bytes[LENGTH_PREFIX_BYTES..]).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.channel(), 3);
    }

    #[test]
    fn control_frames_use_tagged_representation() {
        // The worker side matches on the "type" tag; keep it stable.
        let json = serde_json::to_value(&Frame::Close { channel: 9 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "close", "channel": 9}));
    }
}

//! Byte-stream frames

use crate::{Message, ProtocolError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Frame flags for stream control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFlags(pub u8);

impl FrameFlags {
    /// Ordinary message frame
    pub const NONE: Self = Self(0);
    /// Sender closed its end of the channel
    pub const CLOSE: Self = Self(1);

    /// Check if a flag is set
    pub fn has_flag(self, flag: FrameFlags) -> bool {
        (self.0 & flag.0) != 0
    }

    /// Set a flag
    pub fn set_flag(&mut self, flag: FrameFlags) {
        self.0 |= flag.0;
    }
}

/// One unit on a byte stream: flags plus an encoded message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Frame flags
    pub flags: FrameFlags,
    /// MessagePack-encoded [`Message`], empty for control frames
    pub payload: Bytes,
}

impl Frame {
    /// Frame carrying an encoded message
    pub fn message(message: &Message) -> Result<Self, ProtocolError> {
        let payload = rmp_serde::to_vec_named(message)?;
        Ok(Self {
            flags: FrameFlags::NONE,
            payload: Bytes::from(payload),
        })
    }

    /// Control frame announcing the channel is closed
    pub fn close() -> Self {
        Self {
            flags: FrameFlags::CLOSE,
            payload: Bytes::new(),
        }
    }

    /// Decode the carried message
    pub fn to_message(&self) -> Result<Message, ProtocolError> {
        Ok(rmp_serde::from_slice(&self.payload)?)
    }

    /// Serialize frame to MessagePack bytes
    pub fn to_msgpack(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Deserialize frame from MessagePack bytes
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Check if this frame closes the channel
    pub fn is_close(&self) -> bool {
        self.flags.has_flag(FrameFlags::CLOSE)
    }
}

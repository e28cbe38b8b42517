//! Length-prefixed frame codec for async byte streams

use crate::{Frame, ProtocolError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Frame codec for encoding/decoding frames over async streams
pub struct FrameCodec {
    /// Bytes read but not yet decoded
    read_buf: BytesMut,
    /// Maximum frame size allowed
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a codec with the default size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(8192),
            max_frame_size,
        }
    }

    /// Encode a frame with its length prefix
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes, ProtocolError> {
        let body = frame.to_msgpack()?;
        self.check_size(body.len())?;

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Write a frame and flush
    pub async fn write_frame<W>(&self, writer: &mut W, frame: &Frame) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        let encoded = self.encode_frame(frame)?;
        writer.write_all(&encoded).await
            .map_err(|e| ProtocolError::Serialization(format!("Write error: {}", e)))?;
        writer.flush().await
            .map_err(|e| ProtocolError::Serialization(format!("Flush error: {}", e)))?;
        Ok(())
    }

    /// Read the next frame. `Ok(None)` on a clean EOF between frames.
    pub async fn read_frame<R>(&mut self, reader: &mut R) -> Result<Option<Frame>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(frame) = self.try_decode_frame()? {
                return Ok(Some(frame));
            }

            let n = reader.read_buf(&mut self.read_buf).await
                .map_err(|e| ProtocolError::Serialization(format!("Read error: {}", e)))?;

            if n == 0 {
                return if self.read_buf.is_empty() {
                    Ok(None)
                } else {
                    // EOF inside a frame
                    Err(ProtocolError::InvalidFrame)
                };
            }
        }
    }

    /// Decode one frame from the buffer if a complete one is present
    pub fn try_decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.read_buf.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let frame_len = (&self.read_buf[..LENGTH_PREFIX]).get_u32() as usize;
        self.check_size(frame_len)?;

        if self.read_buf.len() < LENGTH_PREFIX + frame_len {
            return Ok(None);
        }

        self.read_buf.advance(LENGTH_PREFIX);
        let body = self.read_buf.split_to(frame_len);
        Frame::from_msgpack(&body).map(Some)
    }

    /// Bytes buffered but not yet decoded
    pub fn buffer_size(&self) -> usize {
        self.read_buf.len()
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

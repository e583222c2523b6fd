//! Fixed-length framing for outgoing bodies.
//!
//! Payload spans are written raw. The caller declared the length up front
//! via `Content-Length`; writing past it is a contract violation surfaced
//! as [`SendError::BodyOverrun`] rather than silently truncated bytes on
//! the wire.

use crate::protocol::{PayloadItem, SendError};
use bytes::BytesMut;
use tokio_util::codec::Encoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    declared: u64,
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { declared: length, remaining: length }
    }

    /// True once the declared number of bytes has been written.
    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}

impl Encoder<PayloadItem> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if bytes.is_empty() {
                    return Ok(());
                }
                let len = bytes.len() as u64;
                if len > self.remaining {
                    let written = self.declared - self.remaining + len;
                    return Err(SendError::body_overrun(self.declared, written));
                }
                dst.extend_from_slice(&bytes);
                self.remaining -= len;
                Ok(())
            }
            PayloadItem::Eof => Ok(()),
        }
    }
}

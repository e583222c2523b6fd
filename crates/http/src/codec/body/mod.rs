//! Outgoing body framing.
//!
//! The read side decodes bodies inside the message parser; this module
//! holds the write side only: fixed-length and chunked encoders plus the
//! [`PayloadEncoder`] that picks between them from a [`PayloadSize`].
//!
//! [`PayloadSize`]: crate::protocol::PayloadSize

mod chunked_encoder;
mod length_encoder;
mod payload_encoder;

pub use payload_encoder::PayloadEncoder;

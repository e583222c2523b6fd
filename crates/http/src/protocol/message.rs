use bytes::Bytes;

use crate::protocol::{FieldSet, StartLine};

/// One item of a message payload stream: a span of body bytes or the
/// zero-length end-of-body marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    Chunk(Bytes),
    Eof,
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// How a message body is framed on the wire.
///
/// `Chunked` wins over `Length`: when `Transfer-Encoding: chunked` is
/// present any `Content-Length` header is ignored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Body with a known length in bytes, from `Content-Length`.
    Length(u64),
    /// Body using chunked transfer encoding.
    Chunked,
    /// No body.
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

/// The parsed head of an incoming message: start line, headers, and the
/// framing derived from them.
#[derive(Debug)]
pub struct MessageHead {
    pub start: StartLine,
    pub fields: FieldSet,
    pub payload: PayloadSize,
}

/// One step of a message body as produced by the parser.
#[derive(Debug)]
pub enum BodyFrame {
    /// A span of body bytes, framing already stripped.
    Data(Bytes),
    /// End of the body; trailers are present only after a chunked body
    /// with a non-empty trailer section.
    End { trailers: Option<FieldSet> },
}

impl BodyFrame {
    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, BodyFrame::End { .. })
    }

    pub fn as_data(&self) -> Option<&Bytes> {
        match self {
            BodyFrame::Data(bytes) => Some(bytes),
            BodyFrame::End { .. } => None,
        }
    }
}

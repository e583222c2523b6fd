use std::io;
use thiserror::Error;

/// Top level error for a connection: either the read side or the write side
/// went wrong.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("parse error: {source}")]
    ParseError {
        #[from]
        source: ParseError,
    },

    #[error("send error: {source}")]
    SendError {
        #[from]
        source: SendError,
    },
}

/// Errors produced while reading and parsing an incoming message.
///
/// Structural errors (malformed start line, oversized lines or chunks, bad
/// numeric headers) are delivered to the registered failure consumers and
/// then shut the connection down. [`ParseError::ReadTimeout`] is the only
/// recoverable kind: a single timed-out read is logged and re-armed, and the
/// error surfaces only after the retry budget is spent.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed start line: {reason}")]
    MalformedStartLine { reason: String },

    #[error("line exceeds the {limit} byte limit")]
    LineTooLong { limit: usize },

    #[error("chunk of {size} bytes exceeds the {max} byte limit")]
    ChunkTooLarge { size: u64, max: u64 },

    #[error("invalid chunk size: {reason}")]
    BadChunkSize { reason: String },

    #[error("invalid content-length header: {reason}")]
    BadContentLength { reason: String },

    #[error("invalid header line: {reason}")]
    InvalidHeaderLine { reason: String },

    #[error("header number exceeds the limit {max}")]
    TooManyHeaders { max: usize },

    #[error("read timed out after retries")]
    ReadTimeout,

    #[error("connection closed by peer: {reason}")]
    ClosedByPeer { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn malformed_start_line<S: ToString>(reason: S) -> Self {
        Self::MalformedStartLine { reason: reason.to_string() }
    }

    pub fn line_too_long(limit: usize) -> Self {
        Self::LineTooLong { limit }
    }

    pub fn chunk_too_large(size: u64, max: u64) -> Self {
        Self::ChunkTooLarge { size, max }
    }

    pub fn bad_chunk_size<S: ToString>(reason: S) -> Self {
        Self::BadChunkSize { reason: reason.to_string() }
    }

    pub fn bad_content_length<S: ToString>(reason: S) -> Self {
        Self::BadContentLength { reason: reason.to_string() }
    }

    pub fn invalid_header_line<S: ToString>(reason: S) -> Self {
        Self::InvalidHeaderLine { reason: reason.to_string() }
    }

    pub fn closed_by_peer<S: ToString>(reason: S) -> Self {
        Self::ClosedByPeer { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// True for errors that warrant telling the peer why before closing.
    /// I/O failures and peer closes get no farewell response.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::ReadTimeout | Self::ClosedByPeer { .. } | Self::Io { .. })
    }
}

/// Errors produced while assembling or flushing an outgoing message.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("headers already sent, {operation} rejected")]
    HeadAlreadySent { operation: &'static str },

    #[error("body of {written} bytes exceeds the declared content-length {declared}")]
    BodyOverrun { declared: u64, written: u64 },

    #[error("connection already closed")]
    Closed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn head_already_sent(operation: &'static str) -> Self {
        Self::HeadAlreadySent { operation }
    }

    pub fn body_overrun(declared: u64, written: u64) -> Self {
        Self::BodyOverrun { declared, written }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

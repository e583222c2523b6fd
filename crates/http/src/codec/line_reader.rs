//! Lowest-level byte consumer for a connection.
//!
//! The reader owns the connection's single receive buffer and goes back to
//! the transport only when that buffer is exhausted, so a burst of
//! pipelined requests that arrived in one segment is consumed without
//! further reads. Lines are CRLF- or LF-terminated; the delimiter is
//! stripped. Hitting EOF surfaces whatever was accumulated (possibly
//! nothing) as a [`Fragment::Partial`] and lets the caller decide whether
//! that is a clean end of the connection or a truncated message.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use crate::config::ConnectionConfig;
use crate::connection::ActivityMonitor;
use crate::protocol::ParseError;

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// The outcome of one reader operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// The requested line or span, complete.
    Full(Bytes),
    /// EOF arrived first; carries whatever had accumulated.
    Partial(Bytes),
}

impl Fragment {
    pub fn bytes(&self) -> &Bytes {
        match self {
            Fragment::Full(bytes) | Fragment::Partial(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Fragment::Full(bytes) | Fragment::Partial(bytes) => bytes,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Fragment::Partial(_))
    }
}

/// Incremental line and span extraction over an async byte source.
#[derive(Debug)]
pub struct LineReader<R> {
    source: R,
    buffer: BytesMut,
    /// Bytes already scanned for a delimiter, to avoid rescans when a line
    /// arrives in several reads.
    scanned: usize,
    eof: bool,
    read_timeout: std::time::Duration,
    read_timeout_retries: u32,
    monitor: ActivityMonitor,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(source: R, config: &ConnectionConfig, monitor: ActivityMonitor) -> Self {
        Self {
            source,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            scanned: 0,
            eof: false,
            read_timeout: config.read_timeout,
            read_timeout_retries: config.read_timeout_retries,
            monitor,
        }
    }

    /// Reads more bytes from the source. Returns false on EOF.
    ///
    /// A timed-out read is logged and re-armed; each retry waits the full
    /// timeout again, so a stalled peer costs no busy spinning. Only after
    /// the retry budget is spent does [`ParseError::ReadTimeout`] surface.
    async fn fill(&mut self) -> Result<bool, ParseError> {
        if self.eof {
            return Ok(false);
        }

        let mut timeouts: u32 = 0;
        loop {
            match tokio::time::timeout(self.read_timeout, self.source.read_buf(&mut self.buffer)).await {
                Ok(Ok(0)) => {
                    trace!("byte source reached eof");
                    self.eof = true;
                    return Ok(false);
                }
                Ok(Ok(n)) => {
                    trace!(bytes = n, "read from byte source");
                    self.monitor.touch();
                    return Ok(true);
                }
                Ok(Err(e)) => return Err(ParseError::io(e)),
                Err(_elapsed) => {
                    timeouts += 1;
                    if timeouts > self.read_timeout_retries {
                        return Err(ParseError::ReadTimeout);
                    }
                    warn!(attempt = timeouts, timeout = ?self.read_timeout, "read timed out, re-arming");
                }
            }
        }
    }

    /// Next CRLF- or LF-terminated line, delimiter stripped.
    ///
    /// Fails with [`ParseError::LineTooLong`] once more than `limit` bytes
    /// accumulate without a delimiter.
    pub async fn next_line(&mut self, limit: usize) -> Result<Fragment, ParseError> {
        loop {
            if let Some(pos) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
                let end = self.scanned + pos;
                if end > limit {
                    return Err(ParseError::line_too_long(limit));
                }
                let mut line = self.buffer.split_to(end + 1);
                self.scanned = 0;
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(Fragment::Full(line.freeze()));
            }

            self.scanned = self.buffer.len();
            if self.scanned > limit {
                return Err(ParseError::line_too_long(limit));
            }

            if !self.fill().await? {
                self.scanned = 0;
                let rest = self.buffer.split().freeze();
                return Ok(Fragment::Partial(rest));
            }
        }
    }

    /// Exactly `n` bytes, resuming across reads as needed.
    pub async fn next_span(&mut self, n: usize) -> Result<Fragment, ParseError> {
        while self.buffer.len() < n {
            if !self.fill().await? {
                self.scanned = 0;
                return Ok(Fragment::Partial(self.buffer.split().freeze()));
            }
        }
        self.scanned = self.scanned.saturating_sub(n);
        Ok(Fragment::Full(self.buffer.split_to(n).freeze()))
    }

    /// At least one byte and at most `max`, whatever is available first.
    /// At EOF returns `Partial` with no bytes.
    pub async fn next_available(&mut self, max: usize) -> Result<Fragment, ParseError> {
        while self.buffer.is_empty() {
            if !self.fill().await? {
                return Ok(Fragment::Partial(Bytes::new()));
            }
        }
        let n = self.buffer.len().min(max);
        self.scanned = self.scanned.saturating_sub(n);
        Ok(Fragment::Full(self.buffer.split_to(n).freeze()))
    }

    /// True once the source is exhausted and the buffer drained.
    pub fn is_at_eof(&self) -> bool {
        self.eof && !self.buffer.has_remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn config() -> ConnectionConfig {
        ConnectionConfig::default()
    }

    fn reader_over(data: &'static [u8]) -> LineReader<&'static [u8]> {
        LineReader::new(data, &config(), ActivityMonitor::new())
    }

    #[tokio::test]
    async fn lines_are_stripped_of_crlf_and_lf() {
        let mut reader = reader_over(b"first\r\nsecond\nthird");
        assert_eq!(reader.next_line(100).await.unwrap(), Fragment::Full(Bytes::from_static(b"first")));
        assert_eq!(reader.next_line(100).await.unwrap(), Fragment::Full(Bytes::from_static(b"second")));
        assert_eq!(reader.next_line(100).await.unwrap(), Fragment::Partial(Bytes::from_static(b"third")));
    }

    #[tokio::test]
    async fn line_resumes_across_fragmented_arrivals() {
        let (client, server) = tokio::io::duplex(16);
        let mut reader = LineReader::new(server, &config(), ActivityMonitor::new());

        let writer = tokio::spawn(async move {
            let mut client = client;
            client.write_all(b"hel").await.unwrap();
            tokio::task::yield_now().await;
            client.write_all(b"lo wor").await.unwrap();
            tokio::task::yield_now().await;
            client.write_all(b"ld\r\n").await.unwrap();
        });

        let line = reader.next_line(100).await.unwrap();
        assert_eq!(line, Fragment::Full(Bytes::from_static(b"hello world")));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let mut reader = reader_over(b"abcdefghij\r\n");
        let err = reader.next_line(5).await.unwrap_err();
        assert!(matches!(err, ParseError::LineTooLong { limit: 5 }));
    }

    #[tokio::test]
    async fn overlong_line_is_rejected_before_delimiter_arrives() {
        let (client, server) = tokio::io::duplex(16);
        let mut reader = LineReader::new(server, &config(), ActivityMonitor::new());

        let writer = tokio::spawn(async move {
            let mut client = client;
            client.write_all(b"0123456789").await.unwrap();
        });

        let err = reader.next_line(4).await.unwrap_err();
        assert!(matches!(err, ParseError::LineTooLong { limit: 4 }));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn span_returns_exactly_n_bytes() {
        let mut reader = reader_over(b"abcdefgh");
        assert_eq!(reader.next_span(3).await.unwrap(), Fragment::Full(Bytes::from_static(b"abc")));
        assert_eq!(reader.next_span(5).await.unwrap(), Fragment::Full(Bytes::from_static(b"defgh")));
        assert_eq!(reader.next_span(1).await.unwrap(), Fragment::Partial(Bytes::new()));
    }

    #[tokio::test]
    async fn span_surfaces_partial_data_at_eof() {
        let mut reader = reader_over(b"abc");
        assert_eq!(reader.next_span(10).await.unwrap(), Fragment::Partial(Bytes::from_static(b"abc")));
    }

    #[tokio::test]
    async fn available_caps_at_max() {
        let mut reader = reader_over(b"abcdef");
        assert_eq!(reader.next_available(4).await.unwrap(), Fragment::Full(Bytes::from_static(b"abcd")));
        assert_eq!(reader.next_available(4).await.unwrap(), Fragment::Full(Bytes::from_static(b"ef")));
        assert!(reader.next_available(4).await.unwrap().is_partial());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_source_times_out_after_retries() {
        let (_client, server) = tokio::io::duplex(16);
        let mut cfg = config();
        cfg.read_timeout = std::time::Duration::from_secs(1);
        cfg.read_timeout_retries = 2;
        let mut reader = LineReader::new(server, &cfg, ActivityMonitor::new());

        let err = reader.next_line(100).await.unwrap_err();
        assert!(matches!(err, ParseError::ReadTimeout));
    }

    #[tokio::test]
    async fn line_then_span_interleave() {
        let mut reader = reader_over(b"5\r\n11111\r\n");
        assert_eq!(reader.next_line(16).await.unwrap(), Fragment::Full(Bytes::from_static(b"5")));
        assert_eq!(reader.next_span(5).await.unwrap(), Fragment::Full(Bytes::from_static(b"11111")));
        assert_eq!(reader.next_line(16).await.unwrap(), Fragment::Full(Bytes::from_static(b"")));
    }
}

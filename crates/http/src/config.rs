use std::time::Duration;

/// Tunable limits and timeouts for one connection.
///
/// Exceeding any size limit ends the message with a parse failure and shuts
/// the connection down. A read timeout is recoverable: it is logged and the
/// read re-armed, up to `read_timeout_retries` consecutive times. The idle
/// timeout closes a connection only when no message is in flight in either
/// direction.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Longest accepted request/status line, delimiter excluded.
    pub max_start_line_bytes: usize,
    /// Longest accepted header or trailer line.
    pub max_header_line_bytes: usize,
    /// Most header lines (continuations included) per header section.
    pub max_header_count: usize,
    /// Largest accepted single chunk of a chunked body.
    pub max_chunk_bytes: u64,
    /// Deadline for one transport read.
    pub read_timeout: Duration,
    /// Consecutive timed-out reads tolerated before giving up.
    pub read_timeout_retries: u32,
    /// Inactivity span after which a quiet connection is closed.
    pub idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_start_line_bytes: 8 * 1024,
            max_header_line_bytes: 8 * 1024,
            max_header_count: 128,
            max_chunk_bytes: 16 * 1024 * 1024,
            read_timeout: Duration::from_secs(30),
            read_timeout_retries: 3,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

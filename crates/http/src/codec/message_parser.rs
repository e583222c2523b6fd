//! The incremental message parser.
//!
//! Drives one message at a time through
//! `InitialLine -> Headers -> Body -> [Trailers] -> Done`, pulling lines and
//! spans from the [`LineReader`]. Parsing is strictly sequential per
//! connection: a new message begins only after the previous one reached
//! `Done`. Every parsed artifact is published to the registered
//! [`EventConsumers`] before it is returned to the caller, and the consumer
//! set is cleared whenever a message ends or fails.

use tokio::io::AsyncRead;
use tracing::trace;

use crate::codec::line_reader::{Fragment, LineReader};
use crate::config::ConnectionConfig;
use crate::connection::ActivityMonitor;
use crate::protocol::{
    BodyFrame, EventConsumers, FieldSet, MessageHead, ParseError, PayloadItem, PayloadSize, RequestLine, StartLine,
    StatusLine,
};

/// Which start-line grammar this parser expects.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// `METHOD SP TARGET SP VERSION` (server side).
    Request,
    /// `VERSION SP STATUS SP REASON` (client side).
    Response,
}

/// Body-side parser state. The head states need no representation here
/// because [`MessageParser::read_head`] runs them to completion in one call.
#[derive(Debug)]
enum BodyPhase {
    /// Between messages.
    Idle,
    /// Fixed-length body with bytes still expected.
    Fixed { remaining: u64 },
    /// Chunked body, before the next chunk-size line.
    ChunkSize,
    /// Chunked body, inside a chunk's data.
    ChunkData { remaining: u64 },
    /// Body fully delivered, terminator not yet emitted.
    Finishing { trailers: Option<FieldSet> },
    /// Message complete.
    Done,
}

/// Incremental parser for one direction of a connection.
#[derive(Debug)]
pub struct MessageParser<R> {
    reader: LineReader<R>,
    kind: MessageKind,
    consumers: EventConsumers,
    phase: BodyPhase,
    monitor: ActivityMonitor,
    /// True between a parsed start line and message end, for idle tracking.
    message_open: bool,
    max_start_line_bytes: usize,
    max_header_line_bytes: usize,
    max_header_count: usize,
    max_chunk_bytes: u64,
}

impl<R> MessageParser<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(source: R, kind: MessageKind, config: &ConnectionConfig, monitor: ActivityMonitor) -> Self {
        Self {
            reader: LineReader::new(source, config, monitor.clone()),
            kind,
            consumers: EventConsumers::new(),
            phase: BodyPhase::Idle,
            monitor,
            message_open: false,
            max_start_line_bytes: config.max_start_line_bytes,
            max_header_line_bytes: config.max_header_line_bytes,
            max_header_count: config.max_header_count,
            max_chunk_bytes: config.max_chunk_bytes,
        }
    }

    /// Consumers registered here observe the current message only; the set
    /// is cleared when the message completes or fails.
    pub fn consumers_mut(&mut self) -> &mut EventConsumers {
        &mut self.consumers
    }

    /// Publishes the failure, drops the message's consumers, and closes the
    /// idle-tracking bracket.
    fn fail(&mut self, error: ParseError) -> ParseError {
        self.consumers.emit_failure(&error);
        self.consumers.clear();
        self.finish_message();
        error
    }

    fn finish_message(&mut self) {
        if self.message_open {
            self.message_open = false;
            self.monitor.end_read();
        }
    }

    /// Parses the start line and header section of the next message.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly
    /// between messages. Blank lines before the start line are skipped.
    pub async fn read_head(&mut self) -> Result<Option<MessageHead>, ParseError> {
        let line = loop {
            let fragment = match self.reader.next_line(self.max_start_line_bytes).await {
                Ok(fragment) => fragment,
                Err(e) => return Err(self.fail(e)),
            };
            match fragment {
                Fragment::Full(line) if line.is_empty() => continue,
                Fragment::Full(line) => break line,
                Fragment::Partial(rest) if rest.is_empty() => return Ok(None),
                Fragment::Partial(rest) => {
                    let reason = format!("eof after {} bytes of start line", rest.len());
                    return Err(self.fail(ParseError::closed_by_peer(reason)));
                }
            }
        };

        self.message_open = true;
        self.monitor.begin_read();

        let text = match std::str::from_utf8(&line) {
            Ok(text) => text,
            Err(_) => return Err(self.fail(ParseError::malformed_start_line("start line is not valid utf-8"))),
        };

        let start = match self.kind {
            MessageKind::Request => RequestLine::parse(text).map(StartLine::Request),
            MessageKind::Response => StatusLine::parse(text).map(StartLine::Response),
        };
        let start = match start {
            Ok(start) => start,
            Err(e) => return Err(self.fail(e)),
        };
        trace!(kind = ?self.kind, "parsed start line");
        self.consumers.emit_line(&start);

        let fields = match self.read_field_section().await {
            Ok(fields) => fields,
            Err(e) => return Err(self.fail(e)),
        };

        let payload = match payload_size(&fields) {
            Ok(payload) => payload,
            Err(e) => return Err(self.fail(e)),
        };
        trace!(?payload, headers = fields.value_count(), "parsed header section");

        self.phase = match payload {
            PayloadSize::Empty => BodyPhase::Finishing { trailers: None },
            PayloadSize::Length(0) => BodyPhase::Finishing { trailers: None },
            PayloadSize::Length(n) => BodyPhase::Fixed { remaining: n },
            PayloadSize::Chunked => BodyPhase::ChunkSize,
        };

        self.consumers.emit_headers(&fields);
        Ok(Some(MessageHead { start, fields, payload }))
    }

    /// Reads header or trailer lines up to the blank terminator, folding
    /// continuation lines into the previous value.
    async fn read_field_section(&mut self) -> Result<FieldSet, ParseError> {
        let mut fields = FieldSet::new();
        let mut lines = 0usize;
        loop {
            let fragment = self.reader.next_line(self.max_header_line_bytes).await?;
            let line = match fragment {
                Fragment::Full(line) => line,
                Fragment::Partial(_) => {
                    return Err(ParseError::closed_by_peer("eof inside header section"));
                }
            };
            if line.is_empty() {
                return Ok(fields);
            }

            lines += 1;
            if lines > self.max_header_count {
                return Err(ParseError::TooManyHeaders { max: self.max_header_count });
            }

            let text = std::str::from_utf8(&line)
                .map_err(|_| ParseError::invalid_header_line("header line is not valid utf-8"))?;

            if text.starts_with(' ') || text.starts_with('\t') {
                if !fields.fold_continuation(text.trim()) {
                    return Err(ParseError::invalid_header_line("continuation line before any header"));
                }
                continue;
            }

            let Some((name, value)) = text.split_once(':') else {
                return Err(ParseError::invalid_header_line(format!("missing colon in {text:?}")));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(ParseError::invalid_header_line("empty header name"));
            }
            fields.append(name, value.trim());
        }
    }

    /// Produces the next body frame of the current message.
    ///
    /// The final frame is [`BodyFrame::End`]; after it the parser is ready
    /// for [`Self::read_head`] again.
    pub async fn next_body_frame(&mut self) -> Result<BodyFrame, ParseError> {
        loop {
            match std::mem::replace(&mut self.phase, BodyPhase::Done) {
                BodyPhase::Idle | BodyPhase::Done => {
                    self.phase = BodyPhase::Done;
                    return Ok(BodyFrame::End { trailers: None });
                }

                BodyPhase::Fixed { remaining } => {
                    let max = usize::try_from(remaining).unwrap_or(usize::MAX);
                    let fragment = match self.reader.next_available(max).await {
                        Ok(fragment) => fragment,
                        Err(e) => return Err(self.fail(e)),
                    };
                    match fragment {
                        Fragment::Full(bytes) => {
                            let left = remaining - bytes.len() as u64;
                            self.phase =
                                if left == 0 { BodyPhase::Finishing { trailers: None } } else { BodyPhase::Fixed { remaining: left } };
                            self.consumers.emit_body(&PayloadItem::Chunk(bytes.clone()));
                            return Ok(BodyFrame::Data(bytes));
                        }
                        Fragment::Partial(_) => {
                            // partial body at eof: spans already delivered, now fail
                            let reason = format!("eof with {remaining} body bytes outstanding");
                            return Err(self.fail(ParseError::closed_by_peer(reason)));
                        }
                    }
                }

                BodyPhase::ChunkSize => {
                    let size = match self.read_chunk_size().await {
                        Ok(size) => size,
                        Err(e) => return Err(self.fail(e)),
                    };
                    if size == 0 {
                        let trailers = match self.read_field_section().await {
                            Ok(fields) => fields,
                            Err(e) => return Err(self.fail(e)),
                        };
                        let trailers = if trailers.is_empty() {
                            None
                        } else {
                            self.consumers.emit_trailers(&trailers);
                            Some(trailers)
                        };
                        self.phase = BodyPhase::Finishing { trailers };
                        continue;
                    }
                    trace!(size, "read chunk size line");
                    self.phase = BodyPhase::ChunkData { remaining: size };
                    continue;
                }

                BodyPhase::ChunkData { remaining } => {
                    let max = usize::try_from(remaining).unwrap_or(usize::MAX);
                    let fragment = match self.reader.next_available(max).await {
                        Ok(fragment) => fragment,
                        Err(e) => return Err(self.fail(e)),
                    };
                    match fragment {
                        Fragment::Full(bytes) => {
                            let left = remaining - bytes.len() as u64;
                            if left == 0 {
                                if let Err(e) = self.consume_chunk_terminator().await {
                                    return Err(self.fail(e));
                                }
                                self.phase = BodyPhase::ChunkSize;
                            } else {
                                self.phase = BodyPhase::ChunkData { remaining: left };
                            }
                            self.consumers.emit_body(&PayloadItem::Chunk(bytes.clone()));
                            return Ok(BodyFrame::Data(bytes));
                        }
                        Fragment::Partial(_) => {
                            let reason = format!("eof with {remaining} chunk bytes outstanding");
                            return Err(self.fail(ParseError::closed_by_peer(reason)));
                        }
                    }
                }

                BodyPhase::Finishing { trailers } => {
                    self.phase = BodyPhase::Done;
                    self.consumers.emit_body(&PayloadItem::Eof);
                    self.consumers.clear();
                    self.finish_message();
                    return Ok(BodyFrame::End { trailers });
                }
            }
        }
    }

    /// Parses one `SIZE-hex[;extensions]` chunk-size line.
    async fn read_chunk_size(&mut self) -> Result<u64, ParseError> {
        let fragment = self.reader.next_line(self.max_header_line_bytes).await?;
        let line = match fragment {
            Fragment::Full(line) => line,
            Fragment::Partial(_) => return Err(ParseError::closed_by_peer("eof before chunk size line")),
        };

        let text =
            std::str::from_utf8(&line).map_err(|_| ParseError::bad_chunk_size("chunk size line is not valid utf-8"))?;
        // extension parameters after ';' are ignored
        let token = text.split(';').next().unwrap_or("").trim();
        if token.is_empty() {
            return Err(ParseError::bad_chunk_size("empty chunk size line"));
        }

        let size = u64::from_str_radix(token, 16)
            .map_err(|_| ParseError::bad_chunk_size(format!("{token:?} is not a hex integer")))?;
        if size > self.max_chunk_bytes {
            return Err(ParseError::chunk_too_large(size, self.max_chunk_bytes));
        }
        Ok(size)
    }

    /// Consumes the CRLF that closes a chunk's data.
    async fn consume_chunk_terminator(&mut self) -> Result<(), ParseError> {
        let fragment = match self.reader.next_line(2).await {
            Ok(fragment) => fragment,
            // anything longer than CRLF here is broken chunk framing,
            // not an oversized protocol line
            Err(ParseError::LineTooLong { .. }) => {
                return Err(ParseError::bad_chunk_size("expected crlf after chunk data"));
            }
            Err(e) => return Err(e),
        };
        match fragment {
            Fragment::Full(rest) if rest.is_empty() => Ok(()),
            Fragment::Full(rest) => {
                Err(ParseError::bad_chunk_size(format!("expected crlf after chunk data, found {rest:?}")))
            }
            Fragment::Partial(_) => Err(ParseError::closed_by_peer("eof after chunk data")),
        }
    }
}

/// Framing selection from the just-parsed header section: chunked wins,
/// `Content-Length` is ignored when chunked encoding is present.
fn payload_size(fields: &FieldSet) -> Result<PayloadSize, ParseError> {
    if is_chunked(fields) {
        return Ok(PayloadSize::Chunked);
    }

    match fields.get("content-length") {
        None => Ok(PayloadSize::Empty),
        Some(value) => {
            let length = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::bad_content_length(format!("value {value:?} is not a u64")))?;
            if length == 0 { Ok(PayloadSize::Empty) } else { Ok(PayloadSize::Length(length)) }
        }
    }
}

/// Chunked applies when it is the final encoding listed.
fn is_chunked(fields: &FieldSet) -> bool {
    fields
        .get_all("transfer-encoding")
        .last()
        .and_then(|value| value.rsplit(',').next())
        .is_some_and(|token| token.trim().eq_ignore_ascii_case("chunked"))
}

//! The per-connection driver.
//!
//! `HttpConnection` owns one transport and runs its whole lifecycle:
//! parsing pipelined requests off the read half, registering each with the
//! response queue, spawning the handler, and pumping the request body into
//! the handler's stream while the handler runs. Responses reach the write
//! half through the [`Pipeline`], so handlers may complete in any order
//! without reordering the wire.
//!
//! A connection ends when the peer closes cleanly, a message asks for
//! `Connection: close`, the idle watcher fires, the cancellation token is
//! cancelled externally, or parsing fails. Structural parse failures get a
//! `400 Bad Request` farewell queued behind the responses already in
//! flight; transport-level failures just tear the connection down.

use std::sync::Arc;

use http::{StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{MessageKind, MessageParser};
use crate::config::ConnectionConfig;
use crate::connection::request::Request;
use crate::connection::response_writer::ResponseWriter;
use crate::connection::{ActivityMonitor, Pipeline, spawn_idle_watcher};
use crate::handler::Handler;
use crate::protocol::{BodyFrame, FieldSet, MessageHead, RequestLine, body_channel};

pub struct HttpConnection<R> {
    parser: MessageParser<R>,
    pipeline: Pipeline,
    monitor: ActivityMonitor,
    token: CancellationToken,
    idle_timeout: std::time::Duration,
}

impl<R> std::fmt::Debug for HttpConnection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").field("idle_timeout", &self.idle_timeout).finish_non_exhaustive()
    }
}

impl<R> HttpConnection<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new<W>(reader: R, writer: W, config: &ConnectionConfig) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let monitor = ActivityMonitor::new();
        Self {
            parser: MessageParser::new(reader, MessageKind::Request, config, monitor.clone()),
            pipeline: Pipeline::new(writer, monitor.clone()),
            monitor,
            token: CancellationToken::new(),
            idle_timeout: config.idle_timeout,
        }
    }

    /// Token cancelled when the connection shuts down; cancel it yourself
    /// to request shutdown, say from a server-wide drain.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Drives the connection until it closes.
    pub async fn serve<H>(mut self, handler: Arc<H>)
    where
        H: Handler + 'static,
    {
        let watcher = spawn_idle_watcher(self.monitor.clone(), self.idle_timeout, self.token.clone());

        loop {
            let head = select! {
                () = self.token.cancelled() => {
                    debug!("connection cancelled, stopping request intake");
                    break;
                }
                result = self.parser.read_head() => result,
            };

            match head {
                Ok(Some(head)) => {
                    if !self.dispatch(head, &handler).await {
                        break;
                    }
                }
                Ok(None) => {
                    info!("peer finished sending requests, closing after in-flight responses");
                    break;
                }
                Err(error) if error.is_structural() => {
                    warn!(%error, "malformed request, answering 400 and closing");
                    let handle = self.pipeline.register().await;
                    let mut writer = ResponseWriter::new(handle, false);
                    if let Err(send_error) = writer.send_error(StatusCode::BAD_REQUEST).await {
                        debug!(%send_error, "could not deliver the 400 farewell");
                    }
                    break;
                }
                Err(error) => {
                    debug!(%error, "transport failed while reading, closing");
                    break;
                }
            }
        }

        select! {
            () = self.pipeline.drained() => {}
            () = self.token.cancelled() => {}
        }
        self.pipeline.shutdown().await;
        self.token.cancel();
        let _ = watcher.await;
    }

    /// Runs one request/response exchange: spawns the handler and pumps the
    /// request body until the message ends. Returns `false` when no further
    /// request should be read from this connection.
    async fn dispatch<H>(&mut self, head: MessageHead, handler: &Arc<H>) -> bool
    where
        H: Handler + 'static,
    {
        let MessageHead { start, fields, .. } = head;
        let Some(line) = start.into_request() else {
            warn!("status line arrived on the server side, closing");
            return false;
        };

        let keep_alive = wants_keep_alive(&line, &fields);
        let expects_continue = fields.value_has_token("expect", "100-continue");

        let handle = self.pipeline.register().await;
        let mut writer = ResponseWriter::new(handle, keep_alive);

        if expects_continue {
            if let Err(error) = writer.send_interim(StatusCode::CONTINUE).await {
                debug!(%error, "failed to send 100 continue");
                return false;
            }
        }

        let (sender, body) = body_channel();
        let request = Request::new(line, fields, body);

        tokio::spawn({
            let handler = Arc::clone(handler);
            async move {
                match handler.call(request, &mut writer).await {
                    Ok(()) => {
                        if let Err(error) = writer.end().await {
                            debug!(%error, "could not finish response after handler returned");
                        }
                    }
                    Err(cause) => {
                        error!(cause = %cause, "handler failed");
                        if let Err(error) = writer.send_error(StatusCode::INTERNAL_SERVER_ERROR).await {
                            debug!(%error, "could not deliver the 500 response");
                        }
                    }
                }
            }
        });

        // Pump the body even when the handler drops its stream: the parser
        // must reach the message boundary before the next head is read.
        loop {
            let frame = select! {
                () = self.token.cancelled() => return false,
                frame = self.parser.next_body_frame() => frame,
            };
            match frame {
                Ok(frame @ BodyFrame::Data(_)) => {
                    sender.send(Ok(frame)).await;
                }
                Ok(frame @ BodyFrame::End { .. }) => {
                    sender.send(Ok(frame)).await;
                    break;
                }
                Err(error) => {
                    warn!(%error, "request body failed, closing the connection");
                    sender.send(Err(error)).await;
                    return false;
                }
            }
        }

        keep_alive
    }
}

/// HTTP/1.1 connections persist unless a message says `Connection: close`;
/// HTTP/1.0 connections close unless a message says `keep-alive`.
fn wants_keep_alive(line: &RequestLine, fields: &FieldSet) -> bool {
    match line.version() {
        Version::HTTP_11 => !fields.value_has_token("connection", "close"),
        Version::HTTP_10 => fields.value_has_token("connection", "keep-alive"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ParseError;

    fn request_line(text: &str) -> RequestLine {
        RequestLine::parse(text).unwrap()
    }

    #[test]
    fn http11_defaults_to_keep_alive() {
        let line = request_line("GET / HTTP/1.1");
        assert!(wants_keep_alive(&line, &FieldSet::new()));

        let mut fields = FieldSet::new();
        fields.append("connection", "close");
        assert!(!wants_keep_alive(&line, &fields));
    }

    #[test]
    fn http10_defaults_to_close() {
        let line = request_line("GET / HTTP/1.0");
        assert!(!wants_keep_alive(&line, &FieldSet::new()));

        let mut fields = FieldSet::new();
        fields.append("connection", "Keep-Alive");
        assert!(wants_keep_alive(&line, &fields));
    }

    #[test]
    fn connection_list_is_scanned_per_token() {
        let line = request_line("GET / HTTP/1.1");
        let mut fields = FieldSet::new();
        fields.append("connection", "upgrade, close");
        assert!(!wants_keep_alive(&line, &fields));
    }

    #[test]
    fn structural_errors_pick_the_farewell_path() {
        assert!(ParseError::malformed_start_line("junk").is_structural());
        assert!(!ParseError::closed_by_peer("mid-body eof").is_structural());
    }
}

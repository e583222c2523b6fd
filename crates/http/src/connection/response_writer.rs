//! The outgoing half of one request/response exchange.
//!
//! A [`ResponseWriter`] accumulates status and header fields until the
//! first body write, at which point the head freezes, the framing mode is
//! chosen, and the serialized head goes to the pipeline. After the freeze
//! any attempt to change the head is rejected with
//! [`SendError::HeadAlreadySent`]. Framing follows the caller's own
//! `Content-Length` header when one is present; otherwise the body is sent
//! chunked and a `Transfer-Encoding: chunked` field is added. Statuses
//! that forbid a body (1xx, 204, 304) are framed as empty.

use bytes::{Bytes, BytesMut};
use http::{StatusCode, Version};
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

use crate::codec::body::PayloadEncoder;
use crate::codec::encode_head;
use crate::connection::{WriteHandle, WriteOutcome};
use crate::protocol::{FieldSet, PayloadItem, SendError};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum WriterState {
    /// Head still mutable, nothing on the wire for this message.
    Preparing,
    /// Head serialized, body writes flowing through the encoder.
    Streaming,
    /// Terminator written and the pipeline slot ended.
    Finished,
}

pub struct ResponseWriter {
    handle: WriteHandle,
    status: StatusCode,
    fields: FieldSet,
    keep_alive: bool,
    state: WriterState,
    encoder: PayloadEncoder,
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("status", &self.status)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ResponseWriter {
    pub(crate) fn new(handle: WriteHandle, keep_alive: bool) -> Self {
        Self {
            handle,
            status: StatusCode::OK,
            fields: FieldSet::new(),
            keep_alive,
            state: WriterState::Preparing,
            encoder: PayloadEncoder::empty(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// True once the head has been serialized toward the wire.
    pub fn head_sent(&self) -> bool {
        self.state != WriterState::Preparing
    }

    pub fn is_finished(&self) -> bool {
        self.state == WriterState::Finished
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<(), SendError> {
        if self.head_sent() {
            return Err(SendError::head_already_sent("set_status"));
        }
        self.status = status;
        Ok(())
    }

    /// Sets `name` to `value`, replacing previous values of that field.
    pub fn insert_header(&mut self, name: &str, value: &str) -> Result<(), SendError> {
        if self.head_sent() {
            return Err(SendError::head_already_sent("insert_header"));
        }
        self.fields.insert(name, value);
        Ok(())
    }

    /// Adds a value for `name`, keeping any the field already has.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), SendError> {
        if self.head_sent() {
            return Err(SendError::head_already_sent("append_header"));
        }
        self.fields.append(name, value);
        Ok(())
    }

    /// Asks for the connection to close once this response is on the wire.
    pub fn request_close(&mut self) -> Result<(), SendError> {
        if self.head_sent() {
            return Err(SendError::head_already_sent("request_close"));
        }
        self.keep_alive = false;
        Ok(())
    }

    /// Sends an interim `1xx` response ahead of the final head. Only legal
    /// while the head is still mutable.
    pub(crate) async fn send_interim(&mut self, status: StatusCode) -> Result<(), SendError> {
        debug_assert!(status.is_informational());
        if self.head_sent() {
            return Err(SendError::head_already_sent("send_interim"));
        }
        let mut head = BytesMut::new();
        encode_head(Version::HTTP_11, status, &FieldSet::new(), &mut head)?;
        self.handle.write(head.freeze()).await?;
        Ok(())
    }

    /// Freezes the head, decides the framing, and hands the serialized
    /// head to the pipeline. Explicit so callers can flush headers before
    /// producing any body; body writes call it implicitly.
    pub async fn write_head(&mut self) -> Result<(), SendError> {
        match self.state {
            WriterState::Preparing => {}
            WriterState::Streaming => return Err(SendError::head_already_sent("write_head")),
            WriterState::Finished => return Err(SendError::Closed),
        }

        self.encoder = self.choose_framing();
        if self.encoder.is_chunked() {
            self.fields.insert("transfer-encoding", "chunked");
        }
        // a caller-set close header counts the same as request_close()
        if self.fields.value_has_token("connection", "close") {
            self.keep_alive = false;
        }
        if self.keep_alive {
            if !self.fields.contains("connection") {
                self.fields.insert("connection", "keep-alive");
            }
        } else {
            self.fields.insert("connection", "close");
            self.handle.mark_close_when_done().await;
        }

        let mut head = BytesMut::new();
        encode_head(Version::HTTP_11, self.status, &self.fields, &mut head)?;
        let outcome = self.handle.write(head.freeze()).await?;
        self.state = WriterState::Streaming;
        debug!(status = %self.status, chunked = self.encoder.is_chunked(), ?outcome, "response head sent");
        Ok(())
    }

    /// Writes one span of body data, sending the head first if needed.
    pub async fn write<B: Into<Bytes>>(&mut self, body: B) -> Result<WriteOutcome, SendError> {
        if self.state == WriterState::Finished {
            return Err(SendError::Closed);
        }
        if self.state == WriterState::Preparing {
            self.write_head().await?;
        }

        let mut framed = BytesMut::new();
        self.encoder.encode(PayloadItem::Chunk(body.into()), &mut framed)?;
        self.handle.write(framed.freeze()).await
    }

    /// Ends the message: writes the framing terminator and releases the
    /// pipeline slot. Safe to call more than once.
    pub async fn end(&mut self) -> Result<(), SendError> {
        if self.state == WriterState::Finished {
            return Ok(());
        }
        if self.state == WriterState::Preparing {
            // bodyless response: advertise a zero length rather than
            // an empty chunked stream
            if !self.fields.contains("content-length") && body_allowed(self.status) {
                self.fields.insert("content-length", "0");
            }
            self.write_head().await?;
        }

        let mut framed = BytesMut::new();
        self.encoder.encode(PayloadItem::Eof, &mut framed)?;
        if !framed.is_empty() {
            self.handle.write(framed.freeze()).await?;
        }
        self.state = WriterState::Finished;
        self.handle.end().await
    }

    /// Replaces whatever was being prepared with a plain error response.
    /// A no-op when the head is already on the wire.
    pub(crate) async fn send_error(&mut self, status: StatusCode) -> Result<(), SendError> {
        if self.head_sent() {
            warn!(status = %status, "head already sent, cannot convert response into an error");
            return self.end().await;
        }
        self.status = status;
        self.fields = FieldSet::new();
        self.fields.insert("content-length", "0");
        self.keep_alive = false;
        self.end().await
    }

    fn choose_framing(&self) -> PayloadEncoder {
        if !body_allowed(self.status) {
            return PayloadEncoder::empty();
        }
        match self.fields.get("content-length") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => PayloadEncoder::empty(),
                Ok(n) => PayloadEncoder::fixed_length(n),
                Err(_) => {
                    warn!(value, "unparseable content-length on outgoing head, sending chunked");
                    PayloadEncoder::chunked()
                }
            },
            None => PayloadEncoder::chunked(),
        }
    }
}

fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ActivityMonitor, Pipeline};
    use tokio::io::AsyncReadExt;

    async fn writer_over_duplex() -> (ResponseWriter, Pipeline, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        let pipeline = Pipeline::new(server, ActivityMonitor::new());
        let handle = pipeline.register().await;
        (ResponseWriter::new(handle, true), pipeline, client)
    }

    async fn wire_text(pipeline: &Pipeline, mut client: tokio::io::DuplexStream) -> String {
        pipeline.drained().await;
        pipeline.shutdown().await;
        let mut collected = Vec::new();
        client.read_to_end(&mut collected).await.unwrap();
        String::from_utf8(collected).unwrap()
    }

    #[tokio::test]
    async fn declared_length_framing_follows_the_caller_header() {
        let (mut writer, pipeline, client) = writer_over_duplex().await;

        writer.insert_header("content-length", "5").unwrap();
        writer.write("hello").await.unwrap();
        writer.end().await.unwrap();

        let text = wire_text(&pipeline, client).await;
        assert_eq!(text, "HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: keep-alive\r\n\r\nhello");
    }

    #[tokio::test]
    async fn undeclared_length_falls_back_to_chunked() {
        let (mut writer, pipeline, client) = writer_over_duplex().await;

        writer.write("hi").await.unwrap();
        writer.write("there").await.unwrap();
        writer.end().await.unwrap();

        let text = wire_text(&pipeline, client).await;
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\nconnection: keep-alive\r\n\r\n2\r\nhi\r\n5\r\nthere\r\n0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn head_mutation_after_first_write_is_rejected() {
        let (mut writer, _pipeline, _client) = writer_over_duplex().await;

        writer.write("x").await.unwrap();
        let err = writer.set_status(StatusCode::NOT_FOUND).unwrap_err();
        assert!(matches!(err, SendError::HeadAlreadySent { operation: "set_status" }));
        let err = writer.insert_header("x-late", "1").unwrap_err();
        assert!(matches!(err, SendError::HeadAlreadySent { .. }));
    }

    #[tokio::test]
    async fn end_is_idempotent_on_the_wire() {
        let (mut writer, pipeline, client) = writer_over_duplex().await;

        writer.write("once").await.unwrap();
        writer.end().await.unwrap();
        writer.end().await.unwrap();
        writer.end().await.unwrap();

        let text = wire_text(&pipeline, client).await;
        assert_eq!(text.matches("0\r\n\r\n").count(), 1);
    }

    #[tokio::test]
    async fn bodyless_end_advertises_zero_length() {
        let (mut writer, pipeline, client) = writer_over_duplex().await;

        writer.set_status(StatusCode::NOT_FOUND).unwrap();
        writer.end().await.unwrap();

        let text = wire_text(&pipeline, client).await;
        assert_eq!(text, "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: keep-alive\r\n\r\n");
    }

    #[tokio::test]
    async fn close_request_adds_the_connection_field() {
        let (mut writer, pipeline, client) = writer_over_duplex().await;

        writer.request_close().unwrap();
        writer.insert_header("content-length", "2").unwrap();
        writer.write("ok").await.unwrap();
        writer.end().await.unwrap();

        let text = wire_text(&pipeline, client).await;
        assert!(text.contains("connection: close\r\n"));
    }

    #[tokio::test]
    async fn interim_response_precedes_the_final_head() {
        let (mut writer, pipeline, client) = writer_over_duplex().await;

        writer.send_interim(StatusCode::CONTINUE).await.unwrap();
        writer.insert_header("content-length", "4").unwrap();
        writer.write("done").await.unwrap();
        writer.end().await.unwrap();

        let text = wire_text(&pipeline, client).await;
        assert!(text.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn fixed_length_overrun_is_an_error() {
        let (mut writer, _pipeline, _client) = writer_over_duplex().await;

        writer.insert_header("content-length", "3").unwrap();
        writer.write("abc").await.unwrap();
        let err = writer.write("d").await.unwrap_err();
        assert!(matches!(err, SendError::BodyOverrun { declared: 3, written: 4 }));
    }
}

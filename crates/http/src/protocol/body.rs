//! Request body transport between the connection driver and a handler task.
//!
//! The driver parses body frames sequentially and pushes them through a
//! bounded channel; the handler consumes them at its own pace. Backpressure
//! comes from the channel capacity. When the handler drops its
//! [`BodyStream`] early, the driver keeps parsing to the end of the message
//! and discards the remaining frames so the connection stays usable for the
//! next pipelined request.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::sync::mpsc;

use crate::protocol::{BodyFrame, FieldSet, ParseError};

const FRAME_CHANNEL_CAPACITY: usize = 8;

pub(crate) fn body_channel() -> (BodySender, BodyStream) {
    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    (BodySender { tx }, BodyStream { rx, finished: false })
}

/// Driver-side producer of body frames.
#[derive(Debug)]
pub(crate) struct BodySender {
    tx: mpsc::Sender<Result<BodyFrame, ParseError>>,
}

impl BodySender {
    /// Forwards one frame; returns false when the receiving side is gone
    /// (the handler stopped caring, the driver should keep draining).
    pub(crate) async fn send(&self, frame: Result<BodyFrame, ParseError>) -> bool {
        self.tx.send(frame).await.is_ok()
    }
}

/// The streaming body of an incoming request.
///
/// Yields [`BodyFrame::Data`] spans in wire order, then a single
/// [`BodyFrame::End`] carrying the trailers if any, then `None`.
#[derive(Debug)]
pub struct BodyStream {
    rx: mpsc::Receiver<Result<BodyFrame, ParseError>>,
    finished: bool,
}

impl BodyStream {
    /// Next frame, or `None` once the body has ended.
    pub async fn frame(&mut self) -> Option<Result<BodyFrame, ParseError>> {
        if self.finished {
            return None;
        }
        let frame = self.rx.recv().await?;
        if matches!(frame, Ok(BodyFrame::End { .. }) | Err(_)) {
            self.finished = true;
        }
        Some(frame)
    }

    /// Next data span, skipping the end marker. `None` once the body is
    /// fully delivered.
    pub async fn data(&mut self) -> Option<Result<Bytes, ParseError>> {
        match self.frame().await? {
            Ok(BodyFrame::Data(bytes)) => Some(Ok(bytes)),
            Ok(BodyFrame::End { .. }) => None,
            Err(e) => Some(Err(e)),
        }
    }

    /// Buffers the whole body, returning the bytes and the trailers.
    pub async fn collect(mut self) -> Result<(Bytes, Option<FieldSet>), ParseError> {
        let mut buf = BytesMut::new();
        loop {
            match self.frame().await {
                Some(Ok(BodyFrame::Data(bytes))) => buf.extend_from_slice(&bytes),
                Some(Ok(BodyFrame::End { trailers })) => return Ok((buf.freeze(), trailers)),
                Some(Err(e)) => return Err(e),
                None => return Ok((buf.freeze(), None)),
            }
        }
    }
}

impl Stream for BodyStream {
    type Item = Result<BodyFrame, ParseError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(frame)) => {
                if matches!(frame, Ok(BodyFrame::End { .. }) | Err(_)) {
                    this.finished = true;
                }
                Poll::Ready(Some(frame))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_concatenates_spans_and_keeps_trailers() {
        let (tx, stream) = body_channel();
        let mut trailers = FieldSet::new();
        trailers.append("X-Check", "abc");

        tokio::spawn(async move {
            assert!(tx.send(Ok(BodyFrame::Data(Bytes::from_static(b"hello ")))).await);
            assert!(tx.send(Ok(BodyFrame::Data(Bytes::from_static(b"world")))).await);
            assert!(tx.send(Ok(BodyFrame::End { trailers: Some(trailers) })).await);
        });

        let (bytes, trailers) = stream.collect().await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
        assert_eq!(trailers.unwrap().get("x-check"), Some("abc"));
    }

    #[tokio::test]
    async fn stream_stops_after_end_frame() {
        let (tx, mut stream) = body_channel();
        tokio::spawn(async move {
            assert!(tx.send(Ok(BodyFrame::End { trailers: None })).await);
        });

        assert!(stream.data().await.is_none());
        assert!(stream.frame().await.is_none());
    }

    #[tokio::test]
    async fn sender_observes_dropped_receiver() {
        let (tx, stream) = body_channel();
        drop(stream);
        assert!(!tx.send(Ok(BodyFrame::Data(Bytes::from_static(b"x")))).await);
    }
}

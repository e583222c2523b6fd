//! Observer lists for parser events.
//!
//! The parser publishes every event (start line, headers, body spans and
//! the end-of-body marker, trailers, failures) to all registered consumers.
//! A consumer that returns an error is logged and skipped so it cannot
//! break delivery to the others. Registrations apply to the current message
//! only: the parser clears the whole set when a message reaches its end or
//! fails, so each message starts with a clean consumer set.

use std::error::Error;
use std::fmt;

use tracing::error;

use crate::protocol::{FieldSet, ParseError, PayloadItem, StartLine};

type ConsumerResult = Result<(), Box<dyn Error + Send + Sync>>;

type Consumer<E> = Box<dyn FnMut(&E) -> ConsumerResult + Send>;

/// Per-event consumer lists for one message.
#[derive(Default)]
pub struct EventConsumers {
    line: Vec<Consumer<StartLine>>,
    headers: Vec<Consumer<FieldSet>>,
    body: Vec<Consumer<PayloadItem>>,
    trailers: Vec<Consumer<FieldSet>>,
    failure: Vec<Consumer<ParseError>>,
}

impl fmt::Debug for EventConsumers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventConsumers")
            .field("line", &self.line.len())
            .field("headers", &self.headers.len())
            .field("body", &self.body.len())
            .field("trailers", &self.trailers.len())
            .field("failure", &self.failure.len())
            .finish()
    }
}

fn deliver<E>(consumers: &mut [Consumer<E>], event: &E, kind: &'static str) {
    for consumer in consumers.iter_mut() {
        if let Err(e) = consumer(event) {
            error!(event = kind, cause = %e, "consumer failed, isolating it from delivery");
        }
    }
}

impl EventConsumers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_line<F>(&mut self, consumer: F)
    where
        F: FnMut(&StartLine) -> ConsumerResult + Send + 'static,
    {
        self.line.push(Box::new(consumer));
    }

    pub fn on_headers<F>(&mut self, consumer: F)
    where
        F: FnMut(&FieldSet) -> ConsumerResult + Send + 'static,
    {
        self.headers.push(Box::new(consumer));
    }

    pub fn on_body<F>(&mut self, consumer: F)
    where
        F: FnMut(&PayloadItem) -> ConsumerResult + Send + 'static,
    {
        self.body.push(Box::new(consumer));
    }

    pub fn on_trailers<F>(&mut self, consumer: F)
    where
        F: FnMut(&FieldSet) -> ConsumerResult + Send + 'static,
    {
        self.trailers.push(Box::new(consumer));
    }

    pub fn on_failure<F>(&mut self, consumer: F)
    where
        F: FnMut(&ParseError) -> ConsumerResult + Send + 'static,
    {
        self.failure.push(Box::new(consumer));
    }

    pub(crate) fn emit_line(&mut self, line: &StartLine) {
        deliver(&mut self.line, line, "line");
    }

    pub(crate) fn emit_headers(&mut self, fields: &FieldSet) {
        deliver(&mut self.headers, fields, "headers");
    }

    pub(crate) fn emit_body(&mut self, item: &PayloadItem) {
        deliver(&mut self.body, item, "body");
    }

    pub(crate) fn emit_trailers(&mut self, fields: &FieldSet) {
        deliver(&mut self.trailers, fields, "trailers");
    }

    pub(crate) fn emit_failure(&mut self, error: &ParseError) {
        deliver(&mut self.failure, error, "failure");
    }

    /// Drops every registration, ready for the next message.
    pub fn clear(&mut self) {
        self.line.clear();
        self.headers.clear();
        self.body.clear();
        self.trailers.clear();
        self.failure.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_consumer_sees_every_event() {
        let mut consumers = EventConsumers::new();
        let seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let seen = seen.clone();
            consumers.on_body(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        consumers.emit_body(&PayloadItem::Chunk(Bytes::from_static(b"x")));
        consumers.emit_body(&PayloadItem::Eof);
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn failing_consumer_does_not_break_the_others() {
        let mut consumers = EventConsumers::new();
        let collected = Arc::new(Mutex::new(Vec::new()));

        consumers.on_body(|_| Err("observer exploded".into()));
        {
            let collected = collected.clone();
            consumers.on_body(move |item| {
                collected.lock().unwrap().push(item.clone());
                Ok(())
            });
        }

        consumers.emit_body(&PayloadItem::Chunk(Bytes::from_static(b"data")));
        assert_eq!(collected.lock().unwrap().len(), 1);
    }

    #[test]
    fn clear_drops_registrations() {
        let mut consumers = EventConsumers::new();
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = seen.clone();
            consumers.on_headers(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        consumers.clear();
        consumers.emit_headers(&FieldSet::new());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}

//! Application-side request handling.
//!
//! A [`Handler`] is invoked once per request with the parsed [`Request`]
//! and the [`ResponseWriter`] bound to that request's slot in the response
//! queue. Handlers may stream the body out piecewise; the connection task
//! guarantees the bytes reach the wire in request order no matter when the
//! handler completes. A handler that returns without calling
//! [`ResponseWriter::end`] gets the message ended on its behalf.

use std::error::Error;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::connection::{Request, ResponseWriter};

pub type BoxError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: Request, response: &mut ResponseWriter) -> Result<(), BoxError>;
}

/// Adapter turning a plain async function into a [`Handler`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(Request, &'a mut ResponseWriter) -> BoxFuture<'a, Result<(), BoxError>>
        + Send
        + Sync,
{
    async fn call(&self, request: Request, response: &mut ResponseWriter) -> Result<(), BoxError> {
        (self.f)(request, response).await
    }
}

/// Wraps `f` as a [`Handler`]. `f` receives the request and the writer for
/// its slot and resolves once the response is produced.
pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Request, &'a mut ResponseWriter) -> BoxFuture<'a, Result<(), BoxError>>
        + Send
        + Sync,
{
    HandlerFn { f }
}

/// Boxes the future of an async request function so it fits the
/// [`HandlerFn`] signature.
pub fn boxed<'a, Fut>(future: Fut) -> BoxFuture<'a, Result<(), BoxError>>
where
    Fut: Future<Output = Result<(), BoxError>> + Send + 'a,
{
    Box::pin(future)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ActivityMonitor, Pipeline};
    use crate::protocol::{FieldSet, RequestLine, body_channel};

    fn greet(request: Request, response: &mut ResponseWriter) -> BoxFuture<'_, Result<(), BoxError>> {
        boxed(async move {
            let _ = request;
            response.insert_header("content-length", "2")?;
            response.write("ok").await?;
            response.end().await?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn make_handler_adapts_plain_functions() {
        let (_client, server) = tokio::io::duplex(1024);
        let pipeline = Pipeline::new(server, ActivityMonitor::new());
        let mut writer = ResponseWriter::new(pipeline.register().await, true);

        let (_sender, body) = body_channel();
        let line = RequestLine::parse("GET / HTTP/1.1").unwrap();
        let request = Request::new(line, FieldSet::new(), body);

        let handler = make_handler(greet);
        handler.call(request, &mut writer).await.unwrap();
        assert!(writer.is_finished());
    }
}

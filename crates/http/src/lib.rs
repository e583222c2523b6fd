//! An incremental HTTP/1.1 engine with connection-level pipelining
//!
//! This crate provides a small, self-contained HTTP/1.1 implementation built
//! on top of tokio. Requests are parsed incrementally as bytes arrive, bodies
//! stream to handlers without full buffering, and responses to pipelined
//! requests are put on the wire in request order no matter when their
//! handlers complete.
//!
//! # Features
//!
//! - Incremental request parsing with per-line limits
//! - Fixed-length and chunked bodies, including trailers
//! - Streaming request and response bodies
//! - Pipelining with strict response ordering
//! - Keep-alive connections with idle supervision
//! - Expect-continue mechanism
//!
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn, Level};
//! use tracing_subscriber::FmtSubscriber;
//! use pipeline_http::config::ConnectionConfig;
//! use pipeline_http::connection::{HttpConnection, Request, ResponseWriter};
//! use pipeline_http::handler::{BoxError, Handler};
//!
//! struct HelloWorld;
//!
//! #[async_trait]
//! impl Handler for HelloWorld {
//!     async fn call(&self, request: Request, response: &mut ResponseWriter) -> Result<(), BoxError> {
//!         info!(path = request.uri().path(), "incoming request");
//!
//!         let (body, _trailers) = request.into_body().collect().await?;
//!         info!(bytes = body.len(), "request body received");
//!
//!         let message = "Hello World!\r\n";
//!         response.insert_header("content-length", &message.len().to_string())?;
//!         response.write(message).await?;
//!         response.end().await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder()
//!         .with_max_level(Level::INFO)
//!         .finish();
//!     tracing::subscriber::set_global_default(subscriber)
//!         .expect("setting default subscriber failed");
//!
//!     info!(port = 8080, "start listening");
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let config = ConnectionConfig::default();
//!     let handler = Arc::new(HelloWorld);
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!         let config = config.clone();
//!
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer, &config);
//!             connection.serve(handler).await;
//!             info!("connection closed");
//!         });
//!     }
//! }
//! ```
//!
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`connection`]: Connection lifecycle, response ordering, and idle supervision
//! - [`protocol`]: Protocol types and the parse-event observer registry
//! - [`codec`]: Incremental parsing and outgoing serialization
//! - [`handler`]: Request handler traits and utilities
//!
//!
//! # Core Components
//!
//! [`connection::HttpConnection`] drives one transport: it parses requests,
//! hands each to the [`handler::Handler`], and pumps the request body while
//! the handler runs. [`connection::ResponseWriter`] accumulates the response
//! head until the first body write, then freezes it and streams the body
//! with the framing chosen from the headers. [`connection::Pipeline`] keeps
//! pipelined responses in request order, buffering out-of-turn output.
//!
//! Parse events (start line, headers, body spans, trailers, failures) can
//! additionally be observed through [`protocol::EventConsumers`], which the
//! parser publishes to as the message is consumed.
//!
//! Errors implement `std::error::Error`:
//!
//! - [`protocol::HttpError`]: Top-level error type
//! - [`protocol::ParseError`]: Incoming message errors
//! - [`protocol::SendError`]: Outgoing message errors

pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod protocol;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use pipeline_http::config::ConnectionConfig;
use pipeline_http::connection::{HttpConnection, Request, ResponseWriter};
use pipeline_http::handler::{BoxError, Handler};

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let config = ConnectionConfig::default();
    let handler = Arc::new(SimpleHandler);

    loop {
        let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let handler = handler.clone();
        let config = config.clone();

        tokio::spawn(async move {
            let (reader, writer) = tcp_stream.into_split();
            let connection = HttpConnection::new(reader, writer, &config);
            connection.serve(handler).await;
            info!(peer = %remote_addr, "connection closed");
        });
    }
}

struct SimpleHandler;

#[async_trait]
impl Handler for SimpleHandler {
    async fn call(&self, request: Request, response: &mut ResponseWriter) -> Result<(), BoxError> {
        info!(path = request.uri().path(), "incoming request");

        let (body, _trailers) = request.into_body().collect().await?;
        if !body.is_empty() {
            info!(bytes = body.len(), "request body received");
        }

        let message = "Hello World!\r\n";
        response.insert_header("content-length", &message.len().to_string())?;
        response.write(message).await?;
        response.end().await?;
        Ok(())
    }
}

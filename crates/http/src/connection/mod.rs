//! Connection lifecycle: the driver, the response ordering queue, the
//! per-exchange writer, and idle supervision.

mod http_connection;
pub use http_connection::HttpConnection;

mod request;
pub use request::Request;

mod response_writer;
pub use response_writer::ResponseWriter;

mod pipeline;
pub use pipeline::Pipeline;
pub use pipeline::WriteHandle;
pub use pipeline::WriteOutcome;

mod idle;
pub use idle::ActivityMonitor;
pub use idle::spawn_idle_watcher;

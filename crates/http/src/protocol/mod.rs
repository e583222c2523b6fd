//! Protocol types shared by the read and write sides of the engine.
//!
//! - [`StartLine`] / [`RequestLine`] / [`StatusLine`]: parsed first lines
//! - [`FieldSet`]: ordered header storage with continuation folding
//! - [`MessageHead`], [`BodyFrame`], [`PayloadItem`], [`PayloadSize`]:
//!   message framing vocabulary
//! - [`EventConsumers`]: observer lists the parser publishes into
//! - [`BodyStream`]: the handler-facing body surface
//! - [`HttpError`], [`ParseError`], [`SendError`]: error kinds

mod fields;
pub use fields::FieldSet;

mod line;
pub use line::RequestLine;
pub use line::StartLine;
pub use line::StatusLine;

mod message;
pub use message::BodyFrame;
pub use message::MessageHead;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod consumers;
pub use consumers::EventConsumers;

mod body;
pub(crate) use body::BodySender;
pub use body::BodyStream;
pub(crate) use body::body_channel;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

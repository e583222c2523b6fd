//! Wire-level reading, parsing, and encoding.
//!
//! - [`LineReader`]: incremental line/span extraction over the transport
//! - [`MessageParser`]: the state machine from start line to message end
//! - [`encode_head`] and the [`body`] encoders: outgoing serialization

pub mod body;

mod line_reader;
pub use line_reader::Fragment;
pub use line_reader::LineReader;

mod message_parser;
pub use message_parser::MessageKind;
pub use message_parser::MessageParser;

mod head_encoder;
pub use head_encoder::encode_head;

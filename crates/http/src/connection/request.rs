//! The handler-facing view of one incoming message.

use http::{Method, Uri, Version};

use crate::protocol::{BodyStream, FieldSet, RequestLine};

/// A parsed request head plus its streaming body.
///
/// The body arrives incrementally while the connection task keeps parsing;
/// dropping the [`BodyStream`] simply discards the rest of the payload
/// without desynchronizing the connection.
#[derive(Debug)]
pub struct Request {
    line: RequestLine,
    fields: FieldSet,
    body: BodyStream,
}

impl Request {
    pub(crate) fn new(line: RequestLine, fields: FieldSet, body: BodyStream) -> Self {
        Self { line, fields, body }
    }

    pub fn method(&self) -> &Method {
        self.line.method()
    }

    pub fn uri(&self) -> &Uri {
        self.line.target()
    }

    pub fn version(&self) -> Version {
        self.line.version()
    }

    pub fn headers(&self) -> &FieldSet {
        &self.fields
    }

    pub fn body_mut(&mut self) -> &mut BodyStream {
        &mut self.body
    }

    pub fn into_body(self) -> BodyStream {
        self.body
    }
}

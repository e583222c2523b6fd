//! Serialization of an outgoing message head.

use bytes::{BufMut, BytesMut};
use http::{StatusCode, Version};
use std::io;
use std::io::{ErrorKind, Write};
use tracing::error;

use crate::protocol::{FieldSet, SendError};

const INIT_HEAD_SIZE: usize = 4 * 1024;

/// Writes `VERSION SP STATUS SP REASON CRLF`, the field lines in their
/// stored order, and the blank terminator. Continuation folding is never
/// produced on the write side.
pub fn encode_head(
    version: Version,
    status: StatusCode,
    fields: &FieldSet,
    dst: &mut BytesMut,
) -> Result<(), SendError> {
    dst.reserve(INIT_HEAD_SIZE);
    match version {
        Version::HTTP_11 => {
            write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or("Unknown"))?;
        }
        v => {
            error!(http_version = ?v, "unsupported http version on the write side");
            return Err(io::Error::from(ErrorKind::Unsupported).into());
        }
    }

    for (name, value) in fields.iter() {
        dst.put_slice(name.as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
    Ok(())
}

/// Writer over `BytesMut` so `write!` can target the reserved buffer
/// without an intermediate allocation.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_lines_follow_field_order() {
        let mut fields = FieldSet::new();
        fields.append("Content-Length", "5");
        fields.append("X-A", "1");
        fields.append("X-A", "2");

        let mut dst = BytesMut::new();
        encode_head(Version::HTTP_11, StatusCode::OK, &fields, &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert_eq!(text, "HTTP/1.1 200 OK\r\ncontent-length: 5\r\nx-a: 1\r\nx-a: 2\r\n\r\n");
    }

    #[test]
    fn http2_is_rejected() {
        let mut dst = BytesMut::new();
        let err = encode_head(Version::HTTP_2, StatusCode::OK, &FieldSet::new(), &mut dst).unwrap_err();
        assert!(matches!(err, SendError::Io { .. }));
    }
}

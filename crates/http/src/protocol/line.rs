//! Start-line parsing for requests and responses.
//!
//! The first line of a message carries exactly three fields separated by
//! single spaces: `METHOD SP TARGET SP VERSION` for requests and
//! `VERSION SP STATUS SP REASON` for responses. Trailing whitespace is
//! trimmed first; an empty field or an unknown version is a
//! [`ParseError::MalformedStartLine`].

use http::{Method, StatusCode, Uri, Version};

use crate::protocol::ParseError;

/// The parsed first line of an incoming message.
#[derive(Debug, Clone)]
pub enum StartLine {
    Request(RequestLine),
    Response(StatusLine),
}

/// `METHOD SP TARGET SP VERSION`
#[derive(Debug, Clone)]
pub struct RequestLine {
    method: Method,
    target: Uri,
    version: Version,
}

/// `VERSION SP STATUS SP REASON`
#[derive(Debug, Clone)]
pub struct StatusLine {
    version: Version,
    status: StatusCode,
    reason: String,
}

fn split_three(line: &str) -> Result<(&str, &str, &str), ParseError> {
    let line = line.trim_end();
    let mut parts = line.splitn(3, ' ');
    let first = parts.next().unwrap_or("");
    let second = parts.next().unwrap_or("");
    let third = parts.next().unwrap_or("");
    if first.is_empty() || second.is_empty() || third.is_empty() {
        return Err(ParseError::malformed_start_line(format!("expected three fields in {line:?}")));
    }
    Ok((first, second, third))
}

fn parse_version(token: &str) -> Result<Version, ParseError> {
    match token {
        "HTTP/1.1" => Ok(Version::HTTP_11),
        "HTTP/1.0" => Ok(Version::HTTP_10),
        other => Err(ParseError::malformed_start_line(format!("unsupported version {other:?}"))),
    }
}

impl RequestLine {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (method, target, version) = split_three(line)?;

        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ParseError::malformed_start_line(format!("invalid method {method:?}")))?;
        let target: Uri =
            target.parse().map_err(|_| ParseError::malformed_start_line(format!("invalid target {target:?}")))?;
        let version = parse_version(version)?;

        Ok(Self { method, target, version })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &Uri {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
    }
}

impl StatusLine {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (version, status, reason) = split_three(line)?;

        let version = parse_version(version)?;
        let status: StatusCode =
            status.parse().map_err(|_| ParseError::malformed_start_line(format!("invalid status {status:?}")))?;

        Ok(Self { version, status, reason: reason.trim_end().to_string() })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl StartLine {
    pub fn as_request(&self) -> Option<&RequestLine> {
        match self {
            StartLine::Request(line) => Some(line),
            StartLine::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&StatusLine> {
        match self {
            StartLine::Request(_) => None,
            StartLine::Response(line) => Some(line),
        }
    }

    pub fn into_request(self) -> Option<RequestLine> {
        match self {
            StartLine::Request(line) => Some(line),
            StartLine::Response(_) => None,
        }
    }
}

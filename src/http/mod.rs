//! The HTTP/1.1 request/response types and dispatch over a [Connection].

use std::io::Read;

use http::Method;
pub use http::StatusCode;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::transport::{Client, Connection};
use crate::{DockerError, Result};

pub(crate) mod codec;

/// Every Docker endpoint is versioned under this prefix.
pub const API_VERSION_PREFIX: &str = "/v1.46";

/// A query parameter value. Structured values are sent as compact JSON.
pub enum QueryValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Json(Value),
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Str(value.to_owned())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Str(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Int(value.into())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

impl From<Value> for QueryValue {
    fn from(value: Value) -> Self {
        QueryValue::Json(value)
    }
}

/// An HTTP request body.
///
/// JSON bodies are rewritten to Docker-style key names on the wire; the other
/// variants are sent as-is. Everything is framed with chunked encoding.
pub enum Body {
    /// Structured data with caller-style keys
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Bytes(value)
    }
}

/// An HTTP request before transmission.
///
/// The path is prefixed with [API_VERSION_PREFIX] on the wire. Query
/// parameters keep their insertion order; header names are lowercased on
/// insert. The `host` header is merged in from the connection at write time
/// unless the caller set one.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: IndexMap<String, QueryValue>,
    pub(crate) headers: IndexMap<String, String>,
    pub(crate) body: Option<Body>,
    pub(crate) expect_json_seq: bool,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Request {
        Request {
            method,
            path: path.into(),
            query: IndexMap::new(),
            headers: IndexMap::new(),
            body: None,
            expect_json_seq: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Request {
        Request::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Request {
        Request::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Request {
        Request::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Request {
        Request::new(Method::DELETE, path)
    }

    pub fn head(path: impl Into<String>) -> Request {
        Request::new(Method::HEAD, path)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Request {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Request {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Request {
        self.body = Some(body.into());
        self
    }

    /// Marks the response body as a sequence of concatenated JSON values
    /// (the image pull event stream).
    pub fn expect_json_seq(mut self) -> Request {
        self.expect_json_seq = true;
        self
    }
}

/// A decoded HTTP response body.
#[derive(Debug, PartialEq)]
pub enum ResponseBody {
    None,
    /// A JSON value with keys rewritten to caller style
    Json(Value),
    /// A sequence of JSON values, one per streamed event
    JsonSeq(Vec<Value>),
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseBody {
    pub fn is_none(&self) -> bool {
        matches!(self, ResponseBody::None)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// The daemon's diagnostic error bodies all share this shape.
#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// A received HTTP response. Header names are stored lowercased.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: IndexMap<String, String>,
    pub body: ResponseBody,
    upgraded: bool,
}

impl Response {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether this response switched the connection to a non-HTTP protocol.
    pub fn is_upgraded(&self) -> bool {
        self.upgraded
    }

    /// Fails with [DockerError::UnexpectedStatus] unless the status is one of
    /// `acceptable`. The error carries the daemon's `message` when the body
    /// had one.
    pub fn expect_status(self, acceptable: &[u16]) -> Result<Response> {
        if acceptable.contains(&self.status.as_u16()) {
            Ok(self)
        } else {
            Err(self.into_status_error())
        }
    }

    /// The decoded JSON body, or an error if the daemon sent something else.
    pub fn json(self) -> Result<Value> {
        match self.body {
            ResponseBody::Json(value) => Ok(value),
            other => Err(DockerError::Unsupported(
                format!("expected a JSON response body, got {other:?}").into(),
            )),
        }
    }

    fn into_status_error(self) -> DockerError {
        let message = match &self.body {
            ResponseBody::Json(value) => serde_json::from_value::<ErrorMessage>(value.clone())
                .ok()
                .map(|m| m.message),
            ResponseBody::Text(text) => Some(text.trim().to_owned()),
            _ => None,
        };

        DockerError::UnexpectedStatus {
            status: self.status.as_u16(),
            message: message.unwrap_or_else(|| {
                self.status.canonical_reason().unwrap_or("unknown status").to_owned()
            }),
            body: match self.body {
                ResponseBody::Json(value) => Some(value),
                _ => None,
            },
        }
    }
}

/// Executes one request on the provided connection and reads its response.
///
/// The connection is left open and positioned after the response body, ready
/// for the next request.
pub fn request(conn: &mut Connection, req: Request) -> Result<Response> {
    let expect_json_seq = req.expect_json_seq;
    let head_only = req.method == Method::HEAD;

    tracing::trace!(method = %req.method, path = %req.path, "dispatching a Docker API request");

    codec::write_request(conn, req)?;
    codec::read_response(conn, expect_json_seq, head_only)
}

/// Executes one request, dialing a short-lived connection when the caller
/// supplied none. A caller-supplied connection is left open.
pub fn simple_request(client: &Client, conn: Option<&mut Connection>, req: Request) -> Result<Response> {
    match conn {
        Some(conn) => request(conn, req),
        None => {
            let mut conn = client.dial()?;
            let result = request(&mut conn, req);
            let closed = conn.close();
            let response = result?;
            closed?;
            Ok(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::mock::MockStream;

    #[test]
    fn expect_status_passes_acceptable_codes_through() {
        let response = Response {
            status: StatusCode::NO_CONTENT,
            headers: IndexMap::new(),
            body: ResponseBody::None,
            upgraded: false,
        };

        let response = response.expect_status(&[204, 304]).unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }

    #[test]
    fn expect_status_surfaces_the_daemon_message() {
        let response = Response {
            status: StatusCode::NOT_FOUND,
            headers: IndexMap::new(),
            body: ResponseBody::Json(json!({"message": "No such container: web"})),
            upgraded: false,
        };

        let err = response.expect_status(&[200]).unwrap_err();
        match err {
            DockerError::UnexpectedStatus { status, message, body } => {
                assert_eq!(status, 404);
                assert_eq!(message, "No such container: web");
                assert_eq!(body, Some(json!({"message": "No such container: web"})));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn simple_request_closes_its_short_lived_connection() {
        let stream = MockStream::new(b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n");
        let client = stream.client("docker.test");

        let response = simple_request(&client, None, Request::get("/test")).unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(stream.shutdowns(), 1);
    }

    #[test]
    fn simple_request_leaves_a_caller_connection_open() {
        let stream = MockStream::new(b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n");
        let client = stream.client("docker.test");
        let mut conn = client.dial().unwrap();

        simple_request(&client, Some(&mut conn), Request::get("/test")).unwrap();
        assert_eq!(stream.shutdowns(), 0);
    }
}

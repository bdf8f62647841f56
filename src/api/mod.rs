//! The Docker API facade: loosely-typed domain operations over the transport.
//!
//! Operations take and return JSON values with caller-style key names; the
//! transport rewrites them to Docker's wire style both ways.

pub mod containers;
pub mod exec;
pub mod images;
pub mod networks;
pub mod system;
pub mod volumes;

pub use containers::{
    AttachOpts, ListContainersOpts, LogsOpts, RemoveContainerOpts, StartOutcome, StopOutcome,
};
pub use exec::ExecStartOpts;

use crate::Result;
use crate::http::{self, Request, Response};
use crate::transport::{Client, Connection};

/// A handle to one Docker daemon.
///
/// Plain requests reuse a lazily dialed persistent connection; hijacking
/// operations (attach, exec start) dial a sibling connection from the same
/// client, so the handle stays usable next to a live stream session.
pub struct Docker {
    client: Client,
    conn: Option<Connection>,
}

impl Docker {
    /// Connects to the daemon at the provided URI, e.g.
    /// `unix:///var/run/docker.sock`.
    pub fn connect(uri: impl AsRef<str>) -> Result<Docker> {
        Ok(Docker::with_client(Client::new(uri)?))
    }

    pub fn with_client(client: Client) -> Docker {
        Docker { client, conn: None }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Runs one request on the persistent connection, dialing it on first
    /// use. A connection that produced a transport error is dropped so the
    /// next call dials afresh; the request itself is never retried.
    pub(crate) fn execute(&mut self, req: Request) -> Result<Response> {
        if self.conn.is_none() {
            self.conn = Some(self.client.dial()?);
        }
        let conn = self.conn.as_mut().expect("must be present, as we just dialed it");

        let result = http::request(conn, req);
        if result.is_err()
            && let Some(conn) = self.conn.take()
        {
            let _ = conn.close();
        }

        result
    }

    /// Closes the persistent connection, if one is open.
    pub fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }
}

impl Default for Docker {
    fn default() -> Self {
        Docker::with_client(Client::default())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::ResponseBody;
    use crate::transport::mock::MockStream;

    /// A handle talking to a canned response stream.
    pub(crate) fn docker_over(input: &[u8]) -> (MockStream, Docker) {
        let stream = MockStream::new(input);
        let docker = Docker::with_client(stream.client("docker.test"));
        (stream, docker)
    }

    /// A chunked JSON 200 response with the daemon's trailing-empty-chunk quirk.
    pub(crate) fn chunked_json_response(body: &str) -> Vec<u8> {
        let mut response =
            b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\ncontent-type: application/json\r\n\r\n".to_vec();
        response.extend_from_slice(format!("{:x}\r\n", body.len()).as_bytes());
        response.extend_from_slice(body.as_bytes());
        response.extend_from_slice(b"\r\n0\r\n\r\n0\r\n\r\n");
        response
    }

    #[test]
    fn the_persistent_connection_is_reused_across_requests() {
        let mut input = chunked_json_response(r#"{"Containers": 2}"#);
        input.extend(chunked_json_response(r#"{"Version": "27.0"}"#));

        let (stream, mut docker) = docker_over(&input);
        let info = docker.info().unwrap();
        assert_eq!(info, json!({"containers": 2}));

        // The second request rides the same connection, right past the quirk
        let version = docker.version().unwrap();
        assert_eq!(version, json!({"version": "27.0"}));
        assert_eq!(stream.shutdowns(), 0);
    }

    #[test]
    fn closing_the_handle_closes_the_connection() {
        let (stream, mut docker) = docker_over(&chunked_json_response("{}"));
        docker.info().unwrap();

        docker.close().unwrap();
        assert_eq!(stream.shutdowns(), 1);

        // Nothing left to close
        docker.close().unwrap();
        assert_eq!(stream.shutdowns(), 1);
    }

    #[test]
    fn an_unexpected_status_keeps_the_connection_but_surfaces_the_message() {
        let mut input = b"HTTP/1.1 404 Not Found\r\ntransfer-encoding: chunked\r\ncontent-type: application/json\r\n\r\n".to_vec();
        let body = r#"{"message": "No such container: web"}"#;
        input.extend_from_slice(format!("{:x}\r\n{body}\r\n0\r\n\r\n", body.len()).as_bytes());

        let (stream, mut docker) = docker_over(&input);
        let err = docker.inspect_container("web").unwrap_err();
        match err {
            crate::DockerError::UnexpectedStatus { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "No such container: web");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stream.shutdowns(), 0);
    }

    #[test]
    fn responses_with_no_body_decode_to_none() {
        let (_, mut docker) = docker_over(b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n");
        let response = docker.execute(Request::post("/test")).unwrap();
        assert_eq!(response.body, ResponseBody::None);
    }
}

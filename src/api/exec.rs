//! Exec instances: create, inspect, and both start flavors.

use serde_json::{Value, json};

use super::Docker;
use crate::Result;
use crate::http::Request;
use crate::stream::{self, StderrMode, StreamSession};

/// Options for [Docker::start_exec]. Which streams actually flow is decided
/// at exec creation time (`attach-stdin` and friends); these options control
/// what the session exposes.
pub struct ExecStartOpts {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: StderrMode,
    pub tty: bool,
}

impl Default for ExecStartOpts {
    fn default() -> Self {
        ExecStartOpts {
            stdin: false,
            stdout: true,
            stderr: StderrMode::Separate,
            tty: false,
        }
    }
}

impl Docker {
    /// Creates an exec instance in a running container from a caller-style
    /// configuration, e.g. `{"cmd": ["ls"], "attach-stdout": true}`. The
    /// returned value carries the instance `id`.
    pub fn create_exec(&mut self, container_id: &str, config: Value) -> Result<Value> {
        self.execute(Request::post(format!("/containers/{container_id}/exec")).body(config))?
            .expect_status(&[201])?
            .json()
    }

    /// Inspects an exec instance, e.g. for its `exit-code` after it ran.
    pub fn inspect_exec(&mut self, exec_id: &str) -> Result<Value> {
        self.execute(Request::get(format!("/exec/{exec_id}/json")))?
            .expect_status(&[200])?
            .json()
    }

    /// Starts an exec instance and hijacks a fresh connection for its
    /// streams. This handle stays usable while the session is live.
    pub fn start_exec(&self, exec_id: &str, opts: &ExecStartOpts) -> Result<StreamSession> {
        let req = Request::post(format!("/exec/{exec_id}/start"))
            .body(json!({"detach": false, "tty": opts.tty}));

        let conn = self.client().dial()?;
        stream::upgrade(conn, req, opts.stdin, opts.stdout, opts.stderr)
    }

    /// Starts an exec instance without attaching to its streams.
    pub fn start_exec_detached(&mut self, exec_id: &str, tty: bool) -> Result<()> {
        self.execute(
            Request::post(format!("/exec/{exec_id}/start")).body(json!({"detach": true, "tty": tty})),
        )?
        .expect_status(&[200, 204])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use serde_json::json;

    use super::super::tests::docker_over;
    use super::*;

    #[test]
    fn create_posts_a_docker_style_config() {
        let (stream, mut docker) = docker_over(
            b"HTTP/1.1 201 Created\r\ntransfer-encoding: chunked\r\ncontent-type: application/json\r\n\r\n\
              d\r\n{\"Id\": \"ex1\"}\r\n0\r\n\r\n",
        );

        let created = docker
            .create_exec("web", json!({"cmd": ["ls", "-l"], "attach-stdout": true}))
            .unwrap();
        assert_eq!(created, json!({"id": "ex1"}));

        let output = String::from_utf8(stream.output()).unwrap();
        assert!(output.starts_with("POST /v1.46/containers/web/exec HTTP/1.1\r\n"));
        assert!(output.contains(r#"{"AttachStdout":true,"Cmd":["ls","-l"]}"#));
    }

    #[test]
    fn start_exec_runs_over_a_hijacked_sibling_connection() {
        let mut input = b"HTTP/1.1 101 UPGRADED\r\n\
              content-type: application/vnd.docker.multiplexed-stream\r\n\r\n"
            .to_vec();
        input.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 3]);
        input.extend_from_slice(b"ok\n");

        let (stream, docker) = docker_over(&input);
        let mut session = docker.start_exec("ex1", &ExecStartOpts::default()).unwrap();

        let mut stdout = Vec::new();
        session.stdout().unwrap().read_to_end(&mut stdout).unwrap();
        assert_eq!(stdout, b"ok\n");
        session.close().unwrap();

        let output = String::from_utf8(stream.output()).unwrap();
        assert!(output.starts_with("POST /v1.46/exec/ex1/start HTTP/1.1\r\n"));
        assert!(output.contains(r#"{"Detach":false,"Tty":false}"#));
    }

    #[test]
    fn detached_start_sends_no_upgrade_headers() {
        let (stream, mut docker) = docker_over(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");

        docker.start_exec_detached("ex1", false).unwrap();

        let output = String::from_utf8(stream.output()).unwrap();
        assert!(output.contains(r#"{"Detach":true,"Tty":false}"#));
        assert!(!output.contains("upgrade"));
    }
}

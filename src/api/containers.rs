//! Container lifecycle, inspection, archive, and attach operations.

use serde_json::Value;

use super::Docker;
use crate::http::{Body, Request, ResponseBody};
use crate::names;
use crate::stream::{self, StderrMode, StreamSession};
use crate::{DockerError, Result};

/// Options for [Docker::list_containers].
#[derive(Default)]
pub struct ListContainersOpts {
    /// Include stopped containers
    pub all: bool,
    pub limit: Option<i64>,
    /// Include size information
    pub size: bool,
    /// Caller-style filter map, e.g. `{"label": ["env=prod"]}`
    pub filters: Option<Value>,
}

/// Options for [Docker::remove_container].
#[derive(Default)]
pub struct RemoveContainerOpts {
    pub force: bool,
    pub remove_volumes: bool,
    pub remove_link: bool,
}

/// Options for [Docker::container_logs].
pub struct LogsOpts {
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    pub since: Option<i64>,
    pub until: Option<i64>,
    /// Number of lines from the end, as the daemon spells it (`"100"` or `"all"`)
    pub tail: Option<String>,
}

impl Default for LogsOpts {
    fn default() -> Self {
        LogsOpts {
            stdout: true,
            stderr: true,
            timestamps: false,
            since: None,
            until: None,
            tail: None,
        }
    }
}

/// Options for [Docker::attach_container].
pub struct AttachOpts {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: StderrMode,
    /// Replay buffered output before streaming
    pub logs: bool,
    pub detach_keys: Option<String>,
}

impl Default for AttachOpts {
    fn default() -> Self {
        AttachOpts {
            stdin: false,
            stdout: true,
            stderr: StderrMode::Separate,
            logs: false,
            detach_keys: None,
        }
    }
}

/// What a start request did, derived from the response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyStarted,
}

/// What a stop request did, derived from the response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

impl Docker {
    pub fn list_containers(&mut self, opts: &ListContainersOpts) -> Result<Value> {
        let mut req = Request::get("/containers/json");
        if opts.all {
            req = req.query("all", true);
        }
        if let Some(limit) = opts.limit {
            req = req.query("limit", limit);
        }
        if opts.size {
            req = req.query("size", true);
        }
        if let Some(filters) = &opts.filters {
            req = req.query("filters", filters.clone());
        }

        self.execute(req)?.expect_status(&[200])?.json()
    }

    /// Creates a container from a caller-style configuration, e.g.
    /// `{"image": "alpine", "host-config": {"binds": [...]}}`.
    pub fn create_container(&mut self, name: Option<&str>, config: Value) -> Result<Value> {
        let mut req = Request::post("/containers/create").body(config);
        if let Some(name) = name {
            req = req.query("name", name);
        }

        self.execute(req)?.expect_status(&[201])?.json()
    }

    pub fn inspect_container(&mut self, id: &str) -> Result<Value> {
        self.execute(Request::get(format!("/containers/{id}/json")))?
            .expect_status(&[200])?
            .json()
    }

    pub fn start_container(&mut self, id: &str) -> Result<StartOutcome> {
        let response = self
            .execute(Request::post(format!("/containers/{id}/start")))?
            .expect_status(&[204, 304])?;

        Ok(match response.status.as_u16() {
            304 => StartOutcome::AlreadyStarted,
            _ => StartOutcome::Started,
        })
    }

    /// Stops a container, giving it `timeout` seconds before the kill.
    pub fn stop_container(&mut self, id: &str, timeout: Option<i64>) -> Result<StopOutcome> {
        let mut req = Request::post(format!("/containers/{id}/stop"));
        if let Some(timeout) = timeout {
            req = req.query("t", timeout);
        }

        let response = self.execute(req)?.expect_status(&[204, 304])?;

        Ok(match response.status.as_u16() {
            304 => StopOutcome::AlreadyStopped,
            _ => StopOutcome::Stopped,
        })
    }

    pub fn restart_container(&mut self, id: &str, timeout: Option<i64>) -> Result<()> {
        let mut req = Request::post(format!("/containers/{id}/restart"));
        if let Some(timeout) = timeout {
            req = req.query("t", timeout);
        }

        self.execute(req)?.expect_status(&[204])?;
        Ok(())
    }

    pub fn kill_container(&mut self, id: &str, signal: Option<&str>) -> Result<()> {
        let mut req = Request::post(format!("/containers/{id}/kill"));
        if let Some(signal) = signal {
            req = req.query("signal", signal);
        }

        self.execute(req)?.expect_status(&[204])?;
        Ok(())
    }

    /// Blocks until the container exits; the returned value carries its
    /// `status-code`.
    pub fn wait_container(&mut self, id: &str) -> Result<Value> {
        self.execute(Request::post(format!("/containers/{id}/wait")))?
            .expect_status(&[200])?
            .json()
    }

    pub fn remove_container(&mut self, id: &str, opts: &RemoveContainerOpts) -> Result<()> {
        let mut req = Request::delete(format!("/containers/{id}"));
        if opts.force {
            req = req.query("force", true);
        }
        if opts.remove_volumes {
            req = req.query("v", true);
        }
        if opts.remove_link {
            req = req.query("link", true);
        }

        self.execute(req)?.expect_status(&[204])?;
        Ok(())
    }

    pub fn prune_containers(&mut self, filters: Option<Value>) -> Result<Value> {
        let mut req = Request::post("/containers/prune");
        if let Some(filters) = filters {
            req = req.query("filters", filters);
        }

        self.execute(req)?.expect_status(&[200])?.json()
    }

    /// Filesystem changes since the container started. The daemon sends
    /// `null` for a container with no changes.
    pub fn container_changes(&mut self, id: &str) -> Result<Value> {
        let response = self
            .execute(Request::get(format!("/containers/{id}/changes")))?
            .expect_status(&[200])?;

        if response.body.is_none() {
            return Ok(Value::Null);
        }
        response.json()
    }

    /// Fetches buffered logs and splits the multiplexed body into
    /// `(stdout, stderr)`. A TTY container has no stream framing; its output
    /// lands in stdout whole.
    pub fn container_logs(&mut self, id: &str, opts: &LogsOpts) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut req = Request::get(format!("/containers/{id}/logs"))
            .query("stdout", opts.stdout)
            .query("stderr", opts.stderr);
        if opts.timestamps {
            req = req.query("timestamps", true);
        }
        if let Some(since) = opts.since {
            req = req.query("since", since);
        }
        if let Some(until) = opts.until {
            req = req.query("until", until);
        }
        if let Some(tail) = &opts.tail {
            req = req.query("tail", tail.as_str());
        }

        let response = self.execute(req)?.expect_status(&[200])?;
        match response.body {
            ResponseBody::Bytes(bytes) => stream::split_frames(&bytes),
            ResponseBody::Text(text) => Ok((text.into_bytes(), Vec::new())),
            ResponseBody::None => Ok((Vec::new(), Vec::new())),
            other => Err(DockerError::Unsupported(
                format!("unexpected logs body: {other:?}").into(),
            )),
        }
    }

    /// Attaches to a running container over a hijacked connection.
    ///
    /// The session rides its own connection; this handle stays usable while
    /// the session is live.
    pub fn attach_container(&self, id: &str, opts: &AttachOpts) -> Result<StreamSession> {
        let mut req = Request::post(format!("/containers/{id}/attach")).query("stream", true);
        if opts.stdin {
            req = req.query("stdin", true);
        }
        if opts.stdout {
            req = req.query("stdout", true);
        }
        if !matches!(opts.stderr, StderrMode::Off) {
            req = req.query("stderr", true);
        }
        if opts.logs {
            req = req.query("logs", true);
        }
        if let Some(keys) = &opts.detach_keys {
            req = req.query("detachKeys", keys.as_str());
        }

        let conn = self.client().dial()?;
        stream::upgrade(conn, req, opts.stdin, opts.stdout, opts.stderr)
    }

    /// Downloads a path inside the container as a tar archive.
    pub fn container_archive(&mut self, id: &str, path: &str) -> Result<Vec<u8>> {
        let response = self
            .execute(Request::get(format!("/containers/{id}/archive")).query("path", path))?
            .expect_status(&[200])?;

        match response.body {
            ResponseBody::Bytes(bytes) => Ok(bytes),
            other => Err(DockerError::Unsupported(
                format!("expected a tar stream, got {other:?}").into(),
            )),
        }
    }

    /// Uploads a tar archive to be extracted at `path` inside the container.
    pub fn extract_to_container(&mut self, id: &str, path: &str, archive: impl Into<Body>) -> Result<()> {
        let req = Request::put(format!("/containers/{id}/archive"))
            .query("path", path)
            .header("content-type", "application/x-tar")
            .body(archive);

        self.execute(req)?.expect_status(&[200])?;
        Ok(())
    }

    /// Stats a path inside the container without downloading it. The stat
    /// arrives base64-encoded in a response header.
    pub fn container_archive_info(&mut self, id: &str, path: &str) -> Result<Value> {
        use base64::prelude::{BASE64_STANDARD, Engine as _};

        let response = self
            .execute(Request::head(format!("/containers/{id}/archive")).query("path", path))?
            .expect_status(&[200])?;

        let stat = response
            .header("x-docker-container-path-stat")
            .ok_or_else(|| DockerError::protocol("the archive stat header is missing"))?;
        let decoded = BASE64_STANDARD
            .decode(stat)
            .map_err(|_| DockerError::protocol("the archive stat header is not valid base64"))?;
        let stat = serde_json::from_slice(&decoded).map_err(|e| {
            DockerError::from_serde_error_with_description(e, || "archive stat header".into())
        })?;

        Ok(names::from_docker(stat))
    }
}

//! Daemon-level operations.

use serde_json::Value;

use super::Docker;
use crate::Result;
use crate::http::Request;

impl Docker {
    /// Version information for the daemon and its components.
    pub fn version(&mut self) -> Result<Value> {
        self.execute(Request::get("/version"))?.expect_status(&[200])?.json()
    }

    /// System-wide information: container counts, storage driver, and so on.
    pub fn info(&mut self) -> Result<Value> {
        self.execute(Request::get("/info"))?.expect_status(&[200])?.json()
    }

    /// Liveness probe against the daemon.
    pub fn ping(&mut self) -> Result<()> {
        self.execute(Request::get("/_ping"))?.expect_status(&[200])?;
        Ok(())
    }
}

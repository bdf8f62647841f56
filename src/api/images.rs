//! Image operations, including the streaming pull.

use serde_json::Value;

use super::Docker;
use crate::http::{Request, ResponseBody};
use crate::{DockerError, Result};

impl Docker {
    pub fn list_images(&mut self, filters: Option<Value>) -> Result<Value> {
        let mut req = Request::get("/images/json");
        if let Some(filters) = filters {
            req = req.query("filters", filters);
        }

        self.execute(req)?.expect_status(&[200])?.json()
    }

    pub fn inspect_image(&mut self, name: &str) -> Result<Value> {
        self.execute(Request::get(format!("/images/{name}/json")))?
            .expect_status(&[200])?
            .json()
    }

    /// Pulls an image from a registry and returns the progress events the
    /// daemon streamed while doing it, one JSON value per event.
    ///
    /// The whole event sequence is read before this returns; dropping the
    /// request early would cancel the pull server-side. `registry_auth` is a
    /// pre-encoded `X-Registry-Auth` header value, passed through untouched.
    pub fn pull_image(
        &mut self,
        from_image: &str,
        tag: Option<&str>,
        registry_auth: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut req = Request::post("/images/create")
            .query("fromImage", from_image)
            .expect_json_seq();
        if let Some(tag) = tag {
            req = req.query("tag", tag);
        }
        if let Some(auth) = registry_auth {
            req = req.header("x-registry-auth", auth);
        }

        let response = self.execute(req)?.expect_status(&[200])?;
        match response.body {
            ResponseBody::JsonSeq(events) => Ok(events),
            ResponseBody::None => Ok(Vec::new()),
            other => Err(DockerError::Unsupported(
                format!("unexpected pull body: {other:?}").into(),
            )),
        }
    }

    /// Removes an image; the returned value lists what was untagged and
    /// deleted.
    pub fn remove_image(&mut self, name: &str, force: bool, noprune: bool) -> Result<Value> {
        let mut req = Request::delete(format!("/images/{name}"));
        if force {
            req = req.query("force", true);
        }
        if noprune {
            req = req.query("noprune", true);
        }

        self.execute(req)?.expect_status(&[200])?.json()
    }
}

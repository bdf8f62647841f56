//! Volume operations.

use serde_json::Value;

use super::Docker;
use crate::Result;
use crate::http::Request;

impl Docker {
    pub fn list_volumes(&mut self, filters: Option<Value>) -> Result<Value> {
        let mut req = Request::get("/volumes");
        if let Some(filters) = filters {
            req = req.query("filters", filters);
        }

        self.execute(req)?.expect_status(&[200])?.json()
    }

    pub fn create_volume(&mut self, config: Value) -> Result<Value> {
        self.execute(Request::post("/volumes/create").body(config))?
            .expect_status(&[201])?
            .json()
    }

    pub fn inspect_volume(&mut self, name: &str) -> Result<Value> {
        self.execute(Request::get(format!("/volumes/{name}")))?
            .expect_status(&[200])?
            .json()
    }

    pub fn remove_volume(&mut self, name: &str, force: bool) -> Result<()> {
        let mut req = Request::delete(format!("/volumes/{name}"));
        if force {
            req = req.query("force", true);
        }

        self.execute(req)?.expect_status(&[204])?;
        Ok(())
    }
}

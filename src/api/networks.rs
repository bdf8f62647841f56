//! Network operations.

use serde_json::Value;

use super::Docker;
use crate::Result;
use crate::http::Request;

impl Docker {
    pub fn list_networks(&mut self, filters: Option<Value>) -> Result<Value> {
        let mut req = Request::get("/networks");
        if let Some(filters) = filters {
            req = req.query("filters", filters);
        }

        self.execute(req)?.expect_status(&[200])?.json()
    }

    /// Inspects a network. The `containers` mapping keeps container IDs as
    /// its keys, untouched by the name rewrite.
    pub fn inspect_network(&mut self, id: &str) -> Result<Value> {
        self.execute(Request::get(format!("/networks/{id}")))?
            .expect_status(&[200])?
            .json()
    }

    pub fn create_network(&mut self, config: Value) -> Result<Value> {
        self.execute(Request::post("/networks/create").body(config))?
            .expect_status(&[201])?
            .json()
    }

    pub fn remove_network(&mut self, id: &str) -> Result<()> {
        self.execute(Request::delete(format!("/networks/{id}")))?
            .expect_status(&[204])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::tests::{chunked_json_response, docker_over};

    #[test]
    fn inspect_keeps_container_ids_opaque() {
        let (_, mut docker) = docker_over(&chunked_json_response(
            r#"{"Name": "bridge", "Containers": {"4fa6e0f0c678": {"Name": "web", "IPv4Address": "172.17.0.2/16"}}}"#,
        ));

        let network = docker.inspect_network("bridge").unwrap();
        assert_eq!(
            network,
            json!({
                "name": "bridge",
                "containers": {"4fa6e0f0c678": {"Name": "web", "IPv4Address": "172.17.0.2/16"}},
            })
        );
    }

    #[test]
    fn create_posts_the_configuration() {
        let (stream, mut docker) = docker_over(
            b"HTTP/1.1 201 Created\r\ntransfer-encoding: chunked\r\ncontent-type: application/json\r\n\r\ne\r\n{\"Id\": \"net1\"}\r\n0\r\n\r\n",
        );

        let created = docker
            .create_network(json!({"name": "backend", "driver": "bridge"}))
            .unwrap();
        assert_eq!(created, json!({"id": "net1"}));

        let output = String::from_utf8(stream.output()).unwrap();
        assert!(output.contains(r#"{"Driver":"bridge","Name":"backend"}"#));
    }
}

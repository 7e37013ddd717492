//! §6 Upstream protocol: `GET/DELETE <api>/<resource>/<id>/dump`. No
//! direct teacher file to lift from here either; built from the same
//! `reqwest::Client`-per-handle, stable-base-URL, plain-status-code
//! primitives the teacher's own HTTP code is built from.

use crate::errors::BridgeError;
use crate::models::ResourceDump;

pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        UpstreamClient {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn dump_url(&self, resource: &str, id: &str) -> String {
        format!("{}/{}/{}/dump", self.base_url.trim_end_matches('/'), resource, id)
    }

    /// S4: fetch the authoritative secret dump of one document.
    pub async fn get_resource_dump(&self, resource: &str, id: &str) -> Result<ResourceDump, BridgeError> {
        let resp = self
            .http
            .get(self.dump_url(resource, id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BridgeError::Transient(e.to_string()))?;

        if resp.status().is_success() {
            resp.json::<ResourceDump>()
                .await
                .map_err(|e| BridgeError::Transient(format!("invalid response: {e}")))
        } else {
            Err(BridgeError::from_status(resp.status()))
        }
    }

    /// S7: delete the dump upstream. Must never be called before the
    /// corresponding `SecretStore::put` has returned success (§8 property 2).
    pub async fn delete_resource_dump(&self, resource: &str, id: &str) -> Result<(), BridgeError> {
        let resp = self
            .http
            .delete(self.dump_url(resource, id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BridgeError::Transient(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(BridgeError::from_status(resp.status()))
        }
    }
}

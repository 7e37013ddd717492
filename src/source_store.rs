//! §4.2 SourceStore: the upstream document store holding live records and
//! the per-resource views Feeders scan.

use uuid::Uuid;

use crate::couch_client::CouchClient;
use crate::errors::BridgeError;
use crate::models::SourceDoc;

pub const VIEW_PAGE_SIZE: usize = 1_000;

#[derive(Clone)]
pub struct SourceStore {
    couch: CouchClient,
}

impl SourceStore {
    pub fn new(couch: CouchClient) -> Self {
        SourceStore { couch }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<SourceDoc>, BridgeError> {
        self.couch.get(&id.to_string()).await
    }

    /// S8: tombstone write. `rev` must be the revision the Worker last
    /// observed (§3 "(id, rev) uniquely identifies a revision").
    pub async fn delete(&self, id: Uuid, rev: &str) -> Result<(), BridgeError> {
        self.couch.delete(&id.to_string(), rev).await
    }

    /// §4.1: one page of a resource's view, full documents included.
    pub async fn scan_resource_page(
        &self,
        resource: &str,
        skip: usize,
    ) -> Result<Vec<SourceDoc>, BridgeError> {
        let view = format!("_design/{resource}/_view/all");
        let docs = self.couch.scan_view_page(&view, VIEW_PAGE_SIZE, skip).await?;
        Ok(docs
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }
}

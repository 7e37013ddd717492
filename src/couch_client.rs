//! §1 "the document-store driver itself" is an external collaborator;
//! this is the thin REST wrapper that stands in for it. No teacher file
//! wraps a document store directly, so this is built from the same raw
//! primitives the teacher's own HTTP code uses elsewhere: a
//! `reqwest::Client`, a base URL, plain JSON bodies, status codes
//! matched directly rather than through a generated client.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::BridgeError;

#[derive(Clone)]
pub struct CouchClient {
    client: reqwest::Client,
    base_url: String,
    db: String,
}

impl CouchClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, db: impl Into<String>) -> Self {
        CouchClient {
            client,
            base_url: base_url.into(),
            db: db.into(),
        }
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), self.db, id)
    }

    /// §4.2 `get(id) -> doc | absent`. `absent` is `Ok(None)`; anything
    /// else is a retryable error.
    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, BridgeError> {
        let resp = self
            .client
            .get(self.doc_url(id))
            .send()
            .await
            .map_err(|e| BridgeError::Transient(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let doc = resp
                    .json::<T>()
                    .await
                    .map_err(|e| BridgeError::Transient(e.to_string()))?;
                Ok(Some(doc))
            }
            s => Err(BridgeError::from_status(s)),
        }
    }

    /// §4.2 `put(doc)` (create-or-update). A document store assigns or
    /// bumps the rev server-side; callers don't need it back for the
    /// states this bridge runs (S2/S8 re-read when they need a fresh rev).
    pub async fn put<T: Serialize>(&self, id: &str, doc: &T) -> Result<(), BridgeError> {
        let resp = self
            .client
            .put(self.doc_url(id))
            .json(doc)
            .send()
            .await
            .map_err(|e| BridgeError::Transient(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(BridgeError::Conflict(id.to_string())),
            s => Err(BridgeError::from_status(s)),
        }
    }

    /// §4.2 `delete(id, rev)`, implemented as writing a tombstone document
    /// with the same id+rev (§1 Data Model "Lifecycle"). CouchDB's own
    /// `DELETE` already does exactly this under the hood.
    pub async fn delete(&self, id: &str, rev: &str) -> Result<(), BridgeError> {
        let resp = self
            .client
            .delete(self.doc_url(id))
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|e| BridgeError::Transient(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(BridgeError::Conflict(id.to_string())),
            StatusCode::NOT_FOUND => Ok(()),
            s => Err(BridgeError::from_status(s)),
        }
    }

    /// §4.1: scan a resource-specific view in pages of `page_size`
    /// documents, full documents included. `view` is the CouchDB view
    /// path relative to the database, e.g. `_design/resource/_view/all`.
    pub async fn scan_view_page(
        &self,
        view: &str,
        page_size: usize,
        skip: usize,
    ) -> Result<Vec<Value>, BridgeError> {
        let url = format!("{}/{}/{}", self.base_url.trim_end_matches('/'), self.db, view);
        let resp = self
            .client
            .get(url)
            .query(&[
                ("include_docs", "true".to_string()),
                ("limit", page_size.to_string()),
                ("skip", skip.to_string()),
            ])
            .send()
            .await
            .map_err(|e| BridgeError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(BridgeError::from_status(resp.status()));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| BridgeError::Transient(e.to_string()))?;
        let rows = body
            .get("rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("doc").cloned())
            .collect())
    }
}

//! §3 data model: the plain structs every component passes around.

use std::time::Duration;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

/// Owned by whichever queue currently holds it; transfers to a Worker on
/// dequeue (§3 "Ownership").
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: Uuid,
    pub resource: String,
    pub retries_count: u32,
    pub timeout: Duration,
}

impl WorkItem {
    pub fn new(id: Uuid, resource: impl Into<String>, base_timeout: Duration) -> Self {
        WorkItem {
            id,
            resource: resource.into(),
            retries_count: 0,
            timeout: base_timeout,
        }
    }
}

/// A document as it lives in SourceStore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDoc {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "_rev")]
    pub rev: String,
    pub date_modified: DateTime<Utc>,
    pub doc_type: String,
    pub payload: serde_json::Value,
}

/// Mirror of a `SourceDoc` living in PublicArchive. Same shape; kept as a
/// distinct type so a Worker can't accidentally archive-write into
/// SourceStore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveDoc {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub date_modified: DateTime<Utc>,
    pub doc_type: String,
    pub payload: serde_json::Value,
}

impl ArchiveDoc {
    /// S2: mirror a SourceDoc, optionally carrying forward an existing rev
    /// so the write lands as an update rather than a conflicting create.
    pub fn from_source(source: &SourceDoc, rev: Option<String>) -> Self {
        ArchiveDoc {
            id: source.id,
            rev,
            date_modified: source.date_modified,
            doc_type: source.doc_type.clone(),
            payload: source.payload.clone(),
        }
    }
}

/// What lands in SecretStore: the id plus the sealed (base64) payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub data: String,
}

/// The JSON body of `GET <api>/<resource>/<id>/dump`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDump {
    pub data: serde_json::Value,
}

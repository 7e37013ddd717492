//! §4.2 PublicArchive: mirrors originals unencrypted, keyed by document id.
//! Never deletes (§3 ArchiveDoc lifecycle).

use uuid::Uuid;

use crate::couch_client::CouchClient;
use crate::errors::BridgeError;
use crate::models::ArchiveDoc;

#[derive(Clone)]
pub struct PublicArchive {
    couch: CouchClient,
}

impl PublicArchive {
    pub fn new(couch: CouchClient) -> Self {
        PublicArchive { couch }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ArchiveDoc>, BridgeError> {
        self.couch.get(&id.to_string()).await
    }

    pub async fn put(&self, doc: &ArchiveDoc) -> Result<(), BridgeError> {
        self.couch.put(&doc.id.to_string(), doc).await
    }
}

//! §4.2 SecretStore: two closed variants behind one narrow contract, per
//! §9 "a tagged union with methods get/put is sufficient" -- no plugin
//! discovery, just a compile-time match.

use aws_sdk_s3::primitives::ByteStream;
use uuid::Uuid;

use crate::blob_key;
use crate::couch_client::CouchClient;
use crate::errors::BridgeError;
use crate::models::SecretRecord;

pub enum SecretStore {
    Couch(CouchClient),
    Blob(BlobStore),
}

impl SecretStore {
    pub async fn get(&self, id: Uuid) -> Result<Option<SecretRecord>, BridgeError> {
        match self {
            SecretStore::Couch(c) => c.get(&id.to_string()).await,
            SecretStore::Blob(b) => b.get(id).await,
        }
    }

    /// §4.5 S5: only ever called when `get` came back absent (§9 open
    /// question: the absent-only write is kept, mutation needs an
    /// out-of-band clear).
    pub async fn put(&self, id: Uuid, sealed_data: &str) -> Result<(), BridgeError> {
        match self {
            SecretStore::Couch(c) => {
                let record = SecretRecord {
                    id,
                    data: sealed_data.to_string(),
                };
                c.put(&id.to_string(), &record).await
            }
            SecretStore::Blob(b) => b.put(id, sealed_data).await,
        }
    }
}

pub struct BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        BlobStore {
            client,
            bucket: bucket.into(),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<SecretRecord>, BridgeError> {
        let key = blob_key::derive_key(id);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| BridgeError::Transient(e.to_string()))?
                    .into_bytes();
                let data = String::from_utf8_lossy(&bytes).to_string();
                Ok(Some(SecretRecord { id, data }))
            }
            Err(e) => {
                if is_not_found(&e) {
                    Ok(None)
                } else {
                    Err(BridgeError::Transient(e.to_string()))
                }
            }
        }
    }

    /// §4.2: private ACL, `application/json` content type, conditional on
    /// the key being absent (`If-None-Match: *`) so a collision surfaces
    /// as a 412 instead of silently overwriting an existing secret (§8
    /// S-blob-collision).
    async fn put(&self, id: Uuid, sealed_data: &str) -> Result<(), BridgeError> {
        let key = blob_key::derive_key(id);
        let body = ByteStream::from(sealed_data.as_bytes().to_vec());
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type("application/json")
            .acl(aws_sdk_s3::types::ObjectCannedAcl::Private)
            .if_none_match("*")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_content_exists(&e) => Ok(()),
            Err(e) => Err(BridgeError::Transient(e.to_string())),
        }
    }
}

fn is_not_found(err: &aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>) -> bool {
    matches!(
        err.as_service_error(),
        Some(aws_sdk_s3::operation::get_object::GetObjectError::NoSuchKey(_))
    )
}

/// S3 has no native "already exists" signal on a plain PUT (it always
/// overwrites); this treats a precondition failure from a conditional put
/// as the `content-exists` case §4.2/§8 describe for the blob variant.
fn is_content_exists(err: &aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::put_object::PutObjectError>) -> bool {
    if let Some(raw) = err.raw_response() {
        return raw.status().as_u16() == 412;
    }
    false
}

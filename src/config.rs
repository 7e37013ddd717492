use std::fs::File;
use std::io::BufReader;
use serde_derive::Deserialize;
use crate::errors::BridgeError;

/// Top-level config file shape: everything the bridge reads lives under `main:`.
#[derive(Deserialize, Clone, Debug)]
pub struct RootConfig {
    pub main: Config,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub resources_api_server: String,
    pub resources_api_version: Option<String>,
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_couch_url")]
    pub couch_url: String,
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default = "default_db_archive_name")]
    pub db_archive_name: String,

    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default = "default_primary_queue_size")]
    pub resource_items_queue_size: i64,
    #[serde(default = "default_retry_queue_size")]
    pub retry_resource_items_queue_size: i64,

    #[serde(default = "default_workers_min")]
    pub workers_min: usize,
    #[serde(default = "default_workers_max")]
    pub workers_max: usize,
    #[serde(default = "default_retry_workers_min")]
    pub retry_workers_min: usize,
    #[serde(default = "default_retry_workers_max")]
    pub retry_workers_max: usize,

    #[serde(default = "default_inc_threshold")]
    pub workers_inc_threshold: u32,
    #[serde(default = "default_dec_threshold")]
    pub workers_dec_threshold: u32,

    #[serde(default = "default_controller_timeout")]
    pub queues_controller_timeout: u64,
    #[serde(default = "default_watch_interval")]
    pub watch_interval: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_retries_count")]
    pub retries_count: u32,
    #[serde(default = "default_retry_timeout")]
    pub retry_default_timeout: u64,

    #[serde(default = "default_inc_step")]
    pub client_inc_step_timeout: f64,
    #[serde(default = "default_dec_step")]
    pub client_dec_step_timeout: f64,
    #[serde(default = "default_drop_threshold")]
    pub drop_threshold_client_cookies: f64,

    #[serde(default = "default_queue_timeout")]
    pub queue_timeout: u64,
    #[serde(default = "default_worker_sleep")]
    pub worker_sleep: u64,

    #[serde(default = "default_secret_storage")]
    pub secret_storage: String,
    #[serde(default)]
    pub s3: Option<S3Config>,

    /// Recipient public key for the secret-archive seal, hex-encoded X25519 point.
    /// Not in the distilled option table but required by §2's "crypto primitives"
    /// component; there is no sane default for a recipient key.
    pub secret_recipient_public_key: String,

    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct LogConfig {
    pub path: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

fn default_couch_url() -> String { "http://127.0.0.1:5984".to_string() }
fn default_db_name() -> String { "edge_db".to_string() }
fn default_db_archive_name() -> String { "archive_db".to_string() }
fn default_primary_queue_size() -> i64 { 10_000 }
fn default_retry_queue_size() -> i64 { -1 }
fn default_workers_min() -> usize { 1 }
fn default_workers_max() -> usize { 3 }
fn default_retry_workers_min() -> usize { 1 }
fn default_retry_workers_max() -> usize { 2 }
fn default_inc_threshold() -> u32 { 75 }
fn default_dec_threshold() -> u32 { 35 }
fn default_controller_timeout() -> u64 { 60 }
fn default_watch_interval() -> u64 { 10 }
fn default_user_agent() -> String { "ArchivariusBridge".to_string() }
fn default_retries_count() -> u32 { 10 }
fn default_retry_timeout() -> u64 { 3 }
fn default_inc_step() -> f64 { 0.1 }
fn default_dec_step() -> f64 { 0.02 }
fn default_drop_threshold() -> f64 { 2.0 }
fn default_queue_timeout() -> u64 { 3 }
fn default_worker_sleep() -> u64 { 5 }
fn default_secret_storage() -> String { "couchdb".to_string() }

impl Config {
    pub fn from_path(path: &str) -> anyhow::Result<Self> {
        let file = File::open(path)
            .map_err(|e| BridgeError::Config(format!("could not open {path}: {e}")))?;
        let reader = BufReader::new(file);
        let root: RootConfig = serde_yaml::from_reader(reader)
            .map_err(|e| BridgeError::Config(format!("could not parse {path}: {e}")))?;
        root.main.validate()?;
        Ok(root.main)
    }

    /// §6: a missing or scheme-less `resources_api_server` is a fatal configuration error.
    fn validate(&self) -> anyhow::Result<()> {
        let url = reqwest::Url::parse(&self.resources_api_server).map_err(|e| {
            BridgeError::Config(format!(
                "resources_api_server '{}' is not a valid URL: {e}",
                self.resources_api_server
            ))
        })?;
        if url.scheme().is_empty() {
            return Err(BridgeError::Config(
                "resources_api_server is missing a scheme".to_string(),
            )
            .into());
        }
        if self.secret_storage != "couchdb" && self.secret_storage != "s3" {
            return Err(BridgeError::Config(format!(
                "secret_storage must be 'couchdb' or 's3', got '{}'",
                self.secret_storage
            ))
            .into());
        }
        if self.secret_storage == "s3" && self.s3.is_none() {
            return Err(BridgeError::Config(
                "secret_storage is 's3' but no s3 section was provided".to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn db_archive_secret_name(&self) -> String {
        format!("{}_secret", self.db_archive_name)
    }

    /// −1 means unbounded (§6); `None` is how the bounded-queue constructor spells that.
    pub fn primary_queue_bound(&self) -> Option<usize> {
        bounded(self.resource_items_queue_size)
    }

    pub fn retry_queue_bound(&self) -> Option<usize> {
        bounded(self.retry_resource_items_queue_size)
    }
}

fn bounded(n: i64) -> Option<usize> {
    if n < 0 {
        None
    } else {
        Some(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
main:
  resources_api_server: "https://example.test/api"
  secret_recipient_public_key: "deadbeef"
"#
    }

    #[test]
    fn test_defaults_applied() {
        let root: RootConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(root.main.workers_min, 1);
        assert_eq!(root.main.workers_max, 3);
        assert_eq!(root.main.secret_storage, "couchdb");
        assert_eq!(root.main.resource_items_queue_size, 10_000);
    }

    #[test]
    fn test_unbounded_queue_size() {
        let root: RootConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(root.main.retry_queue_bound(), None);
        assert_eq!(root.main.primary_queue_bound(), Some(10_000));
    }

    #[test]
    fn test_missing_scheme_is_fatal() {
        let yaml = r#"
main:
  resources_api_server: "example.test/api"
  secret_recipient_public_key: "deadbeef"
"#;
        let root: RootConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(root.main.validate().is_err());
    }

    #[test]
    fn test_s3_without_section_is_fatal() {
        let yaml = r#"
main:
  resources_api_server: "https://example.test/api"
  secret_recipient_public_key: "deadbeef"
  secret_storage: s3
"#;
        let root: RootConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(root.main.validate().is_err());
    }

    #[test]
    fn test_archive_secret_name_suffix() {
        let root: RootConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(root.main.db_archive_secret_name(), "archive_db_secret");
    }
}

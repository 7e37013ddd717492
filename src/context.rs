//! §9 "the owning object is the bridge context": assembles every store,
//! the pool, the queues and the sealer from `Config`, and owns the
//! Feeders and the Controller for the lifetime of a run.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::config::Config;
use crate::controller::{Controller, ControllerConfig, WorkerPool};
use crate::couch_client::CouchClient;
use crate::crypto::Sealer;
use crate::errors::BridgeError;
use crate::feeder::Feeder;
use crate::filters::FilterRegistry;
use crate::pool::{BackoffConfig, ClientPool};
use crate::public_archive::PublicArchive;
use crate::queues::WorkQueue;
use crate::secret_store::{BlobStore, SecretStore};
use crate::source_store::SourceStore;
use crate::stats::Stats;
use crate::worker::WorkerContext;

/// Built once per run from `Config`, then handed to `Controller::run`.
pub struct BridgeContext {
    pub controller: Arc<Controller>,
    pub feeders: Vec<Feeder>,
    pub primary_queue: Arc<WorkQueue>,
}

impl BridgeContext {
    pub async fn build(config: Config, filters: FilterRegistry) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        let source = SourceStore::new(CouchClient::new(http.clone(), config.couch_url.clone(), config.db_name.clone()));
        let public = PublicArchive::new(CouchClient::new(
            http.clone(),
            config.couch_url.clone(),
            config.db_archive_name.clone(),
        ));

        let secret = build_secret_store(&config).await?;
        let sealer = Arc::new(Sealer::from_hex(&config.secret_recipient_public_key)?);

        let primary_queue = Arc::new(WorkQueue::new(config.primary_queue_bound()));
        let retry_queue = Arc::new(WorkQueue::new(config.retry_queue_bound()));

        let client_pool = Arc::new(ClientPool::new(
            config.resources_api_server.clone(),
            config.api_key.clone(),
            config.user_agent.clone(),
        ));
        client_pool.refill_to(config.workers_min.max(1)).await;

        let backoff = BackoffConfig {
            inc_step: config.client_inc_step_timeout,
            dec_step: config.client_dec_step_timeout,
            drop_threshold: config.drop_threshold_client_cookies,
        };

        let stats = Stats::new();
        let base_timeout = Duration::from_secs(config.retry_default_timeout);

        let worker_ctx = Arc::new(WorkerContext {
            source: source.clone(),
            public,
            secret,
            pool: client_pool.clone(),
            sealer,
            stats: stats.clone(),
            retry_queue: retry_queue.clone(),
            backoff,
            retries_count_max: config.retries_count,
            worker_sleep: Duration::from_secs(config.worker_sleep),
            queue_timeout: Duration::from_secs(config.queue_timeout),
        });

        let filters = Arc::new(filters);
        let feeders: Vec<Feeder> = config
            .resources
            .iter()
            .map(|resource| {
                Feeder::new(
                    resource.clone(),
                    source.clone(),
                    filters.clone(),
                    primary_queue.clone(),
                    stats.clone(),
                    base_timeout,
                )
            })
            .collect();

        let controller = Arc::new(Controller {
            cfg: ControllerConfig {
                workers_min: config.workers_min,
                workers_max: config.workers_max,
                retry_workers_min: config.retry_workers_min,
                retry_workers_max: config.retry_workers_max,
                controller_period: Duration::from_secs(config.queues_controller_timeout),
                watch_period: Duration::from_secs(config.watch_interval),
            },
            worker_ctx,
            client_pool,
            primary_queue: primary_queue.clone(),
            retry_queue,
            primary_workers: tokio::sync::Mutex::new(WorkerPool::new()),
            retry_workers: tokio::sync::Mutex::new(WorkerPool::new()),
            feeders: tokio::sync::Mutex::new(Vec::new()),
            stats,
            shutdown: tokio_util::sync::CancellationToken::new(),
        });

        Ok(BridgeContext {
            controller,
            feeders,
            primary_queue,
        })
    }

    /// Spawns every configured Feeder, hands their handles to the
    /// Controller so `is_done` can observe them finishing, then drives
    /// the Controller/Watcher loops to completion.
    pub async fn run(self) {
        info!("starting archivarius bridge with {} feeder(s)", self.feeders.len());
        let mut handles = Vec::with_capacity(self.feeders.len());
        for feeder in self.feeders {
            handles.push(tokio::spawn(async move { feeder.run().await }));
        }
        {
            let mut guard = self.controller.feeders.lock().await;
            *guard = handles;
        }
        self.controller.run().await;
    }
}

async fn build_secret_store(config: &Config) -> anyhow::Result<SecretStore> {
    match config.secret_storage.as_str() {
        "s3" => {
            let s3_cfg = config
                .s3
                .as_ref()
                .ok_or_else(|| BridgeError::Config("secret_storage is 's3' but no s3 section was provided".into()))?;
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = &s3_cfg.region {
                loader = loader.region(aws_config::Region::new(region.clone()));
            }
            let shared = loader.load().await;
            let mut builder = aws_sdk_s3::config::Builder::from(&shared);
            if let Some(endpoint) = &s3_cfg.endpoint {
                builder = builder.endpoint_url(endpoint.clone());
            }
            let client = aws_sdk_s3::Client::from_conf(builder.build());
            Ok(SecretStore::Blob(BlobStore::new(client, s3_cfg.bucket.clone())))
        }
        _ => {
            let http = reqwest::Client::builder().user_agent(config.user_agent.clone()).build()?;
            Ok(SecretStore::Couch(CouchClient::new(
                http,
                config.couch_url.clone(),
                config.db_archive_secret_name(),
            )))
        }
    }
}

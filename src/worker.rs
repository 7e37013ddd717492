//! §4.5 Worker: the per-item state machine S0-S8. One `run_worker` task
//! per pool slot, parameterized by which queue it reads from -- same
//! "single async function owns a stateful loop over channels" shape as
//! the teacher's `message_loop`, generalized from a found/retrieved/error
//! status loop to the copy-encrypt-store-delete state machine this
//! pipeline needs.

use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use tokio_util::sync::CancellationToken;

use crate::errors::BridgeError;
use crate::models::{ArchiveDoc, SourceDoc, WorkItem};
use crate::pool::{BackoffConfig, BackoffOutcome, ClientHandle, ClientPool};
use crate::public_archive::PublicArchive;
use crate::queues::{self, WorkQueue};
use crate::secret_store::SecretStore;
use crate::source_store::SourceStore;
use crate::stats::{CounterExt, Stats};
use crate::crypto::Sealer;

pub struct WorkerContext {
    pub source: SourceStore,
    pub public: PublicArchive,
    pub secret: SecretStore,
    pub pool: Arc<ClientPool>,
    pub sealer: Arc<Sealer>,
    pub stats: Arc<Stats>,
    pub retry_queue: Arc<WorkQueue>,
    pub backoff: BackoffConfig,
    pub retries_count_max: u32,
    pub worker_sleep: Duration,
    pub queue_timeout: Duration,
}

/// Runs until `shutdown` is cancelled and the queue has nothing left
/// (§4.5 "Termination").
pub async fn run_worker(ctx: Arc<WorkerContext>, queue: Arc<WorkQueue>, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() && queue.is_empty() {
            break;
        }
        // S0
        let item = match queue.pop_timeout(ctx.queue_timeout).await {
            Some(item) => item,
            None => continue,
        };
        process_item(&ctx, item).await;
    }
}

/// Runs S1-S8 for a single dequeued item. Exposed directly (rather than
/// only through `run_worker`) so integration tests can drive one item at
/// a time against fake stores without a live queue.
pub async fn process_item(ctx: &WorkerContext, item: WorkItem) {
    // S1
    let source_doc = match ctx.source.get(item.id).await {
        Ok(Some(doc)) => doc,
        Ok(None) => return, // discard silently
        Err(e) => {
            ctx.stats.exceptions.incr();
            retry(ctx, item, &e).await;
            return;
        }
    };

    // S2
    match mirror_to_public_archive(ctx, &source_doc).await {
        Ok(()) => ctx.stats.moved_to_public.incr(),
        Err(e) => {
            ctx.stats.exceptions.incr();
            retry(ctx, item, &e).await;
            return;
        }
    }

    // S3
    let mut handle = match ctx.pool.acquire().await {
        Some(h) => h,
        None => {
            tokio::time::sleep(ctx.worker_sleep).await;
            retry(ctx, item, &BridgeError::Transient("no client available".to_string())).await;
            return;
        }
    };

    // S4
    let dump = match handle
        .client
        .get_resource_dump(&item.resource, &item.id.to_string())
        .await
    {
        Ok(dump) => {
            release_after_backoff(ctx, ctx.backoff.on_success(&mut handle), handle);
            dump
        }
        Err(BridgeError::NotFound) => {
            release_after_backoff(ctx, ctx.backoff.on_other_error(&mut handle), handle);
            ctx.stats.not_found.incr();
            return;
        }
        Err(BridgeError::RateLimited) => {
            let outcome = ctx.backoff.on_rate_limited(&mut handle);
            release_after_backoff(ctx, outcome, handle);
            ctx.stats.exceptions.incr();
            retry(ctx, item, &BridgeError::RateLimited).await;
            return;
        }
        Err(e) => {
            release_after_backoff(ctx, ctx.backoff.on_other_error(&mut handle), handle);
            ctx.stats.exceptions.incr();
            retry(ctx, item, &e).await;
            return;
        }
    };

    // S5
    let sealed = match seal_dump(ctx, item.id, &dump.data) {
        Ok(sealed) => sealed,
        Err(e) => {
            ctx.stats.exceptions.incr();
            retry(ctx, item, &e).await;
            return;
        }
    };
    match write_secret_if_absent(ctx, item.id, &sealed).await {
        Ok(()) => ctx.stats.dumped_to_secret.incr(),
        Err(e) => {
            ctx.stats.exceptions.incr();
            retry(ctx, item, &e).await;
            return;
        }
    }

    // S6
    let mut handle = match ctx.pool.acquire().await {
        Some(h) => h,
        None => {
            tokio::time::sleep(ctx.worker_sleep).await;
            retry(ctx, item, &BridgeError::Transient("no client available".to_string())).await;
            return;
        }
    };

    // S7
    match handle.client.delete_resource_dump(&item.resource, &item.id.to_string()).await {
        Ok(()) => {
            release_after_backoff(ctx, ctx.backoff.on_success(&mut handle), handle);
        }
        Err(BridgeError::RateLimited) => {
            let outcome = ctx.backoff.on_rate_limited(&mut handle);
            release_after_backoff(ctx, outcome, handle);
            ctx.stats.exceptions.incr();
            retry(ctx, item, &BridgeError::RateLimited).await;
            return;
        }
        Err(BridgeError::NotFound) => {
            release_after_backoff(ctx, ctx.backoff.on_other_error(&mut handle), handle);
            ctx.stats.not_found.incr();
            return;
        }
        Err(e) => {
            release_after_backoff(ctx, ctx.backoff.on_other_error(&mut handle), handle);
            ctx.stats.exceptions.incr();
            retry(ctx, item, &e).await;
            return;
        }
    }

    // S8
    match ctx.source.delete(item.id, &source_doc.rev).await {
        Ok(()) => ctx.stats.archived.incr(),
        Err(e) => {
            ctx.stats.exceptions.incr();
            retry(ctx, item, &e).await;
        }
    }
}

/// S2: mirror into PublicArchive unless it's already current.
async fn mirror_to_public_archive(ctx: &WorkerContext, source_doc: &SourceDoc) -> Result<(), BridgeError> {
    match ctx.public.get(source_doc.id).await? {
        None => {
            let archive_doc = ArchiveDoc::from_source(source_doc, None);
            ctx.public.put(&archive_doc).await
        }
        Some(archived) if archived.date_modified < source_doc.date_modified => {
            let archive_doc = ArchiveDoc::from_source(source_doc, archived.rev);
            ctx.public.put(&archive_doc).await
        }
        Some(_) => Ok(()), // already current, skip mirror
    }
}

fn seal_dump(ctx: &WorkerContext, id: uuid::Uuid, data: &serde_json::Value) -> Result<String, BridgeError> {
    let bytes = serde_json::to_vec(data)
        .map_err(|e| BridgeError::Crypto(format!("could not serialize dump for {id}: {e}")))?;
    ctx.sealer.seal(&bytes)
}

/// S5: §9 open question resolved -- only write when absent. Mutation
/// needs an out-of-band clear, by design.
async fn write_secret_if_absent(ctx: &WorkerContext, id: uuid::Uuid, sealed: &str) -> Result<(), BridgeError> {
    if ctx.secret.get(id).await?.is_some() {
        return Ok(());
    }
    ctx.secret.put(id, sealed).await
}

fn release_after_backoff(ctx: &WorkerContext, outcome: BackoffOutcome, handle: ClientHandle) {
    match outcome {
        BackoffOutcome::Immediate => {
            let pool = ctx.pool.clone();
            tokio::spawn(async move { pool.release(handle).await });
        }
        BackoffOutcome::Delayed(delay) => ctx.pool.release_after(handle, delay),
    }
}

/// §4.6 retry policy. `err.is_retryable()` filters out the terminal cases
/// (not-found is handled by its caller before this is ever reached;
/// config errors never originate mid-item).
async fn retry(ctx: &WorkerContext, mut item: WorkItem, err: &BridgeError) {
    if !err.is_retryable() {
        return;
    }
    if err.counts_toward_retries() {
        item.retries_count += 1;
        item.timeout *= 2;
    }
    if item.retries_count > ctx.retries_count_max {
        error!(
            "dropping item {} (resource={}) after {} retries: {err}",
            item.id, item.resource, item.retries_count
        );
        ctx.stats.dropped.incr();
        return;
    }
    warn!("retrying item {} (resource={}) in {:?}: {err}", item.id, item.resource, item.timeout);
    ctx.stats.retried.incr();
    let delay = item.timeout;
    queues::schedule_retry(ctx.retry_queue.clone(), item, delay);
}

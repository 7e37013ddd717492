//! §4.4 Controller and Watcher. Two independent loops sharing the same
//! pools: the Controller paces scale-up/down on backlog and refills the
//! ClientPool; the Watcher restores minimum parallelism quickly after a
//! transient drain. Grounded in the teacher's `Collector::monitor`
//! poll-loop shape, split into two cooperating loops per §4.4's own
//! rationale for why one loop isn't enough.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pool::ClientPool;
use crate::queues::WorkQueue;
use crate::stats::Stats;
use crate::worker::{run_worker, WorkerContext};

/// A pool of currently-running Worker tasks for one queue. Handles that
/// have already exited (§4.5 termination) are pruned lazily on access.
pub struct WorkerPool {
    workers: Vec<(JoinHandle<()>, CancellationToken)>,
}

impl WorkerPool {
    pub fn new() -> Self {
        WorkerPool { workers: Vec::new() }
    }

    fn prune(&mut self) {
        self.workers.retain(|(handle, _)| !handle.is_finished());
    }

    pub fn len(&mut self) -> usize {
        self.prune();
        self.workers.len()
    }

    pub fn spawn(&mut self, ctx: Arc<WorkerContext>, queue: Arc<WorkQueue>) {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let handle = tokio::spawn(async move {
            run_worker(ctx, queue, worker_token).await;
        });
        self.workers.push((handle, token));
    }

    /// §4.4 step 3: "signal one worker to shut down". It finishes its
    /// current item (if any) and the queue-empty check at S0 before
    /// actually exiting -- no forced preemption (§4.7).
    pub fn signal_one_shutdown(&mut self) {
        self.prune();
        if let Some((_, token)) = self.workers.first() {
            token.cancel();
        }
    }

    pub fn signal_all_shutdown(&mut self) {
        self.prune();
        for (_, token) in &self.workers {
            token.cancel();
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ControllerConfig {
    pub workers_min: usize,
    pub workers_max: usize,
    pub retry_workers_min: usize,
    pub retry_workers_max: usize,
    pub controller_period: Duration,
    pub watch_period: Duration,
}

pub struct Controller {
    pub cfg: ControllerConfig,
    pub worker_ctx: Arc<WorkerContext>,
    pub client_pool: Arc<ClientPool>,
    pub primary_queue: Arc<WorkQueue>,
    pub retry_queue: Arc<WorkQueue>,
    pub primary_workers: Mutex<WorkerPool>,
    pub retry_workers: Mutex<WorkerPool>,
    pub feeders: Mutex<Vec<JoinHandle<()>>>,
    pub stats: Arc<Stats>,
    pub shutdown: CancellationToken,
}

impl Controller {
    /// §4.7: the run is complete once Feeders, both queues and both
    /// worker populations are all empty. The queue checks matter on
    /// their own: a Feeder can push items and finish before the
    /// Controller/Watcher have ticked even once, leaving both worker
    /// pools at their initial length of zero with unprocessed work
    /// still sitting on PrimaryQueue.
    async fn is_done(&self) -> bool {
        let feeders_done = {
            let mut feeders = self.feeders.lock().await;
            feeders.retain(|h| !h.is_finished());
            feeders.is_empty()
        };
        if !feeders_done {
            return false;
        }
        if !self.primary_queue.is_empty() || !self.retry_queue.is_empty() {
            return false;
        }
        let primary_empty = self.primary_workers.lock().await.len() == 0;
        let retry_empty = self.retry_workers.lock().await.len() == 0;
        primary_empty && retry_empty
    }

    /// §4.4 Controller loop, period `queues_controller_timeout`.
    async fn controller_tick(&self) {
        // 1. ensure the pool has at least one handle.
        if self.client_pool.len().await == 0 {
            self.client_pool.refill_to(1).await;
        }

        // 2/3. scale the primary pool on backlog. A pending shutdown
        // request only ever shrinks the pool, never grows it.
        {
            let mut primary = self.primary_workers.lock().await;
            let non_empty = !self.primary_queue.is_empty();
            let len = primary.len();
            let shutting_down = self.shutdown.is_cancelled();
            if shutting_down {
                primary.signal_all_shutdown();
            } else if non_empty && len < self.cfg.workers_max {
                primary.spawn(self.worker_ctx.clone(), self.primary_queue.clone());
            } else if !non_empty && len > self.cfg.workers_min {
                primary.signal_one_shutdown();
            }
        }

        if self.shutdown.is_cancelled() {
            self.retry_workers.lock().await.signal_all_shutdown();
        }

        // 4. telemetry.
        let primary_len = self.primary_workers.lock().await.len();
        let retry_len = self.retry_workers.lock().await.len();
        info!(
            "controller tick: primary_queue={} retry_queue={} primary_workers={} retry_workers={} stats[{}]",
            self.primary_queue.depth(),
            self.retry_queue.depth(),
            primary_len,
            retry_len,
            self.stats.snapshot()
        );
    }

    /// §4.4 Watcher loop, period `watch_interval`: preserves minimum
    /// parallelism quickly after a transient drain.
    async fn watcher_tick(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        {
            let mut primary = self.primary_workers.lock().await;
            if !self.primary_queue.is_empty() && primary.len() < self.cfg.workers_min {
                primary.spawn(self.worker_ctx.clone(), self.primary_queue.clone());
            }
        }
        {
            let mut retry = self.retry_workers.lock().await;
            if !self.retry_queue.is_empty() && retry.len() < self.cfg.retry_workers_min {
                retry.spawn(self.worker_ctx.clone(), self.retry_queue.clone());
            }
        }
    }

    /// Drives both loops until the run is complete (§4.7).
    pub async fn run(self: Arc<Self>) {
        let controller_self = self.clone();
        let controller_handle = tokio::spawn(async move {
            loop {
                if controller_self.is_done().await {
                    break;
                }
                controller_self.controller_tick().await;
                tokio::time::sleep(controller_self.cfg.controller_period).await;
            }
        });

        let watcher_self = self.clone();
        let watcher_handle = tokio::spawn(async move {
            loop {
                if watcher_self.is_done().await {
                    break;
                }
                watcher_self.watcher_tick().await;
                tokio::time::sleep(watcher_self.cfg.watch_period).await;
            }
        });

        let _ = tokio::join!(controller_handle, watcher_handle);
        info!("bridge run complete: {}", self.stats.snapshot());
    }

    /// §4.7 cooperative shutdown entry point (e.g. SIGTERM): stop
    /// spawning new workers and ask every live one to finish its current
    /// item and stop. Feeders are left to finish their current page scan
    /// on their own; they have no mid-scan cancellation point.
    pub async fn request_shutdown(&self) {
        self.shutdown.cancel();
        self.primary_workers.lock().await.signal_all_shutdown();
        self.retry_workers.lock().await.signal_all_shutdown();
    }
}

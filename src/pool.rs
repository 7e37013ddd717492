//! §4.3 ClientPool: a bounded supply of upstream client handles with
//! adaptive per-client backoff. Grounded in the teacher's
//! `Arc<RwLock<..>>`-shared-cache pattern (`known_blobs_cache.rs`),
//! generalized from a cache to a pool of handles that workers borrow and
//! return.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::upstream::UpstreamClient;

pub struct ClientHandle {
    pub client: UpstreamClient,
    pub request_interval: f64,
    pub user_agent: String,
    cookie_jar: Arc<reqwest::cookie::Jar>,
    base_url: String,
    api_key: String,
}

impl ClientHandle {
    /// §4.3 / §3 "above threshold, caller resets it to 0 and clears
    /// client-side session cookies before reuse." `reqwest`'s built-in
    /// jar has no `clear`, so a fresh jar plus a freshly built client is
    /// the cookie reset.
    pub fn clear_cookies_and_reset(&mut self) {
        self.cookie_jar = Arc::new(reqwest::cookie::Jar::default());
        let http = build_http_client(&self.user_agent, self.cookie_jar.clone());
        self.client = UpstreamClient::new(http, self.base_url.clone(), self.api_key.clone());
        self.request_interval = 0.0;
    }
}

fn build_http_client(user_agent: &str, jar: Arc<reqwest::cookie::Jar>) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .cookie_provider(jar)
        .build()
        .expect("reqwest client config is static and always valid")
}

pub struct ClientPool {
    handles: Mutex<VecDeque<ClientHandle>>,
    base_url: String,
    api_key: String,
    user_agent_prefix: String,
    bridge_uuid: Uuid,
}

impl ClientPool {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, user_agent_prefix: impl Into<String>) -> Self {
        ClientPool {
            handles: Mutex::new(VecDeque::new()),
            base_url: base_url.into(),
            api_key: api_key.into(),
            user_agent_prefix: user_agent_prefix.into(),
            bridge_uuid: Uuid::new_v4(),
        }
    }

    /// Non-blocking; returns `None` when the pool is momentarily empty
    /// rather than waiting for a release.
    pub async fn acquire(&self) -> Option<ClientHandle> {
        self.handles.lock().await.pop_front()
    }

    pub async fn release(&self, handle: ClientHandle) {
        self.handles.lock().await.push_back(handle);
    }

    /// §4.3: schedule re-admission after `delay` without blocking the
    /// caller. A single spawned timer task per call, per §9's "timer
    /// wheel or a single scheduler task" guidance -- simplest thing that
    /// doesn't block a worker.
    pub fn release_after(self: &Arc<Self>, handle: ClientHandle, delay: Duration) {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pool.release(handle).await;
        });
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// §4.3: create new clients until at least `min` are present.
    /// Creation retries with doubling backoff starting at 0.1s on
    /// transient failures -- client construction here is infallible
    /// (no network round trip at construction time), but the retry loop
    /// is kept so a future client type that does dial out on creation
    /// slots in without changing this contract.
    pub async fn refill_to(&self, min: usize) {
        let current = self.len().await;
        if current >= min {
            return;
        }
        for i in current..min {
            let mut backoff = Duration::from_millis(100);
            loop {
                match self.try_create_one(i).await {
                    Ok(handle) => {
                        self.release(handle).await;
                        break;
                    }
                    Err(e) => {
                        warn!("client creation failed, retrying in {:?}: {e}", backoff);
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        info!("client pool refilled to {min}");
    }

    async fn try_create_one(&self, index: usize) -> anyhow::Result<ClientHandle> {
        let client_uuid = Uuid::new_v4();
        let user_agent = format!("{}/{}/{}", self.user_agent_prefix, self.bridge_uuid, client_uuid);
        let jar = Arc::new(reqwest::cookie::Jar::default());
        let http = build_http_client(&user_agent, jar.clone());
        let _ = index;
        Ok(ClientHandle {
            client: UpstreamClient::new(http, self.base_url.clone(), self.api_key.clone()),
            request_interval: 0.0,
            user_agent,
            cookie_jar: jar,
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
        })
    }
}

/// §4.3 adaptive backoff rules, applied by the worker after each upstream
/// call -- not by the pool itself.
pub struct BackoffConfig {
    pub inc_step: f64,
    pub dec_step: f64,
    pub drop_threshold: f64,
}

pub enum BackoffOutcome {
    /// Release immediately.
    Immediate,
    /// `release_after(handle, delay)`.
    Delayed(Duration),
}

impl BackoffConfig {
    pub fn on_success(&self, handle: &mut ClientHandle) -> BackoffOutcome {
        handle.request_interval = (handle.request_interval - self.dec_step).max(0.0);
        BackoffOutcome::Immediate
    }

    pub fn on_rate_limited(&self, handle: &mut ClientHandle) -> BackoffOutcome {
        if handle.request_interval > self.drop_threshold {
            handle.clear_cookies_and_reset();
        } else {
            handle.request_interval += self.inc_step;
        }
        BackoffOutcome::Delayed(Duration::from_secs_f64(handle.request_interval))
    }

    pub fn on_other_error(&self, _handle: &mut ClientHandle) -> BackoffOutcome {
        BackoffOutcome::Immediate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> BackoffConfig {
        BackoffConfig {
            inc_step: 0.1,
            dec_step: 0.02,
            drop_threshold: 2.0,
        }
    }

    fn handle() -> ClientHandle {
        let jar = Arc::new(reqwest::cookie::Jar::default());
        ClientHandle {
            client: UpstreamClient::new(
                build_http_client("ua", jar.clone()),
                "https://example.test",
                "key",
            ),
            request_interval: 0.0,
            user_agent: "ua".to_string(),
            cookie_jar: jar,
            base_url: "https://example.test".to_string(),
            api_key: "key".to_string(),
        }
    }

    #[test]
    fn test_success_decrements_floored_at_zero() {
        let cfg = backoff();
        let mut h = handle();
        h.request_interval = 0.01;
        cfg.on_success(&mut h);
        assert_eq!(h.request_interval, 0.0);
    }

    #[test]
    fn test_rate_limit_below_threshold_increments_and_delays() {
        let cfg = backoff();
        let mut h = handle();
        h.request_interval = 1.0;
        match cfg.on_rate_limited(&mut h) {
            BackoffOutcome::Delayed(d) => assert_eq!(d, Duration::from_secs_f64(1.1)),
            BackoffOutcome::Immediate => panic!("expected delayed release"),
        }
        assert!((h.request_interval - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_rate_limit_above_threshold_resets_to_zero() {
        let cfg = backoff();
        let mut h = handle();
        h.request_interval = 2.5;
        cfg.on_rate_limited(&mut h);
        assert_eq!(h.request_interval, 0.0);
    }

    #[test]
    fn test_other_error_leaves_interval_unchanged() {
        let cfg = backoff();
        let mut h = handle();
        h.request_interval = 0.5;
        cfg.on_other_error(&mut h);
        assert_eq!(h.request_interval, 0.5);
    }

    #[tokio::test]
    async fn test_acquire_on_empty_pool_returns_none() {
        let pool = ClientPool::new("https://example.test", "key", "ArchivariusBridge");
        assert!(pool.acquire().await.is_none());
    }

    #[tokio::test]
    async fn test_refill_to_populates_pool() {
        let pool = ClientPool::new("https://example.test", "key", "ArchivariusBridge");
        pool.refill_to(3).await;
        assert_eq!(pool.len().await, 3);
    }

    #[tokio::test]
    async fn test_release_after_readmits_later() {
        let pool = Arc::new(ClientPool::new("https://example.test", "key", "ArchivariusBridge"));
        pool.refill_to(1).await;
        let h = pool.acquire().await.unwrap();
        assert_eq!(pool.len().await, 0);
        pool.release_after(h, Duration::from_millis(20));
        assert_eq!(pool.len().await, 0);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pool.len().await, 1);
    }
}

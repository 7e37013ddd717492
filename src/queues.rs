//! §4.4 WorkQueues: a primary bounded queue and a retry queue, both FIFO.
//! Generalizes the teacher's `futures::channel::mpsc` bounded-channel
//! pattern (`initialize_channels` in `collector.rs`) to the one extra
//! thing a Worker needs that a plain channel doesn't give you: a
//! blocking-with-timeout receive (§5 "Queue waits are bounded by
//! `queue_timeout`"), plus a depth counter for the Controller/Watcher's
//! non-blocking "is it empty" checks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::models::WorkItem;

enum Sender {
    Bounded(mpsc::Sender<WorkItem>),
    Unbounded(mpsc::UnboundedSender<WorkItem>),
}

enum Receiver {
    Bounded(mpsc::Receiver<WorkItem>),
    Unbounded(mpsc::UnboundedReceiver<WorkItem>),
}

/// One FIFO queue, bounded or not depending on the `-1` config convention
/// (§6). Depth is tracked explicitly since `tokio::sync::mpsc` exposes no
/// portable "how many items are queued" query.
pub struct WorkQueue {
    sender: Sender,
    receiver: Mutex<Receiver>,
    depth: Arc<AtomicUsize>,
}

impl WorkQueue {
    pub fn new(bound: Option<usize>) -> Self {
        match bound {
            Some(n) => {
                let (tx, rx) = mpsc::channel(n.max(1));
                WorkQueue {
                    sender: Sender::Bounded(tx),
                    receiver: Mutex::new(Receiver::Bounded(rx)),
                    depth: Arc::new(AtomicUsize::new(0)),
                }
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                WorkQueue {
                    sender: Sender::Unbounded(tx),
                    receiver: Mutex::new(Receiver::Unbounded(rx)),
                    depth: Arc::new(AtomicUsize::new(0)),
                }
            }
        }
    }

    /// Blocks only on backpressure for a bounded queue at capacity.
    pub async fn push(&self, item: WorkItem) -> Result<(), WorkItem> {
        let result = match &self.sender {
            Sender::Bounded(tx) => tx.send(item).await.map_err(|e| e.0),
            Sender::Unbounded(tx) => tx.send(item).map_err(|e| e.0),
        };
        if result.is_ok() {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    /// S0: dequeue, bounded by `queue_timeout`. `None` on timeout *or* on
    /// the channel closing (both mean "nothing to do right now").
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<WorkItem> {
        let mut receiver = self.receiver.lock().await;
        let recv = async {
            match &mut *receiver {
                Receiver::Bounded(rx) => rx.recv().await,
                Receiver::Unbounded(rx) => rx.recv().await,
            }
        };
        let item = tokio::time::timeout(timeout, recv).await.ok().flatten();
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }
}

/// §4.6: a retried item isn't re-enqueued synchronously -- a scheduled
/// task places it back on the queue after `timeout`, freeing the worker
/// immediately.
pub fn schedule_retry(queue: Arc<WorkQueue>, item: WorkItem, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = queue.push(item).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item() -> WorkItem {
        WorkItem::new(Uuid::new_v4(), "tenders", Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_push_then_pop_preserves_fifo_and_depth() {
        let q = WorkQueue::new(Some(4));
        let a = item();
        let b = item();
        let a_id = a.id;
        q.push(a).await.unwrap();
        q.push(b).await.unwrap();
        assert_eq!(q.depth(), 2);

        let popped = q.pop_timeout(Duration::from_millis(50)).await.unwrap();
        assert_eq!(popped.id, a_id);
        assert_eq!(q.depth(), 1);
    }

    #[tokio::test]
    async fn test_pop_times_out_on_empty_queue() {
        let q = WorkQueue::new(Some(4));
        let popped = q.pop_timeout(Duration::from_millis(20)).await;
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_unbounded_queue_never_blocks_push() {
        let q = WorkQueue::new(None);
        for _ in 0..50 {
            q.push(item()).await.unwrap();
        }
        assert_eq!(q.depth(), 50);
    }

    #[tokio::test]
    async fn test_schedule_retry_requeues_after_delay() {
        let q = Arc::new(WorkQueue::new(None));
        schedule_retry(q.clone(), item(), Duration::from_millis(20));
        assert!(q.is_empty());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(q.depth(), 1);
    }
}

//! §4.1 Feeder: one task per resource, scanning a view page by page,
//! applying the resource's filter, and pushing matches onto PrimaryQueue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info};

use crate::filters::FilterRegistry;
use crate::models::WorkItem;
use crate::queues::WorkQueue;
use crate::source_store::{SourceStore, VIEW_PAGE_SIZE};
use crate::stats::{CounterExt, Stats};

pub struct Feeder {
    pub resource: String,
    source: SourceStore,
    filters: Arc<FilterRegistry>,
    primary: Arc<WorkQueue>,
    stats: Arc<Stats>,
    base_timeout: Duration,
}

impl Feeder {
    pub fn new(
        resource: impl Into<String>,
        source: SourceStore,
        filters: Arc<FilterRegistry>,
        primary: Arc<WorkQueue>,
        stats: Arc<Stats>,
        base_timeout: Duration,
    ) -> Self {
        Feeder {
            resource: resource.into(),
            source,
            filters,
            primary,
            stats,
            base_timeout,
        }
    }

    /// §4.1: eligibility is parameterized by the start time captured once
    /// per run, so a single pass is internally consistent even though the
    /// view keeps changing underneath it.
    pub async fn run(&self) {
        let start_time = Utc::now();
        let mut skip = 0usize;
        info!("feeder for resource '{}' starting", self.resource);

        loop {
            let page = match self.source.scan_resource_page(&self.resource, skip).await {
                Ok(page) => page,
                Err(e) => {
                    // §4.1: transient view errors are fatal for this Feeder.
                    error!("feeder for resource '{}' terminating: {e}", self.resource);
                    return;
                }
            };

            let page_len = page.len();
            for doc in &page {
                if self.filters.eval(&self.resource, doc, start_time) {
                    let item = WorkItem::new(doc.id, self.resource.clone(), self.base_timeout);
                    if self.primary.push(item).await.is_ok() {
                        self.stats.added.incr();
                    }
                }
            }

            if page_len < VIEW_PAGE_SIZE {
                break;
            }
            skip += VIEW_PAGE_SIZE;
        }

        info!("feeder for resource '{}' exhausted its view", self.resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::couch_client::CouchClient;
    use crate::filters::doc_type_allow_list;

    fn test_queue() -> Arc<WorkQueue> {
        Arc::new(WorkQueue::new(None))
    }

    #[tokio::test]
    async fn test_feeder_stops_without_a_live_store() {
        // Pointed at an address nothing is listening on: the first page
        // fetch fails, and the Feeder must terminate rather than loop.
        let couch = CouchClient::new(reqwest::Client::new(), "http://127.0.0.1:1", "edge_db");
        let source = SourceStore::new(couch);
        let mut registry = FilterRegistry::new();
        registry.register("tenders", doc_type_allow_list(vec!["Tender".to_string()]));

        let queue = test_queue();
        let stats = Stats::new();
        let feeder = Feeder::new(
            "tenders",
            source,
            Arc::new(registry),
            queue.clone(),
            stats.clone(),
            Duration::from_secs(3),
        );
        feeder.run().await;
        assert_eq!(queue.depth(), 0);
        assert_eq!(stats.snapshot().added, 0);
    }
}

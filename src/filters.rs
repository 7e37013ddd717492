//! §4.1 / §9 "Pluggable filter": the per-resource predicate deciding
//! which documents are eligible for archival. Kept as an injected
//! interface, registered by resource name, the way the teacher dispatches
//! RecordType allow-lists per subscription in its own filter module.

use std::collections::HashMap;
use chrono::{DateTime, Utc};

use crate::models::SourceDoc;

/// `(row, start_time) -> bool`. `start_time` is captured once per Feeder
/// run so eligibility stays stable across the whole pass (§4.1).
pub type FilterFn = Box<dyn Fn(&SourceDoc, DateTime<Utc>) -> bool + Send + Sync>;

pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        FilterRegistry {
            filters: HashMap::new(),
        }
    }

    pub fn register(&mut self, resource: impl Into<String>, filter: FilterFn) {
        self.filters.insert(resource.into(), filter);
    }

    /// Resources with no registered filter allow everything through --
    /// same default the teacher's `RecordTypeFilter` falls back to when a
    /// subscription has no entry.
    pub fn eval(&self, resource: &str, doc: &SourceDoc, start_time: DateTime<Utc>) -> bool {
        match self.filters.get(resource) {
            Some(f) => f(doc, start_time),
            None => true,
        }
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A filter that only admits documents already final as of the feeder's
/// start time -- the common case for "finalized procurement records".
pub fn not_modified_after(cutoff_field_is_date_modified: bool) -> FilterFn {
    let _ = cutoff_field_is_date_modified;
    Box::new(|doc: &SourceDoc, start_time: DateTime<Utc>| doc.date_modified <= start_time)
}

/// Example resource-specific filter in the teacher's idiom: an allow-list
/// of `doc_type` values, analogous to `RecordTypeFilter`'s RecordType
/// allow-lists per subscription.
pub fn doc_type_allow_list(allowed: Vec<String>) -> FilterFn {
    Box::new(move |doc: &SourceDoc, _start_time: DateTime<Utc>| allowed.contains(&doc.doc_type))
}

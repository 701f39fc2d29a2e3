//! In-memory registry of rejected publish attempts awaiting retry
//!
//! Keyed by request id: re-adding an id overwrites the previous record.
//! Removals requested by confirmation events are staged in a pending set and
//! applied by [`RetryRegistry::flush_removals`] once the current sweep is done.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// One pending or failed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub request_id: String,
    pub payload: Vec<u8>,
    pub exchange: String,
    pub routing_key: String,
    pub origin_service: String,
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryState {
    records: HashMap<String, MessageRecord>,
    pending_removal: HashSet<String>,
}

/// Process-local retry registry
///
/// Every operation takes the internal lock once, so operations are atomic with
/// respect to each other and a shared handle can be observed while a sweep runs.
#[derive(Debug, Default)]
pub struct RetryRegistry {
    state: Mutex<RegistryState>,
}

impl RetryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record for `request_id`
    pub fn add(
        &self,
        request_id: &str,
        payload: &[u8],
        exchange: &str,
        routing_key: &str,
        service: &str,
        retry_count: u32,
    ) {
        let record = MessageRecord {
            request_id: request_id.to_string(),
            payload: payload.to_vec(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            origin_service: service.to_string(),
            retry_count,
            enqueued_at: Utc::now(),
        };

        self.state.lock().records.insert(request_id.to_string(), record);
    }

    /// Insert or overwrite `request_id`, keeping any retry count already accrued
    ///
    /// Lookup and insert happen under one lock, so a concurrent sweep cannot
    /// observe or bump the count in between. Returns the count carried over.
    pub fn record_failure(
        &self,
        request_id: &str,
        payload: &[u8],
        exchange: &str,
        routing_key: &str,
        service: &str,
    ) -> u32 {
        let mut state = self.state.lock();
        let retry_count = state
            .records
            .get(request_id)
            .map(|record| record.retry_count)
            .unwrap_or(0);

        state.records.insert(
            request_id.to_string(),
            MessageRecord {
                request_id: request_id.to_string(),
                payload: payload.to_vec(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                origin_service: service.to_string(),
                retry_count,
                enqueued_at: Utc::now(),
            },
        );
        retry_count
    }

    /// Bump the retry count, returning the new value; absent ids are ignored
    pub fn increment_retries(&self, request_id: &str) -> Option<u32> {
        let mut state = self.state.lock();
        state.records.get_mut(request_id).map(|record| {
            record.retry_count += 1;
            record.retry_count
        })
    }

    /// Hard delete
    pub fn remove(&self, request_id: &str) -> Option<MessageRecord> {
        self.state.lock().records.remove(request_id)
    }

    pub fn get(&self, request_id: &str) -> Option<MessageRecord> {
        self.state.lock().records.get(request_id).cloned()
    }

    pub fn retry_count(&self, request_id: &str) -> Option<u32> {
        self.state
            .lock()
            .records
            .get(request_id)
            .map(|record| record.retry_count)
    }

    /// Copy of every record, staged removals included, oldest first
    pub fn snapshot(&self) -> Vec<MessageRecord> {
        let mut records: Vec<MessageRecord> =
            self.state.lock().records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        records
    }

    /// Stage `request_id` for deletion at the next flush
    pub fn mark_for_removal(&self, request_id: &str) {
        self.state.lock().pending_removal.insert(request_id.to_string());
    }

    pub fn is_marked_for_removal(&self, request_id: &str) -> bool {
        self.state.lock().pending_removal.contains(request_id)
    }

    /// Hard delete every staged id, returning the records that were removed
    pub fn flush_removals(&self) -> Vec<MessageRecord> {
        let mut state = self.state.lock();
        let staged: Vec<String> = state.pending_removal.drain().collect();
        staged
            .iter()
            .filter_map(|request_id| state.records.remove(request_id))
            .collect()
    }

    pub fn pending_removals(&self) -> usize {
        self.state.lock().pending_removal.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }
}

#![forbid(unsafe_code)]

//! Answer records and their debounced persistence.
//!
//! # Design Invariants
//!
//! 1. **One record per item**: `upsert` finds or creates; it never duplicates.
//! 2. **Tolerant load**: a stored blob that is not a JSON array resets the
//!    collection to empty; undecodable elements are skipped; duplicate ids
//!    keep the last occurrence. Every repair is reported, none is an error.
//! 3. **Trailing-edge debounce**: every mutation cancels the pending flush
//!    and schedules a new one, so a burst produces one write.
//! 4. **No retry**: a failed write is reported and dropped.

use std::sync::Arc;
use std::time::Duration;

use qflow_core::{AnswerLookup, AnswerRecord, AnswerValue, Item, ItemId, completed_count, wall_clock_ms};
use serde_json::Value;

use crate::persistence::{PersistenceStore, StorageError, StorageResult};
use crate::scheduler::{FlowTimer, Scheduler, TimerId};

/// Outcome of [`AnswerStore::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Records kept.
    pub loaded: usize,
    /// Repairs applied while decoding.
    pub repairs: Vec<String>,
    /// Read or parse failure; the store starts empty.
    pub error: Option<StorageError>,
}

/// Decode a stored blob into records, repairing what can be repaired.
///
/// Returns the records and a description of each repair. Only bytes that are
/// not JSON at all are an error.
pub fn decode_records(bytes: &[u8]) -> StorageResult<(Vec<AnswerRecord>, Vec<String>)> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|e| StorageError::Corruption(format!("answers are not JSON: {e}")))?;

    let elements = match root {
        Value::Null => return Ok((Vec::new(), Vec::new())),
        Value::Array(elements) => elements,
        other => {
            let found = match other {
                Value::Bool(_) => "boolean",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                _ => "object",
            };
            return Ok((
                Vec::new(),
                vec![format!("stored answers are a {found}, not an array; reset to empty")],
            ));
        }
    };

    let mut records: Vec<AnswerRecord> = Vec::with_capacity(elements.len());
    let mut repairs = Vec::new();
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<AnswerRecord>(element) {
            Ok(record) => {
                if let Some(existing) = records.iter_mut().find(|r| r.item_id == record.item_id) {
                    repairs.push(format!("duplicate record for {}; kept the last", record.item_id));
                    *existing = record;
                } else {
                    records.push(record);
                }
            }
            Err(e) => repairs.push(format!("skipped undecodable record at {index}: {e}")),
        }
    }
    Ok((records, repairs))
}

/// Encode records for storage.
pub fn encode_records(records: &[AnswerRecord]) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(records).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Owns the answer records.
pub struct AnswerStore {
    records: Vec<AnswerRecord>,
    store: Arc<dyn PersistenceStore>,
    pending_flush: Option<TimerId>,
    saves: u64,
    save_failures: u64,
}

impl AnswerStore {
    /// Create an empty store backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            records: Vec::new(),
            store,
            pending_flush: None,
            saves: 0,
            save_failures: 0,
        }
    }

    /// Replace the records with whatever the backend holds.
    ///
    /// Never fails: read and decode errors leave the store empty and are
    /// reported in the [`LoadReport`].
    pub fn load(&mut self) -> LoadReport {
        self.records.clear();
        let bytes = match self.store.load() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return LoadReport::default(),
            Err(e) => {
                tracing::warn!(store = self.store.name(), error = %e, "answer load failed; starting empty");
                return LoadReport {
                    error: Some(e),
                    ..LoadReport::default()
                };
            }
        };

        match decode_records(&bytes) {
            Ok((records, repairs)) => {
                for repair in &repairs {
                    tracing::warn!(store = self.store.name(), repair = %repair, "repaired stored answers");
                }
                self.records = records;
                tracing::debug!(records = self.records.len(), "answers loaded");
                LoadReport {
                    loaded: self.records.len(),
                    repairs,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(store = self.store.name(), error = %e, "stored answers unreadable; starting empty");
                LoadReport {
                    error: Some(e),
                    ..LoadReport::default()
                }
            }
        }
    }

    /// Merge `value` into the record for `item_id`, creating it if needed.
    ///
    /// Returns whether the stored data changed.
    pub fn upsert(&mut self, item_id: &ItemId, value: AnswerValue) -> bool {
        match self.records.iter_mut().find(|r| &r.item_id == item_id) {
            Some(record) => record.apply(value),
            None => {
                let mut record = AnswerRecord::new(item_id.clone(), wall_clock_ms());
                record.apply(value);
                self.records.push(record);
                true
            }
        }
    }

    /// The record for `item_id`.
    #[must_use]
    pub fn find(&self, item_id: &str) -> Option<&AnswerRecord> {
        self.records.iter().find(|r| r.item_id.as_str() == item_id)
    }

    /// Every record.
    #[must_use]
    pub fn records(&self) -> &[AnswerRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Items whose record satisfies the completeness rule.
    #[must_use]
    pub fn completed_count(&self, items: &[Item]) -> usize {
        completed_count(items, &self.records)
    }

    /// Restart the debounce window: cancel any pending flush and schedule a
    /// new one `window` from now.
    pub fn debounced_persist(&mut self, scheduler: &mut Scheduler<FlowTimer>, window: Duration) {
        if let Some(id) = self.pending_flush.take() {
            scheduler.cancel(id);
        }
        self.pending_flush = Some(scheduler.schedule_after(window, FlowTimer::PersistFlush));
    }

    /// Whether a debounced flush is pending.
    #[must_use]
    pub fn has_pending_flush(&self) -> bool {
        self.pending_flush.is_some()
    }

    /// Handle the debounce timer firing.
    pub fn on_flush_timer(&mut self) -> StorageResult<()> {
        self.pending_flush = None;
        self.flush()
    }

    /// Flush now if a debounced flush is pending. `None` when nothing was pending.
    pub fn flush_pending(&mut self, scheduler: &mut Scheduler<FlowTimer>) -> Option<StorageResult<()>> {
        let id = self.pending_flush.take()?;
        scheduler.cancel(id);
        Some(self.flush())
    }

    /// Write every record to the backend.
    pub fn flush(&mut self) -> StorageResult<()> {
        let result = encode_records(&self.records).and_then(|bytes| self.store.save(&bytes));
        match &result {
            Ok(()) => {
                self.saves += 1;
                tracing::debug!(store = self.store.name(), records = self.records.len(), "answers persisted");
            }
            Err(e) => {
                self.save_failures += 1;
                tracing::warn!(store = self.store.name(), error = %e, "answer persistence failed; not retrying");
            }
        }
        result
    }

    /// Destroy every record, cancel a pending flush, and clear the backend.
    pub fn reset(&mut self, scheduler: &mut Scheduler<FlowTimer>) -> StorageResult<()> {
        if let Some(id) = self.pending_flush.take() {
            scheduler.cancel(id);
        }
        self.records.clear();
        self.store.clear()
    }

    /// Successful writes.
    #[must_use]
    pub fn saves(&self) -> u64 {
        self.saves
    }

    /// Failed writes.
    #[must_use]
    pub fn save_failures(&self) -> u64 {
        self.save_failures
    }

    /// Backend name.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.store.name()
    }
}

impl AnswerLookup for AnswerStore {
    fn find_answer(&self, item_id: &str) -> Option<&AnswerRecord> {
        self.find(item_id)
    }
}

impl std::fmt::Debug for AnswerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStore")
            .field("records", &self.records.len())
            .field("backend", &self.store.name())
            .field("pending_flush", &self.pending_flush)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use qflow_core::Choice;

    fn single(v: &str) -> AnswerValue {
        AnswerValue::Single(Choice::new(v))
    }

    fn store_with(bytes: &str) -> (AnswerStore, Arc<MemoryStore>) {
        let backend = Arc::new(MemoryStore::with_bytes(bytes.as_bytes().to_vec()));
        (AnswerStore::new(backend.clone()), backend)
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut store = AnswerStore::new(Arc::new(MemoryStore::new()));
        let id = ItemId::new("q1");
        assert!(store.upsert(&id, single("A")));
        assert!(!store.upsert(&id, single("A")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.find("q1").unwrap().single_value.as_deref(), Some("A"));
    }

    #[test]
    fn dual_halves_merge_into_one_record() {
        let mut store = AnswerStore::new(Arc::new(MemoryStore::new()));
        let id = ItemId::new("q25");
        store.upsert(&id, AnswerValue::Outer(Choice::new("B")));
        store.upsert(&id, AnswerValue::Inner(Choice::new("A")));
        let record = store.find("q25").unwrap();
        assert_eq!(store.len(), 1);
        assert!(record.inner_value.is_some() && record.outer_value.is_some());
    }

    #[test]
    fn null_and_non_array_load_empty() {
        let (mut store, _) = store_with("null");
        let report = store.load();
        assert!(store.is_empty());
        assert!(report.repairs.is_empty() && report.error.is_none());

        let (mut store, _) = store_with(r#"{"itemId":"q1"}"#);
        let report = store.load();
        assert!(store.is_empty());
        assert_eq!(report.repairs.len(), 1);
    }

    #[test]
    fn garbage_load_reports_corruption() {
        let (mut store, _) = store_with("not json");
        let report = store.load();
        assert!(store.is_empty());
        assert!(matches!(report.error, Some(StorageError::Corruption(_))));
    }

    #[test]
    fn load_skips_bad_elements_and_dedupes() {
        let (mut store, _) = store_with(
            r#"[
                {"itemId":"q1","timestamp":1,"singleValue":"A"},
                42,
                {"itemId":"q1","timestamp":2,"singleValue":"C"},
                {"itemId":"q2","timestamp":3,"singleValue":"B"}
            ]"#,
        );
        let report = store.load();
        assert_eq!(report.loaded, 2);
        assert_eq!(report.repairs.len(), 2);
        assert_eq!(store.find("q1").unwrap().single_value.as_deref(), Some("C"));
    }

    #[test]
    fn debounce_coalesces_to_one_write() {
        let backend = Arc::new(MemoryStore::new());
        let mut store = AnswerStore::new(backend.clone());
        let mut scheduler = Scheduler::new();
        let window = Duration::from_millis(500);

        for i in 0..10 {
            store.upsert(&ItemId::new(format!("q{i}")), single("A"));
            store.debounced_persist(&mut scheduler, window);
            scheduler.advance_to(scheduler.now() + Duration::from_millis(40));
        }
        assert_eq!(scheduler.pending(), 1);

        while let Some((_, timer)) = scheduler.pop_due(Duration::from_secs(5)) {
            assert_eq!(timer, FlowTimer::PersistFlush);
            store.on_flush_timer().unwrap();
        }
        assert_eq!(backend.save_count(), 1);
        assert!(!store.has_pending_flush());

        let (records, _) = decode_records(&backend.contents().unwrap()).unwrap();
        assert_eq!(records.len(), 10);
    }

    #[test]
    fn flush_pending_writes_once() {
        let backend = Arc::new(MemoryStore::new());
        let mut store = AnswerStore::new(backend.clone());
        let mut scheduler = Scheduler::new();
        assert!(store.flush_pending(&mut scheduler).is_none());

        store.upsert(&ItemId::new("q1"), single("A"));
        store.debounced_persist(&mut scheduler, Duration::from_millis(500));
        assert!(store.flush_pending(&mut scheduler).unwrap().is_ok());
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(backend.save_count(), 1);
    }

    #[test]
    fn reset_clears_records_and_backend() {
        let (mut store, backend) = store_with(r#"[{"itemId":"q1","singleValue":"A"}]"#);
        store.load();
        let mut scheduler = Scheduler::new();
        store.debounced_persist(&mut scheduler, Duration::from_millis(500));
        store.reset(&mut scheduler).unwrap();
        assert!(store.is_empty());
        assert_eq!(scheduler.pending(), 0);
        assert!(backend.contents().is_none());
    }
}

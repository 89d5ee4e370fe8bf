//! Dead-letter metadata and an inspectable read path over DLQ entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broker::ConsumedMessage;

/// In-process retries attempted by the consumer before routing to the DLQ.
pub const MAX_RETRIES: usize = 3;

/// Total lifetime retries (in-process plus replayed) before a message is
/// abandoned rather than replayed again.
pub const REPLAY_LIFETIME_CAP: usize = 2 * MAX_RETRIES;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub retry_count: usize,
    pub first_failure: DateTime<Utc>,
    pub last_failure: DateTime<Utc>,
    pub original_topic: String,
    pub error_message: String,
}

/// Where a DLQ entry sits in its lifecycle, for an operator listing the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DlqStatus {
    /// Parked, waiting out its cooldown (or queued behind it) before the
    /// replayer decides whether to replay or abandon it.
    Pending,
    /// Successfully reinjected onto the main topic.
    Replayed,
    /// Abandoned: lifetime retry cap exceeded, or republish itself failed.
    Abandoned,
}

/// A DLQ entry, as an operator would inspect it.
#[derive(Debug, Clone)]
pub struct DlqEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub metadata: MessageMetadata,
    pub original_partition: i32,
    pub original_offset: i64,
    pub failure_time: DateTime<Utc>,
    pub status: DlqStatus,
}

impl DlqEntry {
    pub fn from_message(message: &ConsumedMessage) -> Option<Self> {
        let metadata: MessageMetadata = serde_json::from_str(message.header("metadata")?).ok()?;
        let failure_time = DateTime::parse_from_rfc3339(message.header("failure_time")?).ok()?.with_timezone(&Utc);
        Some(Self {
            key: message.key.clone(),
            value: message.value.clone(),
            metadata,
            original_partition: message.header("original_partition")?.parse().ok()?,
            original_offset: message.header("original_offset")?.parse().ok()?,
            failure_time,
            status: DlqStatus::Pending,
        })
    }
}

/// In-memory record of DLQ entries, keyed by their original partition/offset
/// so a later status change (pending -> replayed/abandoned) updates the same
/// entry rather than appending a duplicate. Populated by `DlqReplayer` as
/// soon as a message lands in the DLQ, letting an operator list what is
/// currently parked as well as what was ultimately replayed or abandoned.
#[derive(Default, Clone)]
pub struct DlqStore {
    entries: std::sync::Arc<std::sync::Mutex<Vec<DlqEntry>>>,
}

impl DlqStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry, or replaces the existing one with the same
    /// original partition/offset (a status transition on an entry already
    /// being tracked).
    pub fn record(&self, entry: DlqEntry) {
        let mut entries = self.entries.lock().unwrap();
        match entries
            .iter_mut()
            .find(|e| e.original_partition == entry.original_partition && e.original_offset == entry.original_offset)
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    pub fn list(&self) -> Vec<DlqEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries still parked awaiting a replay/abandon decision.
    pub fn pending(&self) -> Vec<DlqEntry> {
        self.entries.lock().unwrap().iter().filter(|e| e.status == DlqStatus::Pending).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ProducerRecord;
    use std::collections::HashMap;

    fn sample_message() -> ConsumedMessage {
        let metadata = MessageMetadata {
            retry_count: 4,
            first_failure: Utc::now(),
            last_failure: Utc::now(),
            original_topic: "order.created".to_string(),
            error_message: "processing error: boom".to_string(),
        };
        let record = ProducerRecord::new("order.created.dlq", b"k".to_vec(), b"v".to_vec())
            .with_header("metadata", serde_json::to_string(&metadata).unwrap())
            .with_header("original_partition", "0")
            .with_header("original_offset", "7")
            .with_header("failure_time", Utc::now().to_rfc3339());
        ConsumedMessage {
            topic: record.topic,
            partition: 0,
            offset: 0,
            key: record.key,
            value: record.value,
            headers: record.headers,
        }
    }

    #[test]
    fn from_message_parses_well_formed_headers() {
        let entry = DlqEntry::from_message(&sample_message()).unwrap();
        assert_eq!(entry.metadata.retry_count, 4);
        assert_eq!(entry.original_offset, 7);
    }

    #[test]
    fn from_message_rejects_missing_metadata() {
        let message = ConsumedMessage {
            topic: "order.created.dlq".to_string(),
            partition: 0,
            offset: 0,
            key: vec![],
            value: vec![],
            headers: HashMap::new(),
        };
        assert!(DlqEntry::from_message(&message).is_none());
    }

    #[test]
    fn store_records_and_lists_entries() {
        let store = DlqStore::new();
        assert!(store.is_empty());
        store.record(DlqEntry::from_message(&sample_message()).unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn recording_a_status_transition_updates_in_place_rather_than_appending() {
        let store = DlqStore::new();
        let mut entry = DlqEntry::from_message(&sample_message()).unwrap();
        assert_eq!(entry.status, DlqStatus::Pending);
        store.record(entry.clone());
        assert_eq!(store.pending().len(), 1, "newly parked entry is visible as pending");

        entry.status = DlqStatus::Replayed;
        store.record(entry);
        assert_eq!(store.len(), 1, "same partition/offset replaces, does not duplicate");
        assert!(store.pending().is_empty(), "replayed entry no longer counts as pending");
    }
}

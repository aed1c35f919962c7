use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use event_store::EventEnvelope;

use crate::error::{ProcessError, Result};
use crate::process::ProcessId;

/// One entry in a process instance's private history.
///
/// The history is the instance: replaying it reconstructs both the
/// subscription set and, through the handled events, the process state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProcessHistoryEntry {
    Started { process_type: String },
    SubscribedToTopic { topic: Uuid },
    UnsubscribedFromTopic { topic: Uuid },
    Handled(EventEnvelope),
}

/// A loaded (or newly created) process instance: identity, subscription view
/// and uncommitted history entries. Saving is optimistic-concurrency-checked
/// against the version the instance was loaded at.
#[derive(Debug)]
pub struct ProcessManager {
    process_id: ProcessId,
    process_type: String,
    loaded_version: i64,
    history: Vec<ProcessHistoryEntry>,
    changes: Vec<ProcessHistoryEntry>,
    subscriptions: HashSet<Uuid>,
}

impl ProcessManager {
    /// Creates a new instance at version 0, recording the start marker.
    pub fn create(process_id: ProcessId, process_type: &str) -> Self {
        Self {
            process_id,
            process_type: process_type.to_string(),
            loaded_version: 0,
            history: Vec::new(),
            changes: vec![ProcessHistoryEntry::Started {
                process_type: process_type.to_string(),
            }],
            subscriptions: HashSet::new(),
        }
    }

    fn from_history(process_id: ProcessId, history: Vec<ProcessHistoryEntry>) -> Self {
        let mut process_type = String::new();
        let mut subscriptions = HashSet::new();
        for entry in &history {
            match entry {
                ProcessHistoryEntry::Started { process_type: t } => process_type = t.clone(),
                ProcessHistoryEntry::SubscribedToTopic { topic } => {
                    subscriptions.insert(*topic);
                }
                ProcessHistoryEntry::UnsubscribedFromTopic { topic } => {
                    subscriptions.remove(topic);
                }
                ProcessHistoryEntry::Handled(_) => {}
            }
        }
        Self {
            process_id,
            process_type,
            loaded_version: history.len() as i64,
            history,
            changes: Vec::new(),
            subscriptions,
        }
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn process_type(&self) -> &str {
        &self.process_type
    }

    /// The committed history this instance was loaded with.
    pub fn history(&self) -> &[ProcessHistoryEntry] {
        &self.history
    }

    pub fn subscriptions(&self) -> &HashSet<Uuid> {
        &self.subscriptions
    }

    /// Subscribes the instance to a topic. Subscribing to a topic the
    /// instance already has is a no-op.
    pub fn subscribe(&mut self, topic: Uuid) {
        if self.subscriptions.insert(topic) {
            self.changes
                .push(ProcessHistoryEntry::SubscribedToTopic { topic });
        }
    }

    /// Unsubscribes the instance from a topic. Unsubscribing from a topic
    /// the instance does not have is a no-op.
    pub fn unsubscribe(&mut self, topic: Uuid) {
        if self.subscriptions.remove(&topic) {
            self.changes
                .push(ProcessHistoryEntry::UnsubscribedFromTopic { topic });
        }
    }

    /// Records a handled event as a new history entry.
    pub fn record_handled(&mut self, event: EventEnvelope) {
        self.changes.push(ProcessHistoryEntry::Handled(event));
    }
}

/// Storage of process instances and their topic subscriptions.
#[async_trait]
pub trait ProcessRepo: Send + Sync {
    /// Loads the instance with its full history.
    async fn get_by_id(&self, process_id: ProcessId) -> Result<ProcessManager>;

    /// Persists the instance's uncommitted history entries.
    ///
    /// Fails with [`ProcessError::ConcurrencyConflict`] if the stored history
    /// has grown since the instance was loaded (or, for a new instance, if
    /// one with the same ID was already persisted).
    async fn save(&self, process: &mut ProcessManager) -> Result<()>;

    /// IDs of every instance subscribed to any of the given topics.
    async fn find_subscribers_to_any_of(&self, topics: &[Uuid]) -> Result<HashSet<ProcessId>>;
}

/// The stored form of a process instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedProcess {
    pub process_id: ProcessId,
    pub process_type: String,
    pub history: Vec<ProcessHistoryEntry>,
}

#[derive(Default)]
struct RepoState {
    processes: HashMap<ProcessId, PersistedProcess>,
    subscribers_by_topic: HashMap<Uuid, HashSet<ProcessId>>,
}

/// In-memory process repository. Process-lifetime only.
#[derive(Clone, Default)]
pub struct InMemoryProcessRepo {
    state: Arc<Mutex<RepoState>>,
}

impl InMemoryProcessRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessRepo for InMemoryProcessRepo {
    async fn get_by_id(&self, process_id: ProcessId) -> Result<ProcessManager> {
        let state = self.state.lock().await;
        let stored = state
            .processes
            .get(&process_id)
            .ok_or(ProcessError::ProcessNotFound(process_id))?;
        Ok(ProcessManager::from_history(
            process_id,
            stored.history.clone(),
        ))
    }

    async fn save(&self, process: &mut ProcessManager) -> Result<()> {
        let mut state = self.state.lock().await;

        let actual = state
            .processes
            .get(&process.process_id)
            .map(|stored| stored.history.len() as i64)
            .unwrap_or(0);
        if actual != process.loaded_version {
            return Err(ProcessError::ConcurrencyConflict {
                process_id: process.process_id,
                expected: process.loaded_version,
                actual,
            });
        }

        let changes = std::mem::take(&mut process.changes);
        for entry in &changes {
            match entry {
                ProcessHistoryEntry::SubscribedToTopic { topic } => {
                    state
                        .subscribers_by_topic
                        .entry(*topic)
                        .or_default()
                        .insert(process.process_id);
                }
                ProcessHistoryEntry::UnsubscribedFromTopic { topic } => {
                    if let Some(subscribers) = state.subscribers_by_topic.get_mut(topic) {
                        subscribers.remove(&process.process_id);
                    }
                }
                ProcessHistoryEntry::Started { .. } | ProcessHistoryEntry::Handled(_) => {}
            }
        }

        let stored = state
            .processes
            .entry(process.process_id)
            .or_insert_with(|| PersistedProcess {
                process_id: process.process_id,
                process_type: process.process_type.clone(),
                history: Vec::new(),
            });
        stored.history.extend(changes.iter().cloned());
        process.history.extend(changes);
        process.loaded_version = process.history.len() as i64;

        Ok(())
    }

    async fn find_subscribers_to_any_of(&self, topics: &[Uuid]) -> Result<HashSet<ProcessId>> {
        let state = self.state.lock().await;
        let mut process_ids = HashSet::new();
        for topic in topics {
            if let Some(subscribers) = state.subscribers_by_topic.get(topic) {
                process_ids.extend(subscribers.iter().copied());
            }
        }
        Ok(process_ids)
    }
}

//! Artifact store: a write-once key/value store of produced `Message`s,
//! keyed by `(runID, artifactID)` (C4), guarding a `HashMap` behind a
//! `parking_lot::Mutex`. A second write to the same key is a programming
//! error, not a legitimate update: the executor produces each artifact
//! exactly once per run by construction (§3/§5).

use crate::error::{PipelineError, Result};
use crate::message::Message;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ArtifactKey {
    run_id: String,
    artifact_id: String,
}

/// A key/value store of produced messages. Must be a *transient* service in
/// the container: each run needs its own fresh store (§3 "Ownership").
pub trait ArtifactStore: Send + Sync {
    fn save(&self, run_id: &str, artifact_id: &str, message: Message) -> Result<()>;
    fn get(&self, run_id: &str, artifact_id: &str) -> Result<Message>;
    fn contains(&self, run_id: &str, artifact_id: &str) -> bool;
}

/// Reference in-memory implementation. Concurrent writes to distinct keys
/// are serialised by the mutex; concurrent reads are safe. The DAG executor
/// never issues two concurrent writes to the same key, but `save` still
/// rejects a repeat write defensively.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    entries: Mutex<HashMap<ArtifactKey, Message>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn save(&self, run_id: &str, artifact_id: &str, message: Message) -> Result<()> {
        let key = ArtifactKey {
            run_id: run_id.to_string(),
            artifact_id: artifact_id.to_string(),
        };
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            return Err(PipelineError::Other(anyhow::anyhow!(
                "artifact `{artifact_id}` already written for run `{run_id}`"
            )));
        }
        entries.insert(key, message);
        Ok(())
    }

    fn get(&self, run_id: &str, artifact_id: &str) -> Result<Message> {
        let key = ArtifactKey {
            run_id: run_id.to_string(),
            artifact_id: artifact_id.to_string(),
        };
        self.entries
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                PipelineError::Other(anyhow::anyhow!(
                    "artifact `{artifact_id}` not found for run `{run_id}`"
                ))
            })
    }

    fn contains(&self, run_id: &str, artifact_id: &str) -> bool {
        let key = ArtifactKey {
            run_id: run_id.to_string(),
            artifact_id: artifact_id.to_string(),
        };
        self.entries.lock().contains_key(&key)
    }
}

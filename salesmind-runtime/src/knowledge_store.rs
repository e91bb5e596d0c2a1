use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

use salesmind_core::records::{CallRecord, KnowledgeEntry, NewCallRecord, NewKnowledgeEntry};
use salesmind_engine::traits::{KnowledgeStore, PersistenceWriteError};

use crate::files::{ensure_dir, read_json, write_json_atomic};

pub const KNOWLEDGE_COLLECTION: &str = "salesmind_knowledge";
pub const CALLS_COLLECTION: &str = "salesmind_calls";

/// Where named collections are kept between runs. Each collection is a JSON array.
pub trait StorageBackend: Send + Sync {
    fn load(&self, collection: &str) -> anyhow::Result<Option<String>>;
    fn save(&self, collection: &str, json: &str) -> anyhow::Result<()>;
}

/// One `<collection>.json` file per collection under `dir`.
#[derive(Debug, Clone)]
pub struct JsonDirStorage {
    dir: PathBuf,
}

impl JsonDirStorage {
    pub fn at_dir(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }
}

impl StorageBackend for JsonDirStorage {
    fn load(&self, collection: &str) -> anyhow::Result<Option<String>> {
        let path = self.collection_path(collection);
        let value: Option<serde_json::Value> = read_json(&path)?;
        value
            .map(|v| serde_json::to_string(&v).context("encode JSON"))
            .transpose()
    }

    fn save(&self, collection: &str, json: &str) -> anyhow::Result<()> {
        let value: serde_json::Value = serde_json::from_str(json).context("decode JSON")?;
        write_json_atomic(&self.collection_path(collection), &value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail, like a full disk.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self, collection: &str) -> Option<String> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .cloned()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self, collection: &str) -> anyhow::Result<Option<String>> {
        Ok(self.raw(collection))
    }

    fn save(&self, collection: &str, json: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("storage quota exceeded");
        }
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string(), json.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Collections {
    knowledge: Vec<KnowledgeEntry>,
    calls: Vec<CallRecord>,
}

/// Knowledge entries and call records, newest first.
///
/// The in-memory lists are authoritative for the life of the process. Every write
/// prepends, then persists the whole collection; if that fails the record is kept in
/// memory and the error is returned.
#[derive(Debug)]
pub struct LocalKnowledgeStore<S: StorageBackend> {
    backend: S,
    state: Mutex<Collections>,
}

impl<S: StorageBackend> LocalKnowledgeStore<S> {
    pub fn open(backend: S) -> anyhow::Result<Self> {
        let knowledge = load_collection(&backend, KNOWLEDGE_COLLECTION)?;
        let calls = load_collection(&backend, CALLS_COLLECTION)?;
        log::info!(
            "knowledge store opened: {} entries, {} calls",
            knowledge.len(),
            calls.len()
        );
        Ok(Self {
            backend,
            state: Mutex::new(Collections { knowledge, calls }),
        })
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist<T: Serialize>(
        &self,
        collection: &'static str,
        items: &[T],
    ) -> Result<(), PersistenceWriteError> {
        let result = serde_json::to_string(items)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.backend.save(collection, &json));
        result.map_err(|e| {
            log::warn!("failed to persist {collection}: {e:#}");
            PersistenceWriteError {
                collection,
                message: format!("{e:#}"),
            }
        })
    }
}

impl LocalKnowledgeStore<JsonDirStorage> {
    pub fn open_dir(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let storage = JsonDirStorage::at_dir(dir)?;
        let display = storage.dir().display().to_string();
        Self::open(storage).with_context(|| format!("open knowledge store: {display}"))
    }
}

impl LocalKnowledgeStore<MemoryStorage> {
    pub fn in_memory() -> Self {
        Self {
            backend: MemoryStorage::new(),
            state: Mutex::new(Collections::default()),
        }
    }
}

impl<S: StorageBackend> KnowledgeStore for LocalKnowledgeStore<S> {
    fn add_knowledge(
        &self,
        entry: NewKnowledgeEntry,
    ) -> Result<KnowledgeEntry, PersistenceWriteError> {
        let entry = KnowledgeEntry::assign(entry);
        // Held through the write so concurrent adds persist in order.
        let mut state = self.lock();
        state.knowledge.insert(0, entry.clone());
        self.persist(KNOWLEDGE_COLLECTION, &state.knowledge)?;
        Ok(entry)
    }

    fn add_call(&self, call: NewCallRecord) -> Result<CallRecord, PersistenceWriteError> {
        let call = CallRecord::assign(call);
        let mut state = self.lock();
        state.calls.insert(0, call.clone());
        self.persist(CALLS_COLLECTION, &state.calls)?;
        Ok(call)
    }

    fn knowledge(&self) -> Vec<KnowledgeEntry> {
        self.lock().knowledge.clone()
    }

    fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }
}

fn load_collection<S: StorageBackend, T: DeserializeOwned>(
    backend: &S,
    collection: &str,
) -> anyhow::Result<Vec<T>> {
    let Some(json) = backend.load(collection)? else {
        return Ok(Vec::new());
    };
    serde_json::from_str(&json).with_context(|| format!("failed to parse collection {collection}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesmind_core::records::{CallOutcome, KnowledgeSource};
    use salesmind_core::types::ScriptKey;

    fn call(outcome: CallOutcome) -> NewCallRecord {
        NewCallRecord {
            lead_name: "Sarah Chen".into(),
            lead_company: "MedTech Solutions".into(),
            agent_name: "Agent Alpha".into(),
            duration_seconds: 95,
            outcome,
            script_key: ScriptKey::new("call1"),
        }
    }

    fn hipaa() -> NewKnowledgeEntry {
        NewKnowledgeEntry {
            topic: "HIPAA Compliance".into(),
            response: "We are HIPAA compliant and sign BAAs.".into(),
            question: Some("Are you HIPAA compliant?".into()),
            source: KnowledgeSource::CallEscalation,
        }
    }

    #[test]
    fn newest_record_comes_first() {
        let store = LocalKnowledgeStore::in_memory();
        store.add_call(call(CallOutcome::Escalated)).unwrap();
        store.add_call(call(CallOutcome::Success)).unwrap();

        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].outcome, CallOutcome::Success);
        assert_eq!(calls[1].outcome, CallOutcome::Escalated);
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[test]
    fn collections_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalKnowledgeStore::open_dir(dir.path()).unwrap();
            store.add_knowledge(hipaa()).unwrap();
            store.add_call(call(CallOutcome::Escalated)).unwrap();
        }

        assert!(dir.path().join("salesmind_knowledge.json").exists());
        assert!(dir.path().join("salesmind_calls.json").exists());

        let store = LocalKnowledgeStore::open_dir(dir.path()).unwrap();
        let knowledge = store.knowledge();
        assert_eq!(knowledge.len(), 1);
        assert_eq!(knowledge[0].topic, "HIPAA Compliance");
        assert_eq!(knowledge[0].source, KnowledgeSource::CallEscalation);
        assert_eq!(store.calls()[0].outcome, CallOutcome::Escalated);
    }

    #[test]
    fn stored_json_uses_wire_names() {
        let store = LocalKnowledgeStore::open(MemoryStorage::new()).unwrap();
        store.add_knowledge(hipaa()).unwrap();

        let raw = store.backend().raw(KNOWLEDGE_COLLECTION).unwrap();
        assert!(raw.contains("\"call-escalation\""));
        assert!(raw.trim_start().starts_with('['));
    }

    #[test]
    fn failed_write_keeps_record_in_memory() {
        let store = LocalKnowledgeStore::open(MemoryStorage::new()).unwrap();
        store.backend().fail_writes(true);

        let err = store.add_call(call(CallOutcome::Ended)).unwrap_err();
        assert_eq!(err.collection, CALLS_COLLECTION);
        assert!(err.message.contains("quota"));
        assert_eq!(store.calls().len(), 1);
        assert!(store.backend().raw(CALLS_COLLECTION).is_none());

        store.backend().fail_writes(false);
        store.add_call(call(CallOutcome::Success)).unwrap();
        let raw = store.backend().raw(CALLS_COLLECTION).unwrap();
        let persisted: Vec<CallRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.len(), 2);
    }

    #[test]
    fn corrupt_collection_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("salesmind_calls.json"), "not json").unwrap();
        assert!(LocalKnowledgeStore::open_dir(dir.path()).is_err());
    }
}

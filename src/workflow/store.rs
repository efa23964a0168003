// PromptChain — Workflow persistence (key-value backends + typed workflow store)

use super::Workflow;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Key under which the whole workflow mapping is stored.
pub const WORKFLOWS_KEY: &str = "workflows";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contents are not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Key-value backends
// ---------------------------------------------------------------------------

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Process-local store, used by tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// A single JSON object on disk holding every key.
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write of the file
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_object(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(obj) => Ok(obj),
            _ => Err(StoreError::Backend(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_object().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut obj = self.read_object().await?;
        obj.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file then rename
        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&Value::Object(obj))?;
        tokio::fs::write(&tmp_path, &content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Workflow store
// ---------------------------------------------------------------------------

/// Typed access to the workflow mapping.
///
/// Backend failures are logged and reported as `false` / empty results; the
/// cause never reaches the caller.
#[derive(Clone)]
pub struct WorkflowStore {
    kv: Arc<dyn KeyValueStore>,
}

impl WorkflowStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Workflow>, StoreError> {
        match self.kv.get(WORKFLOWS_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn write_all(&self, workflows: &BTreeMap<String, Workflow>) -> Result<(), StoreError> {
        let value = serde_json::to_value(workflows)?;
        self.kv.set(WORKFLOWS_KEY, value).await
    }

    /// Insert or replace by id.
    pub async fn save(&self, workflow: &Workflow) -> bool {
        let result = async {
            let mut all = self.read_all().await?;
            all.insert(workflow.id.clone(), workflow.clone());
            self.write_all(&all).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(workflow = %workflow.id, nodes = workflow.nodes.len(), "Workflow saved");
                true
            }
            Err(e) => {
                tracing::error!(workflow = %workflow.id, "Error saving workflow: {}", e);
                false
            }
        }
    }

    pub async fn load_all(&self) -> Vec<Workflow> {
        match self.read_all().await {
            Ok(all) => all.into_values().collect(),
            Err(e) => {
                tracing::error!("Error loading workflows: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<Workflow> {
        match self.read_all().await {
            Ok(mut all) => all.remove(id),
            Err(e) => {
                tracing::error!(workflow = %id, "Error loading workflow: {}", e);
                None
            }
        }
    }

    /// Remove by id. Deleting an id that is not stored still succeeds.
    pub async fn delete(&self, id: &str) -> bool {
        let result = async {
            let mut all = self.read_all().await?;
            all.remove(id);
            self.write_all(&all).await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(workflow = %id, "Error deleting workflow: {}", e);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

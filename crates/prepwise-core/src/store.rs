//! Document storage: a minimal collection/document API plus file and memory backends.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::config::{Config, StoreBackend};
use crate::error::{PrepwiseError, Result};
use crate::firestore::FirestoreDocumentStore;
use crate::types::{FeedbackRecord, InterviewRecord};

pub const INTERVIEWS: &str = "interviews";
pub const FEEDBACK: &str = "feedback";

/// A collection-oriented document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document and return its generated id.
    async fn add(&self, collection: &str, data: serde_json::Value) -> Result<String>;

    /// Create or overwrite the document with the given id.
    async fn set(&self, collection: &str, id: &str, data: serde_json::Value) -> Result<()>;

    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<serde_json::Value>>;
}

/// Build the store selected by `store.backend`.
pub fn open_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    match config.store_backend() {
        StoreBackend::Jsonl => Ok(Arc::new(JsonlDocumentStore::new(config.store_dir()))),
        StoreBackend::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
        StoreBackend::Firestore => {
            let firestore = config
                .store
                .as_ref()
                .and_then(|s| s.firestore.as_ref())
                .ok_or_else(|| PrepwiseError::Config("store.firestore section is missing".into()))?;
            Ok(Arc::new(FirestoreDocumentStore::from_config(firestore)?))
        }
    }
}

pub async fn save_interview(store: &dyn DocumentStore, record: &InterviewRecord) -> Result<String> {
    store.add(INTERVIEWS, serde_json::to_value(record)?).await
}

pub async fn load_interview(store: &dyn DocumentStore, id: &str) -> Result<Option<InterviewRecord>> {
    match store.get(INTERVIEWS, id).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Persist feedback, overwriting `id` when given.
pub async fn save_feedback(
    store: &dyn DocumentStore,
    id: Option<&str>,
    record: &FeedbackRecord,
) -> Result<String> {
    let data = serde_json::to_value(record)?;
    match id {
        Some(id) => {
            store.set(FEEDBACK, id, data).await?;
            Ok(id.to_string())
        }
        None => store.add(FEEDBACK, data).await,
    }
}

fn check_collection(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PrepwiseError::Store(format!("invalid collection name: {name:?}")))
    }
}

/// One line of a collection file.
#[derive(Debug, Serialize, Deserialize)]
struct DocumentLine {
    id: String,
    data: serde_json::Value,
}

/// File-based store using one JSONL file per collection.
///
/// Layout: `<base>/<collection>.jsonl`, one `{"id", "data"}` object per line.
pub struct JsonlDocumentStore {
    base: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlDocumentStore {
    pub fn new(base: PathBuf) -> Self {
        Self {
            base,
            write_lock: Mutex::new(()),
        }
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base.join(format!("{collection}.jsonl"))
    }

    async fn load_lines(&self, collection: &str) -> Result<Vec<DocumentLine>> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut lines = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let doc: DocumentLine = serde_json::from_str(line).map_err(|e| {
                PrepwiseError::Store(format!("corrupt line in {collection}: {e}"))
            })?;
            lines.push(doc);
        }
        Ok(lines)
    }

    async fn append_line(&self, collection: &str, doc: &DocumentLine) -> Result<()> {
        tokio::fs::create_dir_all(&self.base).await?;
        let line = serde_json::to_string(doc)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.collection_path(collection))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonlDocumentStore {
    async fn add(&self, collection: &str, data: serde_json::Value) -> Result<String> {
        check_collection(collection)?;
        let id = Uuid::new_v4().simple().to_string();
        let _guard = self.write_lock.lock().await;
        self.append_line(collection, &DocumentLine { id: id.clone(), data })
            .await?;
        debug!(collection, id = %id, "Added document");
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: serde_json::Value) -> Result<()> {
        check_collection(collection)?;
        let _guard = self.write_lock.lock().await;
        let mut lines = self.load_lines(collection).await?;
        lines.retain(|l| l.id != id);
        lines.push(DocumentLine {
            id: id.to_string(),
            data,
        });

        tokio::fs::create_dir_all(&self.base).await?;
        let mut out = String::new();
        for line in &lines {
            out.push_str(&serde_json::to_string(line)?);
            out.push('\n');
        }
        // Atomic write: write to temp then rename
        let path = self.collection_path(collection);
        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, out.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(collection, id, "Set document");
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<serde_json::Value>> {
        check_collection(collection)?;
        let lines = self.load_lines(collection).await?;
        Ok(lines.into_iter().rev().find(|l| l.id == id).map(|l| l.data))
    }
}

/// In-memory store; contents are lost on drop.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn add(&self, collection: &str, data: serde_json::Value) -> Result<String> {
        check_collection(collection)?;
        let id = Uuid::new_v4().simple().to_string();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: serde_json::Value) -> Result<()> {
        check_collection(collection)?;
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<serde_json::Value>> {
        check_collection(collection)?;
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }
}

//! In-memory storage backend implementation

use super::Storage;
use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    /// Create new in-memory storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Copy of a stored document
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.documents.read().get(key).cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, keys: &[String]) -> Result<HashMap<String, Value>> {
        let documents = self.documents.read();
        Ok(keys
            .iter()
            .filter_map(|key| documents.get(key).map(|doc| (key.clone(), doc.clone())))
            .collect())
    }

    async fn write(&self, changes: HashMap<String, Value>) -> Result<()> {
        self.documents.write().extend(changes);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        let mut documents = self.documents.write();
        for key in keys {
            documents.remove(key);
        }
        Ok(())
    }
}

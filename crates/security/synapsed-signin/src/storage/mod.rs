//! Turn-scoped, user-partitioned state
//!
//! Provides:
//! - The [`Storage`] contract a host backs with its own engine
//! - [`MemoryStorage`] for tests and single-process deployments
//! - [`TurnState`], the per-turn view of the sender's property bag

use crate::activity::Activity;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

mod memory;

pub use memory::MemoryStorage;

/// Keyed document storage
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the given keys; missing keys are absent from the result
    async fn read(&self, keys: &[String]) -> Result<HashMap<String, Value>>;

    /// Upsert documents
    async fn write(&self, changes: HashMap<String, Value>) -> Result<()>;

    /// Delete documents; unknown keys are ignored
    async fn delete(&self, keys: &[String]) -> Result<()>;
}

/// Storage key of the user-scoped bag for an activity's sender
pub fn user_state_key(activity: &Activity) -> Result<String> {
    if activity.channel_id.is_empty() {
        return Err(Error::InvalidActivity("missing channel id".into()));
    }
    if activity.from.id.is_empty() {
        return Err(Error::InvalidActivity("missing sender id".into()));
    }
    Ok(format!("{}/users/{}", activity.channel_id, activity.from.id))
}

/// User-scoped properties loaded for one turn
pub struct TurnState {
    storage: Arc<dyn Storage>,
    key: String,
    properties: Map<String, Value>,
    dirty: bool,
}

impl TurnState {
    /// Load the sender's bag for this activity
    pub async fn load(storage: Arc<dyn Storage>, activity: &Activity) -> Result<Self> {
        let key = user_state_key(activity)?;
        let mut docs = storage.read(std::slice::from_ref(&key)).await?;
        let properties = match docs.remove(&key) {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(Error::storage(format!(
                    "user state under '{key}' is not an object: {other}"
                )))
            }
            None => Map::new(),
        };
        trace!(key = %key, properties = properties.len(), "Loaded user state");

        Ok(Self {
            storage,
            key,
            properties,
            dirty: false,
        })
    }

    /// Storage key this state persists under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read a typed property
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.properties
            .get(name)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(Error::from)
    }

    /// Set a typed property
    pub fn set<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        self.properties
            .insert(name.to_string(), serde_json::to_value(value)?);
        self.dirty = true;
        Ok(())
    }

    /// Remove a property
    pub fn delete(&mut self, name: &str) {
        if self.properties.remove(name).is_some() {
            self.dirty = true;
        }
    }

    /// Whether a property is present
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Whether there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist pending changes; an empty bag removes the record
    pub async fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.properties.is_empty() {
            self.storage.delete(std::slice::from_ref(&self.key)).await?;
        } else {
            let mut changes = HashMap::with_capacity(1);
            changes.insert(self.key.clone(), Value::Object(self.properties.clone()));
            self.storage.write(changes).await?;
        }
        self.dirty = false;
        trace!(key = %self.key, "Saved user state");
        Ok(())
    }
}

impl std::fmt::Debug for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnState")
            .field("key", &self.key)
            .field("properties", &self.properties)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(user: &str) -> Activity {
        Activity::message("web", user, "c1", "hi")
    }

    #[tokio::test]
    async fn test_state_is_partitioned_by_user() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());

        let mut alice = TurnState::load(storage.clone(), &activity("alice")).await.unwrap();
        alice.set("active-flow", &"graph").unwrap();
        alice.save().await.unwrap();

        let bob = TurnState::load(storage.clone(), &activity("bob")).await.unwrap();
        assert_eq!(bob.get::<String>("active-flow").unwrap(), None);

        let alice = TurnState::load(storage, &activity("alice")).await.unwrap();
        assert_eq!(alice.key(), "web/users/alice");
        assert_eq!(
            alice.get::<String>("active-flow").unwrap().as_deref(),
            Some("graph")
        );
    }

    #[tokio::test]
    async fn test_empty_bag_is_deleted() {
        let memory = Arc::new(MemoryStorage::new());
        let storage: Arc<dyn Storage> = memory.clone();

        let mut state = TurnState::load(storage.clone(), &activity("u1")).await.unwrap();
        state.set("x", &1).unwrap();
        state.save().await.unwrap();
        assert_eq!(memory.len(), 1);

        state.delete("x");
        assert!(state.is_dirty());
        state.save().await.unwrap();
        assert!(memory.is_empty());
    }

    #[test]
    fn test_key_requires_identity() {
        let mut anonymous = activity("");
        assert!(matches!(
            user_state_key(&anonymous),
            Err(Error::InvalidActivity(_))
        ));
        anonymous.from.id = "u1".into();
        anonymous.channel_id.clear();
        assert!(user_state_key(&anonymous).is_err());
    }
}

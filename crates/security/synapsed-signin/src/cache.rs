//! Token cache owned by the orchestrator
//!
//! Entries are keyed by user and handler so one orchestrator instance can
//! serve many users without handing one user's token to another.

use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: String,
    handler: String,
}

impl CacheKey {
    fn new(user_id: &str, handler: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            handler: handler.to_string(),
        }
    }
}

/// Acquired tokens by `(user, handler)`
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: RwLock<HashMap<CacheKey, String>>,
}

impl TokenCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token for a user and handler
    pub fn get(&self, user_id: &str, handler: &str) -> Option<String> {
        self.entries
            .read()
            .get(&CacheKey::new(user_id, handler))
            .cloned()
    }

    /// Store a token, replacing any previous one
    pub fn insert(&self, user_id: &str, handler: &str, token: impl Into<String>) {
        self.entries
            .write()
            .insert(CacheKey::new(user_id, handler), token.into());
    }

    /// Drop a token; returns whether one was cached
    pub fn remove(&self, user_id: &str, handler: &str) -> bool {
        self.entries
            .write()
            .remove(&CacheKey::new(user_id, handler))
            .is_some()
    }

    /// Number of cached tokens across all users
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

//! # Persistence seam for limit definitions.
//!
//! [`LimitStore`] is the contract the registry needs from whatever persists
//! definitions (a relational table, a KV store, a file). [`MemoryStore`] keeps
//! them in process and is what the [`Limiter`](crate::Limiter) uses unless
//! another store is supplied.
//!
//! ## Contract
//! - `insert` fails with `AlreadyExists` when the tag is taken.
//! - `list` returns definitions ordered by tag ascending.
//! - Backend failures map to [`LimitError::Store`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::LimitError;
use crate::registry::LimitDefinition;

/// Storage backend for limit definitions.
#[async_trait]
pub trait LimitStore: Send + Sync + 'static {
    /// Inserts a new definition; `AlreadyExists` if its tag is present.
    async fn insert(&self, def: LimitDefinition) -> Result<(), LimitError>;

    /// Definition for `tag`, if any.
    async fn get(&self, tag: &str) -> Result<Option<LimitDefinition>, LimitError>;

    /// Definition with the given id, if any.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<LimitDefinition>, LimitError>;

    /// Replaces the definition stored under `def.tag`; returns `false` if absent.
    async fn update(&self, def: LimitDefinition) -> Result<bool, LimitError>;

    /// Removes and returns the definition for `tag`.
    async fn remove(&self, tag: &str) -> Result<Option<LimitDefinition>, LimitError>;

    /// A page of definitions ordered by tag ascending.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<LimitDefinition>, LimitError>;
}

/// In-process store ordered by tag.
#[derive(Default)]
pub struct MemoryStore {
    defs: RwLock<BTreeMap<String, LimitDefinition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LimitStore for MemoryStore {
    async fn insert(&self, def: LimitDefinition) -> Result<(), LimitError> {
        let mut defs = self.defs.write().await;
        if defs.contains_key(&def.tag) {
            return Err(LimitError::AlreadyExists { tag: def.tag });
        }
        defs.insert(def.tag.clone(), def);
        Ok(())
    }

    async fn get(&self, tag: &str) -> Result<Option<LimitDefinition>, LimitError> {
        Ok(self.defs.read().await.get(tag).cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<LimitDefinition>, LimitError> {
        Ok(self
            .defs
            .read()
            .await
            .values()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn update(&self, def: LimitDefinition) -> Result<bool, LimitError> {
        let mut defs = self.defs.write().await;
        match defs.get_mut(&def.tag) {
            Some(slot) => {
                *slot = def;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, tag: &str) -> Result<Option<LimitDefinition>, LimitError> {
        Ok(self.defs.write().await.remove(tag))
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<LimitDefinition>, LimitError> {
        Ok(self
            .defs
            .read()
            .await
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn def(tag: &str) -> LimitDefinition {
        LimitDefinition::new(tag, 1, None, Utc::now())
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = MemoryStore::new();
        store.insert(def("a")).await.unwrap();
        let err = store.insert(def("a")).await.unwrap_err();
        assert_eq!(err, LimitError::AlreadyExists { tag: "a".into() });
    }

    #[tokio::test]
    async fn list_is_ordered_and_paged() {
        let store = MemoryStore::new();
        for tag in ["c", "a", "d", "b"] {
            store.insert(def(tag)).await.unwrap();
        }
        let page: Vec<String> = store
            .list(1, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.tag)
            .collect();
        assert_eq!(page, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn lookup_by_id() {
        let store = MemoryStore::new();
        let d = def("a");
        let id = d.id;
        store.insert(d).await.unwrap();
        assert_eq!(store.get_by_id(id).await.unwrap().unwrap().tag, "a");
        assert!(store.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }
}

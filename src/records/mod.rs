//! Media record lookup.
//!
//! Maps an opaque identifier to the upstream URL and display filename. The
//! proxy never chooses URLs itself; it only fetches what a record names.
//!
//! # Design Decisions
//! - Lookup sits behind a trait so a database-backed store can replace the
//!   in-memory one without touching the handler
//! - The shipped store is seeded from config and shared via `Arc`

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::schema::RecordConfig;

/// Upstream location and display name for one piece of media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub url: String,
    /// Display filename; may be empty.
    #[serde(default)]
    pub filename: String,
}

impl From<&RecordConfig> for MediaRecord {
    fn from(config: &RecordConfig) -> Self {
        Self {
            id: config.id.clone(),
            url: config.url.clone(),
            filename: config.filename.clone(),
        }
    }
}

pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// `None` when no record exists for `id`.
    fn lookup<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Option<MediaRecord>>;
}

/// Concurrent in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    inner: Arc<DashMap<String, MediaRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(records: &[RecordConfig]) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(MediaRecord::from(record));
        }
        tracing::info!(records = store.len(), "Media records loaded");
        store
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: MediaRecord) {
        self.inner.insert(record.id.clone(), record);
    }

    pub fn remove(&self, id: &str) -> Option<MediaRecord> {
        self.inner.remove(id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn lookup<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Option<MediaRecord>> {
        let found = self.inner.get(id).map(|entry| entry.value().clone());
        Box::pin(async move { found })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, url: &str) -> RecordConfig {
        RecordConfig {
            id: id.to_string(),
            url: url.to_string(),
            filename: format!("{id}.jpg"),
        }
    }

    #[tokio::test]
    async fn seeded_from_config() {
        let store = InMemoryRecordStore::from_config(&[
            record("a", "https://cdn.example/a.jpg"),
            record("b", "https://cdn.example/b.jpg"),
        ]);
        assert_eq!(store.len(), 2);

        let found = store.lookup("b").await.unwrap();
        assert_eq!(found.url, "https://cdn.example/b.jpg");
        assert_eq!(found.filename, "b.jpg");
        assert!(store.lookup("missing").await.is_none());
    }

    #[tokio::test]
    async fn insert_replaces_and_remove_deletes() {
        let store = InMemoryRecordStore::new();
        store.insert(MediaRecord {
            id: "x".into(),
            url: "https://cdn.example/old.png".into(),
            filename: String::new(),
        });
        store.insert(MediaRecord {
            id: "x".into(),
            url: "https://cdn.example/new.png".into(),
            filename: String::new(),
        });
        assert_eq!(store.lookup("x").await.unwrap().url, "https://cdn.example/new.png");

        assert!(store.remove("x").is_some());
        assert!(store.is_empty());
    }
}

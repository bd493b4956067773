// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store.
//!
//! Used for local development and tests. Each document lives in its own
//! `DashMap` entry, so per-document operations are atomic under the shard lock.

use crate::db::{
    apply_ops, Change, ChangeFeed, Document, DocumentStore, FieldOp, Query, UpdateOutcome,
    UpsertOutcome, ID_FIELD,
};
use crate::error::AppError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::broadcast;

type DocKey = (String, String);

/// In-memory [`DocumentStore`].
#[derive(Default)]
pub struct MemoryStore {
    docs: DashMap<DocKey, Document>,
    feed: ChangeFeed,
    /// Remaining writes to fail with a transient error (fault injection).
    failing_writes: AtomicU32,
    /// Same, limited to one collection.
    failing_collections: DashMap<String, u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` write operations fail with [`AppError::TransientStore`].
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes to `collection` fail with
    /// [`AppError::TransientStore`]. Writes elsewhere are unaffected.
    pub fn fail_next_writes_to(&self, collection: &str, n: u32) {
        self.failing_collections.insert(collection.to_string(), n);
    }

    /// Number of stored documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.docs.iter().filter(|e| e.key().0 == collection).count()
    }

    fn check_write(&self, collection: &str) -> Result<(), AppError> {
        let mut injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if let Some(mut remaining) = self.failing_collections.get_mut(collection) {
            if *remaining > 0 {
                *remaining -= 1;
                injected = true;
            }
        }
        if injected {
            return Err(AppError::TransientStore("injected write failure".to_string()));
        }
        Ok(())
    }
}

fn key(collection: &str, id: &str) -> DocKey {
    (collection.to_string(), id.to_string())
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        Ok(self.docs.get(&key(collection, id)).map(|d| d.value().clone()))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        mut fields: Document,
        merge: bool,
    ) -> Result<(), AppError> {
        self.check_write(collection)?;
        fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let mut entry = self.docs.entry(key(collection, id)).or_default();
        if merge {
            entry.extend(fields);
        } else {
            *entry = fields;
        }
        self.feed.publish(collection, id, Some(entry.value().clone()));
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        ops: &[FieldOp],
    ) -> Result<UpdateOutcome, AppError> {
        self.check_write(collection)?;

        let Some(mut doc) = self.docs.get_mut(&key(collection, id)) else {
            return Ok(UpdateOutcome::NotFound);
        };
        let mut next = doc.value().clone();
        if apply_ops(&mut next, ops).is_err() {
            return Ok(UpdateOutcome::PreconditionFailed);
        }
        *doc = next;
        self.feed.publish(collection, id, Some(doc.value().clone()));
        Ok(UpdateOutcome::Applied)
    }

    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        ops: &[FieldOp],
    ) -> Result<UpsertOutcome, AppError> {
        self.check_write(collection)?;

        // A rejected upsert of a missing document never becomes visible
        match self.docs.entry(key(collection, id)) {
            Entry::Occupied(mut entry) => {
                let mut next = entry.get().clone();
                if apply_ops(&mut next, ops).is_err() {
                    return Ok(UpsertOutcome::PreconditionFailed);
                }
                next.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
                entry.insert(next);
                self.feed.publish(collection, id, Some(entry.get().clone()));
                Ok(UpsertOutcome::Updated)
            }
            Entry::Vacant(entry) => {
                let mut next = Document::new();
                if apply_ops(&mut next, ops).is_err() {
                    return Ok(UpsertOutcome::PreconditionFailed);
                }
                next.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
                let doc = entry.insert(next);
                self.feed.publish(collection, id, Some(doc.value().clone()));
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.check_write(collection)?;

        // Publish under the entry lock to keep per-document ordering.
        if let Entry::Occupied(entry) = self.docs.entry(key(collection, id)) {
            entry.remove();
            self.feed.publish(collection, id, None);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<(String, Document)>, AppError> {
        let mut results: Vec<(String, Document)> = self
            .docs
            .iter()
            .filter(|e| e.key().0 == query.collection && query.matches(e.value()))
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(results)
    }

    fn changes(&self, collection: &str) -> broadcast::Receiver<Change> {
        self.feed.subscribe(collection)
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Change notifications and live subscriptions.
//!
//! Backends publish every committed write on a per-collection broadcast
//! channel while still holding the document's write lock, so changes to one
//! document are delivered in commit order. Subscriptions deliver an initial
//! snapshot followed by updates; a lagged receiver resyncs from the store.

use crate::db::{Document, DocumentStore, Query};
use crate::error::AppError;
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

const FEED_CAPACITY: usize = 256;

/// A committed write. `data` is `None` when the document was deleted.
#[derive(Debug, Clone)]
pub struct Change {
    pub collection: String,
    pub id: String,
    pub data: Option<Document>,
}

/// Per-collection broadcast hub.
#[derive(Default)]
pub struct ChangeFeed {
    senders: DashMap<String, broadcast::Sender<Change>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, collection: &str, id: &str, data: Option<Document>) {
        if let Some(tx) = self.senders.get(collection) {
            // No receivers is fine
            let _ = tx.send(Change {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
            });
        }
    }

    pub fn subscribe(&self, collection: &str) -> broadcast::Receiver<Change> {
        self.senders
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe()
    }
}

/// Boxed snapshot stream returned by subscriptions.
pub type SnapshotStream<T> = Pin<Box<dyn Stream<Item = Result<T, AppError>> + Send>>;

/// Subscribe to one document. Yields `None` once the document is gone.
pub fn watch_doc(
    store: Arc<dyn DocumentStore>,
    collection: &str,
    id: &str,
) -> SnapshotStream<Option<Document>> {
    let collection = collection.to_string();
    let id = id.to_string();

    Box::pin(async_stream::stream! {
        // Subscribe before the initial read so nothing falls in between.
        let mut changes = BroadcastStream::new(store.changes(&collection));
        yield store.get(&collection, &id).await;

        while let Some(change) = changes.next().await {
            match change {
                Ok(change) if change.id == id => yield Ok(change.data),
                Ok(_) => {}
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(%collection, %id, skipped, "Change feed lagged, resyncing document");
                    yield store.get(&collection, &id).await;
                }
            }
        }
    })
}

/// Subscribe to a query. Each item is the full current result set, ordered by
/// document id.
pub fn watch_query(
    store: Arc<dyn DocumentStore>,
    query: Query,
) -> SnapshotStream<Vec<(String, Document)>> {
    Box::pin(async_stream::stream! {
        let mut changes = BroadcastStream::new(store.changes(&query.collection));
        let mut current: BTreeMap<String, Document> = BTreeMap::new();

        match store.query(&query).await {
            Ok(docs) => {
                current = docs.into_iter().collect();
                yield Ok(snapshot(&current));
            }
            Err(e) => yield Err(e),
        }

        while let Some(change) = changes.next().await {
            match change {
                Ok(change) => {
                    let changed = match change.data {
                        Some(data) if query.matches(&data) => {
                            current.insert(change.id, data);
                            true
                        }
                        _ => current.remove(&change.id).is_some(),
                    };
                    if changed {
                        yield Ok(snapshot(&current));
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(collection = %query.collection, skipped, "Change feed lagged, resyncing query");
                    match store.query(&query).await {
                        Ok(docs) => {
                            current = docs.into_iter().collect();
                            yield Ok(snapshot(&current));
                        }
                        Err(e) => yield Err(e),
                    }
                }
            }
        }
    })
}

fn snapshot(current: &BTreeMap<String, Document>) -> Vec<(String, Document)> {
    current
        .iter()
        .map(|(id, doc)| (id.clone(), doc.clone()))
        .collect()
}

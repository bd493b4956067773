// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed [`DocumentStore`].
//!
//! Read-modify-write operations are serialized per document with an async
//! lock and committed in a Firestore transaction. Change notifications are
//! published from this process, so live subscriptions assume a single
//! service instance owns the writes.

use crate::db::{
    apply_ops, Change, ChangeFeed, Document, DocumentStore, FieldOp, FilterValue, Query,
    UpdateOutcome, UpsertOutcome, ID_FIELD,
};
use crate::error::AppError;
use dashmap::DashMap;
use firestore::errors::FirestoreError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};

/// Per-document write locks.
type DocLocks = DashMap<(String, String), Arc<Mutex<()>>>;

/// Held write lock on one document. Dropping the last holder removes the
/// lock from the map, so the map only holds documents being written.
struct DocGuard<'a> {
    locks: &'a DocLocks,
    key: (String, String),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // The map's own reference is the only one left when nobody holds or
        // waits on the lock; remove_if checks that under the shard lock.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

async fn lock_doc<'a>(locks: &'a DocLocks, collection: &str, id: &str) -> DocGuard<'a> {
    let key = (collection.to_string(), id.to_string());
    let lock = locks
        .entry(key.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    DocGuard {
        locks,
        key,
        guard: Some(lock.lock_owned().await),
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
    locks: Arc<DocLocks>,
    feed: Arc<ChangeFeed>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self::with_client(client))
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self::with_client(client))
    }

    fn with_client(client: firestore::FirestoreDb) -> Self {
        Self {
            client,
            locks: Arc::new(DashMap::new()),
            feed: Arc::new(ChangeFeed::new()),
        }
    }

    async fn read(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collection)
            .obj::<Document>()
            .one(id)
            .await
            .map_err(store_error)
    }

    /// Write a whole document inside a transaction.
    async fn commit(&self, collection: &str, id: &str, doc: &Document) -> Result<(), AppError> {
        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(store_error)?;

        self.client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(doc)
            .add_to_transaction(&mut transaction)
            .map_err(store_error)?;

        transaction.commit().await.map_err(store_error)?;
        Ok(())
    }
}

/// Classify a Firestore error into the engine's taxonomy.
fn store_error(e: FirestoreError) -> AppError {
    match &e {
        FirestoreError::NetworkError(_) => AppError::TransientStore(e.to_string()),
        FirestoreError::DatabaseError(db) if db.retry_possible => {
            AppError::TransientStore(e.to_string())
        }
        _ => AppError::Database(e.to_string()),
    }
}

#[async_trait::async_trait]
impl DocumentStore for FirestoreDb {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        self.read(collection, id).await
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        mut fields: Document,
        merge: bool,
    ) -> Result<(), AppError> {
        let _guard = lock_doc(&self.locks, collection, id).await;

        fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        let doc = if merge {
            let mut existing = self.read(collection, id).await?.unwrap_or_default();
            existing.extend(fields);
            existing
        } else {
            fields
        };

        self.commit(collection, id, &doc).await?;
        self.feed.publish(collection, id, Some(doc));
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        ops: &[FieldOp],
    ) -> Result<UpdateOutcome, AppError> {
        let _guard = lock_doc(&self.locks, collection, id).await;

        let Some(mut doc) = self.read(collection, id).await? else {
            return Ok(UpdateOutcome::NotFound);
        };
        if let Err(failed) = apply_ops(&mut doc, ops) {
            tracing::debug!(collection, id, reason = %failed.0, "Update precondition failed");
            return Ok(UpdateOutcome::PreconditionFailed);
        }

        self.commit(collection, id, &doc).await?;
        self.feed.publish(collection, id, Some(doc));
        Ok(UpdateOutcome::Applied)
    }

    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        ops: &[FieldOp],
    ) -> Result<UpsertOutcome, AppError> {
        let _guard = lock_doc(&self.locks, collection, id).await;

        let existing = self.read(collection, id).await?;
        let created = existing.is_none();
        let mut doc = existing.unwrap_or_default();
        if let Err(failed) = apply_ops(&mut doc, ops) {
            tracing::debug!(collection, id, reason = %failed.0, "Upsert precondition failed");
            return Ok(UpsertOutcome::PreconditionFailed);
        }
        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        self.commit(collection, id, &doc).await?;
        self.feed.publish(collection, id, Some(doc));
        Ok(if created {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        let _guard = lock_doc(&self.locks, collection, id).await;

        self.client
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(store_error)?;

        self.feed.publish(collection, id, None);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<(String, Document)>, AppError> {
        let select = self.client.fluent().select().from(query.collection.as_str());

        let docs: Vec<Document> = if query.filters.is_empty() {
            select.obj().query().await.map_err(store_error)?
        } else {
            let filters = query.filters.clone();
            select
                .filter(move |q| {
                    q.for_all(filters.iter().map(|(field, value)| match value {
                        FilterValue::Str(s) => q.field(field.as_str()).eq(s.clone()),
                        FilterValue::Bool(b) => q.field(field.as_str()).eq(*b),
                    }))
                })
                .obj()
                .query()
                .await
                .map_err(store_error)?
        };

        let mut results: Vec<(String, Document)> = docs
            .into_iter()
            .filter_map(|doc| {
                let id = doc.get(ID_FIELD)?.as_str()?.to_string();
                Some((id, doc))
            })
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(results)
    }

    fn changes(&self, collection: &str) -> broadcast::Receiver<Change> {
        self.feed.subscribe(collection)
    }
}

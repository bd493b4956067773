// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Document store layer.
//!
//! The engine talks to persistence only through [`DocumentStore`]: per-document
//! atomic read-modify-write expressed as [`FieldOp`] lists, plus a change feed
//! from which live subscriptions are built (see [`feed`]).

pub mod feed;
pub mod firestore;
pub mod memory;
pub mod rooms;

pub use feed::{Change, ChangeFeed};
pub use firestore::FirestoreDb;
pub use memory::MemoryStore;
pub use rooms::RoomDb;

use crate::error::AppError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

/// Collection names as constants.
pub mod collections {
    pub const ROOMS: &str = "rooms";
    /// Room members, keyed by `{room_id}_{uid}`
    pub const MEMBERS: &str = "room_members";
    /// User profile + lifetime totals (profile fields owned by the identity service)
    pub const USERS: &str = "users";
    /// Per-day totals, keyed by `{uid}_{YYYY-MM-DD}`
    pub const DAILY_LOGS: &str = "daily_logs";
}

/// Field every stored document carries with its own id.
pub const ID_FIELD: &str = "id";

/// A stored document: a flat JSON object.
pub type Document = serde_json::Map<String, Value>;

/// One step of an atomic document update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(String, Value),
    Remove(String),
    /// Additive delta; a missing field counts as 0.
    Increment(String, i64),
    /// Additive delta that rejects the whole update if the result would
    /// exceed the integer value of `cap_field`.
    IncrementCapped {
        field: String,
        by: i64,
        cap_field: String,
    },
    /// Subtract `by`, saturating at 0.
    DecrementFloor(String, i64),
    /// Precondition: field equals value.
    Expect(String, Value),
    /// Precondition: field is absent or differs from value.
    ExpectNot(String, Value),
}

impl FieldOp {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        FieldOp::Set(field.to_string(), value.into())
    }

    pub fn set_timestamp(field: &str, ts: DateTime<Utc>) -> Self {
        FieldOp::Set(field.to_string(), timestamp_value(ts))
    }

    pub fn remove(field: &str) -> Self {
        FieldOp::Remove(field.to_string())
    }

    pub fn increment(field: &str, by: i64) -> Self {
        FieldOp::Increment(field.to_string(), by)
    }

    pub fn expect(field: &str, value: impl Into<Value>) -> Self {
        FieldOp::Expect(field.to_string(), value.into())
    }

    pub fn expect_timestamp(field: &str, ts: DateTime<Utc>) -> Self {
        FieldOp::Expect(field.to_string(), timestamp_value(ts))
    }

    pub fn expect_not(field: &str, value: impl Into<Value>) -> Self {
        FieldOp::ExpectNot(field.to_string(), value.into())
    }
}

/// Canonical stored form of a timestamp. Preconditions compare against it,
/// so every timestamp that is later matched must be written through here.
pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// A precondition in an update did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionFailed(pub String);

/// Apply `ops` to `doc`. On error `doc` may be partially modified, so callers
/// apply to a scratch copy.
pub fn apply_ops(doc: &mut Document, ops: &[FieldOp]) -> Result<(), PreconditionFailed> {
    for op in ops {
        match op {
            FieldOp::Set(field, value) => {
                doc.insert(field.clone(), value.clone());
            }
            FieldOp::Remove(field) => {
                doc.remove(field);
            }
            FieldOp::Increment(field, by) => {
                let next = int_field(doc, field).saturating_add(*by);
                doc.insert(field.clone(), Value::from(next));
            }
            FieldOp::IncrementCapped {
                field,
                by,
                cap_field,
            } => {
                let next = int_field(doc, field).saturating_add(*by);
                let cap = int_field(doc, cap_field);
                if next > cap {
                    return Err(PreconditionFailed(format!(
                        "{} would exceed {} ({} > {})",
                        field, cap_field, next, cap
                    )));
                }
                doc.insert(field.clone(), Value::from(next));
            }
            FieldOp::DecrementFloor(field, by) => {
                let next = int_field(doc, field).saturating_sub(*by).max(0);
                doc.insert(field.clone(), Value::from(next));
            }
            FieldOp::Expect(field, value) => {
                if doc.get(field) != Some(value) {
                    return Err(PreconditionFailed(format!("{} != {}", field, value)));
                }
            }
            FieldOp::ExpectNot(field, value) => {
                if doc.get(field) == Some(value) {
                    return Err(PreconditionFailed(format!("{} == {}", field, value)));
                }
            }
        }
    }
    Ok(())
}

fn int_field(doc: &Document, field: &str) -> i64 {
    doc.get(field).and_then(Value::as_i64).unwrap_or(0)
}

/// Result of [`DocumentStore::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    NotFound,
    PreconditionFailed,
}

/// Result of [`DocumentStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    PreconditionFailed,
}

/// Equality filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Bool(bool),
}

impl FilterValue {
    fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (FilterValue::Str(s), Some(Value::String(v))) => s == v,
            (FilterValue::Bool(b), Some(Value::Bool(v))) => b == v,
            _ => false,
        }
    }
}

/// Collection query with equality filters (all must match).
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, FilterValue)>,
}

impl Query {
    pub fn all(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
        }
    }

    pub fn eq_str(mut self, field: &str, value: &str) -> Self {
        self.filters
            .push((field.to_string(), FilterValue::Str(value.to_string())));
        self
    }

    pub fn eq_bool(mut self, field: &str, value: bool) -> Self {
        self.filters
            .push((field.to_string(), FilterValue::Bool(value)));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| value.matches(doc.get(field)))
    }
}

/// Persistence collaborator.
///
/// Each call touches exactly one document (or reads one collection) and
/// either commits fully or not at all. Every committed write is published on
/// the backend's change feed.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError>;

    /// Write `fields`. With `merge`, fields not named are kept.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        merge: bool,
    ) -> Result<(), AppError>;

    /// Atomically apply `ops` to an existing document.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        ops: &[FieldOp],
    ) -> Result<UpdateOutcome, AppError>;

    /// Atomically apply `ops`, starting from an empty document if absent.
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        ops: &[FieldOp],
    ) -> Result<UpsertOutcome, AppError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError>;

    async fn query(&self, query: &Query) -> Result<Vec<(String, Document)>, AppError>;

    /// Change notifications for one collection.
    fn changes(&self, collection: &str) -> broadcast::Receiver<Change>;
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed operations over the document store.
//!
//! Provides high-level operations for:
//! - Rooms
//! - Members (flattened as `{room_id}_{uid}`)
//! - User totals and current-room back-references
//! - Daily logs (flattened as `{uid}_{date}`)

use crate::db::feed::{self, SnapshotStream};
use crate::db::{
    collections, Document, DocumentStore, FieldOp, Query, UpdateOutcome, UpsertOutcome,
};
use crate::error::AppError;
use crate::models::{DailyLog, Member, Profile, Room, UserTotals};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Document id of a member record.
pub fn member_doc_id(room_id: &str, uid: &str) -> String {
    format!(
        "{}_{}",
        urlencoding::encode(room_id),
        urlencoding::encode(uid)
    )
}

/// Document id of a daily log record.
pub fn daily_log_doc_id(uid: &str, date: &str) -> String {
    format!("{}_{}", urlencoding::encode(uid), date)
}

fn decode<T: DeserializeOwned>(collection: &str, id: &str, doc: Document) -> Result<T, AppError> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| {
        AppError::Database(format!("Malformed {} document {}: {}", collection, id, e))
    })
}

fn encode<T: Serialize>(value: &T) -> Result<Document, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(AppError::Internal(anyhow::anyhow!(
            "Document did not serialize to an object"
        ))),
        Err(e) => Err(AppError::Internal(e.into())),
    }
}

/// Typed repository over a [`DocumentStore`].
#[derive(Clone)]
pub struct RoomDb {
    store: Arc<dyn DocumentStore>,
}

impl RoomDb {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    // ─── Room Operations ─────────────────────────────────────────

    pub async fn get_room(&self, room_id: &str) -> Result<Option<Room>, AppError> {
        self.store
            .get(collections::ROOMS, room_id)
            .await?
            .map(|doc| decode(collections::ROOMS, room_id, doc))
            .transpose()
    }

    /// Create or replace a room document.
    pub async fn put_room(&self, room: &Room) -> Result<(), AppError> {
        self.store
            .set(collections::ROOMS, &room.id, encode(room)?, false)
            .await
    }

    pub async fn update_room(
        &self,
        room_id: &str,
        ops: &[FieldOp],
    ) -> Result<UpdateOutcome, AppError> {
        self.store.update(collections::ROOMS, room_id, ops).await
    }

    pub async fn delete_room(&self, room_id: &str) -> Result<(), AppError> {
        self.store.delete(collections::ROOMS, room_id).await
    }

    /// All rooms, newest first.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, AppError> {
        let docs = self.store.query(&Query::all(collections::ROOMS)).await?;
        decode_rooms(docs)
    }

    /// Live room list, newest first.
    pub fn watch_rooms(&self) -> SnapshotStream<Vec<Room>> {
        feed::watch_query(self.store.clone(), Query::all(collections::ROOMS))
            .map(|snapshot| snapshot.and_then(decode_rooms))
            .boxed()
    }

    /// Live room document; `None` once deleted.
    pub fn watch_room(&self, room_id: &str) -> SnapshotStream<Option<Room>> {
        let id = room_id.to_string();
        feed::watch_doc(self.store.clone(), collections::ROOMS, room_id)
            .map(move |snapshot| {
                snapshot?
                    .map(|doc| decode(collections::ROOMS, &id, doc))
                    .transpose()
            })
            .boxed()
    }

    // ─── Member Operations ───────────────────────────────────────

    pub async fn get_member(&self, room_id: &str, uid: &str) -> Result<Option<Member>, AppError> {
        let id = member_doc_id(room_id, uid);
        self.store
            .get(collections::MEMBERS, &id)
            .await?
            .map(|doc| decode(collections::MEMBERS, &id, doc))
            .transpose()
    }

    pub async fn update_member(
        &self,
        room_id: &str,
        uid: &str,
        ops: &[FieldOp],
    ) -> Result<UpdateOutcome, AppError> {
        self.store
            .update(collections::MEMBERS, &member_doc_id(room_id, uid), ops)
            .await
    }

    pub async fn upsert_member(
        &self,
        room_id: &str,
        uid: &str,
        ops: &[FieldOp],
    ) -> Result<UpsertOutcome, AppError> {
        self.store
            .upsert(collections::MEMBERS, &member_doc_id(room_id, uid), ops)
            .await
    }

    pub async fn delete_member(&self, room_id: &str, uid: &str) -> Result<(), AppError> {
        self.store
            .delete(collections::MEMBERS, &member_doc_id(room_id, uid))
            .await
    }

    /// Members currently in the room.
    pub async fn members_in_room(&self, room_id: &str) -> Result<Vec<Member>, AppError> {
        decode_members(self.store.query(&in_room_query(room_id)).await?)
    }

    /// Every member record of the room, including those who left.
    pub async fn all_members(&self, room_id: &str) -> Result<Vec<Member>, AppError> {
        let query = Query::all(collections::MEMBERS).eq_str("roomId", room_id);
        decode_members(self.store.query(&query).await?)
    }

    /// Live set of members currently in the room.
    pub fn watch_members(&self, room_id: &str) -> SnapshotStream<Vec<Member>> {
        feed::watch_query(self.store.clone(), in_room_query(room_id))
            .map(|snapshot| snapshot.and_then(decode_members))
            .boxed()
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user_totals(&self, uid: &str) -> Result<Option<UserTotals>, AppError> {
        self.store
            .get(collections::USERS, uid)
            .await?
            .map(|doc| decode(collections::USERS, uid, doc))
            .transpose()
    }

    /// Profile fields of the user document, as written by the profile service.
    ///
    /// A user document carrying only accounting fields has no profile yet.
    pub async fn get_profile(&self, uid: &str) -> Result<Option<Profile>, AppError> {
        self.store
            .get(collections::USERS, uid)
            .await?
            .filter(|doc| doc.contains_key("userName"))
            .map(|doc| decode(collections::USERS, uid, doc))
            .transpose()
    }

    pub async fn upsert_user(&self, uid: &str, ops: &[FieldOp]) -> Result<UpsertOutcome, AppError> {
        self.store.upsert(collections::USERS, uid, ops).await
    }

    pub async fn update_user(&self, uid: &str, ops: &[FieldOp]) -> Result<UpdateOutcome, AppError> {
        self.store.update(collections::USERS, uid, ops).await
    }

    // ─── Daily Log Operations ────────────────────────────────────

    /// Add `delta_secs` to the user's log for `date`.
    pub async fn add_daily_time(
        &self,
        uid: &str,
        date: &str,
        delta_secs: u64,
    ) -> Result<(), AppError> {
        let ops = [
            FieldOp::set("uid", uid),
            FieldOp::set("date", date),
            FieldOp::increment("totalTime", delta_secs as i64),
        ];
        self.store
            .upsert(collections::DAILY_LOGS, &daily_log_doc_id(uid, date), &ops)
            .await?;
        Ok(())
    }

    pub async fn daily_logs_for_user(&self, uid: &str) -> Result<Vec<DailyLog>, AppError> {
        let query = Query::all(collections::DAILY_LOGS).eq_str("uid", uid);
        self.store
            .query(&query)
            .await?
            .into_iter()
            .map(|(id, doc)| decode(collections::DAILY_LOGS, &id, doc))
            .collect()
    }
}

fn in_room_query(room_id: &str) -> Query {
    Query::all(collections::MEMBERS)
        .eq_str("roomId", room_id)
        .eq_bool("isInRoom", true)
}

fn decode_rooms(docs: Vec<(String, Document)>) -> Result<Vec<Room>, AppError> {
    let mut rooms = docs
        .into_iter()
        .map(|(id, doc)| decode::<Room>(collections::ROOMS, &id, doc))
        .collect::<Result<Vec<_>, _>>()?;
    rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(rooms)
}

fn decode_members(docs: Vec<(String, Document)>) -> Result<Vec<Member>, AppError> {
    let mut members = docs
        .into_iter()
        .map(|(id, doc)| decode::<Member>(collections::MEMBERS, &id, doc))
        .collect::<Result<Vec<_>, _>>()?;
    members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.uid.cmp(&b.uid)));
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_doc_id_escapes_separators() {
        assert_eq!(member_doc_id("room-1", "uid/2"), "room-1_uid%2F2");
        assert_eq!(daily_log_doc_id("u1", "2024-01-15"), "u1_2024-01-15");
    }
}

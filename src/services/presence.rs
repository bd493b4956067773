// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live room views.
//!
//! [`PresenceReducer`] folds room and member-set snapshots into a reconciled
//! [`RoomView`]; it does no I/O, so it can be driven by synthetic snapshot
//! sequences. [`watch_room`] drives it from the store's live subscriptions and
//! resolves display identities along the way. Nothing here writes.

use crate::db::feed::SnapshotStream;
use crate::db::RoomDb;
use crate::error::AppError;
use crate::models::{Member, MemberView, Profile, Room, RoomSummary, RoomView};
use crate::services::accountant::elapsed_secs;
use crate::services::profiles::ProfileDirectory;
use crate::time_utils::{format_utc_rfc3339, Clock};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

/// One snapshot from a room view's subscriptions.
#[derive(Debug, Clone)]
pub enum PresenceInput {
    /// Room document; `None` once it no longer exists.
    Room(Option<RoomSummary>),
    /// Members currently in the room, with their display identities.
    Members(Vec<(Member, Profile)>),
}

/// What observers of a room see.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    View(RoomView),
    /// Emitted exactly once; nothing follows it.
    Deleted,
}

/// Reconciles snapshots for one room.
#[derive(Debug, Default)]
pub struct PresenceReducer {
    room: Option<RoomSummary>,
    members: Option<Vec<(Member, Profile)>>,
    last: Option<RoomView>,
    deleted: bool,
}

impl PresenceReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Fold one snapshot. Returns an event when observers should be told
    /// something new.
    pub fn apply(&mut self, input: PresenceInput, now: DateTime<Utc>) -> Option<PresenceEvent> {
        if self.deleted {
            return None;
        }

        match input {
            PresenceInput::Room(None) => {
                self.deleted = true;
                self.room = None;
                self.members = None;
                return Some(PresenceEvent::Deleted);
            }
            PresenceInput::Room(Some(room)) => self.room = Some(room),
            PresenceInput::Members(members) => self.members = Some(members),
        }

        let (Some(room), Some(members)) = (&self.room, &self.members) else {
            // Wait until both subscriptions have delivered their first snapshot
            return None;
        };

        let view = RoomView {
            room: room.clone(),
            members: members
                .iter()
                .map(|(member, profile)| member_view(member, profile, now))
                .collect(),
        };
        if self.last.as_ref() == Some(&view) {
            return None;
        }
        self.last = Some(view.clone());
        Some(PresenceEvent::View(view))
    }
}

/// Join a member record with its display identity.
pub fn member_view(member: &Member, profile: &Profile, now: DateTime<Utc>) -> MemberView {
    let working_since = member.work_start_time.filter(|_| member.is_working);
    MemberView {
        uid: member.uid.clone(),
        display_name: profile.display_name.clone(),
        handle: profile.handle.clone(),
        photo_ref: profile.photo_ref.clone(),
        is_working: working_since.is_some(),
        work_item: member.work_item.clone(),
        work_start_time: working_since.map(format_utc_rfc3339),
        total_time: member.total_time,
        current_session_secs: working_since.map_or(0, |start| elapsed_secs(start, now)),
    }
}

/// Profile lookups for one view. Only real profiles are cached, so a failed
/// lookup is retried on the next snapshot.
struct ProfileCache {
    directory: Arc<dyn ProfileDirectory>,
    known: HashMap<String, Profile>,
}

impl ProfileCache {
    async fn resolve(&mut self, uid: &str) -> Profile {
        if let Some(profile) = self.known.get(uid) {
            return profile.clone();
        }
        match self.directory.get_profile(uid).await {
            Ok(Some(profile)) => {
                self.known.insert(uid.to_string(), profile.clone());
                profile
            }
            Ok(None) => Profile::placeholder(uid),
            Err(e) => {
                tracing::warn!(uid, error = %e, "Profile lookup failed, using placeholder");
                Profile::placeholder(uid)
            }
        }
    }

    async fn summary(&mut self, room: &Room) -> RoomSummary {
        let handle = self.resolve(&room.creator_id).await.handle;
        RoomSummary::from_room(room, handle)
    }
}

enum Update {
    Room(Result<Option<Room>, AppError>),
    Members(Result<Vec<Member>, AppError>),
}

/// Live view of one room. Ends after [`PresenceEvent::Deleted`]; dropping
/// the stream unsubscribes both feeds.
pub fn watch_room(
    db: RoomDb,
    profiles: Arc<dyn ProfileDirectory>,
    clock: Arc<dyn Clock>,
    room_id: &str,
) -> SnapshotStream<PresenceEvent> {
    let room_id = room_id.to_string();

    Box::pin(async_stream::stream! {
        let mut room_updates = db.watch_room(&room_id);
        let mut member_updates = db.watch_members(&room_id);
        let mut cache = ProfileCache { directory: profiles, known: HashMap::new() };
        let mut reducer = PresenceReducer::new();

        loop {
            let update = tokio::select! {
                Some(room) = room_updates.next() => Update::Room(room),
                Some(members) = member_updates.next() => Update::Members(members),
                else => break,
            };

            let input = match update {
                Update::Room(Ok(Some(room))) => PresenceInput::Room(Some(cache.summary(&room).await)),
                Update::Room(Ok(None)) => PresenceInput::Room(None),
                Update::Members(Ok(members)) => {
                    let mut resolved = Vec::with_capacity(members.len());
                    for member in members {
                        let profile = cache.resolve(&member.uid).await;
                        resolved.push((member, profile));
                    }
                    PresenceInput::Members(resolved)
                }
                Update::Room(Err(e)) | Update::Members(Err(e)) => {
                    tracing::warn!(room_id = %room_id, error = %e, "Room view subscription error");
                    yield Err::<PresenceEvent, AppError>(e);
                    continue;
                }
            };

            if let Some(event) = reducer.apply(input, clock.now()) {
                yield Ok(event);
            }
            if reducer.is_deleted() {
                tracing::debug!(room_id = %room_id, "Room deleted, closing view");
                break;
            }
        }
    })
}

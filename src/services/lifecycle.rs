// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room lifecycle: create, join, work/break, leave, delete.
//!
//! Every operation is a sequence of single-document atomic updates. Each
//! update carries preconditions pinning the state it was planned from, and
//! a failed precondition means "re-read and plan again", never "overwrite".
//! Counters only move through deltas, so retrying a step is safe.

use crate::config::Config;
use crate::db::feed::SnapshotStream;
use crate::db::{FieldOp, RoomDb, UpdateOutcome, UpsertOutcome};
use crate::error::AppError;
use crate::models::room::MAX_ROOM_CAPACITY;
use crate::models::{ActionOutcome, CreateRoomRequest, DailyLogSummary, Room, RoomSummary};
use crate::services::accountant::{summarize_daily_logs, SessionCommit};
use crate::services::member_state::{self, LeavePlan, MemberState, Transition};
use crate::services::presence::{self, PresenceEvent};
use crate::services::profiles::ProfileDirectory;
use crate::services::registry::{self, RoomRegistry};
use crate::services::retry::RetryPolicy;
use crate::time_utils::Clock;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

/// Re-plans allowed when a member's state changes under an operation.
const MAX_TRANSITION_ATTEMPTS: u32 = 5;

/// Sweeps over the remaining members during a delete cascade.
const MAX_CASCADE_PASSES: u32 = 5;

pub const DEFAULT_LOG_DAYS: u32 = 14;
pub const MAX_LOG_DAYS: u32 = 366;

/// Orchestrates multi-document room operations.
#[derive(Clone)]
pub struct RoomService {
    db: RoomDb,
    registry: RoomRegistry,
    profiles: Arc<dyn ProfileDirectory>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    default_max_members: u32,
}

impl RoomService {
    pub fn new(
        db: RoomDb,
        profiles: Arc<dyn ProfileDirectory>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            registry: RoomRegistry::new(db.clone()),
            db,
            profiles,
            clock,
            retry: RetryPolicy::from_config(config),
            default_max_members: config.default_max_members.clamp(1, MAX_ROOM_CAPACITY),
        }
    }

    pub fn db(&self) -> &RoomDb {
        &self.db
    }

    // ─── Rooms ───────────────────────────────────────────────────

    pub async fn create_room(
        &self,
        creator_uid: &str,
        request: CreateRoomRequest,
    ) -> Result<RoomSummary, AppError> {
        request
            .validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Room name must not be empty".to_string()));
        }

        let password_hash = if request.is_private {
            let password = request
                .password
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    AppError::BadRequest("Private rooms require a password".to_string())
                })?;
            Some(registry::hash_password(password)?)
        } else {
            None
        };

        let room = Room {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            is_private: request.is_private,
            password_hash,
            max_members: request.max_members.unwrap_or(self.default_max_members),
            now_members: 0,
            creator_id: creator_uid.to_string(),
            created_at: self.clock.now(),
            deleting: false,
        };

        self.retry
            .run("create_room", || self.db.put_room(&room))
            .await?;

        tracing::info!(
            room_id = %room.id,
            uid = creator_uid,
            max_members = room.max_members,
            is_private = room.is_private,
            "Room created"
        );

        let handle = self.profiles.profile_or_placeholder(creator_uid).await.handle;
        Ok(RoomSummary::from_room(&room, handle))
    }

    /// Rooms open for joining, newest first.
    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>, AppError> {
        let rooms = self.retry.run("list_rooms", || self.db.list_rooms()).await?;
        let mut handles = HashMap::new();
        Ok(summarize_rooms(self.profiles.as_ref(), &mut handles, rooms).await)
    }

    /// Live room list, newest first.
    pub fn watch_rooms(&self) -> SnapshotStream<Vec<RoomSummary>> {
        let profiles = self.profiles.clone();
        let mut updates = self.db.watch_rooms();

        Box::pin(async_stream::stream! {
            let mut handles = HashMap::new();
            while let Some(snapshot) = updates.next().await {
                match snapshot {
                    Ok(rooms) => yield Ok(summarize_rooms(profiles.as_ref(), &mut handles, rooms).await),
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    /// Live view of a room's state and members.
    pub async fn room_view(&self, room_id: &str) -> Result<SnapshotStream<PresenceEvent>, AppError> {
        self.retry
            .run("get_room", || self.db.get_room(room_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Room {}", room_id)))?;

        Ok(presence::watch_room(
            self.db.clone(),
            self.profiles.clone(),
            self.clock.clone(),
            room_id,
        ))
    }

    /// Delete a room. Every member still inside is walked through a full
    /// leave (committing running sessions) before any document is removed.
    ///
    /// Resumable: a failed cascade leaves the room marked `deleting`, and
    /// calling this again picks up where it stopped.
    pub async fn delete_room(&self, uid: &str, room_id: &str) -> Result<(), AppError> {
        let room = self
            .retry
            .run("get_room", || self.db.get_room(room_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Room {}", room_id)))?;

        if room.creator_id != uid {
            tracing::warn!(room_id, uid, "Non-creator attempted room delete");
            return Err(AppError::PermissionDenied(
                "Only the room creator can delete it".to_string(),
            ));
        }

        if !room.deleting {
            let ops = [FieldOp::set("deleting", true)];
            let outcome = self
                .retry
                .run("mark_deleting", || self.db.update_room(room_id, &ops))
                .await?;
            if outcome == UpdateOutcome::NotFound {
                return Err(AppError::NotFound(format!("Room {}", room_id)));
            }
        }
        tracing::info!(room_id, uid, "Room delete started");

        let mut committed_secs = 0;
        for pass in 0..MAX_CASCADE_PASSES {
            let members = self
                .retry
                .run("members_in_room", || self.db.members_in_room(room_id))
                .await?;
            if members.is_empty() {
                break;
            }
            tracing::debug!(room_id, pass, remaining = members.len(), "Cascading leave");
            for member in members {
                committed_secs += self.leave_room(&member.uid, room_id).await?.committed_secs;
            }
        }

        let remaining = self
            .retry
            .run("members_in_room", || self.db.members_in_room(room_id))
            .await?;
        if !remaining.is_empty() {
            return Err(AppError::TransientStore(format!(
                "{} members still in room {}",
                remaining.len(),
                room_id
            )));
        }

        let records = self
            .retry
            .run("all_members", || self.db.all_members(room_id))
            .await?;
        for member in &records {
            self.retry
                .run("delete_member", || self.db.delete_member(room_id, &member.uid))
                .await?;
        }
        self.retry
            .run("delete_room", || self.db.delete_room(room_id))
            .await?;

        tracing::info!(
            room_id,
            uid,
            member_records = records.len(),
            committed_secs,
            "Room deleted"
        );
        Ok(())
    }

    // ─── Membership ──────────────────────────────────────────────

    /// Join a room as `Resting`. Joining a room the user is already in is a
    /// no-op; being in another room leaves that room once the new seat is
    /// claimed.
    pub async fn join_room(
        &self,
        uid: &str,
        room_id: &str,
        password: Option<&str>,
    ) -> Result<ActionOutcome, AppError> {
        let member = self
            .retry
            .run("get_member", || self.db.get_member(room_id, uid))
            .await?;
        if MemberState::of(member.as_ref()).is_in_room() {
            return Ok(ActionOutcome::no_op("Already in room"));
        }

        // The seat is secured before touching any other room, so a refused
        // join leaves the user where they were.
        self.retry
            .run("request_join", || self.registry.request_join(room_id, password))
            .await?;

        if let Some(other) = self.current_room_id(uid).await? {
            if other != room_id {
                tracing::info!(uid, from = %other, to = room_id, "Leaving previous room");
                if let Err(e) = self.leave_room(uid, &other).await {
                    if let Err(release) = self.release_seat(room_id).await {
                        tracing::error!(room_id, uid, error = %release, "Failed to release seat after failed join");
                    }
                    return Err(e);
                }
            }
        }

        let enter = member_state::enter_ops(room_id, uid, self.clock.now());
        let entered = self
            .retry
            .run("enter_room", || self.db.upsert_member(room_id, uid, &enter))
            .await;
        match entered {
            Ok(UpsertOutcome::Created | UpsertOutcome::Updated) => {}
            Ok(UpsertOutcome::PreconditionFailed) => {
                // A concurrent join for the same user got there first
                self.release_seat(room_id).await?;
                return Ok(ActionOutcome::no_op("Already in room"));
            }
            Err(e) => {
                if let Err(release) = self.release_seat(room_id).await {
                    tracing::error!(room_id, uid, error = %release, "Failed to release seat after failed join");
                }
                return Err(e);
            }
        }

        let back_ref = [FieldOp::set("currentRoomID", room_id)];
        self.retry
            .run("set_current_room", || self.db.upsert_user(uid, &back_ref))
            .await?;

        // A delete that started after the seat was claimed will not see us
        // if its sweep already ran, so undo the join ourselves.
        let still_open = self
            .retry
            .run("get_room", || self.db.get_room(room_id))
            .await?
            .is_some_and(|room| !room.deleting);
        if !still_open {
            tracing::warn!(room_id, uid, "Room deleted during join, backing out");
            self.leave_room(uid, room_id).await?;
            return Err(AppError::NotFound(format!("Room {}", room_id)));
        }

        tracing::info!(room_id, uid, "Member joined");
        Ok(ActionOutcome::applied(0))
    }

    /// `Resting → Working`. Already working is reported as a no-op and keeps
    /// the running session.
    pub async fn start_work(
        &self,
        uid: &str,
        room_id: &str,
        item: &str,
    ) -> Result<ActionOutcome, AppError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let member = self
                .retry
                .run("get_member", || self.db.get_member(room_id, uid))
                .await?;
            let state = MemberState::of(member.as_ref());

            let ops = match member_state::start_work(&state, item, self.clock.now())? {
                Transition::NoOp(notice) => return Ok(ActionOutcome::no_op(notice)),
                Transition::Apply(ops) => ops,
            };

            match self
                .retry
                .run("start_work", || self.db.update_member(room_id, uid, &ops))
                .await?
            {
                UpdateOutcome::Applied => {
                    tracing::info!(room_id, uid, "Work started");
                    return Ok(ActionOutcome::applied(0));
                }
                UpdateOutcome::NotFound => {
                    return Err(AppError::InvalidTransition(
                        "Cannot start work outside a room".to_string(),
                    ))
                }
                UpdateOutcome::PreconditionFailed => continue,
            }
        }
        Err(contended())
    }

    /// `Working → Resting`, committing the session to the member's room
    /// total, the user's lifetime total and today's daily log. Calling it
    /// again before the next `start_work` commits nothing.
    pub async fn take_break(&self, uid: &str, room_id: &str) -> Result<ActionOutcome, AppError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let member = self
                .retry
                .run("get_member", || self.db.get_member(room_id, uid))
                .await?;
            let state = MemberState::of(member.as_ref());

            let plan = match member_state::take_break(&state, self.clock.now())? {
                Transition::NoOp(notice) => return Ok(ActionOutcome::no_op(notice)),
                Transition::Apply(plan) => plan,
            };

            match self
                .retry
                .run("take_break", || self.db.update_member(room_id, uid, &plan.ops))
                .await?
            {
                UpdateOutcome::Applied => {
                    if let Err(e) = self.commit_user_totals(uid, &plan.commit).await {
                        // The room total already holds this session
                        tracing::error!(
                            room_id,
                            uid,
                            delta_secs = plan.commit.delta_secs,
                            date = %plan.commit.date,
                            error = %e,
                            "Session credited to room but not to user totals"
                        );
                        return Err(e);
                    }
                    tracing::info!(
                        room_id,
                        uid,
                        delta_secs = plan.commit.delta_secs,
                        date = %plan.commit.date,
                        "Session committed"
                    );
                    return Ok(ActionOutcome::applied(plan.commit.delta_secs));
                }
                UpdateOutcome::NotFound => {
                    return Err(AppError::InvalidTransition(
                        "Cannot take a break outside a room".to_string(),
                    ))
                }
                // Someone else ended or restarted the session; re-read
                UpdateOutcome::PreconditionFailed => continue,
            }
        }
        Err(contended())
    }

    /// Leave a room, committing a running session first.
    pub async fn leave_room(&self, uid: &str, room_id: &str) -> Result<ActionOutcome, AppError> {
        let mut committed_secs = 0;

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let member = self
                .retry
                .run("get_member", || self.db.get_member(room_id, uid))
                .await?;

            match member_state::leave(&MemberState::of(member.as_ref())) {
                Transition::NoOp(notice) => {
                    self.clear_current_room(uid, room_id).await?;
                    if committed_secs > 0 {
                        return Ok(ActionOutcome::applied(committed_secs));
                    }
                    return Ok(ActionOutcome::no_op(notice));
                }
                Transition::Apply(LeavePlan::BreakThenExit) => {
                    match self.take_break(uid, room_id).await {
                        Ok(outcome) => committed_secs += outcome.committed_secs,
                        // Left concurrently; the next read sees it
                        Err(AppError::InvalidTransition(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                Transition::Apply(LeavePlan::Exit) => {
                    let exit = member_state::exit_ops();
                    match self
                        .retry
                        .run("exit_room", || self.db.update_member(room_id, uid, &exit))
                        .await?
                    {
                        UpdateOutcome::Applied => {
                            self.release_seat(room_id).await?;
                            self.clear_current_room(uid, room_id).await?;
                            tracing::info!(room_id, uid, committed_secs, "Member left");
                            return Ok(ActionOutcome::applied(committed_secs));
                        }
                        UpdateOutcome::NotFound => {
                            self.clear_current_room(uid, room_id).await?;
                            return Ok(ActionOutcome::no_op("Not in room"));
                        }
                        UpdateOutcome::PreconditionFailed => continue,
                    }
                }
            }
        }
        Err(contended())
    }

    // ─── Users ───────────────────────────────────────────────────

    /// Room the user is in, if any. A reference to a room that is gone, or
    /// that the user is no longer in, is cleared.
    pub async fn current_room(&self, uid: &str) -> Result<Option<RoomSummary>, AppError> {
        let Some(room_id) = self.current_room_id(uid).await? else {
            return Ok(None);
        };

        let room = self
            .retry
            .run("get_room", || self.db.get_room(&room_id))
            .await?
            .filter(|room| !room.deleting);
        let member = self
            .retry
            .run("get_member", || self.db.get_member(&room_id, uid))
            .await?;

        match room {
            Some(room) if MemberState::of(member.as_ref()).is_in_room() => {
                let handle = self
                    .profiles
                    .profile_or_placeholder(&room.creator_id)
                    .await
                    .handle;
                Ok(Some(RoomSummary::from_room(&room, handle)))
            }
            _ => {
                tracing::info!(uid, room_id = %room_id, "Clearing stale current room");
                self.clear_current_room(uid, &room_id).await?;
                Ok(None)
            }
        }
    }

    /// Work totals for the last `days` calendar days (UTC), oldest first.
    pub async fn daily_logs(&self, uid: &str, days: u32) -> Result<DailyLogSummary, AppError> {
        if !(1..=MAX_LOG_DAYS).contains(&days) {
            return Err(AppError::BadRequest(format!(
                "days must be between 1 and {}",
                MAX_LOG_DAYS
            )));
        }

        let logs = self
            .retry
            .run("daily_logs", || self.db.daily_logs_for_user(uid))
            .await?;
        let totals: HashMap<String, u64> = logs
            .into_iter()
            .map(|log| (log.date, log.total_time))
            .collect();

        Ok(summarize_daily_logs(
            &totals,
            self.clock.now().date_naive(),
            days,
        ))
    }

    // ─── Helpers ─────────────────────────────────────────────────

    async fn current_room_id(&self, uid: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .retry
            .run("get_user", || self.db.get_user_totals(uid))
            .await?
            .and_then(|totals| totals.current_room_id))
    }

    /// Add a committed session to the lifetime total and the daily log.
    async fn commit_user_totals(&self, uid: &str, commit: &SessionCommit) -> Result<(), AppError> {
        if commit.delta_secs == 0 {
            return Ok(());
        }
        let ops = [FieldOp::increment("totalTime", commit.delta_secs as i64)];
        self.retry
            .run("user_total", || self.db.upsert_user(uid, &ops))
            .await?;
        self.retry
            .run("daily_log", || {
                self.db.add_daily_time(uid, &commit.date, commit.delta_secs)
            })
            .await
    }

    async fn release_seat(&self, room_id: &str) -> Result<(), AppError> {
        self.retry
            .run("release_seat", || self.registry.request_leave(room_id))
            .await
    }

    /// Drop the user's back-reference if it still points at `room_id`.
    async fn clear_current_room(&self, uid: &str, room_id: &str) -> Result<(), AppError> {
        let ops = [
            FieldOp::expect("currentRoomID", room_id),
            FieldOp::remove("currentRoomID"),
        ];
        self.retry
            .run("clear_current_room", || self.db.update_user(uid, &ops))
            .await?;
        Ok(())
    }
}

fn contended() -> AppError {
    AppError::TransientStore("Member state kept changing, try again".to_string())
}

/// Client-facing summaries, skipping rooms that are being deleted.
async fn summarize_rooms(
    profiles: &dyn ProfileDirectory,
    handles: &mut HashMap<String, String>,
    rooms: Vec<Room>,
) -> Vec<RoomSummary> {
    let mut summaries = Vec::with_capacity(rooms.len());
    for room in rooms.into_iter().filter(|room| !room.deleting) {
        let handle = match handles.get(&room.creator_id) {
            Some(handle) => handle.clone(),
            None => match profiles.get_profile(&room.creator_id).await {
                Ok(Some(profile)) => {
                    handles.insert(room.creator_id.clone(), profile.handle.clone());
                    profile.handle
                }
                Ok(None) => room.creator_id.clone(),
                Err(e) => {
                    tracing::warn!(uid = %room.creator_id, error = %e, "Creator lookup failed");
                    room.creator_id.clone()
                }
            },
        };
        summaries.push(RoomSummary::from_room(&room, handle));
    }
    summaries
}

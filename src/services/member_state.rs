// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-member work/rest state machine.
//!
//! `NotInRoom → Resting ⇄ Working → NotInRoom`. Each transition is planned
//! here as a guarded list of field operations: the guards pin the state the
//! plan was computed from, so a racing writer makes the update fail its
//! precondition instead of silently losing or double-counting time.

use crate::db::FieldOp;
use crate::error::AppError;
use crate::models::Member;
use crate::services::accountant::SessionCommit;
use chrono::{DateTime, Utc};

/// Maximum length of a work item description.
pub const MAX_WORK_ITEM_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberState {
    NotInRoom,
    Resting,
    Working {
        item: String,
        started_at: DateTime<Utc>,
    },
}

impl MemberState {
    pub fn of(member: Option<&Member>) -> Self {
        match member {
            Some(m) if m.is_in_room => match (m.is_working, m.work_start_time) {
                (true, Some(started_at)) => MemberState::Working {
                    item: m.work_item.clone(),
                    started_at,
                },
                // A working flag without a start time has nothing to commit
                _ => MemberState::Resting,
            },
            _ => MemberState::NotInRoom,
        }
    }

    pub fn is_in_room(&self) -> bool {
        !matches!(self, MemberState::NotInRoom)
    }
}

/// A planned transition, or a no-op with a user-visible notice.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<T> {
    Apply(T),
    NoOp(&'static str),
}

/// Ops ending a running session and crediting the room-scoped total.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakPlan {
    pub commit: SessionCommit,
    pub ops: Vec<FieldOp>,
}

/// What `leave` has to do from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeavePlan {
    /// Resting: just exit.
    Exit,
    /// Working: commit the session first, then exit.
    BreakThenExit,
}

/// Ops that enter (or re-enter) a room as `Resting`.
///
/// Fails its precondition if the member is already in the room, which makes a
/// duplicate join a no-op. `totalTime` is kept across visits.
pub fn enter_ops(room_id: &str, uid: &str, now: DateTime<Utc>) -> Vec<FieldOp> {
    vec![
        FieldOp::expect_not("isInRoom", true),
        FieldOp::set("roomId", room_id),
        FieldOp::set("uid", uid),
        FieldOp::set("isInRoom", true),
        FieldOp::set("isWorking", false),
        FieldOp::set("workItem", ""),
        FieldOp::remove("workStartTime"),
        FieldOp::increment("totalTime", 0),
        FieldOp::set_timestamp("joinedAt", now),
    ]
}

/// `Resting → Working`.
pub fn start_work(
    state: &MemberState,
    item: &str,
    now: DateTime<Utc>,
) -> Result<Transition<Vec<FieldOp>>, AppError> {
    match state {
        MemberState::NotInRoom => Err(AppError::InvalidTransition(
            "Cannot start work outside a room".to_string(),
        )),
        // Restarting would reset the timer and drop the running session
        MemberState::Working { .. } => Ok(Transition::NoOp("Already working")),
        MemberState::Resting => {
            let item = item.trim();
            if item.chars().count() > MAX_WORK_ITEM_LEN {
                return Err(AppError::BadRequest(format!(
                    "Work item must be at most {} characters",
                    MAX_WORK_ITEM_LEN
                )));
            }
            Ok(Transition::Apply(vec![
                FieldOp::expect("isInRoom", true),
                FieldOp::expect("isWorking", false),
                FieldOp::set("isWorking", true),
                FieldOp::set("workItem", item),
                FieldOp::set_timestamp("workStartTime", now),
            ]))
        }
    }
}

/// `Working → Resting`, crediting the elapsed session.
pub fn take_break(
    state: &MemberState,
    now: DateTime<Utc>,
) -> Result<Transition<BreakPlan>, AppError> {
    match state {
        MemberState::NotInRoom => Err(AppError::InvalidTransition(
            "Cannot take a break outside a room".to_string(),
        )),
        MemberState::Resting => Ok(Transition::NoOp("Not working")),
        MemberState::Working { started_at, .. } => {
            let commit = SessionCommit::new(*started_at, now);
            let ops = vec![
                FieldOp::expect("isWorking", true),
                FieldOp::expect_timestamp("workStartTime", *started_at),
                FieldOp::set("isWorking", false),
                FieldOp::remove("workStartTime"),
                FieldOp::set("workItem", ""),
                FieldOp::increment("totalTime", commit.delta_secs as i64),
            ];
            Ok(Transition::Apply(BreakPlan { commit, ops }))
        }
    }
}

/// `Resting | Working → NotInRoom`.
pub fn leave(state: &MemberState) -> Transition<LeavePlan> {
    match state {
        MemberState::NotInRoom => Transition::NoOp("Not in room"),
        MemberState::Resting => Transition::Apply(LeavePlan::Exit),
        MemberState::Working { .. } => Transition::Apply(LeavePlan::BreakThenExit),
    }
}

/// Ops marking a resting member as gone. Fails its precondition if the member
/// started working (or already left) since it was read.
pub fn exit_ops() -> Vec<FieldOp> {
    vec![
        FieldOp::expect("isInRoom", true),
        FieldOp::expect("isWorking", false),
        FieldOp::set("isInRoom", false),
        FieldOp::remove("workStartTime"),
        FieldOp::set("workItem", ""),
    ]
}

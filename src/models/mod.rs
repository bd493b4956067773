// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod daily_log;
pub mod member;
pub mod room;
pub mod user;

pub use daily_log::{DailyLog, DailyLogEntry, DailyLogSummary};
pub use member::{Member, MemberView};
pub use room::{CreateRoomRequest, Room, RoomSummary};
pub use user::{Profile, UserTotals};

use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Reconciled room state published to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RoomView {
    pub room: RoomSummary,
    pub members: Vec<MemberView>,
}

/// Result of a member action that may be a no-op.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActionOutcome {
    pub applied: bool,
    /// User-visible reason when nothing changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Session time committed by this action (seconds)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub committed_secs: u64,
}

impl ActionOutcome {
    pub fn applied(committed_secs: u64) -> Self {
        Self {
            applied: true,
            notice: None,
            committed_secs,
        }
    }

    pub fn no_op(notice: &str) -> Self {
        Self {
            applied: false,
            notice: Some(notice.to_string()),
            committed_secs: 0,
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room member (occupancy) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Stored member record, one per (room, user).
///
/// `work_start_time` is present iff `is_working`; `is_in_room == false`
/// implies `is_working == false`. Leaving is a soft delete: the record and
/// its `total_time` survive until the room is destroyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub room_id: String,
    pub uid: String,
    #[serde(default)]
    pub is_in_room: bool,
    #[serde(default)]
    pub is_working: bool,
    #[serde(default)]
    pub work_item: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_start_time: Option<DateTime<Utc>>,
    /// Room-scoped cumulative work time (seconds)
    #[serde(default)]
    pub total_time: u64,
    pub joined_at: DateTime<Utc>,
}

/// Member as shown in a room view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MemberView {
    pub uid: String,
    pub display_name: String,
    pub handle: String,
    pub photo_ref: Option<String>,
    pub is_working: bool,
    pub work_item: String,
    pub work_start_time: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_time: u64,
    /// Seconds elapsed in the running session at publish time
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub current_session_secs: u64,
}

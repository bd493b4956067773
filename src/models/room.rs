// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Upper bound on room capacity accepted at creation.
pub const MAX_ROOM_CAPACITY: u32 = 100;

/// Stored room record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Room ID (also used as document ID)
    pub id: String,
    #[serde(rename = "roomName")]
    pub name: String,
    pub is_private: bool,
    /// Argon2 PHC string; absent for public rooms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub max_members: u32,
    #[serde(default)]
    pub now_members: u32,
    #[serde(rename = "creatorID")]
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    /// Set once a delete cascade has started; blocks new joins.
    #[serde(default)]
    pub deleting: bool,
}

/// Room creation request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub password: Option<String>,
    /// Defaults to the configured capacity when omitted
    #[validate(range(min = 1, max = 100))]
    #[serde(default)]
    pub max_members: Option<u32>,
}

/// Room as shown to clients (never carries the password hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub is_private: bool,
    pub max_members: u32,
    pub now_members: u32,
    pub creator_id: String,
    /// Creator's public handle, or their uid if the profile is unavailable
    pub creator_handle: String,
    pub created_at: String,
}

impl RoomSummary {
    pub fn from_room(room: &Room, creator_handle: String) -> Self {
        Self {
            id: room.id.clone(),
            name: room.name.clone(),
            is_private: room.is_private,
            max_members: room.max_members,
            now_members: room.now_members,
            creator_id: room.creator_id.clone(),
            creator_handle,
            created_at: crate::time_utils::format_utc_rfc3339(room.created_at),
        }
    }
}

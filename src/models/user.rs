// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User totals and profile identity.

use serde::{Deserialize, Serialize};

/// Accounting fields on the user document.
///
/// `current_room_id` is present iff the user is presently in that room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTotals {
    /// Lifetime work time across rooms (seconds)
    #[serde(default)]
    pub total_time: u64,
    #[serde(default, rename = "currentRoomID")]
    pub current_room_id: Option<String>,
}

/// Display identity from the profile service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "userName")]
    pub display_name: String,
    #[serde(rename = "userID")]
    pub handle: String,
    #[serde(rename = "photoURL", default)]
    pub photo_ref: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Profile {
    /// Stand-in identity used when a profile cannot be loaded.
    pub fn placeholder(uid: &str) -> Self {
        Self {
            display_name: "Unknown user".to_string(),
            handle: uid.to_string(),
            photo_ref: None,
            tags: Vec::new(),
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Display identity lookups.

use crate::db::RoomDb;
use crate::error::AppError;
use crate::models::Profile;

/// Source of user display identities (owned by the external profile service).
#[async_trait::async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>, AppError>;

    /// Profile, or a placeholder if it is missing or cannot be loaded.
    async fn profile_or_placeholder(&self, uid: &str) -> Profile {
        match self.get_profile(uid).await {
            Ok(Some(profile)) => profile,
            Ok(None) => Profile::placeholder(uid),
            Err(e) => {
                tracing::warn!(uid, error = %e, "Profile lookup failed, using placeholder");
                Profile::placeholder(uid)
            }
        }
    }
}

/// Profiles read from the shared `users` collection.
#[derive(Clone)]
pub struct StoreProfiles {
    db: RoomDb,
}

impl StoreProfiles {
    pub fn new(db: RoomDb) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl ProfileDirectory for StoreProfiles {
    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>, AppError> {
        self.db.get_profile(uid).await
    }
}

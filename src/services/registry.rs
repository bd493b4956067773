// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room capacity and access control.
//!
//! The authoritative member count lives on the room document and only moves
//! through capped/floored deltas, so `0 <= nowMembers <= maxMembers` holds at
//! every committed state regardless of how joins and leaves interleave.

use crate::db::{FieldOp, RoomDb, UpdateOutcome};
use crate::error::AppError;
use crate::models::Room;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a room password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))
}

/// Check that `password` opens `room`. Public rooms accept anything.
pub fn verify_access(room: &Room, password: Option<&str>) -> Result<(), AppError> {
    if !room.is_private {
        return Ok(());
    }

    let Some(stored) = room.password_hash.as_deref() else {
        // Private room without a password can never be opened
        tracing::warn!(room_id = %room.id, "Private room has no password hash");
        return Err(AppError::AccessDenied("Room is locked".to_string()));
    };
    let parsed = PasswordHash::new(stored).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Corrupt password hash for room {}: {}", room.id, e))
    })?;

    let password = password.unwrap_or_default();
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_err()
    {
        return Err(AppError::AccessDenied("Incorrect room password".to_string()));
    }
    Ok(())
}

/// Ops claiming one seat. Rejected when the room is full or being deleted.
pub fn admit_ops() -> Vec<FieldOp> {
    vec![
        FieldOp::expect_not("deleting", true),
        FieldOp::IncrementCapped {
            field: "nowMembers".to_string(),
            by: 1,
            cap_field: "maxMembers".to_string(),
        },
    ]
}

/// Ops releasing one seat, floored at zero.
pub fn release_ops() -> Vec<FieldOp> {
    vec![FieldOp::DecrementFloor("nowMembers".to_string(), 1)]
}

/// Seat accounting for rooms.
#[derive(Clone)]
pub struct RoomRegistry {
    db: RoomDb,
}

impl RoomRegistry {
    pub fn new(db: RoomDb) -> Self {
        Self { db }
    }

    /// Load a room that can still be joined.
    async fn joinable_room(&self, room_id: &str) -> Result<Room, AppError> {
        match self.db.get_room(room_id).await? {
            Some(room) if !room.deleting => Ok(room),
            _ => Err(AppError::NotFound(format!("Room {}", room_id))),
        }
    }

    /// Check access to `room_id` and claim a seat. Nothing changes on failure.
    pub async fn request_join(
        &self,
        room_id: &str,
        password: Option<&str>,
    ) -> Result<Room, AppError> {
        let room = self.joinable_room(room_id).await?;
        verify_access(&room, password)?;
        self.claim_seat(room_id).await?;
        Ok(room)
    }

    /// Claim a seat without an access check.
    async fn claim_seat(&self, room_id: &str) -> Result<(), AppError> {
        match self.db.update_room(room_id, &admit_ops()).await? {
            UpdateOutcome::Applied => Ok(()),
            UpdateOutcome::NotFound => Err(AppError::NotFound(format!("Room {}", room_id))),
            UpdateOutcome::PreconditionFailed => {
                // Either full or a delete started since the read
                let current = self.joinable_room(room_id).await?;
                Err(AppError::CapacityExceeded(format!(
                    "Room {} is full ({}/{})",
                    room_id, current.now_members, current.max_members
                )))
            }
        }
    }

    /// Release a seat. A room that is already gone has no seat to release.
    pub async fn request_leave(&self, room_id: &str) -> Result<(), AppError> {
        match self.db.update_room(room_id, &release_ops()).await? {
            UpdateOutcome::Applied | UpdateOutcome::NotFound => Ok(()),
            UpdateOutcome::PreconditionFailed => Err(AppError::Internal(anyhow::anyhow!(
                "Unconditional seat release rejected for room {}",
                room_id
            ))),
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod accountant;
pub mod lifecycle;
pub mod member_state;
pub mod presence;
pub mod profiles;
pub mod registry;
pub mod retry;

pub use lifecycle::RoomService;
pub use presence::{PresenceEvent, PresenceReducer};
pub use profiles::{ProfileDirectory, StoreProfiles};
pub use registry::RoomRegistry;
pub use retry::RetryPolicy;

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Studyroom tracker: shared study rooms with work-session accounting.
//!
//! Users join capacity-limited rooms, toggle between working and resting,
//! and accumulate work time per room, per lifetime and per calendar day.
//! Room views are pushed live to every observer of a room.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{DocumentStore, RoomDb};
use services::{RoomService, StoreProfiles};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub rooms: RoomService,
}

impl AppState {
    /// Wire the services over a document store.
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        let db = RoomDb::new(store);
        let profiles = Arc::new(StoreProfiles::new(db.clone()));
        let rooms = RoomService::new(db, profiles, clock, &config);
        Self { config, rooms }
    }
}

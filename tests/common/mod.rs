// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use studyroom_tracker::config::Config;
use studyroom_tracker::db::{collections, Document, DocumentStore, FirestoreDb, MemoryStore};
use studyroom_tracker::middleware::auth::create_jwt;
use studyroom_tracker::models::CreateRoomRequest;
use studyroom_tracker::routes::create_router;
use studyroom_tracker::services::RoomService;
use studyroom_tracker::time_utils::ManualClock;
use studyroom_tracker::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Monday morning, UTC.
#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
}

/// In-memory service stack driven by a manual clock.
#[allow(dead_code)]
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub state: Arc<AppState>,
}

#[allow(dead_code)]
impl TestEnv {
    pub fn rooms(&self) -> &RoomService {
        &self.state.rooms
    }
}

#[allow(dead_code)]
pub fn test_env() -> TestEnv {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let state = Arc::new(AppState::new(
        Config::test_default(),
        store.clone(),
        clock.clone(),
    ));
    TestEnv {
        store,
        clock,
        state,
    }
}

/// Create a test app over an in-memory store.
/// Returns the router and the environment behind it.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, TestEnv) {
    let env = test_env();
    (create_router(env.state.clone()), env)
}

/// Session token for `uid`, signed with the test key.
#[allow(dead_code)]
pub fn create_test_jwt(uid: &str) -> String {
    create_jwt(uid, &Config::test_default().jwt_signing_key).expect("Failed to create JWT")
}

/// Write a profile the way the external profile service does.
#[allow(dead_code)]
pub async fn seed_profile(store: &MemoryStore, uid: &str, name: &str, handle: &str) {
    let fields: Document = json!({
        "userName": name,
        "userID": handle,
        "tags": ["study"],
    })
    .as_object()
    .cloned()
    .unwrap();
    store
        .set(collections::USERS, uid, fields, true)
        .await
        .expect("Failed to seed profile");
}

#[allow(dead_code)]
pub fn public_room(name: &str, max_members: u32) -> CreateRoomRequest {
    CreateRoomRequest {
        name: name.to_string(),
        is_private: false,
        password: None,
        max_members: Some(max_members),
    }
}

#[allow(dead_code)]
pub fn private_room(name: &str, max_members: u32, password: &str) -> CreateRoomRequest {
    CreateRoomRequest {
        name: name.to_string(),
        is_private: true,
        password: Some(password.to_string()),
        max_members: Some(max_members),
    }
}

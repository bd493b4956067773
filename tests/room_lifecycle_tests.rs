// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room lifecycle tests over the in-memory store.
//!
//! These tests verify that:
//! 1. Capacity holds under sequential and concurrent joins/leaves
//! 2. Session time lands in the member, lifetime and daily totals exactly once
//! 3. Deleting a room walks every member out before anything is removed

use chrono::Duration;
use studyroom_tracker::db::collections;
use studyroom_tracker::error::AppError;

mod common;
use common::{private_room, public_room, test_env};

#[tokio::test]
async fn test_capacity_and_session_commit_scenario() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Library", 2)).await.unwrap();

    assert!(rooms.join_room("a", &room.id, None).await.unwrap().applied);
    assert!(rooms.join_room("b", &room.id, None).await.unwrap().applied);

    let err = rooms.join_room("c", &room.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::CapacityExceeded(_)));

    let stored = rooms.db().get_room(&room.id).await.unwrap().unwrap();
    assert_eq!(stored.now_members, 2);
    assert!(rooms.db().get_member(&room.id, "c").await.unwrap().is_none());

    assert!(rooms.start_work("a", &room.id, "reading").await.unwrap().applied);
    env.clock.advance(Duration::seconds(125));
    let outcome = rooms.take_break("a", &room.id).await.unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.committed_secs, 125);

    let member = rooms.db().get_member(&room.id, "a").await.unwrap().unwrap();
    assert_eq!(member.total_time, 125);
    assert!(!member.is_working);
    assert!(member.work_start_time.is_none());
    assert_eq!(member.work_item, "");

    let totals = rooms.db().get_user_totals("a").await.unwrap().unwrap();
    assert_eq!(totals.total_time, 125);

    let logs = rooms.db().daily_logs_for_user("a").await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].date, "2024-01-15");
    assert_eq!(logs[0].total_time, 125);
}

#[tokio::test]
async fn test_second_break_commits_nothing() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Desk", 4)).await.unwrap();
    rooms.join_room("a", &room.id, None).await.unwrap();

    rooms.start_work("a", &room.id, "essay").await.unwrap();
    env.clock.advance(Duration::seconds(60));
    assert_eq!(rooms.take_break("a", &room.id).await.unwrap().committed_secs, 60);

    env.clock.advance(Duration::seconds(60));
    let second = rooms.take_break("a", &room.id).await.unwrap();
    assert!(!second.applied);
    assert_eq!(second.committed_secs, 0);

    let totals = rooms.db().get_user_totals("a").await.unwrap().unwrap();
    assert_eq!(totals.total_time, 60);
}

#[tokio::test]
async fn test_start_while_working_keeps_running_session() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Desk", 4)).await.unwrap();
    rooms.join_room("a", &room.id, None).await.unwrap();

    rooms.start_work("a", &room.id, "reading").await.unwrap();
    env.clock.advance(Duration::seconds(30));

    let again = rooms.start_work("a", &room.id, "writing").await.unwrap();
    assert!(!again.applied);
    assert_eq!(again.notice.as_deref(), Some("Already working"));

    env.clock.advance(Duration::seconds(30));
    assert_eq!(rooms.take_break("a", &room.id).await.unwrap().committed_secs, 60);
}

#[tokio::test]
async fn test_start_work_outside_room_is_rejected() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Desk", 4)).await.unwrap();

    let err = rooms.start_work("b", &room.id, "reading").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_leave_while_working_commits_and_clears_back_reference() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Desk", 4)).await.unwrap();
    rooms.join_room("b", &room.id, None).await.unwrap();
    assert_eq!(
        rooms
            .db()
            .get_user_totals("b")
            .await
            .unwrap()
            .unwrap()
            .current_room_id
            .as_deref(),
        Some(room.id.as_str())
    );

    rooms.start_work("b", &room.id, "maths").await.unwrap();
    env.clock.advance(Duration::seconds(90));
    let outcome = rooms.leave_room("b", &room.id).await.unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.committed_secs, 90);

    let member = rooms.db().get_member(&room.id, "b").await.unwrap().unwrap();
    assert!(!member.is_in_room);
    assert!(!member.is_working);
    assert_eq!(member.total_time, 90);

    let totals = rooms.db().get_user_totals("b").await.unwrap().unwrap();
    assert_eq!(totals.total_time, 90);
    assert!(totals.current_room_id.is_none());

    let stored = rooms.db().get_room(&room.id).await.unwrap().unwrap();
    assert_eq!(stored.now_members, 0);

    // Leaving twice changes nothing
    assert!(!rooms.leave_room("b", &room.id).await.unwrap().applied);
    let stored = rooms.db().get_room(&room.id).await.unwrap().unwrap();
    assert_eq!(stored.now_members, 0);
}

#[tokio::test]
async fn test_rejoin_keeps_room_total() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Desk", 4)).await.unwrap();

    rooms.join_room("b", &room.id, None).await.unwrap();
    rooms.start_work("b", &room.id, "maths").await.unwrap();
    env.clock.advance(Duration::seconds(40));
    rooms.leave_room("b", &room.id).await.unwrap();

    rooms.join_room("b", &room.id, None).await.unwrap();
    let member = rooms.db().get_member(&room.id, "b").await.unwrap().unwrap();
    assert!(member.is_in_room);
    assert!(!member.is_working);
    assert_eq!(member.total_time, 40);
}

#[tokio::test]
async fn test_duplicate_join_is_noop() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Desk", 4)).await.unwrap();

    assert!(rooms.join_room("b", &room.id, None).await.unwrap().applied);
    let again = rooms.join_room("b", &room.id, None).await.unwrap();
    assert!(!again.applied);

    let stored = rooms.db().get_room(&room.id).await.unwrap().unwrap();
    assert_eq!(stored.now_members, 1);
}

#[tokio::test]
async fn test_joining_another_room_leaves_the_first() {
    let env = test_env();
    let rooms = env.rooms();
    let first = rooms.create_room("a", public_room("First", 4)).await.unwrap();
    let second = rooms.create_room("a", public_room("Second", 4)).await.unwrap();

    rooms.join_room("b", &first.id, None).await.unwrap();
    rooms.start_work("b", &first.id, "reading").await.unwrap();
    env.clock.advance(Duration::seconds(15));
    rooms.join_room("b", &second.id, None).await.unwrap();

    let first_room = rooms.db().get_room(&first.id).await.unwrap().unwrap();
    let second_room = rooms.db().get_room(&second.id).await.unwrap().unwrap();
    assert_eq!(first_room.now_members, 0);
    assert_eq!(second_room.now_members, 1);

    let totals = rooms.db().get_user_totals("b").await.unwrap().unwrap();
    assert_eq!(totals.current_room_id.as_deref(), Some(second.id.as_str()));
    assert_eq!(totals.total_time, 15);
}

#[tokio::test]
async fn test_refused_join_keeps_user_in_current_room() {
    let env = test_env();
    let rooms = env.rooms();
    let home = rooms.create_room("a", public_room("Home", 4)).await.unwrap();
    let full = rooms.create_room("a", public_room("Full", 1)).await.unwrap();
    rooms.join_room("a", &full.id, None).await.unwrap();

    rooms.join_room("b", &home.id, None).await.unwrap();
    rooms.start_work("b", &home.id, "reading").await.unwrap();
    env.clock.advance(Duration::seconds(30));

    let err = rooms.join_room("b", &full.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::CapacityExceeded(_)));

    let member = rooms.db().get_member(&home.id, "b").await.unwrap().unwrap();
    assert!(member.is_in_room);
    assert!(member.is_working);
    assert_eq!(member.total_time, 0);

    let home_room = rooms.db().get_room(&home.id).await.unwrap().unwrap();
    let full_room = rooms.db().get_room(&full.id).await.unwrap().unwrap();
    assert_eq!(home_room.now_members, 1);
    assert_eq!(full_room.now_members, 1);

    let totals = rooms.db().get_user_totals("b").await.unwrap().unwrap();
    assert_eq!(totals.current_room_id.as_deref(), Some(home.id.as_str()));
    assert_eq!(totals.total_time, 0);

    // The running session is still intact
    let outcome = rooms.take_break("b", &home.id).await.unwrap();
    assert_eq!(outcome.committed_secs, 30);
}

#[tokio::test]
async fn test_wrong_password_keeps_user_in_current_room() {
    let env = test_env();
    let rooms = env.rooms();
    let home = rooms.create_room("a", public_room("Home", 4)).await.unwrap();
    let quiet = rooms
        .create_room("a", private_room("Quiet", 4, "s3cret"))
        .await
        .unwrap();
    rooms.join_room("b", &home.id, None).await.unwrap();

    let err = rooms
        .join_room("b", &quiet.id, Some("guess"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied(_)));

    let home_room = rooms.db().get_room(&home.id).await.unwrap().unwrap();
    assert_eq!(home_room.now_members, 1);
    let totals = rooms.db().get_user_totals("b").await.unwrap().unwrap();
    assert_eq!(totals.current_room_id.as_deref(), Some(home.id.as_str()));
}

#[tokio::test]
async fn test_failed_user_commit_is_reported() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Library", 4)).await.unwrap();
    rooms.join_room("a", &room.id, None).await.unwrap();
    rooms.start_work("a", &room.id, "reading").await.unwrap();
    env.clock.advance(Duration::seconds(60));

    // Outlast every retry on the user document only
    env.store.fail_next_writes_to(collections::USERS, 3);
    let err = rooms.take_break("a", &room.id).await.unwrap_err();
    assert!(err.is_retryable());

    let member = rooms.db().get_member(&room.id, "a").await.unwrap().unwrap();
    assert!(!member.is_working);
    assert_eq!(member.total_time, 60);
    let totals = rooms.db().get_user_totals("a").await.unwrap().unwrap();
    assert_eq!(totals.total_time, 0);
}

#[tokio::test]
async fn test_private_room_requires_password() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms
        .create_room("a", private_room("Quiet", 4, "s3cret"))
        .await
        .unwrap();
    assert!(room.is_private);

    let stored = rooms.db().get_room(&room.id).await.unwrap().unwrap();
    let hash = stored.password_hash.as_deref().unwrap();
    assert!(hash.starts_with("$argon2"));

    let err = rooms
        .join_room("b", &room.id, Some("guess"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied(_)));
    let err = rooms.join_room("b", &room.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::AccessDenied(_)));

    let stored = rooms.db().get_room(&room.id).await.unwrap().unwrap();
    assert_eq!(stored.now_members, 0);
    assert!(rooms.db().get_member(&room.id, "b").await.unwrap().is_none());

    assert!(rooms
        .join_room("b", &room.id, Some("s3cret"))
        .await
        .unwrap()
        .applied);
}

#[tokio::test]
async fn test_create_room_validation() {
    let env = test_env();
    let rooms = env.rooms();

    let err = rooms.create_room("a", public_room("   ", 4)).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = rooms.create_room("a", public_room("Desk", 0)).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = rooms
        .create_room("a", private_room("Desk", 4, ""))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mut request = public_room("Default size", 1);
    request.max_members = None;
    let room = rooms.create_room("a", request).await.unwrap();
    assert_eq!(room.max_members, 8);
    assert_eq!(room.now_members, 0);
    assert_eq!(room.name, "Default size");
}

#[tokio::test]
async fn test_list_rooms_newest_first_with_creator_handle() {
    let env = test_env();
    common::seed_profile(&env.store, "a", "Alice", "alice").await;
    let rooms = env.rooms();

    let older = rooms.create_room("a", public_room("Older", 4)).await.unwrap();
    env.clock.advance(Duration::seconds(1));
    let newer = rooms.create_room("z", public_room("Newer", 4)).await.unwrap();

    let listed = rooms.list_rooms().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, newer.id);
    assert_eq!(listed[1].id, older.id);
    assert_eq!(listed[1].creator_handle, "alice");
    // No profile: fall back to the uid
    assert_eq!(listed[0].creator_handle, "z");
}

#[tokio::test]
async fn test_delete_by_creator_cascades_and_commits_sessions() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("owner", public_room("Hall", 4)).await.unwrap();

    rooms.join_room("owner", &room.id, None).await.unwrap();
    rooms.join_room("w", &room.id, None).await.unwrap();
    rooms.join_room("r", &room.id, None).await.unwrap();
    rooms.join_room("gone", &room.id, None).await.unwrap();
    rooms.leave_room("gone", &room.id).await.unwrap();

    rooms.start_work("w", &room.id, "thesis").await.unwrap();
    env.clock.advance(Duration::seconds(300));

    rooms.delete_room("owner", &room.id).await.unwrap();

    assert!(rooms.db().get_room(&room.id).await.unwrap().is_none());
    assert_eq!(env.store.count(collections::MEMBERS), 0);

    for uid in ["owner", "w", "r", "gone"] {
        let totals = rooms.db().get_user_totals(uid).await.unwrap().unwrap();
        assert!(totals.current_room_id.is_none(), "{} still points at room", uid);
    }

    let working = rooms.db().get_user_totals("w").await.unwrap().unwrap();
    assert_eq!(working.total_time, 300);
    let logs = rooms.db().daily_logs_for_user("w").await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].total_time, 300);

    let err = rooms.join_room("r", &room.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_by_non_creator_changes_nothing() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("owner", public_room("Hall", 4)).await.unwrap();
    rooms.join_room("m", &room.id, None).await.unwrap();
    rooms.start_work("m", &room.id, "reading").await.unwrap();

    let before = rooms.db().get_room(&room.id).await.unwrap().unwrap();
    let member_before = rooms.db().get_member(&room.id, "m").await.unwrap().unwrap();

    let err = rooms.delete_room("m", &room.id).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));

    assert_eq!(rooms.db().get_room(&room.id).await.unwrap().unwrap(), before);
    assert_eq!(
        rooms.db().get_member(&room.id, "m").await.unwrap().unwrap(),
        member_before
    );
}

#[tokio::test]
async fn test_delete_resumes_after_transient_failures() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("owner", public_room("Hall", 4)).await.unwrap();
    rooms.join_room("m", &room.id, None).await.unwrap();
    rooms.start_work("m", &room.id, "reading").await.unwrap();
    env.clock.advance(Duration::seconds(45));

    // More consecutive failures than one step retries: the first call fails
    env.store.fail_next_writes(3);
    let err = rooms.delete_room("owner", &room.id).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(rooms.db().get_room(&room.id).await.unwrap().is_some());

    rooms.delete_room("owner", &room.id).await.unwrap();
    assert!(rooms.db().get_room(&room.id).await.unwrap().is_none());
    assert_eq!(env.store.count(collections::MEMBERS), 0);
    let totals = rooms.db().get_user_totals("m").await.unwrap().unwrap();
    assert_eq!(totals.total_time, 45);
    assert!(totals.current_room_id.is_none());
}

#[tokio::test]
async fn test_transient_write_failures_are_retried() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Desk", 4)).await.unwrap();
    rooms.join_room("a", &room.id, None).await.unwrap();
    rooms.start_work("a", &room.id, "reading").await.unwrap();
    env.clock.advance(Duration::seconds(20));

    env.store.fail_next_writes(2);
    let outcome = rooms.take_break("a", &room.id).await.unwrap();
    assert_eq!(outcome.committed_secs, 20);

    let member = rooms.db().get_member(&room.id, "a").await.unwrap().unwrap();
    assert_eq!(member.total_time, 20);
    let totals = rooms.db().get_user_totals("a").await.unwrap().unwrap();
    assert_eq!(totals.total_time, 20);
}

#[tokio::test]
async fn test_joining_room_being_deleted_is_not_found() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Desk", 4)).await.unwrap();
    rooms
        .db()
        .update_room(
            &room.id,
            &[studyroom_tracker::db::FieldOp::set("deleting", true)],
        )
        .await
        .unwrap();

    let err = rooms.join_room("b", &room.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(rooms.list_rooms().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_current_room_clears_stale_reference() {
    let env = test_env();
    let rooms = env.rooms();
    let room = rooms.create_room("a", public_room("Desk", 4)).await.unwrap();
    rooms.join_room("b", &room.id, None).await.unwrap();

    let current = rooms.current_room("b").await.unwrap().unwrap();
    assert_eq!(current.id, room.id);

    rooms
        .db()
        .upsert_user(
            "b",
            &[studyroom_tracker::db::FieldOp::set("currentRoomID", "vanished")],
        )
        .await
        .unwrap();
    assert!(rooms.current_room("b").await.unwrap().is_none());

    let totals = rooms.db().get_user_totals("b").await.unwrap().unwrap();
    assert!(totals.current_room_id.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_and_leaves_stay_within_capacity() {
    let env = test_env();
    let room = env
        .rooms()
        .create_room("owner", public_room("Busy", 3))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..12 {
        let state = env.state.clone();
        let room_id = room.id.clone();
        handles.push(tokio::spawn(async move {
            let uid = format!("user-{}", i);
            let joined = state.rooms.join_room(&uid, &room_id, None).await;
            (uid, joined)
        }));
    }

    let mut admitted = Vec::new();
    for handle in handles {
        let (uid, joined) = handle.await.unwrap();
        match joined {
            Ok(outcome) if outcome.applied => admitted.push(uid),
            Ok(_) => panic!("{} got a no-op join", uid),
            Err(AppError::CapacityExceeded(_)) => {}
            Err(e) => panic!("{} failed to join: {}", uid, e),
        }
    }
    assert_eq!(admitted.len(), 3);

    let stored = env.rooms().db().get_room(&room.id).await.unwrap().unwrap();
    assert_eq!(stored.now_members, 3);
    assert_eq!(
        env.rooms().db().members_in_room(&room.id).await.unwrap().len(),
        3
    );

    // Each admitted user leaves twice, concurrently
    let mut handles = Vec::new();
    for uid in admitted.iter().chain(admitted.iter()) {
        let state = env.state.clone();
        let room_id = room.id.clone();
        let uid = uid.clone();
        handles.push(tokio::spawn(async move {
            state.rooms.leave_room(&uid, &room_id).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = env.rooms().db().get_room(&room.id).await.unwrap().unwrap();
    assert_eq!(stored.now_members, 0);
}

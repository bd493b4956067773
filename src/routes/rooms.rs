// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room routes: lifecycle actions and live streams.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{ActionOutcome, CreateRoomRequest, RoomSummary};
use crate::services::PresenceEvent;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Room routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rooms", post(create_room).get(list_rooms))
        .route("/api/rooms/stream", get(stream_rooms))
        .route("/api/rooms/{room_id}", axum::routing::delete(delete_room))
        .route("/api/rooms/{room_id}/join", post(join_room))
        .route("/api/rooms/{room_id}/start", post(start_work))
        .route("/api/rooms/{room_id}/break", post(take_break))
        .route("/api/rooms/{room_id}/leave", post(leave_room))
        .route("/api/rooms/{room_id}/view", get(room_view))
}

// ─── Rooms ───────────────────────────────────────────────────

/// Room list response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomSummary>,
}

async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomSummary>)> {
    let room = state.rooms.create_room(&user.uid, request).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

async fn list_rooms(State(state): State<Arc<AppState>>) -> Result<Json<RoomListResponse>> {
    let rooms = state.rooms.list_rooms().await?;
    Ok(Json(RoomListResponse { rooms }))
}

/// SSE stream of the room list; one `rooms` event per change.
async fn stream_rooms(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = std::result::Result<Event, Infallible>>> {
    let mut updates = state.rooms.watch_rooms();

    let stream = async_stream::stream! {
        while let Some(snapshot) = updates.next().await {
            match snapshot {
                Ok(rooms) => {
                    if let Some(event) = json_event("rooms", &RoomListResponse { rooms }) {
                        yield Ok(event);
                    }
                }
                Err(e) => yield Ok(error_event(&e)),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn delete_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<StatusCode> {
    state.rooms.delete_room(&user.uid, &room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// SSE stream of the reconciled room view. Ends with a `room_deleted` event
/// once the room is gone.
async fn room_view(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl tokio_stream::Stream<Item = std::result::Result<Event, Infallible>>>> {
    let mut updates = state.rooms.room_view(&room_id).await?;

    let stream = async_stream::stream! {
        while let Some(update) = updates.next().await {
            match update {
                Ok(PresenceEvent::View(view)) => {
                    if let Some(event) = json_event("view", &view) {
                        yield Ok(event);
                    }
                }
                Ok(PresenceEvent::Deleted) => {
                    yield Ok(Event::default().event("room_deleted").data(room_id.as_str()));
                    break;
                }
                Err(e) => yield Ok(error_event(&e)),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ─── Member Actions ──────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartWorkRequest {
    #[serde(default)]
    pub item: String,
}

async fn join_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<ActionOutcome>> {
    let outcome = state
        .rooms
        .join_room(&user.uid, &room_id, request.password.as_deref())
        .await?;
    Ok(Json(outcome))
}

async fn start_work(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
    Json(request): Json<StartWorkRequest>,
) -> Result<Json<ActionOutcome>> {
    let outcome = state
        .rooms
        .start_work(&user.uid, &room_id, &request.item)
        .await?;
    Ok(Json(outcome))
}

async fn take_break(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<Json<ActionOutcome>> {
    Ok(Json(state.rooms.take_break(&user.uid, &room_id).await?))
}

async fn leave_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> Result<Json<ActionOutcome>> {
    Ok(Json(state.rooms.leave_room(&user.uid, &room_id).await?))
}

// ─── SSE helpers ─────────────────────────────────────────────

fn json_event<T: Serialize>(name: &str, payload: &T) -> Option<Event> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(Event::default().event(name).data(json)),
        Err(e) => {
            tracing::error!(event = name, error = %e, "Failed to serialize SSE payload");
            None
        }
    }
}

fn error_event(err: &crate::error::AppError) -> Event {
    Event::default().event("error").data(err.code())
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user routes: work logs and current room.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{DailyLogSummary, RoomSummary};
use crate::services::lifecycle::DEFAULT_LOG_DAYS;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me/logs", get(get_daily_logs))
        .route("/api/me/room", get(get_current_room))
}

/// Query parameters for daily logs.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    DEFAULT_LOG_DAYS
}

async fn get_daily_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<DailyLogSummary>> {
    tracing::debug!(uid = %user.uid, days = params.days, "Fetching daily logs");
    Ok(Json(state.rooms.daily_logs(&user.uid, params.days).await?))
}

/// Room the user is currently in.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CurrentRoomResponse {
    pub room: Option<RoomSummary>,
}

async fn get_current_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CurrentRoomResponse>> {
    let room = state.rooms.current_room(&user.uid).await?;
    Ok(Json(CurrentRoomResponse { room }))
}

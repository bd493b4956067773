// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-day work time accumulators.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Stored daily log: merged by additive deltas, never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    pub uid: String,
    /// Calendar day, "YYYY-MM-DD" (UTC)
    pub date: String,
    #[serde(default)]
    pub total_time: u64,
}

/// One day in a daily log summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DailyLogEntry {
    pub date: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_time: u64,
}

/// Last-N-days summary, oldest day first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DailyLogSummary {
    pub logs: Vec<DailyLogEntry>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total: u64,
    /// Sum of the last 7 days in the window
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub week: u64,
    /// Sum of the last 30 days in the window
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub month: u64,
}

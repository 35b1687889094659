//! Configuration, greeting and refresh handlers.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::required_param;
use crate::config::{ConfigGroup, EXAMPLE_GROUP, RULES_GROUP, SOR_CODES_GROUP};
use crate::error::OnboardError;
use crate::refresh::RefreshRecord;
use crate::server::AppState;

/// Fallback for `example.greeting1`.
pub const DEFAULT_APP_GREETING: &str = "Default greeting from app";
/// Fallback for `example.greeting`.
pub const DEFAULT_CONFIG_GREETING: &str = "Default greeting from config";

/// Rule maps and system-of-record codes from the active snapshot.
///
/// Groups that have never been loaded are returned empty.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<&'static str, ConfigGroup>> {
    let snapshot = state.refresh.store().snapshot();
    let mut body = BTreeMap::new();
    for group in [RULES_GROUP, SOR_CODES_GROUP] {
        body.insert(group, snapshot.group(group).cloned().unwrap_or_default());
    }
    Json(body)
}

/// A single configuration group.
pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
) -> Result<Json<ConfigGroup>, OnboardError> {
    state.refresh.store().get(&group).map(Json)
}

/// `[greeting1, greeting]` from the `example` group, with defaults.
pub async fn config_greeting(State(state): State<Arc<AppState>>) -> Json<[String; 2]> {
    let snapshot = state.refresh.store().snapshot();
    let greeting1 = snapshot
        .text(EXAMPLE_GROUP, "greeting1")
        .unwrap_or(DEFAULT_APP_GREETING);
    let greeting = snapshot
        .text(EXAMPLE_GROUP, "greeting")
        .unwrap_or(DEFAULT_CONFIG_GREETING);
    Json([greeting1.to_string(), greeting.to_string()])
}

#[derive(Debug, Deserialize)]
pub struct GreetParams {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GreetingResponse {
    pub message: String,
}

pub async fn greet(
    Query(params): Query<GreetParams>,
) -> Result<Json<GreetingResponse>, OnboardError> {
    let name = required_param(params.name, "name")?;
    Ok(Json(GreetingResponse {
        message: format!("Hello, {name}!"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BranchParams {
    pub branch: Option<String>,
}

/// Switch the configuration label and refresh in the background.
pub async fn change_branch(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BranchParams>,
) -> Result<String, OnboardError> {
    let branch = required_param(params.branch, "branch")?;
    let handle = state.refresh.change_label(&branch)?;
    Ok(format!(
        "Branch change to '{}' initiated. Refresh {} running in background.",
        handle.label, handle.id
    ))
}

pub async fn refresh_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<RefreshRecord>, OnboardError> {
    state
        .refresh
        .status(id)
        .map(Json)
        .ok_or_else(|| OnboardError::not_found(format!("refresh {id}")))
}

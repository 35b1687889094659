//! Registry and build-task handlers.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::required_param;
use crate::error::OnboardError;
use crate::registry::InstanceRecord;
use crate::server::AppState;
use crate::tasks::{TaskId, REPORT_PLACEHOLDER};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancesParams {
    pub app_name: Option<String>,
}

/// Service URLs of every registered instance of `appName`.
pub async fn admin_instances(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InstancesParams>,
) -> Result<Json<Vec<String>>, OnboardError> {
    let app_name = params
        .app_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| state.settings.registry.default_app.clone());
    let urls = state.registry.list_instances(&app_name).await?;
    Ok(Json(urls))
}

/// Unauthenticated listing of every registered instance.
pub async fn public_instances(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<InstanceRecord>>, OnboardError> {
    Ok(Json(state.registry.all_instances().await?))
}

/// Task identifiers accepted by `/admin/gradle-task`.
pub async fn list_tasks() -> Json<Vec<&'static str>> {
    Json(TaskId::ALL.iter().map(|t| t.as_str()).collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    pub task_name: Option<String>,
}

/// Run an allow-listed build task.
///
/// Report-producing tasks answer with the HTML report (or a placeholder when
/// none was written); other tasks answer with their plain-text output.
pub async fn gradle_task(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TaskParams>,
) -> Result<Response, OnboardError> {
    let task_name = required_param(params.task_name, "taskName")?;
    let outcome = state.tasks.run_task(&task_name).await?;

    if !outcome.succeeded {
        let code = outcome
            .exit_code
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        warn!(task = %outcome.task, exit_code = %code, "task did not succeed");
        return Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("task failed with exit code {code}"),
        )
            .into_response());
    }

    if outcome.task.produces_report() {
        let html = outcome
            .report_html
            .unwrap_or_else(|| REPORT_PLACEHOLDER.to_string());
        return Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response());
    }

    Ok(outcome.output.into_response())
}

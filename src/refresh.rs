//! Label changes and background configuration refresh.
//!
//! [`RefreshTrigger::change_label`] swaps the active [`ConfigContext`]
//! immediately and schedules a reload of the [`ConfigStore`] on the runtime.
//! The caller gets a [`RefreshHandle`] back before the reload finishes; the
//! outcome is recorded per refresh id and can be queried afterwards.
//!
//! Reloads never overlap. A reload queued behind another one reads the
//! label only when it starts, so a burst of changes settles on the newest.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ConfigContext, ConfigStore};
use crate::error::{OnboardError, Result};

/// How many finished refresh records are kept for status queries.
const HISTORY_LIMIT: u64 = 64;

/// Lifecycle of one refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    /// Waiting for an earlier reload to finish.
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RefreshPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Status record for one refresh request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRecord {
    pub id: u64,
    /// Label passed to `change_label`.
    pub requested_label: String,
    /// Label the reload actually fetched; differs when a newer change
    /// arrived while this one was queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_label: Option<String>,
    pub phase: RefreshPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Returned to the caller of [`RefreshTrigger::change_label`].
#[derive(Debug)]
pub struct RefreshHandle {
    pub id: u64,
    pub label: String,
    join: JoinHandle<RefreshRecord>,
}

impl RefreshHandle {
    /// Wait for the reload to finish and return its final record.
    pub async fn wait(self) -> Result<RefreshRecord> {
        self.join
            .await
            .map_err(|e| OnboardError::internal(format!("refresh task {} aborted: {e}", self.id)))
    }
}

/// Owns the label pointer and schedules store reloads.
pub struct RefreshTrigger {
    store: Arc<ConfigStore>,
    context: RwLock<Arc<ConfigContext>>,
    next_id: AtomicU64,
    history: DashMap<u64, RefreshRecord>,
}

impl RefreshTrigger {
    pub fn new(store: Arc<ConfigStore>, initial: ConfigContext) -> Self {
        Self {
            store,
            context: RwLock::new(Arc::new(initial)),
            next_id: AtomicU64::new(1),
            history: DashMap::new(),
        }
    }

    /// The context reloads currently resolve against.
    pub fn context(&self) -> Arc<ConfigContext> {
        self.context.read().clone()
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Load the store under the current context, waiting for the result.
    pub async fn load_current(&self) -> Result<()> {
        let ctx = self.context();
        self.store.reload(&ctx).await.map(|_| ())
    }

    /// Point the service at `label` and refresh configuration in the background.
    ///
    /// The label pointer is updated before this returns. If the reload fails
    /// the pointer stays at the new label; the failure is logged and recorded
    /// under the returned id.
    pub fn change_label(self: &Arc<Self>, label: &str) -> Result<RefreshHandle> {
        if label.trim().is_empty() {
            return Err(OnboardError::validation("branch must not be empty"));
        }

        {
            let mut current = self.context.write();
            let next = current.with_label(label);
            *current = Arc::new(next);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.history.insert(
            id,
            RefreshRecord {
                id,
                requested_label: label.to_string(),
                applied_label: None,
                phase: RefreshPhase::Pending,
                error: None,
                requested_at: Utc::now(),
                finished_at: None,
            },
        );
        self.prune(id);
        info!(refresh_id = id, label, "label changed; refresh scheduled");

        let trigger = Arc::clone(self);
        let join = tokio::spawn(async move { trigger.run_refresh(id).await });

        Ok(RefreshHandle {
            id,
            label: label.to_string(),
            join,
        })
    }

    /// Status of a refresh by id, if it is still remembered.
    pub fn status(&self, id: u64) -> Option<RefreshRecord> {
        self.history.get(&id).map(|r| r.value().clone())
    }

    async fn run_refresh(&self, id: u64) -> RefreshRecord {
        let outcome = self
            .store
            .reload_with(|| {
                let ctx = (*self.context()).clone();
                self.update(id, |r| {
                    r.phase = RefreshPhase::Running;
                    r.applied_label = Some(ctx.label.clone());
                });
                ctx
            })
            .await;

        match outcome {
            Ok((ctx, _)) => {
                info!(refresh_id = id, label = %ctx.label, "refresh completed");
                self.update(id, |r| {
                    r.phase = RefreshPhase::Succeeded;
                    r.finished_at = Some(Utc::now());
                });
            },
            Err(e) => {
                warn!(refresh_id = id, error = %e, kind = e.kind(), "refresh failed");
                self.update(id, |r| {
                    r.phase = RefreshPhase::Failed;
                    r.error = Some(e.to_string());
                    r.finished_at = Some(Utc::now());
                });
            },
        }

        self.status(id).unwrap_or_else(|| RefreshRecord {
            id,
            requested_label: String::new(),
            applied_label: None,
            phase: RefreshPhase::Failed,
            error: Some("refresh record evicted".to_string()),
            requested_at: Utc::now(),
            finished_at: Some(Utc::now()),
        })
    }

    fn update(&self, id: u64, f: impl FnOnce(&mut RefreshRecord)) {
        if let Some(mut record) = self.history.get_mut(&id) {
            f(record.value_mut());
        }
    }

    fn prune(&self, newest: u64) {
        if newest > HISTORY_LIMIT {
            let cutoff = newest - HISTORY_LIMIT;
            self.history
                .retain(|id, record| *id > cutoff || !record.phase.is_terminal());
        }
    }
}

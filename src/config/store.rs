//! Copy-on-write configuration store.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{ConfigContext, ConfigGroup, ConfigSource, Snapshot, KNOWN_GROUPS};
use crate::error::{OnboardError, Result};

/// Holds the active [`Snapshot`] and reloads it from a [`ConfigSource`].
///
/// Readers take a cheap `Arc` clone of the current snapshot. Reloads are
/// serialized by `reload_lock`; the new snapshot is built off-lock and
/// installed with a single pointer swap.
pub struct ConfigStore {
    source: Arc<dyn ConfigSource>,
    current: RwLock<Arc<Snapshot>>,
    reload_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(Snapshot::default())),
            reload_lock: Mutex::new(()),
        }
    }

    /// The snapshot visible right now.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// One group from the current snapshot.
    pub fn get(&self, group: &str) -> Result<ConfigGroup> {
        self.snapshot()
            .group(group)
            .cloned()
            .ok_or_else(|| OnboardError::not_found(format!("configuration group '{group}'")))
    }

    /// Text value of `key` in `group`, if any.
    pub fn lookup(&self, group: &str, key: &str) -> Option<String> {
        self.snapshot().text(group, key).map(str::to_string)
    }

    /// Re-fetch every group under `ctx` and install the result.
    ///
    /// A failed fetch leaves the current snapshot untouched. A known group
    /// missing from a successful fetch keeps its previous contents.
    pub async fn reload(&self, ctx: &ConfigContext) -> Result<Arc<Snapshot>> {
        let _guard = self.reload_lock.lock().await;
        self.reload_locked(ctx).await
    }

    /// Like [`reload`](Self::reload), but resolves the context only once the
    /// reload lock is held, so queued reloads pick up the newest label.
    pub async fn reload_with<F>(&self, resolve: F) -> Result<(ConfigContext, Arc<Snapshot>)>
    where
        F: FnOnce() -> ConfigContext + Send,
    {
        let _guard = self.reload_lock.lock().await;
        let ctx = resolve();
        let snapshot = self.reload_locked(&ctx).await?;
        Ok((ctx, snapshot))
    }

    async fn reload_locked(&self, ctx: &ConfigContext) -> Result<Arc<Snapshot>> {
        let mut fetched = match self.source.fetch(ctx).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(
                    label = %ctx.label,
                    source = %self.source.describe(),
                    error = %e,
                    "configuration reload failed; keeping previous snapshot"
                );
                return Err(e);
            },
        };

        let previous = self.snapshot();
        for (group, _) in KNOWN_GROUPS {
            if fetched.contains_key(*group) {
                continue;
            }
            if let Some(old) = previous.group(group) {
                warn!(
                    label = %ctx.label,
                    group = *group,
                    "group missing from fetch; keeping previous values"
                );
                fetched.insert((*group).to_string(), old.clone());
            }
        }

        let snapshot = Arc::new(Snapshot {
            label: Some(ctx.label.clone()),
            loaded_at: Some(Utc::now()),
            groups: fetched,
        });
        *self.current.write() = Arc::clone(&snapshot);

        info!(
            label = %ctx.label,
            groups = snapshot.groups.len(),
            "configuration snapshot installed"
        );
        Ok(snapshot)
    }
}

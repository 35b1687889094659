//! HTTP server wiring.

use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth;
use crate::config::{ConfigContext, ConfigServerSource, ConfigSource, ConfigStore, FileSource};
use crate::error::OnboardError;
use crate::handlers;
use crate::refresh::RefreshTrigger;
use crate::registry::RegistryClient;
use crate::settings::{ConfigSourceSettings, Settings};
use crate::tasks::TaskRunner;

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub refresh: Arc<RefreshTrigger>,
    pub registry: RegistryClient,
    pub tasks: TaskRunner,
}

impl AppState {
    /// Build every component from settings. Nothing is fetched yet.
    pub fn from_settings(settings: Settings) -> Result<Self, OnboardError> {
        let source: Arc<dyn ConfigSource> = match &settings.config_source {
            ConfigSourceSettings::Server {
                url, timeout_ms, ..
            } => Arc::new(ConfigServerSource::new(
                url,
                std::time::Duration::from_millis(*timeout_ms),
            )?),
            ConfigSourceSettings::File { directory } => Arc::new(FileSource::new(directory)),
        };
        Self::with_source(settings, source)
    }

    /// Like [`from_settings`](Self::from_settings) with an explicit configuration source.
    pub fn with_source(
        settings: Settings,
        source: Arc<dyn ConfigSource>,
    ) -> Result<Self, OnboardError> {
        let context = ConfigContext::new(
            settings.config_source.application(),
            settings.config_source.profile(),
            settings.label.clone(),
        );
        let store = Arc::new(ConfigStore::new(source));
        let refresh = Arc::new(RefreshTrigger::new(store, context));
        let registry = RegistryClient::new(&settings.registry.url, settings.registry.timeout())?;
        let tasks = TaskRunner::new(settings.tasks.clone());

        Ok(Self {
            settings,
            refresh,
            registry,
            tasks,
        })
    }
}

/// Build the router. `/instances` is public; everything else sits behind auth.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        // Configuration
        .route("/config", get(handlers::config::get_config))
        .route("/config/{group}", get(handlers::config::get_group))
        .route("/config-greeting", get(handlers::config::config_greeting))
        .route("/greet", get(handlers::config::greet))
        // Refresh
        .route("/change-branch", post(handlers::config::change_branch))
        .route("/refresh-status/{id}", get(handlers::config::refresh_status))
        // Registry and build tasks
        .route("/admin/instances", get(handlers::admin::admin_instances))
        .route("/admin/gradle-task", get(handlers::admin::gradle_task))
        .route("/admin/tasks", get(handlers::admin::list_tasks))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/instances", get(handlers::admin::public_instances))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Onboarding HTTP service
pub struct OnboardServer;

impl OnboardServer {
    /// Load configuration and serve until Ctrl+C.
    pub async fn start(settings: Settings) -> Result<()> {
        let addr = settings.server.socket_addr();
        if settings.auth.is_none() {
            warn!("no [auth] credentials configured; all routes are open");
        }

        let state = Arc::new(AppState::from_settings(settings)?);

        let ctx = state.refresh.context();
        match state.refresh.load_current().await {
            Ok(()) => info!(label = %ctx.label, "initial configuration loaded"),
            Err(e) => warn!(
                label = %ctx.label,
                error = %e,
                "initial configuration load failed; serving defaults until a refresh succeeds"
            ),
        }

        let app = router(state);

        info!("Onboarding service starting on http://{}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Onboarding service stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

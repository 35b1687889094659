//! On-boarding automation service.
//!
//! A small HTTP service that exposes externalized configuration (rule maps,
//! system-of-record codes, greeting text), switches the configuration label
//! at runtime with a background refresh, looks up live instances in a
//! companion registry, and runs allow-listed build tasks whose HTML test
//! reports are returned with their stylesheets inlined.
//!
//! # Usage
//!
//! ```bash
//! onboard serve --config onboard.toml
//! ```
//!
//! # Components
//!
//! - [`config::ConfigStore`] - copy-on-write snapshot of configuration groups
//! - [`refresh::RefreshTrigger`] - label pointer and serialized reloads
//! - [`registry::RegistryClient`] - instance lookups by application name
//! - [`tasks::TaskRunner`] - subprocess runner with timeout and report assembly
//! - [`server`] - axum routes over all of the above

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod refresh;
pub mod registry;
pub mod server;
pub mod settings;
pub mod tasks;

pub use error::{OnboardError, Result, SettingsError};
pub use server::{router, AppState, OnboardServer};
pub use settings::Settings;

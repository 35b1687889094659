//! TOML service settings.
//!
//! Every table is optional; omitted values fall back to defaults that match
//! a local development setup (config server on 8888, registry on 9000,
//! the service itself on 8081).
//!
//! # Example TOML
//!
//! ```toml
//! label = "main"
//!
//! [server]
//! bind = "0.0.0.0"
//! port = 8081
//!
//! [auth]
//! username = "admin"
//! password = "secret"
//!
//! [config_source]
//! kind = "server"
//! url = "http://localhost:8888"
//! application = "app"
//! profile = "default"
//!
//! [registry]
//! url = "http://localhost:9000"
//!
//! [tasks]
//! project_dir = "/srv/onboarding/app"
//! program = "./gradlew"
//! timeout_secs = 600
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SettingsError;

/// Top-level service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Initial configuration label (branch) loaded at startup.
    pub label: String,
    pub server: ServerSettings,
    /// HTTP Basic credentials. `None` runs the service without authentication.
    pub auth: Option<AuthSettings>,
    pub config_source: ConfigSourceSettings,
    pub registry: RegistrySettings,
    pub tasks: TaskSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            label: "main".to_string(),
            server: ServerSettings::default(),
            auth: None,
            config_source: ConfigSourceSettings::default(),
            registry: RegistrySettings::default(),
            tasks: TaskSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8081,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct AuthSettings {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Where configuration groups are fetched from.
///
/// The `kind` field in TOML selects the variant.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigSourceSettings {
    /// A label-addressable configuration server.
    Server {
        url: String,
        #[serde(default = "default_application")]
        application: String,
        #[serde(default = "default_profile")]
        profile: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    /// One TOML file per label in a local directory.
    File { directory: PathBuf },
}

impl Default for ConfigSourceSettings {
    fn default() -> Self {
        Self::Server {
            url: "http://localhost:8888".to_string(),
            application: default_application(),
            profile: default_profile(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ConfigSourceSettings {
    pub fn application(&self) -> &str {
        match self {
            Self::Server { application, .. } => application,
            Self::File { .. } => "app",
        }
    }

    pub fn profile(&self) -> &str {
        match self {
            Self::Server { profile, .. } => profile,
            Self::File { .. } => "default",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub url: String,
    pub timeout_ms: u64,
    /// Application name used when `/admin/instances` is called without `appName`.
    pub default_app: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9000".to_string(),
            timeout_ms: default_timeout_ms(),
            default_app: "client-app".to_string(),
        }
    }
}

impl RegistrySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskSettings {
    /// Working directory the build tool runs in.
    pub project_dir: PathBuf,
    /// Build tool executable, resolved relative to `project_dir` when relative.
    pub program: String,
    /// Arguments placed before each task's own arguments.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    /// Text the build output must contain for a run to count as successful.
    pub success_marker: String,
    /// Directory holding `index.html` and `css/` of the generated test report,
    /// relative to `project_dir` unless absolute.
    pub report_dir: PathBuf,
    pub report_wait_ms: u64,
    pub report_poll_ms: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            program: "./gradlew".to_string(),
            args: Vec::new(),
            timeout_secs: 600,
            success_marker: "BUILD SUCCESSFUL".to_string(),
            report_dir: PathBuf::from("build/reports/tests/test"),
            report_wait_ms: 3000,
            report_poll_ms: 100,
        }
    }
}

impl TaskSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn report_wait(&self) -> Duration {
        Duration::from_millis(self.report_wait_ms)
    }

    pub fn report_poll(&self) -> Duration {
        Duration::from_millis(self.report_poll_ms)
    }

    /// Absolute (or `project_dir`-relative) location of the report directory.
    pub fn resolved_report_dir(&self) -> PathBuf {
        if self.report_dir.is_absolute() {
            self.report_dir.clone()
        } else {
            self.project_dir.join(&self.report_dir)
        }
    }
}

fn default_application() -> String {
    "app".to_string()
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Settings {
    /// Parse a TOML string into validated [`Settings`].
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate settings from a file path.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.label.trim().is_empty() {
            return Err(invalid("label must not be empty"));
        }
        if self.server.port == 0 {
            return Err(invalid("server.port must be non-zero"));
        }
        if let Some(auth) = &self.auth {
            if auth.username.is_empty() {
                return Err(invalid("auth.username must not be empty"));
            }
        }
        match &self.config_source {
            ConfigSourceSettings::Server { url, .. } if url.trim().is_empty() => {
                return Err(invalid("config_source.url must not be empty"));
            },
            ConfigSourceSettings::File { directory } if directory.as_os_str().is_empty() => {
                return Err(invalid("config_source.directory must not be empty"));
            },
            _ => {},
        }
        if self.registry.url.trim().is_empty() {
            return Err(invalid("registry.url must not be empty"));
        }
        if self.tasks.program.trim().is_empty() {
            return Err(invalid("tasks.program must not be empty"));
        }
        if self.tasks.timeout_secs == 0 {
            return Err(invalid("tasks.timeout_secs must be greater than 0"));
        }
        if self.tasks.success_marker.is_empty() {
            return Err(invalid("tasks.success_marker must not be empty"));
        }
        if self.tasks.report_poll_ms == 0 {
            return Err(invalid("tasks.report_poll_ms must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> SettingsError {
    SettingsError::Validation {
        message: message.to_string(),
    }
}

//! onboard: on-boarding automation service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

use onboard::{OnboardServer, Settings};

/// On-boarding automation service
#[derive(Parser)]
#[command(name = "onboard")]
#[command(
    about = "Serve refreshable configuration, registry lookups and build reports",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "ONBOARD_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Settings file (TOML). Defaults are used when omitted.
        #[arg(long, env = "ONBOARD_CONFIG")]
        config: Option<PathBuf>,

        /// Override `server.port`
        #[arg(long, env = "ONBOARD_PORT")]
        port: Option<u16>,

        /// Override `server.bind`
        #[arg(long, env = "ONBOARD_BIND")]
        bind: Option<IpAddr>,
    },

    /// Parse and validate a settings file, then print the resolved values
    CheckConfig {
        /// Settings file (TOML)
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Serve { config, port, bind } => {
            let mut settings = match config {
                Some(path) => Settings::load(&path)
                    .with_context(|| format!("loading settings from {}", path.display()))?,
                None => Settings::default(),
            };
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(bind) = bind {
                settings.server.bind = bind;
            }
            settings.validate()?;
            OnboardServer::start(settings).await
        },
        Commands::CheckConfig { config } => {
            let mut settings = Settings::load(&config)
                .with_context(|| format!("loading settings from {}", config.display()))?;
            if let Some(auth) = settings.auth.as_mut() {
                auth.password = "[REDACTED]".to_string();
            }
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        },
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

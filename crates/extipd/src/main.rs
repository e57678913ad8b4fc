// # extipd - External IP Daemon
//
// This daemon is a THIN integration layer. All reconciliation logic lives in
// extip-core; this binary only:
//
// 1. Reads configuration from environment variables
// 2. Initializes logging and the tokio runtime
// 3. Wires the interface source, Kubernetes store and watch into the engine
// 4. Runs the engine until SIGTERM or SIGINT
//
// ## Configuration
//
// - `EXTIP_ANNOTATION_KEY`: Service annotation naming the interface
//   (default `external-ip-interface`)
// - `EXTIP_RESYNC_INTERVAL_SECS`: Periodic pass interval, 10 to 3600 (default 60)
// - `EXTIP_API_TIMEOUT_SECS`: Per-call API deadline, 0 disables (default 0)
// - `EXTIP_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `EXTIP_LOG_FORMAT`: text or json (default text)
//
// Cluster credentials come from the usual kubeconfig / in-cluster discovery.
//
// ## Example
//
// ```bash
// export EXTIP_LOG_LEVEL=debug
// extipd
// ```

use anyhow::{Context, Result};
use extip_core::engine::EngineEvent;
use extip_core::{ControllerConfig, DEFAULT_ANNOTATION_KEY, ReconcileEngine, forward_events};
use extip_core::traits::ServiceEventSource;
use extip_iface::SystemInterfaces;
use extip_kube::{KubeServiceEvents, KubeServiceStore};
use std::env;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ExtipExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ExtipExitCode> for ExitCode {
    fn from(code: ExtipExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    annotation_key: String,
    resync_interval_secs: u64,
    api_timeout_secs: u64,
    log_level: String,
    log_format: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            annotation_key: env::var("EXTIP_ANNOTATION_KEY")
                .unwrap_or_else(|_| DEFAULT_ANNOTATION_KEY.to_string()),
            resync_interval_secs: parse_u64("EXTIP_RESYNC_INTERVAL_SECS", 60)?,
            api_timeout_secs: parse_u64("EXTIP_API_TIMEOUT_SECS", 0)?,
            log_level: env::var("EXTIP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("EXTIP_LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.annotation_key.trim().is_empty() {
            anyhow::bail!("EXTIP_ANNOTATION_KEY cannot be empty");
        }

        if !(10..=3600).contains(&self.resync_interval_secs) {
            anyhow::bail!(
                "EXTIP_RESYNC_INTERVAL_SECS must be between 10 and 3600 seconds. Got: {}",
                self.resync_interval_secs
            );
        }

        if self.api_timeout_secs > 300 {
            anyhow::bail!(
                "EXTIP_API_TIMEOUT_SECS must be between 0 and 300 seconds. Got: {}",
                self.api_timeout_secs
            );
        }

        if parse_level(&self.log_level).is_none() {
            anyhow::bail!(
                "EXTIP_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        match self.log_format.as_str() {
            "text" | "json" => {}
            _ => anyhow::bail!(
                "EXTIP_LOG_FORMAT '{}' is not supported. Supported formats: text, json",
                self.log_format
            ),
        }

        Ok(())
    }

    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::new()
            .with_annotation_key(self.annotation_key.clone())
            .with_resync_interval_secs(self.resync_interval_secs)
            .with_api_timeout_secs(self.api_timeout_secs)
    }
}

fn parse_u64(var: &str, default: u64) -> Result<u64> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a non-negative integer. Got: '{}'", var, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExtipExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ExtipExitCode::ConfigError.into();
    }

    let log_level = parse_level(&config.log_level).unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder().with_max_level(log_level);
    let installed = if config.log_format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };

    if let Err(e) = installed {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExtipExitCode::ConfigError.into();
    }

    info!("Starting extipd daemon");
    info!(
        "Watching services annotated '{}' (resync every {}s)",
        config.annotation_key, config.resync_interval_secs
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ExtipExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => ExtipExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup error: {:#}", e);
                ExtipExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                ExtipExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Failure class, mapped onto the process exit code
enum DaemonError {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

/// Run the daemon
async fn run_daemon(config: Config) -> std::result::Result<(), DaemonError> {
    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client")
        .map_err(DaemonError::Startup)?;

    let (mut engine, events) = ReconcileEngine::new(
        Box::new(SystemInterfaces::new()),
        Box::new(KubeServiceStore::new(client.clone())),
        config.controller_config(),
    )
    .context("failed to create reconciliation engine")
    .map_err(DaemonError::Startup)?;

    let watch = KubeServiceEvents::new(client).watch();
    let forwarder = tokio::spawn(forward_events(watch, engine.trigger()));
    let event_logger = tokio::spawn(log_engine_events(events));

    info!("Daemon initialized successfully");

    let result = engine
        .run_until(async {
            match wait_for_shutdown().await {
                Ok(signal) => info!("Received shutdown signal: {}", signal),
                Err(e) => error!("Signal handling error, shutting down: {}", e),
            }
        })
        .await;

    forwarder.abort();
    // The engine (and its event sender) is dropped after the loop, which ends the logger
    drop(engine);
    let _ = event_logger.await;

    info!("Shutting down daemon");
    result
        .context("reconciliation loop failed")
        .map_err(DaemonError::Runtime)
}

/// Surface engine events at debug level
async fn log_engine_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "engine event");
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            annotation_key: DEFAULT_ANNOTATION_KEY.to_string(),
            resync_interval_secs: 60,
            api_timeout_secs: 0,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn resync_interval_out_of_range() {
        let mut cfg = config();
        cfg.resync_interval_secs = 5;
        assert!(cfg.validate().is_err());
        cfg.resync_interval_secs = 3601;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn api_timeout_limit() {
        let mut cfg = config();
        cfg.api_timeout_secs = 300;
        assert!(cfg.validate().is_ok());
        cfg.api_timeout_secs = 301;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_settings() {
        let mut cfg = config();
        cfg.log_level = "verbose".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.log_format = "yaml".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn controller_config_carries_settings() {
        let mut cfg = config();
        cfg.annotation_key = "example.com/iface".to_string();
        cfg.api_timeout_secs = 15;

        let controller = cfg.controller_config();
        assert_eq!(controller.annotation_key, "example.com/iface");
        assert_eq!(controller.resync_interval_secs, 60);
        assert_eq!(controller.api_timeout(), Some(std::time::Duration::from_secs(15)));
    }
}

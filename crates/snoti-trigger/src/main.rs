//! snoti-trigger binary entry point.
//!
//! Usage: snoti-trigger [--config <file>] [--broker-url <host:port>] ...
//!
//! Every flag can also be set through its `SNOTI_*` environment variable.
//! Flags and environment override the config file.

use clap::Parser;
use snoti_trigger::{
    HandlerRegistry, LogEventHandler, Trigger, TriggerConfig, TriggerError, TriggerResult,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// Forwards SNOTI broker events to handlers and acknowledges them.
#[derive(Parser, Debug)]
#[command(name = "snoti-trigger")]
#[command(about = "Forwards SNOTI broker events to handlers and acknowledges them")]
struct Args {
    /// JSON config file (brokerUrl, authID, authSecret, productKey, subKey, ...).
    #[arg(long, short, env = "SNOTI_CONFIG")]
    config: Option<PathBuf>,

    /// Broker address as host:port.
    #[arg(long, env = "SNOTI_BROKER_URL")]
    broker_url: Option<String>,

    #[arg(long, env = "SNOTI_AUTH_ID")]
    auth_id: Option<String>,

    #[arg(long, env = "SNOTI_AUTH_SECRET", hide_env_values = true)]
    auth_secret: Option<String>,

    #[arg(long, env = "SNOTI_PRODUCT_KEY")]
    product_key: Option<String>,

    #[arg(long, env = "SNOTI_SUB_KEY")]
    sub_key: Option<String>,

    /// Accept any broker certificate.
    #[arg(long, env = "SNOTI_INSECURE_SKIP_VERIFY", num_args = 0..=1, default_missing_value = "true")]
    insecure_skip_verify: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SNOTI_LOG_LEVEL")]
    log_level: Option<String>,

    /// Also write JSONL logs to this file. Stderr output continues.
    #[arg(long, env = "SNOTI_LOG_PATH")]
    log_path: Option<PathBuf>,

    /// Also write JSONL logs to ~/.snoti/logs/snoti-trigger.jsonl.
    #[arg(long)]
    json_log: bool,

    /// Seconds to wait for tasks on shutdown.
    #[arg(long, default_value = "5")]
    stop_timeout_secs: u64,
}

impl Args {
    fn overrides(&self) -> TriggerConfig {
        TriggerConfig {
            broker_url: self.broker_url.clone(),
            auth_id: self.auth_id.clone(),
            auth_secret: self.auth_secret.clone(),
            product_key: self.product_key.clone(),
            sub_key: self.sub_key.clone(),
            insecure_skip_verify: self.insecure_skip_verify,
            log_level: self.log_level.clone(),
            log_path: self.log_path.clone(),
        }
    }

    fn load_config(&self) -> TriggerResult<TriggerConfig> {
        let file = match &self.config {
            Some(path) => TriggerConfig::from_file(path)?,
            None => TriggerConfig::default(),
        };
        Ok(file.merge(self.overrides()))
    }

    /// Logging setup: stderr always, plus a JSONL file when one is requested.
    fn log_config(&self, config: &TriggerConfig) -> observability::LogConfig {
        let log_path = config
            .log_path
            .clone()
            .or_else(|| self.json_log.then(|| observability::default_log_path("snoti-trigger")));
        observability::LogConfig {
            service_name: "snoti-trigger".into(),
            default_level: config.log_level().to_string(),
            log_path,
            also_stderr: true,
        }
    }
}

#[tokio::main]
async fn main() -> TriggerResult<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    observability::init_with_config(args.log_config(&config))?;

    let settings = config.settings().inspect_err(|e| {
        error!(error = %e, "Invalid configuration");
    })?;
    info!(
        broker = %settings.broker_url(),
        product_key = %settings.product_key(),
        verification = ?settings.certificate_verification(),
        "Configuration loaded"
    );

    let handlers = HandlerRegistry::new().with(LogEventHandler)?;
    let trigger = Trigger::new(settings, handlers)?;
    trigger.start();

    tokio::signal::ctrl_c().await.map_err(TriggerError::Io)?;
    info!("Received shutdown signal, stopping...");

    if !trigger
        .stop(Duration::from_secs(args.stop_timeout_secs))
        .await
    {
        error!("Shutdown timed out");
    }
    Ok(())
}

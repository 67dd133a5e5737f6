//! Ambient configuration and logging setup: USIM/EAP-TLS configuration
//! loaded from YAML and validated before use, plus a small `tracing`
//! subscriber builder a host can wire in.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;
use crate::usim::UsimConfig;

/// Logging configuration: enable/disable, filter directive, and whether to
/// report the call site.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub enable: bool,
    pub level: String,
    pub report_caller: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { enable: true, level: "info".to_string(), report_caller: false }
    }
}

/// Installs a `tracing-subscriber` global subscriber from `cfg`. A no-op
/// when `cfg.enable` is false. `report_caller` maps to `with_file`/
/// `with_line_number`.
pub fn init_tracing(cfg: &LoggingConfig) {
    if !cfg.enable {
        return;
    }
    let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(cfg.report_caller)
        .with_line_number(cfg.report_caller)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global tracing subscriber already set");
    }
}

/// The authentication core's whole configuration surface (spec §6): USIM
/// credentials plus the ambient logging knobs. No environment variables
/// are consumed and no on-disk state is written (spec §6).
#[derive(Debug, Deserialize, serde_valid::Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuthCoreConfig {
    #[serde(flatten)]
    pub usim: UsimConfig,
    #[serde(default)]
    pub logger: LoggingConfig,
}

impl AuthCoreConfig {
    /// Parses and validates a YAML configuration document.
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let cfg: AuthCoreConfig = serde_yaml::from_str(source)?;
        serde_valid::Validate::validate(&cfg)?;
        Ok(cfg)
    }
}

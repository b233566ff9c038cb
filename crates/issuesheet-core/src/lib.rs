pub mod config;
pub mod error;

pub use config::{
    ColumnMap, Config, GitHubConfig, ServerConfig, SheetLayout, SpreadsheetConfig,
    ValidationResult,
};
pub use error::{
    AppError, ConfigError, ReqwestErrorExt, RusqliteErrorExt, SheetError, TrackerError,
    WebhookError,
};

use anyhow::Result;

/// Initialize logging. Honours `RUST_LOG`, defaulting to `info`.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    tracing::debug!("IssueSheet core initialized");
    Ok(())
}

//! Runtime configuration.
//!
//! Values are passed explicitly into the components that need them; nothing
//! here is global.

use crate::error::{PaymentError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_IMPORT_LIMIT: u32 = 100;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// When the processor moves authorized funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMethod {
    /// Funds are captured as part of confirmation.
    #[default]
    Automatic,
    /// Confirmation stops at `requires_capture`; an explicit capture follows.
    Manual,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMethod::Automatic => "automatic",
            CaptureMethod::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub api_base: String,
    pub timeout: Duration,
    pub capture_method: CaptureMethod,
}

impl GatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            capture_method: CaptureMethod::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(PaymentError::ConfigError(
                "an API key is required unless running in sandbox mode".to_string(),
            ));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(PaymentError::ConfigError(format!(
                "API base must be an http(s) URL, got {:?}",
                self.api_base
            )));
        }
        if self.timeout.is_zero() {
            return Err(PaymentError::ConfigError(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between reconciliation passes.
    pub interval: Duration,
    /// How many of the most recent remote intents the import phase looks at.
    pub import_limit: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            import_limit: DEFAULT_IMPORT_LIMIT,
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(PaymentError::ConfigError(
                "sync interval must be greater than zero".to_string(),
            ));
        }
        if self.import_limit == 0 || self.import_limit > 100 {
            return Err(PaymentError::ConfigError(format!(
                "import limit must be between 1 and 100, got {}",
                self.import_limit
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum GatewayMode {
    Remote(GatewayConfig),
    Sandbox(CaptureMethod),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayMode,
    pub reconciler: ReconcilerConfig,
    /// Persistent ledger location; in-memory when absent.
    pub db_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if let GatewayMode::Remote(gateway) = &self.gateway {
            gateway.validate()?;
        }
        self.reconciler.validate()
    }
}

use crate::application::retry::RetryPolicy;
use crate::domain::fees::FeeSchedule;
use crate::domain::money::Amount;
use crate::error::{LedgerError, Result};
use crate::infrastructure::gateway::{HttpGatewayConfig, SimulatedSettings};
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::time::Duration as StdDuration;

const DEV_WEBHOOK_SECRET: &str = "pixledger-dev-secret";

/// Which gateway adapter the process talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GatewayKind {
    Simulated,
    Http,
}

/// Runtime rules every orchestrator shares.
#[derive(Debug, Clone)]
pub struct LedgerPolicy {
    pub fees: FeeSchedule,
    pub holding_period: chrono::Duration,
    pub min_withdrawal: Amount,
    pub charge_expiry_minutes: i64,
    pub retry: RetryPolicy,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            holding_period: chrono::Duration::days(14),
            min_withdrawal: Amount::from_const(1000),
            charge_expiry_minutes: 60,
            retry: RetryPolicy::default(),
        }
    }
}

/// Ledger settings shared by every subcommand.
#[derive(Clone, Args)]
pub struct LedgerConfig {
    /// Processor fee, in percent of the gross amount.
    #[arg(long, env = "PIXLEDGER_GATEWAY_FEE_PCT", default_value = "5.99")]
    pub gateway_fee_pct: Decimal,

    /// Platform fee, in percent of the gross amount.
    #[arg(long, env = "PIXLEDGER_PLATFORM_FEE_PCT", default_value = "8")]
    pub platform_fee_pct: Decimal,

    /// Days sale proceeds stay frozen before they can be withdrawn.
    #[arg(long, env = "PIXLEDGER_HOLDING_PERIOD_DAYS", default_value_t = 14)]
    pub holding_period_days: i64,

    /// Smallest payout a creator may request, in minor units.
    #[arg(long, env = "PIXLEDGER_MIN_WITHDRAWAL", default_value_t = 1000)]
    pub min_withdrawal: i64,

    #[arg(long, env = "PIXLEDGER_CHARGE_EXPIRY_MINUTES", default_value_t = 60)]
    pub charge_expiry_minutes: i64,

    #[arg(long, env = "PIXLEDGER_GATEWAY", value_enum, default_value_t = GatewayKind::Simulated)]
    pub gateway: GatewayKind,

    /// Base URL of the processor API (http gateway only).
    #[arg(long, env = "PIXLEDGER_GATEWAY_URL")]
    pub gateway_url: Option<String>,

    #[arg(long, env = "PIXLEDGER_GATEWAY_API_KEY", hide_env_values = true)]
    gateway_api_key: Option<String>,

    /// Shared secret of webhook signatures. Required by the http gateway.
    #[arg(long, env = "PIXLEDGER_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,

    /// Request timeout of the http gateway, in seconds.
    #[arg(long, env = "PIXLEDGER_GATEWAY_TIMEOUT_SECS", default_value_t = 10)]
    pub gateway_timeout_secs: u64,

    /// Seconds after which the simulated gateway pays a charge by itself.
    #[arg(long, env = "PIXLEDGER_SIM_APPROVE_AFTER_SECS")]
    pub sim_approve_after_secs: Option<i64>,

    /// Seconds after which a simulated payout completes.
    #[arg(long, env = "PIXLEDGER_SIM_PAYOUT_DELAY_SECS", default_value_t = 300)]
    pub sim_payout_delay_secs: i64,

    #[arg(long, env = "PIXLEDGER_RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,

    #[arg(long, env = "PIXLEDGER_RETRY_BACKOFF_MS", default_value_t = 200)]
    pub retry_backoff_ms: u64,
}

impl LedgerConfig {
    pub fn policy(&self) -> Result<LedgerPolicy> {
        if self.holding_period_days < 0 {
            return Err(LedgerError::Config(
                "holding period cannot be negative".to_string(),
            ));
        }
        if self.charge_expiry_minutes <= 0 {
            return Err(LedgerError::Config(
                "charge expiry must be positive".to_string(),
            ));
        }
        let min_withdrawal = Amount::new(self.min_withdrawal)
            .map_err(|_| LedgerError::Config("minimum withdrawal must be positive".to_string()))?;

        let holding_period = chrono::Duration::try_days(self.holding_period_days)
            .ok_or_else(|| LedgerError::Config("holding period is out of range".to_string()))?;

        Ok(LedgerPolicy {
            fees: FeeSchedule::new(self.gateway_fee_pct, self.platform_fee_pct)?,
            holding_period,
            min_withdrawal,
            charge_expiry_minutes: self.charge_expiry_minutes,
            retry: RetryPolicy::exponential(
                self.retry_attempts,
                StdDuration::from_millis(self.retry_backoff_ms),
            ),
        })
    }

    /// Secret for the simulated gateway, falling back to a development value.
    pub fn simulated_webhook_secret(&self) -> SecretString {
        let secret = self
            .webhook_secret
            .clone()
            .unwrap_or_else(|| DEV_WEBHOOK_SECRET.to_string());
        SecretString::from(secret)
    }

    pub fn webhook_secret(&self) -> Result<SecretString> {
        self.webhook_secret
            .clone()
            .filter(|s| !s.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| {
                LedgerError::Config("the http gateway needs --webhook-secret".to_string())
            })
    }

    pub fn gateway_api_key(&self) -> Result<SecretString> {
        self.gateway_api_key
            .clone()
            .map(SecretString::from)
            .ok_or_else(|| LedgerError::Config("the http gateway needs an API key".to_string()))
    }

    pub fn gateway_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.gateway_timeout_secs)
    }

    pub fn simulated_settings(&self) -> SimulatedSettings {
        SimulatedSettings {
            approve_after: self.sim_approve_after_secs.map(chrono::Duration::seconds),
            payout_settle_after: chrono::Duration::seconds(self.sim_payout_delay_secs),
        }
    }

    pub fn http_gateway(&self) -> Result<HttpGatewayConfig> {
        let base_url = self
            .gateway_url
            .clone()
            .ok_or_else(|| LedgerError::Config("the http gateway needs --gateway-url".to_string()))?;
        Ok(HttpGatewayConfig {
            base_url,
            api_key: self.gateway_api_key()?,
            webhook_secret: self.webhook_secret()?,
            timeout: self.gateway_timeout(),
        })
    }
}

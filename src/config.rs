use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payouts: PayoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Settings for the payout settlement engine and its background sweeper.
#[derive(Debug, Clone, Deserialize)]
pub struct PayoutConfig {
    /// Withholding tax rate in percent, e.g. "7.5". Zero disables
    /// withholding entirely.
    pub withholding_tax_rate: Decimal,
    /// Category recorded on each withholding entry, e.g. "payout_wht".
    pub withholding_tax_category: String,
    /// Settlement currency passed to the transfer gateway.
    pub currency: String,
    /// Seconds between reconciliation sweeps.
    pub sweep_interval_secs: u64,
    /// Hours after which an unresolved request is force-failed.
    pub stuck_timeout_hours: i64,
    /// Maximum number of stuck requests handled per sweep pass.
    pub sweep_batch_size: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let withholding_tax_rate =
            env::var("WITHHOLDING_TAX_RATE").unwrap_or_else(|_| "7.5".to_string());
        let withholding_tax_rate = Decimal::from_str(&withholding_tax_rate)
            .context("WITHHOLDING_TAX_RATE must be a decimal percentage")?;

        let payouts = PayoutConfig {
            withholding_tax_rate,
            withholding_tax_category: env::var("WITHHOLDING_TAX_CATEGORY")
                .unwrap_or_else(|_| "payout_wht".to_string()),
            currency: env::var("PAYOUT_CURRENCY").unwrap_or_else(|_| "GHS".to_string()),
            sweep_interval_secs: env::var("PAYOUT_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("PAYOUT_SWEEP_INTERVAL_SECS must be a valid number")?,
            stuck_timeout_hours: env::var("PAYOUT_STUCK_TIMEOUT_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("PAYOUT_STUCK_TIMEOUT_HOURS must be a valid number")?,
            sweep_batch_size: env::var("PAYOUT_SWEEP_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("PAYOUT_SWEEP_BATCH_SIZE must be a valid number")?,
        };

        let config = Config {
            server,
            database,
            payouts,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.payouts.withholding_tax_rate < Decimal::ZERO
            || self.payouts.withholding_tax_rate >= Decimal::from(100)
        {
            return Err(anyhow!(
                "WITHHOLDING_TAX_RATE must be in [0, 100), got {}",
                self.payouts.withholding_tax_rate
            ));
        }

        if self.payouts.currency.trim().is_empty() {
            return Err(anyhow!("PAYOUT_CURRENCY cannot be empty"));
        }

        if self.payouts.sweep_interval_secs == 0 {
            return Err(anyhow!("PAYOUT_SWEEP_INTERVAL_SECS must be greater than 0"));
        }

        if self.payouts.stuck_timeout_hours <= 0 {
            return Err(anyhow!("PAYOUT_STUCK_TIMEOUT_HOURS must be greater than 0"));
        }

        if self.payouts.sweep_batch_size <= 0 {
            return Err(anyhow!("PAYOUT_SWEEP_BATCH_SIZE must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                environment: "development".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/sokoni".to_string(),
                max_connections: 20,
            },
            payouts: PayoutConfig {
                withholding_tax_rate: Decimal::new(75, 1),
                withholding_tax_category: "payout_wht".to_string(),
                currency: "GHS".to_string(),
                sweep_interval_secs: 3600,
                stuck_timeout_hours: 24,
                sweep_batch_size: 100,
            },
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_privileged_port() {
        let mut config = valid_config();
        config.server.port = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_environment() {
        let mut config = valid_config();
        config.server.environment = "qa".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_tax_rate_at_or_above_hundred() {
        let mut config = valid_config();
        config.payouts.withholding_tax_rate = Decimal::from(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_tax_rate() {
        let mut config = valid_config();
        config.payouts.withholding_tax_rate = Decimal::from(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_sweep_interval() {
        let mut config = valid_config();
        config.payouts.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}

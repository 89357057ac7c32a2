//! Engine configuration.
//!
//! # Configuration Sources
//!
//! - Environment variables (prefixed with `DEALPOOL_`)
//! - Programmatic defaults via the builder
//!
//! # Example
//!
//! ```rust,ignore
//! use dealpool_core::config::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .default_commission_bps(1_000)
//!     .conflict_retries(1)
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::pricing::PositionSpread;
use crate::{Bps, DealPoolError, Result};

const DEFAULT_COMMISSION_BPS: u16 = 1_000;
const DEFAULT_CONFLICT_RETRIES: u32 = 1;
const MAX_CONFLICT_RETRIES: u32 = 10;

/// Platform-wide engine settings.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fallback commission when neither tier nor deal sets one.
    pub default_commission: Bps,

    /// Position-based price adjustment inside a tier.
    pub position_spread: PositionSpread,

    /// Storage-conflict retries per admission attempt.
    pub conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_commission: Bps::new(DEFAULT_COMMISSION_BPS).unwrap_or(Bps::ZERO),
            position_spread: PositionSpread::default(),
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Looks for variables prefixed with `DEALPOOL_`:
    /// - `DEALPOOL_DEFAULT_COMMISSION_BPS`
    /// - `DEALPOOL_FIRST_BUYER_DISCOUNT_BPS`
    /// - `DEALPOOL_LAST_BUYER_PREMIUM_BPS`
    /// - `DEALPOOL_CONFLICT_RETRIES`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("DEALPOOL_DEFAULT_COMMISSION_BPS") {
            let raw: u16 = v.parse().map_err(|e| {
                DealPoolError::ConfigError(format!("Invalid DEALPOOL_DEFAULT_COMMISSION_BPS: {e}"))
            })?;
            config.default_commission = Bps::new(raw)?;
        }

        if let Ok(v) = std::env::var("DEALPOOL_FIRST_BUYER_DISCOUNT_BPS") {
            let raw: u16 = v.parse().map_err(|e| {
                DealPoolError::ConfigError(format!(
                    "Invalid DEALPOOL_FIRST_BUYER_DISCOUNT_BPS: {e}"
                ))
            })?;
            config.position_spread.first_buyer_discount = Bps::new(raw)?;
        }

        if let Ok(v) = std::env::var("DEALPOOL_LAST_BUYER_PREMIUM_BPS") {
            let raw: u16 = v.parse().map_err(|e| {
                DealPoolError::ConfigError(format!("Invalid DEALPOOL_LAST_BUYER_PREMIUM_BPS: {e}"))
            })?;
            config.position_spread.last_buyer_premium = Bps::new(raw)?;
        }

        if let Ok(v) = std::env::var("DEALPOOL_CONFLICT_RETRIES") {
            config.conflict_retries = v.parse().map_err(|e| {
                DealPoolError::ConfigError(format!("Invalid DEALPOOL_CONFLICT_RETRIES: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration (eager; never reached at join time).
    pub fn validate(&self) -> Result<()> {
        if self.position_spread.first_buyer_discount == Bps::MAX {
            return Err(DealPoolError::ConfigError(
                "first_buyer_discount of 100% would zero the first price".into(),
            ));
        }
        if self.conflict_retries > MAX_CONFLICT_RETRIES {
            return Err(DealPoolError::ConfigError(format!(
                "conflict_retries must be <= {MAX_CONFLICT_RETRIES}"
            )));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Clone, Debug, Default)]
pub struct EngineConfigBuilder {
    default_commission_bps: Option<u16>,
    first_buyer_discount_bps: Option<u16>,
    last_buyer_premium_bps: Option<u16>,
    conflict_retries: Option<u32>,
}

impl EngineConfigBuilder {
    pub fn default_commission_bps(mut self, v: u16) -> Self {
        self.default_commission_bps = Some(v);
        self
    }

    pub fn first_buyer_discount_bps(mut self, v: u16) -> Self {
        self.first_buyer_discount_bps = Some(v);
        self
    }

    pub fn last_buyer_premium_bps(mut self, v: u16) -> Self {
        self.last_buyer_premium_bps = Some(v);
        self
    }

    pub fn conflict_retries(mut self, v: u32) -> Self {
        self.conflict_retries = Some(v);
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();
        if let Some(v) = self.default_commission_bps {
            config.default_commission = Bps::new(v)?;
        }
        if let Some(v) = self.first_buyer_discount_bps {
            config.position_spread.first_buyer_discount = Bps::new(v)?;
        }
        if let Some(v) = self.last_buyer_premium_bps {
            config.position_spread.last_buyer_premium = Bps::new(v)?;
        }
        if let Some(v) = self.conflict_retries {
            config.conflict_retries = v;
        }
        config.validate()?;
        Ok(config)
    }
}

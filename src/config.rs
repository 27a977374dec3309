//! Cart configuration

use clap::Args;
use rusty_money::{Findable, iso::Currency};
use thiserror::Error;

use crate::bundles::BundlePresets;

/// Default storage key for the guest cart.
pub const DEFAULT_STORAGE_KEY: &str = "storefront.cart";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configured currency code is not an ISO currency.
    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),
}

/// Cart engine settings.
#[derive(Debug, Clone, Args)]
pub struct CartConfig {
    /// Local storage key holding the guest cart
    #[arg(long, env = "CART_STORAGE_KEY", default_value = DEFAULT_STORAGE_KEY)]
    pub storage_key: String,

    /// ISO currency code all prices are expressed in
    #[arg(long, env = "CART_CURRENCY", default_value = "USD")]
    pub currency: String,

    /// Disable the fixed bundle presets used when no dynamic rule matches
    #[arg(long, env = "CART_DISABLE_PRESETS", default_value_t = false)]
    pub disable_presets: bool,

    /// Fixed discount per double bundle, in minor units
    #[arg(long, env = "CART_DOUBLE_DISCOUNT", default_value_t = 5_00)]
    pub double_discount: u64,

    /// Fixed discount per triple bundle, in minor units
    #[arg(long, env = "CART_TRIPLE_DISCOUNT", default_value_t = 15_00)]
    pub triple_discount: u64,
}

impl Default for CartConfig {
    fn default() -> Self {
        let presets = BundlePresets::default();

        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            currency: "USD".to_string(),
            disable_presets: false,
            double_discount: presets.double_discount,
            triple_discount: presets.triple_discount,
        }
    }
}

impl CartConfig {
    /// Resolve the configured currency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCurrency`] if the code is not recognised.
    pub fn currency(&self) -> Result<&'static Currency, ConfigError> {
        Currency::find(&self.currency.to_ascii_uppercase())
            .ok_or_else(|| ConfigError::UnknownCurrency(self.currency.clone()))
    }

    /// Preset table built from the configured amounts.
    #[must_use]
    pub fn presets(&self) -> BundlePresets {
        BundlePresets {
            double_discount: self.double_discount,
            triple_discount: self.triple_discount,
        }
    }

    /// Whether presets price lines that no dynamic rule covers.
    #[must_use]
    pub fn presets_enabled(&self) -> bool {
        !self.disable_presets
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Args)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "warn")]
    pub log_level: String,

    /// Log format (compact, json)
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{EUR, USD};
    use testresult::TestResult;

    use super::*;

    #[test]
    fn defaults_resolve() -> TestResult {
        let config = CartConfig::default();

        assert_eq!(config.currency()?, USD);
        assert_eq!(config.presets(), BundlePresets::default());
        assert!(config.presets_enabled());

        Ok(())
    }

    #[test]
    fn currency_codes_are_case_insensitive() -> TestResult {
        let config = CartConfig {
            currency: "eur".to_string(),
            ..CartConfig::default()
        };

        assert_eq!(config.currency()?, EUR);

        Ok(())
    }

    #[test]
    fn unknown_currency_is_rejected() {
        let config = CartConfig {
            currency: "XYZ".to_string(),
            ..CartConfig::default()
        };

        assert!(matches!(
            config.currency(),
            Err(ConfigError::UnknownCurrency(code)) if code == "XYZ"
        ));
    }
}

use crate::error::ConfigError;
use core_types::PolicyId;
use rust_decimal::Decimal;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    AiConfirmedParams, ApiConfig, Config, IndicatorParams, LoggingConfig, MarginPolicy,
    MeanReversionParams, PersistenceConfig, RegimeSwitchParams, RiskManagement, Scheduler,
    StopPolicy, StrategyConfig, TrendFollowingParams, Trading, Universe,
};

/// Environment variable prefix for overriding any configuration key,
/// e.g. `FUTSIM__SCHEDULER__WORKER_POOL_SIZE=8`.
pub const ENV_PREFIX: &str = "FUTSIM";

/// Upper bound for `scheduler.cooldown_secs`: one year.
pub const MAX_COOLDOWN_SECS: u64 = 365 * 24 * 60 * 60;

/// Loads the application configuration from the given TOML file.
///
/// The file is required; environment variables with the `FUTSIM__` prefix are
/// layered on top. The Gemini key falls back to `GEMINI_API_KEY`. The result is
/// validated before it is returned, so a successful load is safe to run with.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut config = builder.try_deserialize::<Config>()?;

    if config.api.gemini_api_key.is_none() {
        config.api.gemini_api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
    }

    config.validate()?;
    Ok(config)
}

impl Config {
    /// Rejects parameter combinations the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.trading.initial_balance <= Decimal::ZERO {
            return invalid("trading.initial_balance must be greater than 0");
        }
        if self.trading.leverage <= Decimal::ZERO {
            return invalid("trading.leverage must be greater than 0");
        }
        if self.trading.taker_fee_rate.is_sign_negative() {
            return invalid("trading.taker_fee_rate cannot be negative");
        }
        if self.scheduler.worker_pool_size == 0 {
            return invalid("scheduler.worker_pool_size must be at least 1");
        }
        if self.scheduler.cycle_interval_secs == 0 {
            return invalid("scheduler.cycle_interval_secs must be at least 1");
        }
        if self.scheduler.idle_interval_secs == 0 {
            return invalid("scheduler.idle_interval_secs must be at least 1");
        }
        if self.scheduler.cooldown_secs > MAX_COOLDOWN_SECS {
            return invalid("scheduler.cooldown_secs cannot exceed one year");
        }
        if self.scheduler.max_open_positions == Some(0) {
            return invalid("scheduler.max_open_positions must be at least 1 when set");
        }
        if self.strategy.interval.trim().is_empty() {
            return invalid("strategy.interval cannot be empty");
        }
        if self.strategy.history_limit == 0 {
            return invalid("strategy.history_limit must be at least 1");
        }
        let required = self.strategy.required_bars();
        if self.strategy.history_limit < required {
            return Err(ConfigError::ValidationError(format!(
                "strategy.history_limit is {} but the {} policy needs at least {} bars",
                self.strategy.history_limit, self.strategy.policy, required
            )));
        }
        if self.strategy.policy == PolicyId::AiConfirmed && self.api.gemini_api_key.is_none() {
            return Err(ConfigError::MissingSecret("GEMINI_API_KEY".to_string()));
        }
        Ok(())
    }
}

impl StrategyConfig {
    /// Bars the selected policy needs before it can emit anything but HOLD.
    pub fn required_bars(&self) -> usize {
        match self.policy {
            PolicyId::TrendFollowing => self.trend_following.min_bars,
            PolicyId::MeanReversion => self.mean_reversion.min_bars,
            PolicyId::RegimeSwitch => self
                .trend_following
                .min_bars
                .max(self.mean_reversion.min_bars)
                .max(2 * self.indicators.adx_period),
            PolicyId::AiConfirmed => self.ai_confirmed.min_bars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [trading]
        initial_balance = 10.0
        leverage = 5
        taker_fee_rate = 0.00055

        [risk_management.margin]
        mode = "fixed"
        amount = 1.0

        [risk_management.stops]
        mode = "fixed_pct"
        stop_loss_pct = 0.0012
        take_profit_pct = 0.004
    "#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_file_gets_defaults_for_optional_sections() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.trading.leverage, dec!(5));
        assert_eq!(config.risk_management.margin, MarginPolicy::Fixed { amount: dec!(1.0) });
        assert_eq!(config.scheduler.worker_pool_size, 5);
        assert_eq!(config.strategy.policy, PolicyId::TrendFollowing);
        assert_eq!(config.universe.quote_suffix, "USDT");
    }

    #[test]
    fn tagged_stop_policies_deserialize() {
        let contents = MINIMAL.replace(
            "mode = \"fixed_pct\"\n        stop_loss_pct = 0.0012\n        take_profit_pct = 0.004",
            "mode = \"atr\"\n        atr_sl_multiplier = 1.5\n        atr_tp_multiplier = 3.0",
        );
        let file = write_config(&contents);
        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config.risk_management.stops,
            StopPolicy::Atr { atr_sl_multiplier: dec!(1.5), atr_tp_multiplier: dec!(3.0) }
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = load_config(Path::new("definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn zero_workers_fail_validation() {
        let file = write_config(&format!("{MINIMAL}\n[scheduler]\nworker_pool_size = 0\n"));
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn zero_idle_interval_fails_validation() {
        let file = write_config(&format!("{MINIMAL}\n[scheduler]\nidle_interval_secs = 0\n"));
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("idle_interval_secs")));
    }

    #[test]
    fn oversized_cooldown_fails_validation() {
        let file = write_config(&format!("{MINIMAL}\n[scheduler]\ncooldown_secs = {}\n", i64::MAX));
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("cooldown_secs")));
    }

    #[test]
    fn history_shorter_than_policy_warmup_fails_validation() {
        let file = write_config(&format!(
            "{MINIMAL}\n[strategy]\npolicy = \"mean_reversion\"\nhistory_limit = 49\n"
        ));
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("at least 50 bars")));
    }

    #[test]
    fn regime_switch_needs_the_longest_warmup() {
        let mut strategy = StrategyConfig { policy: PolicyId::RegimeSwitch, ..StrategyConfig::default() };
        assert_eq!(strategy.required_bars(), 50);
        strategy.indicators.adx_period = 40;
        assert_eq!(strategy.required_bars(), 80);
    }
}

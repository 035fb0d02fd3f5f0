use core_types::PolicyId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub trading: Trading,
    pub risk_management: RiskManagement,
    #[serde(default)]
    pub scheduler: Scheduler,
    #[serde(default)]
    pub universe: Universe,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Account-level parameters of the virtual futures account.
#[derive(Debug, Clone, Deserialize)]
pub struct Trading {
    /// Margin balance used when no persisted state exists yet.
    pub initial_balance: Decimal,
    /// Multiplier from committed margin to position notional.
    pub leverage: Decimal,
    /// Taker fee charged on both entry and exit notional. 0.00055 corresponds to 0.055%.
    pub taker_fee_rate: Decimal,
}

/// Contains parameters for trade-level risk management.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskManagement {
    pub margin: MarginPolicy,
    pub stops: StopPolicy,
}

/// How much margin a single new position commits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MarginPolicy {
    /// The same amount on every trade.
    Fixed { amount: Decimal },
    /// A fraction of the current free balance, never less than `floor`.
    FractionOfBalance { fraction: Decimal, floor: Decimal },
}

/// How the stop-loss and take-profit levels of a new position are placed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StopPolicy {
    /// Fixed fractional offsets from the entry price.
    FixedPct {
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
    },
    /// Offsets expressed as multiples of the Average True Range at entry.
    Atr {
        atr_sl_multiplier: Decimal,
        atr_tp_multiplier: Decimal,
    },
    /// Fixed offsets where the stop additionally ratchets behind the price by `trail_pct`.
    Trailing {
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
        trail_pct: Decimal,
    },
}

/// Timing and concurrency of the decision loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    /// Sleep between two full cycles.
    pub cycle_interval_secs: u64,
    /// Sleep when a cycle found nothing to evaluate.
    pub idle_interval_secs: u64,
    /// Upper bound on concurrent policy evaluations.
    pub worker_pool_size: usize,
    /// When reached, the loop only monitors already-open symbols.
    pub max_open_positions: Option<usize>,
    /// Minimum time between two decisions on the same symbol.
    pub cooldown_secs: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 6,
            idle_interval_secs: 60,
            worker_pool_size: 5,
            max_open_positions: Some(8),
            cooldown_secs: 120,
        }
    }
}

/// Filters that turn the exchange-wide ticker list into a candidate set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Universe {
    pub quote_suffix: String,
    pub excluded_substrings: Vec<String>,
    pub min_turnover_24h: Decimal,
    pub min_price: Decimal,
    pub max_price: Option<Decimal>,
    /// Sort candidates by absolute 24h change before applying `max_candidates`.
    pub rank_by_volatility: bool,
    pub max_candidates: Option<usize>,
}

impl Default for Universe {
    fn default() -> Self {
        Self {
            quote_suffix: "USDT".to_string(),
            excluded_substrings: vec!["CUSDT".to_string(), "TUSD".to_string(), "USDC".to_string()],
            min_turnover_24h: dec!(100000),
            min_price: dec!(0.1),
            max_price: None,
            rank_by_volatility: false,
            max_candidates: None,
        }
    }
}

/// Selects the signal policy and carries the parameter sets for all of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub policy: PolicyId,
    /// Kline interval requested from the exchange (Bybit notation, e.g. "1", "15", "60").
    pub interval: String,
    /// Number of bars fetched per evaluation.
    pub history_limit: usize,
    pub indicators: IndicatorParams,
    pub trend_following: TrendFollowingParams,
    pub mean_reversion: MeanReversionParams,
    pub regime_switch: RegimeSwitchParams,
    pub ai_confirmed: AiConfirmedParams,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            policy: PolicyId::TrendFollowing,
            interval: "1".to_string(),
            history_limit: 100,
            indicators: IndicatorParams::default(),
            trend_following: TrendFollowingParams::default(),
            mean_reversion: MeanReversionParams::default(),
            regime_switch: RegimeSwitchParams::default(),
            ai_confirmed: AiConfirmedParams::default(),
        }
    }
}

/// Lookback windows for the indicator engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub sma_period: usize,
    /// Bars averaged (excluding the latest) for the volume filter.
    pub volume_lookback: usize,
    /// Bars scanned for recent support and resistance.
    pub swing_lookback: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            atr_period: 14,
            adx_period: 14,
            bb_period: 20,
            bb_std_dev: 2.0,
            ema_fast_period: 8,
            ema_slow_period: 21,
            sma_period: 50,
            volume_lookback: 9,
            swing_lookback: 10,
        }
    }
}

/// Parameters for the EMA trend + volume + reversal-candle policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendFollowingParams {
    pub min_bars: usize,
    /// Current volume must be at least this multiple of the recent average.
    pub volume_factor: f64,
    /// Minimum candle body as a fraction of the candle range.
    pub body_ratio: f64,
    /// How close (fractionally) the candle extreme must come to support/resistance.
    pub level_tolerance: f64,
}

impl Default for TrendFollowingParams {
    fn default() -> Self {
        Self {
            min_bars: 30,
            volume_factor: 0.8,
            body_ratio: 0.6,
            level_tolerance: 0.001,
        }
    }
}

/// Parameters for the Bollinger Band + RSI mean-reversion policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeanReversionParams {
    pub min_bars: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for MeanReversionParams {
    fn default() -> Self {
        Self {
            min_bars: 50,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

/// ADX thresholds that decide which sub-policy the regime switch delegates to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegimeSwitchParams {
    pub adx_trend_threshold: f64,
    pub adx_range_threshold: f64,
}

impl Default for RegimeSwitchParams {
    fn default() -> Self {
        Self {
            adx_trend_threshold: 25.0,
            adx_range_threshold: 20.0,
        }
    }
}

/// Parameters for the technically pre-filtered, model-confirmed policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfirmedParams {
    pub min_bars: usize,
    /// RSI at or below this flags a long candidate.
    pub prefilter_rsi_low: f64,
    /// RSI at or above this flags a short candidate.
    pub prefilter_rsi_high: f64,
    /// The model's score lies in [-100, 100]; entries need |score| >= this.
    pub confidence_threshold: f64,
}

impl Default for AiConfirmedParams {
    fn default() -> Self {
        Self {
            min_bars: 50,
            prefilter_rsi_low: 35.0,
            prefilter_rsi_high: 65.0,
            confidence_threshold: 70.0,
        }
    }
}

/// Endpoints and timeouts of the external collaborators.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bybit_base_url: String,
    /// Bybit product category, "linear" for USDT perpetuals.
    pub category: String,
    pub request_timeout_secs: u64,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub reasoning_timeout_secs: u64,
    /// Filled from `GEMINI_API_KEY` when not set explicitly.
    pub gemini_api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bybit_base_url: "https://api.bybit.com".to_string(),
            category: "linear".to_string(),
            request_timeout_secs: 20,
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            gemini_model: "gemini-1.5-flash-latest".to_string(),
            reasoning_timeout_secs: 30,
            gemini_api_key: None,
        }
    }
}

/// Where the ledger state and trade log live on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub data_dir: PathBuf,
    pub status_file: String,
    pub positions_file: String,
    pub trade_log_file: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            status_file: "status.json".to_string(),
            positions_file: "positions.csv".to_string(),
            trade_log_file: "trade_log.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Directory for the daily rolling log file. No file output when absent.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: Some(PathBuf::from("logs")),
            file_prefix: "futures-sim.log".to_string(),
        }
    }
}

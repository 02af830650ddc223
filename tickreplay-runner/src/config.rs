//! TOML backtest configuration.
//!
//! One file describes one asset and the strategy instances that trade it:
//!
//! ```toml
//! tick_dir = "data/ticks"
//! output_dir = "output"
//!
//! [asset]
//! symbol = "BTCUSDT"
//! source = "binance"
//!
//! [[strategies]]
//! id = "ema-cross"
//! kind = { type = "ema_crossover", timeframe = "1h", fast = 5, slow = 20, volume = 0.1 }
//!
//! [strategies.orderbook]
//! allocation = 10000.0
//! leverage = 3.0
//! ```
//!
//! Validation is eager: a config that loads is a config that runs.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use tickreplay_core::domain::Timeframe;
use tickreplay_core::indicators::IndicatorSpec;
use tickreplay_core::orderbook::{OrderbookConfig, OrderbookError};
use tickreplay_core::strategy::{StrategyConfig, TimeframeConfig};

/// Deterministic identifier of a session (BLAKE3 over config and date range).
pub type SessionId = String;

/// Errors raised while loading or validating a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("asset symbol is empty")]
    MissingSymbol,

    #[error("no strategies configured")]
    NoStrategies,

    #[error("duplicate strategy id '{0}'")]
    DuplicateStrategy(String),

    #[error("strategy '{id}': {source}")]
    Orderbook { id: String, source: OrderbookError },

    #[error("strategy '{id}': {reason}")]
    InvalidStrategy { id: String, reason: String },

    #[error("queue capacity must be positive")]
    ZeroQueueCapacity,

    #[error("empty date range: {from} is after {to}")]
    EmptyRange { from: NaiveDate, to: NaiveDate },

    #[error("failed to fingerprint config: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

// ── Config types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub asset: AssetConfig,

    /// Root of the tick store.
    #[serde(default = "default_tick_dir")]
    pub tick_dir: PathBuf,

    /// Where the persistence worker writes its JSONL repositories.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Bound of every worker queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Source of one-minute klines for tick restore.
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,

    #[serde(default)]
    pub strategies: Vec<StrategyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayConfig {
    /// A directory of `{SYMBOL}_{timeframe}.csv` kline exports.
    Csv { dir: PathBuf },
}

/// One strategy instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEntry {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub kind: StrategyKind,
    pub orderbook: OrderbookConfig,
    /// Extra timeframes and indicators beyond those the kind needs.
    #[serde(default)]
    pub timeframes: Vec<TimeframeConfig>,
}

/// Built-in strategies and their parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyKind {
    /// Long when the fast EMA closes above the slow one, flat otherwise.
    EmaCrossover {
        timeframe: Timeframe,
        fast: usize,
        slow: usize,
        volume: f64,
        #[serde(default)]
        take_profit_pct: Option<f64>,
        #[serde(default)]
        stop_loss_pct: Option<f64>,
    },

    /// Buy once on the first tick and hold to the end.
    BuyAndHold { volume: f64 },
}

/// Indicator keys the EMA crossover reads.
pub const EMA_FAST_KEY: &str = "ema_fast";
pub const EMA_SLOW_KEY: &str = "ema_slow";

fn default_tick_dir() -> PathBuf {
    PathBuf::from("data/ticks")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_source() -> String {
    "binance".to_string()
}

fn default_enabled() -> bool {
    true
}

// ── Loading and validation ───────────────────────────────────────────

impl BacktestConfig {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asset.symbol.trim().is_empty() {
            return Err(ConfigError::MissingSymbol);
        }
        if self.strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        let mut seen = HashSet::new();
        for entry in &self.strategies {
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::DuplicateStrategy(entry.id.clone()));
            }
            entry.validate()?;
        }
        Ok(())
    }

    pub fn enabled_strategies(&self) -> impl Iterator<Item = &StrategyEntry> + '_ {
        self.strategies.iter().filter(|s| s.enabled)
    }

    /// Stable id for a run of this config over `range`.
    ///
    /// Two sessions with identical configs and dates share an id, so their
    /// output can be compared or deduplicated.
    pub fn session_id(&self, range: &DateRange) -> Result<SessionId, ConfigError> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&serde_json::to_vec(self)?);
        hasher.update(range.from.to_string().as_bytes());
        hasher.update(range.to.to_string().as_bytes());
        Ok(hasher.finalize().to_hex().to_string())
    }
}

impl StrategyEntry {
    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidStrategy {
            id: self.id.clone(),
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(self.invalid("id is empty"));
        }
        self.orderbook
            .validate()
            .map_err(|source| ConfigError::Orderbook {
                id: self.id.clone(),
                source,
            })?;

        match &self.kind {
            StrategyKind::EmaCrossover {
                fast,
                slow,
                volume,
                take_profit_pct,
                stop_loss_pct,
                ..
            } => {
                if *fast == 0 || *slow == 0 {
                    return Err(self.invalid("EMA periods must be positive"));
                }
                if fast >= slow {
                    return Err(self.invalid(format!(
                        "fast period {fast} must be shorter than slow period {slow}"
                    )));
                }
                check_volume(self, *volume)?;
                for pct in [take_profit_pct, stop_loss_pct].into_iter().flatten() {
                    if !(pct.is_finite() && *pct > 0.0) {
                        return Err(self.invalid(format!("TP/SL percentage {pct} must be positive")));
                    }
                }
            }
            StrategyKind::BuyAndHold { volume } => check_volume(self, *volume)?,
        }

        for tf in &self.timeframes {
            if tf.indicators.iter().any(|spec| spec.window() == 0) {
                return Err(self.invalid(format!("indicator window on {} is zero", tf.timeframe)));
            }
        }
        Ok(())
    }

    /// Core strategy config with the indicators the kind depends on registered.
    pub fn to_strategy_config(&self, asset: &AssetConfig) -> StrategyConfig {
        let mut config = StrategyConfig::new(&self.id, &asset.symbol, self.orderbook.clone());
        config.source = asset.source.clone();
        config.enabled = self.enabled;
        config.timeframes = self.timeframes.clone();

        if let StrategyKind::EmaCrossover {
            timeframe,
            fast,
            slow,
            ..
        } = &self.kind
        {
            let fast = IndicatorSpec::Ema {
                period: *fast,
                key: Some(EMA_FAST_KEY.to_string()),
            };
            let slow = IndicatorSpec::Ema {
                period: *slow,
                key: Some(EMA_SLOW_KEY.to_string()),
            };
            match config.timeframes.iter_mut().find(|t| t.timeframe == *timeframe) {
                Some(tf) => tf.indicators.extend([fast, slow]),
                None => config.timeframes.push(
                    TimeframeConfig::new(*timeframe)
                        .with_indicator(fast)
                        .with_indicator(slow),
                ),
            }
        }
        config
    }
}

fn check_volume(entry: &StrategyEntry, volume: f64) -> Result<(), ConfigError> {
    if volume.is_finite() && volume > 0.0 {
        Ok(())
    } else {
        Err(entry.invalid(format!("order volume {volume} must be positive")))
    }
}

// ── Date range ───────────────────────────────────────────────────────

/// Inclusive range of whole UTC days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ConfigError> {
        if from > to {
            return Err(ConfigError::EmptyRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// Midnight opening `from`.
    pub fn start(&self) -> DateTime<Utc> {
        self.from.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Last second of `to`.
    pub fn end(&self) -> DateTime<Utc> {
        self.to.and_time(chrono::NaiveTime::MIN).and_utc() + Duration::days(1) - Duration::seconds(1)
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// One-minute ticks a gap-free store holds for this range.
    pub fn expected_minutes(&self) -> i64 {
        self.days() * 24 * 60
    }
}

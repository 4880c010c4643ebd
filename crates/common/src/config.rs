use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::models::FillPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/bridge.toml";
const ENV_PREFIX: &str = "BRIDGE_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid URL in {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        source: url::ParseError,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which actionability rule the poller applies to fetched signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// STRONG signals whose reason mentions the keyword.
    StrongKeyword,
    /// Complete signals newer than the last one traded.
    FreshSignal,
}

impl FilterMode {
    pub fn default_order_profile(self) -> OrderProfile {
        match self {
            Self::StrongKeyword => OrderProfile {
                deviation: 20,
                magic: 123_456,
                comment: "Auto_{action}_Doji".to_string(),
                filling: FillPolicy::Ioc,
                attach_stops: false,
            },
            Self::FreshSignal => OrderProfile {
                deviation: 20,
                magic: 20_230_803,
                comment: "v0_AI_Signal".to_string(),
                filling: FillPolicy::Fok,
                attach_stops: true,
            },
        }
    }

    pub fn default_sizing(self) -> SizingConfig {
        match self {
            Self::StrongKeyword => SizingConfig {
                default_volume: DEFAULT_VOLUME,
                default_formula: Some(VolumeFormula::new(0.01, 100_000.0)),
                formulas: HashMap::from([(
                    "EURUSD".to_string(),
                    VolumeFormula::new(0.01, 10_000.0),
                )]),
            },
            Self::FreshSignal => SizingConfig {
                default_volume: DEFAULT_VOLUME,
                default_formula: None,
                formulas: HashMap::from([
                    ("BTCUSDT".to_string(), VolumeFormula::new(0.4, 218.0)),
                    ("EURUSDT".to_string(), VolumeFormula::new(0.4, 55.0)),
                ]),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub signal: SignalConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    pub strategy: StrategyConfig,
    /// Replaces the mode's order defaults as a whole.
    #[serde(default)]
    pub order: Option<OrderProfile>,
    /// Replaces the mode's sizing defaults as a whole.
    #[serde(default)]
    pub sizing: Option<SizingConfig>,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    pub fn order_profile(&self) -> OrderProfile {
        self.order
            .clone()
            .unwrap_or_else(|| self.strategy.mode.default_order_profile())
    }

    pub fn sizing(&self) -> SizingConfig {
        self.sizing
            .clone()
            .unwrap_or_else(|| self.strategy.mode.default_sizing())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.signal.url).map_err(|source| ConfigError::InvalidUrl {
            field: "signal.url",
            source,
        })?;

        if self.terminal.kind == TerminalKind::Bridge {
            let url = self.terminal.url.as_deref().ok_or_else(|| {
                ConfigError::Invalid("terminal.url is required for the bridge terminal".into())
            })?;
            Url::parse(url).map_err(|source| ConfigError::InvalidUrl {
                field: "terminal.url",
                source,
            })?;
        }

        if let Some(file) = &self.logging.file
            && file.file_name().is_none()
        {
            return Err(ConfigError::Invalid(format!(
                "logging.file {} does not name a file",
                file.display()
            )));
        }

        if self.signal.poll_interval_secs == 0 || self.monitor.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll intervals must be at least one second".into(),
            ));
        }

        let sizing = self.sizing();
        let bad_formula = sizing
            .formulas
            .iter()
            .map(|(symbol, formula)| (symbol.as_str(), formula))
            .chain(sizing.default_formula.as_ref().map(|f| ("default", f)))
            .find(|(_, formula)| formula.divisor == 0.0 || !formula.divisor.is_finite());
        if let Some((symbol, _)) = bad_formula {
            return Err(ConfigError::Invalid(format!(
                "sizing formula for {} needs a finite non-zero divisor",
                symbol
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

impl SignalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_min_profit")]
    pub min_profit: f64,
    #[serde(default = "default_min_profit_pct")]
    pub min_profit_pct: f64,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
            error_backoff_secs: default_error_backoff(),
            min_profit: default_min_profit(),
            min_profit_pct: default_min_profit_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub mode: FilterMode,
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default = "default_symbol")]
    pub default_symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderProfile {
    pub deviation: u32,
    pub magic: u64,
    /// `{action}` expands to BUY or SELL.
    pub comment: String,
    pub filling: FillPolicy,
    #[serde(default)]
    pub attach_stops: bool,
}

impl OrderProfile {
    pub fn comment_for(&self, action: &str) -> String {
        self.comment.replace("{action}", action)
    }
}

pub const DEFAULT_VOLUME: f64 = 0.01;

/// `coefficient * balance / divisor`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeFormula {
    pub coefficient: f64,
    pub divisor: f64,
}

impl VolumeFormula {
    pub const fn new(coefficient: f64, divisor: f64) -> Self {
        Self {
            coefficient,
            divisor,
        }
    }

    pub fn apply(&self, balance: f64) -> f64 {
        self.coefficient * balance / self.divisor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f64,
    #[serde(default)]
    pub default_formula: Option<VolumeFormula>,
    #[serde(default)]
    pub formulas: HashMap<String, VolumeFormula>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    #[default]
    Paper,
    Bridge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default)]
    pub kind: TerminalKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub paper: PaperConfig,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            kind: TerminalKind::default(),
            url: None,
            api_key: None,
            api_secret: None,
            timeout_secs: default_request_timeout(),
            paper: PaperConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub login: u64,
    pub server: String,
    pub balance: f64,
    pub symbols: HashMap<String, PaperSymbol>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperSymbol {
    pub price: f64,
    #[serde(default)]
    pub spread: f64,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    #[serde(default = "default_contract_size")]
    pub contract_size: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        let fx = |price| PaperSymbol {
            price,
            spread: 0.0002,
            volume_min: 0.01,
            volume_max: 100.0,
            volume_step: 0.01,
            contract_size: 100_000.0,
        };
        Self {
            login: 1,
            server: "Paper-Demo".to_string(),
            balance: 10_000.0,
            symbols: HashMap::from([
                ("EURUSD".to_string(), fx(1.0850)),
                ("EURUSDT".to_string(), fx(1.0850)),
                (
                    "BTCUSDT".to_string(),
                    PaperSymbol {
                        price: 64_000.0,
                        spread: 10.0,
                        volume_min: 0.01,
                        volume_max: 100.0,
                        volume_step: 0.01,
                        contract_size: 1.0,
                    },
                ),
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also append log lines to this file. Stdout only when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_error_backoff() -> u64 {
    30
}

fn default_monitor_interval() -> u64 {
    10
}

fn default_min_profit() -> f64 {
    1.0
}

fn default_min_profit_pct() -> f64 {
    20.0
}

fn default_keyword() -> String {
    "doji".to_string()
}

fn default_symbol() -> String {
    "EURUSD".to_string()
}

fn default_volume() -> f64 {
    DEFAULT_VOLUME
}

fn default_contract_size() -> f64 {
    1.0
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the TOML file named by `BRIDGE_CONFIG` (or the default path), then applies
    /// `BRIDGE_*` env overrides.
    pub fn load() -> Result<BridgeConfig, ConfigError> {
        let path = env::var("BRIDGE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<BridgeConfig, ConfigError> {
        let config: BridgeConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const MINIMAL: &str = r#"
        [signal]
        url = "http://localhost:3000/api/signals"

        [strategy]
        mode = "fresh_signal"
    "#;

    #[test]
    fn minimal_file_gets_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("bridge.toml", MINIMAL)?;

            let config = ConfigLoader::load_from("bridge.toml").map_err(|e| e.to_string())?;

            assert_eq!(config.signal.poll_interval_secs, 5);
            assert_eq!(config.signal.request_timeout_secs, 10);
            assert_eq!(config.monitor.interval_secs, 10);
            assert_eq!(config.monitor.error_backoff_secs, 30);
            assert_eq!(config.monitor.min_profit, 1.0);
            assert_eq!(config.monitor.min_profit_pct, 20.0);
            assert_eq!(config.terminal.kind, TerminalKind::Paper);
            assert!(config.telegram.is_none());
            assert!(config.logging.file.is_none());

            let order = config.order_profile();
            assert_eq!(order.magic, 20_230_803);
            assert_eq!(order.filling, FillPolicy::Fok);
            assert!(order.attach_stops);

            let sizing = config.sizing();
            assert_eq!(sizing.formulas["BTCUSDT"], VolumeFormula::new(0.4, 218.0));
            assert!(sizing.default_formula.is_none());
            Ok(())
        });
    }

    #[test]
    fn mode_is_required() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bridge.toml",
                r#"
                [signal]
                url = "http://localhost:3000/api/signals"

                [strategy]
                keyword = "doji"
                "#,
            )?;

            let err = ConfigLoader::load_from("bridge.toml").unwrap_err();
            assert!(err.to_string().contains("mode"), "unexpected error: {}", err);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_nested_keys() {
        Jail::expect_with(|jail| {
            jail.create_file("bridge.toml", MINIMAL)?;
            jail.set_env("BRIDGE_SIGNAL__URL", "https://signals.example.com/api/trading-signals");
            jail.set_env("BRIDGE_SIGNAL__POLL_INTERVAL_SECS", "2");
            jail.set_env("BRIDGE_STRATEGY__MODE", "strong_keyword");

            let config = ConfigLoader::load_from("bridge.toml").map_err(|e| e.to_string())?;

            assert_eq!(
                config.signal.url,
                "https://signals.example.com/api/trading-signals"
            );
            assert_eq!(config.signal.poll_interval(), Duration::from_secs(2));
            assert_eq!(config.strategy.mode, FilterMode::StrongKeyword);
            assert_eq!(config.order_profile().comment_for("SELL"), "Auto_SELL_Doji");
            Ok(())
        });
    }

    #[test]
    fn explicit_order_section_replaces_mode_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bridge.toml",
                r#"
                [signal]
                url = "http://localhost:3000/api/signals"

                [strategy]
                mode = "strong_keyword"

                [order]
                deviation = 5
                magic = 42
                comment = "manual"
                filling = "return"
                "#,
            )?;

            let config = ConfigLoader::load_from("bridge.toml").map_err(|e| e.to_string())?;
            let order = config.order_profile();

            assert_eq!(order.deviation, 5);
            assert_eq!(order.magic, 42);
            assert_eq!(order.filling, FillPolicy::Return);
            assert!(!order.attach_stops);
            Ok(())
        });
    }

    #[test]
    fn bridge_terminal_needs_url() {
        Jail::expect_with(|jail| {
            jail.create_file("bridge.toml", MINIMAL)?;
            jail.set_env("BRIDGE_TERMINAL__KIND", "bridge");

            let err = ConfigLoader::load_from("bridge.toml").unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn rejects_malformed_signal_url() {
        Jail::expect_with(|jail| {
            jail.create_file("bridge.toml", MINIMAL)?;
            jail.set_env("BRIDGE_SIGNAL__URL", "not a url");

            let err = ConfigLoader::load_from("bridge.toml").unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidUrl {
                    field: "signal.url",
                    ..
                }
            ));
            Ok(())
        });
    }

    #[test]
    fn log_file_from_toml_or_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bridge.toml",
                &format!("{}\n[logging]\nfile = \"logs/bridge.log\"\n", MINIMAL),
            )?;

            let config = ConfigLoader::load_from("bridge.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.logging.file, Some(PathBuf::from("logs/bridge.log")));

            jail.set_env("BRIDGE_LOGGING__FILE", "/var/log/bridge.log");
            let config = ConfigLoader::load_from("bridge.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/bridge.log")));
            Ok(())
        });
    }

    #[test]
    fn log_file_must_name_a_file() {
        Jail::expect_with(|jail| {
            jail.create_file("bridge.toml", MINIMAL)?;
            jail.set_env("BRIDGE_LOGGING__FILE", "logs/..");

            let err = ConfigLoader::load_from("bridge.toml").unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn formula_applies_linearly() {
        let formula = VolumeFormula::new(0.4, 218.0);
        assert!((formula.apply(10_000.0) - 18.348_623_853_211_01).abs() < 1e-9);
    }
}

use anyhow::Result;
use figment::{providers::{Env, Format, Serialized, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 300,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// View or table with (date, category, region, quantity)
    pub history_relation: String,
    /// Table replaced on every refresh
    pub forecast_relation: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/warehouse".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            history_relation: "analytics.ml_daily_demand_category_region".to_string(),
            forecast_relation: "analytics.demand_forecast_15d".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub default_horizon: u32,
    pub default_lookback_days: u32,
    pub max_horizon: u32,
    pub max_lookback_days: u32,
    /// Blocking tasks used for the per-series walks
    pub workers: usize,
    /// Background refresh interval; 0 disables it
    #[serde(default)]
    pub refresh_every_minutes: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_horizon: 15,
            default_lookback_days: 365,
            max_horizon: 366,
            max_lookback_days: 3650,
            workers: 4,
            refresh_every_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// JSON artifact of the pre-trained model
    pub path: PathBuf,
    /// Overrides the identifier derived from the artifact metadata
    #[serde(default)]
    pub identifier: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("saved_model/best_model.json"),
            identifier: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("DEMAND__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Self = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let f = &self.forecast;
        if f.default_horizon == 0 || f.default_horizon > f.max_horizon {
            anyhow::bail!(
                "forecast.default_horizon must be within 1..={}, got {}",
                f.max_horizon,
                f.default_horizon
            );
        }
        if f.default_lookback_days == 0 || f.default_lookback_days > f.max_lookback_days {
            anyhow::bail!(
                "forecast.default_lookback_days must be within 1..={}, got {}",
                f.max_lookback_days,
                f.default_lookback_days
            );
        }
        if f.workers == 0 {
            anyhow::bail!("forecast.workers must be at least 1");
        }
        Ok(())
    }
}

use crate::engine::EngineSettings;
use crate::feed::synthetic::SyntheticFeedConfig;
use crate::hotspot::{SeverityThresholds, ThresholdTable};
use crate::reading::GeoPoint;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_FEED_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_INGEST_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub engine: Option<EngineSection>,
    #[serde(default)]
    pub thresholds: Option<ThresholdsSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub feed: Option<FeedSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSection {
    /// Rolling window / rollover bucket length in seconds (default: 24 h)
    pub window_secs: Option<u64>,
    /// Snapshot cadence in seconds (default: 10)
    pub tick_interval_secs: Option<u64>,
    /// Relative delta below which a trend reads stable (default: 0.01)
    pub trend_epsilon: Option<f64>,
    /// Tolerated out-of-order slack in seconds (default: 5)
    pub clock_skew_secs: Option<u64>,
    /// Evict entities idle for this many seconds (default: 3 window lengths)
    pub idle_eviction_secs: Option<u64>,
    pub ingest_queue_capacity: Option<usize>,
    pub snapshot_stream_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdsSection {
    #[serde(default)]
    pub co: Option<ThresholdBand>,
    #[serde(default)]
    pub co2: Option<ThresholdBand>,
}

/// Severity band boundaries in ppm; values at or above `high` are critical.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ThresholdBand {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedSection {
    /// Drive the engine from the built-in simulator (default: true)
    pub synthetic: Option<bool>,
    pub poll_interval_ms: Option<u64>,
    pub vehicles: Option<usize>,
    pub center_lat: Option<f64>,
    pub center_lng: Option<f64>,
    pub spread: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Engine policies with defaults filled in for anything the file omits.
    pub fn engine_settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        let section = self.engine.as_ref();

        let window = section
            .and_then(|s| s.window_secs)
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(defaults.window);
        let idle_eviction = section
            .and_then(|s| s.idle_eviction_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| window * 3);

        EngineSettings {
            window,
            tick_interval: section
                .and_then(|s| s.tick_interval_secs)
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(defaults.tick_interval),
            trend_epsilon: section
                .and_then(|s| s.trend_epsilon)
                .unwrap_or(defaults.trend_epsilon),
            skew_tolerance: section
                .and_then(|s| s.clock_skew_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.skew_tolerance),
            idle_eviction,
            thresholds: self.threshold_table(),
            snapshot_stream_capacity: section
                .and_then(|s| s.snapshot_stream_capacity)
                .unwrap_or(defaults.snapshot_stream_capacity),
        }
    }

    pub fn threshold_table(&self) -> ThresholdTable {
        let defaults = ThresholdTable::default();
        let band = |band: Option<ThresholdBand>, default: SeverityThresholds| {
            band.map(|band| SeverityThresholds {
                low: band.low,
                high: band.high,
            })
            .unwrap_or(default)
        };
        match &self.thresholds {
            Some(section) => ThresholdTable {
                co: band(section.co, defaults.co),
                co2: band(section.co2, defaults.co2),
            },
            None => defaults,
        }
    }

    pub fn ingest_queue_capacity(&self) -> usize {
        self.engine
            .as_ref()
            .and_then(|s| s.ingest_queue_capacity)
            .unwrap_or(DEFAULT_INGEST_QUEUE_CAPACITY)
            .max(1)
    }

    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn feed_poll_interval(&self) -> Duration {
        let ms = self
            .feed
            .as_ref()
            .and_then(|s| s.poll_interval_ms)
            .unwrap_or(DEFAULT_FEED_POLL_INTERVAL_MS);
        Duration::from_millis(ms.max(1))
    }

    /// Simulator settings when the synthetic feed is enabled (the default:
    /// without live sensors attached there is nothing else to ingest).
    pub fn synthetic_feed(&self) -> Option<SyntheticFeedConfig> {
        let section = self.feed.as_ref();
        if !section.and_then(|s| s.synthetic).unwrap_or(true) {
            return None;
        }

        let defaults = SyntheticFeedConfig::default();
        Some(SyntheticFeedConfig {
            vehicles: section.and_then(|s| s.vehicles).unwrap_or(defaults.vehicles),
            center: GeoPoint {
                lat: section
                    .and_then(|s| s.center_lat)
                    .unwrap_or(defaults.center.lat),
                lng: section
                    .and_then(|s| s.center_lng)
                    .unwrap_or(defaults.center.lng),
            },
            spread: section.and_then(|s| s.spread).unwrap_or(defaults.spread),
            seed: section.and_then(|s| s.seed),
            ..defaults
        })
    }

    pub fn log_level(&self) -> tracing::Level {
        self.logging
            .level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }
}

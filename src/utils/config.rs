use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// How a station's HTTP payload is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    /// `{ data: [ { lastData: { ... } } ] }`, speeds in mph.
    RestPublicArray,
    /// Flat `{ epoch, wspd, ... }` snapshot, speeds in m/s.
    RestSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub id: String,
    pub kind: StationKind,
    pub url: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_host: String,
    pub http_port: u16,
    pub http_domain: String,
    pub is_production: bool,

    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Tz,
    pub activity_start_hour: u32,
    pub activity_end_hour: u32,

    pub stations: Vec<StationConfig>,
    pub models: Vec<ModelConfig>,
    pub default_model: String,

    pub notify_min_knots: f64,
    pub notify_sample_count: usize,
    pub notify_max_gust_delta: f64,
    pub notify_max_deviation_deg: f64,
    pub notify_click_url: String,
    pub notify_icon: String,
    pub notify_badge: String,
    pub default_locale: String,

    pub data_dir: PathBuf,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: String,

    pub ingest_cron: String,
    pub aggregate_cron: String,
    pub forecast_cron: String,
    pub scoring_cron: String,
    pub cleanup_cron: String,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow!("invalid value for {}: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn default_stations() -> Vec<StationConfig> {
    vec![
        StationConfig {
            id: "pier".to_string(),
            kind: StationKind::RestPublicArray,
            url: "https://lightning.ambientweather.net/devices".to_string(),
            primary: true,
        },
        StationConfig {
            id: "harbor".to_string(),
            kind: StationKind::RestSnapshot,
            url: "https://app.weathercloud.net/device/values".to_string(),
            primary: false,
        },
    ]
}

fn default_models() -> Vec<ModelConfig> {
    [
        ("best_match", "https://api.open-meteo.com/v1"),
        ("gfs", "https://api.open-meteo.com/v1/gfs"),
        ("icon", "https://api.open-meteo.com/v1/dwd-icon"),
        ("meteofrance", "https://api.open-meteo.com/v1/meteofrance"),
    ]
    .iter()
    .map(|(id, base)| ModelConfig {
        id: id.to_string(),
        base_url: base.to_string(),
    })
    .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL must be set in .env or environment")?;

        let stations: Vec<StationConfig> = match env::var("STATIONS") {
            Ok(raw) => serde_json::from_str(&raw).context("invalid STATIONS json")?,
            Err(_) => default_stations(),
        };
        if stations.is_empty() {
            return Err(anyhow!("at least one station is required"));
        }
        if stations.iter().filter(|s| s.primary).count() > 1 {
            return Err(anyhow!("at most one station may be primary"));
        }

        let models: Vec<ModelConfig> = match env::var("FORECAST_MODELS") {
            Ok(raw) => serde_json::from_str(&raw).context("invalid FORECAST_MODELS json")?,
            Err(_) => default_models(),
        };
        if models.is_empty() {
            return Err(anyhow!("at least one forecast model is required"));
        }
        let default_model = env_or("DEFAULT_MODEL", &models[0].id);
        if !models.iter().any(|m| m.id == default_model) {
            return Err(anyhow!(
                "DEFAULT_MODEL {} is not a configured model",
                default_model
            ));
        }

        let timezone: Tz = env_or("SPOT_TIMEZONE", "Europe/Lisbon")
            .parse()
            .map_err(|e| anyhow!("invalid SPOT_TIMEZONE: {}", e))?;

        Ok(Config {
            database_url,
            http_host: env_or("HOST", "127.0.0.1"),
            http_port: parse_env("HTTP_PORT", 8080u16)?,
            http_domain: env_or("HTTP_DOMAIN", "http://127.0.0.1:8080"),
            is_production: env_or("ENVIRONMENT", "development") == "production",

            latitude: parse_env("SPOT_LATITUDE", 38.6979f64)?,
            longitude: parse_env("SPOT_LONGITUDE", -9.2290f64)?,
            timezone,
            activity_start_hour: parse_env("ACTIVITY_START_HOUR", 6u32)?,
            activity_end_hour: parse_env("ACTIVITY_END_HOUR", 19u32)?,

            stations,
            models,
            default_model,

            notify_min_knots: parse_env("NOTIFY_MIN_KNOTS", 8.0f64)?,
            notify_sample_count: parse_env("NOTIFY_SAMPLE_COUNT", 4usize)?,
            notify_max_gust_delta: parse_env("NOTIFY_MAX_GUST_DELTA", 7.0f64)?,
            notify_max_deviation_deg: parse_env("NOTIFY_MAX_DEVIATION_DEG", 30.0f64)?,
            notify_click_url: env_or("NOTIFY_CLICK_URL", "https://wind.example.com/"),
            notify_icon: env_or("NOTIFY_ICON", "/icons/icon-192.png"),
            notify_badge: env_or("NOTIFY_BADGE", "/icons/badge-72.png"),
            default_locale: env_or("DEFAULT_LOCALE", "en"),

            data_dir: PathBuf::from(env_or("DATA_DIR", "./data")),
            vapid_private_key: env::var("VAPID_PRIVATE_KEY").ok(),
            vapid_public_key: env::var("VAPID_PUBLIC_KEY").ok(),
            vapid_subject: env_or("VAPID_SUBJECT", "mailto:admin@wind.example.com"),

            ingest_cron: env_or("INGEST_CRON", "0 */5 * * * *"),
            aggregate_cron: env_or("AGGREGATE_CRON", "0 0 * * * *"),
            forecast_cron: env_or("FORECAST_CRON", "0 10 */3 * * *"),
            scoring_cron: env_or("SCORING_CRON", "0 30 21 * * *"),
            cleanup_cron: env_or("CLEANUP_CRON", "0 15 3 * * *"),
        })
    }

    /// True while the local clock at the spot is inside the activity window.
    pub fn in_activity_window(&self, now: DateTime<Utc>) -> bool {
        let hour = now.with_timezone(&self.timezone).hour();
        hour >= self.activity_start_hour && hour <= self.activity_end_hour
    }

    pub fn primary_station(&self) -> &StationConfig {
        self.stations
            .iter()
            .find(|s| s.primary)
            .unwrap_or(&self.stations[0])
    }

    /// Localised notification title/body pairs, keyed by locale.
    /// `{speed}` in the body is replaced with the current speed at send time.
    pub fn notification_locales(&self) -> HashMap<String, (String, String)> {
        let mut map = HashMap::new();
        map.insert(
            "en".to_string(),
            (
                "Wind is on!".to_string(),
                "Steady {speed} kn at the spot right now.".to_string(),
            ),
        );
        map.insert(
            "pt".to_string(),
            (
                "Vento a entrar!".to_string(),
                "{speed} nós constantes no spot neste momento.".to_string(),
            ),
        );
        map
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: String::new(),
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        http_domain: String::new(),
        is_production: false,
        latitude: 38.6979,
        longitude: -9.2290,
        timezone: chrono_tz::UTC,
        activity_start_hour: 6,
        activity_end_hour: 19,
        stations: default_stations(),
        models: default_models(),
        default_model: "best_match".to_string(),
        notify_min_knots: 8.0,
        notify_sample_count: 4,
        notify_max_gust_delta: 7.0,
        notify_max_deviation_deg: 30.0,
        notify_click_url: "https://wind.example.com/".to_string(),
        notify_icon: "/icons/icon-192.png".to_string(),
        notify_badge: "/icons/badge-72.png".to_string(),
        default_locale: "en".to_string(),
        data_dir: PathBuf::from("."),
        vapid_private_key: None,
        vapid_public_key: None,
        vapid_subject: String::new(),
        ingest_cron: String::new(),
        aggregate_cron: String::new(),
        forecast_cron: String::new(),
        scoring_cron: String::new(),
        cleanup_cron: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_activity_window_edges() {
        let cfg = test_config();
        let at = |h| Utc.with_ymd_and_hms(2026, 7, 1, h, 30, 0).unwrap();
        assert!(!cfg.in_activity_window(at(5)));
        assert!(cfg.in_activity_window(at(6)));
        assert!(cfg.in_activity_window(at(19)));
        assert!(!cfg.in_activity_window(at(20)));
    }

    #[test]
    fn test_stations_json_parses() {
        let raw = r#"[{"id":"a","kind":"rest_public_array","url":"http://x","primary":true},
                      {"id":"b","kind":"rest_snapshot","url":"http://y"}]"#;
        let stations: Vec<StationConfig> = serde_json::from_str(raw).unwrap();
        assert_eq!(stations.len(), 2);
        assert!(stations[0].primary);
        assert_eq!(stations[1].kind, StationKind::RestSnapshot);
    }
}

use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{Measurement, NewMeasurement};
use crate::services::storage::Storage;
use crate::utils::config::{Config, StationConfig, StationKind};
use crate::utils::units;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of one 5-minute cycle. The cycle is a success when at least one
/// station stored a row; `primary` carries the primary station's stored
/// measurement (calibrated) when that station was among the successes.
#[derive(Debug)]
pub struct CycleOutcome {
    pub stored: usize,
    pub failed: usize,
    pub primary: Option<Measurement>,
}

/// `{ data: [ { lastData: { ... } } ] }` payload family, imperial units.
#[derive(Debug, Deserialize)]
struct PublicArrayResponse {
    data: Vec<PublicArrayDevice>,
}

#[derive(Debug, Deserialize)]
struct PublicArrayDevice {
    #[serde(rename = "lastData")]
    last_data: PublicArrayReading,
}

#[derive(Debug, Deserialize)]
struct PublicArrayReading {
    /// Observation time, epoch milliseconds.
    dateutc: i64,
    windspeedmph: f64,
    windgustmph: Option<f64>,
    maxdailygust: Option<f64>,
    winddir: f64,
    winddir_avg10m: Option<f64>,
    tempf: Option<f64>,
    humidity: Option<f64>,
    baromrelin: Option<f64>,
}

/// Flat snapshot payload family, metric units, epoch seconds.
#[derive(Debug, Deserialize)]
struct SnapshotReading {
    epoch: i64,
    wspd: f64,
    wspdhi: Option<f64>,
    wdir: f64,
    wdiravg: Option<f64>,
    bar: Option<f64>,
}

fn wrap_deg(raw: f64) -> i32 {
    (raw.round() as i32).rem_euclid(360)
}

fn parse_public_array(station_id: &str, body: &str) -> Result<NewMeasurement> {
    let payload: PublicArrayResponse =
        serde_json::from_str(body).context("unexpected public-array payload shape")?;
    let reading = &payload
        .data
        .first()
        .ok_or_else(|| anyhow!("public-array payload carries no devices"))?
        .last_data;

    let ts = Utc
        .timestamp_millis_opt(reading.dateutc)
        .single()
        .ok_or_else(|| anyhow!("invalid dateutc {}", reading.dateutc))?;

    Ok(NewMeasurement {
        ts,
        station_id: station_id.to_string(),
        wind_speed_knots: units::round1(units::mph_to_knots(reading.windspeedmph)),
        wind_gust_knots: reading.windgustmph.map(|v| units::round1(units::mph_to_knots(v))),
        max_gust_knots: reading.maxdailygust.map(|v| units::round1(units::mph_to_knots(v))),
        wind_direction_deg: wrap_deg(reading.winddir),
        wind_direction_avg_deg: reading.winddir_avg10m.map(wrap_deg),
        temperature: reading.tempf.map(units::fahrenheit_to_celsius),
        humidity: reading.humidity,
        pressure: reading.baromrelin.map(units::inhg_to_hpa),
    })
}

fn parse_snapshot(station_id: &str, body: &str) -> Result<NewMeasurement> {
    let reading: SnapshotReading =
        serde_json::from_str(body).context("unexpected snapshot payload shape")?;

    let ts = Utc
        .timestamp_opt(reading.epoch, 0)
        .single()
        .ok_or_else(|| anyhow!("invalid epoch {}", reading.epoch))?;

    Ok(NewMeasurement {
        ts,
        station_id: station_id.to_string(),
        wind_speed_knots: units::round1(units::ms_to_knots(reading.wspd)),
        wind_gust_knots: reading.wspdhi.map(|v| units::round1(units::ms_to_knots(v))),
        max_gust_knots: None,
        wind_direction_deg: wrap_deg(reading.wdir),
        wind_direction_avg_deg: reading.wdiravg.map(wrap_deg),
        temperature: None,
        humidity: None,
        pressure: reading.bar,
    })
}

/// Polls every configured station once per cycle and writes one raw row per
/// responding station. Stations fail independently; a cycle only fails when
/// every station does.
pub struct IngestionService {
    http: reqwest::Client,
    stations: Vec<StationConfig>,
    primary_id: String,
    storage: Arc<Storage>,
}

impl IngestionService {
    pub fn new(config: &Config, storage: Arc<Storage>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("failed to build station http client")?;
        Ok(Self {
            http,
            stations: config.stations.clone(),
            primary_id: config.primary_station().id.clone(),
            storage,
        })
    }

    async fn fetch_station(&self, station: &StationConfig) -> Result<NewMeasurement> {
        let response = self
            .http
            .get(&station.url)
            .send()
            .await
            .with_context(|| format!("station {} request failed", station.id))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("station {} returned HTTP {}", station.id, status));
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("station {} body read failed", station.id))?;

        match station.kind {
            StationKind::RestPublicArray => parse_public_array(&station.id, &body),
            StationKind::RestSnapshot => parse_snapshot(&station.id, &body),
        }
    }

    /// Run one ingestion cycle: concurrent fetch of every station, one
    /// insert per success, partial failure tolerated.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let fetches = self.stations.iter().map(|s| self.fetch_station(s));
        let results: Vec<Result<NewMeasurement>> = join_all(fetches).await;

        let mut stored = 0usize;
        let mut failed = 0usize;
        let mut primary_stored = false;

        for (station, result) in self.stations.iter().zip(results) {
            match result {
                Ok(measurement) => match self.storage.insert_measurement(&measurement).await {
                    Ok(_) => {
                        stored += 1;
                        if station.id == self.primary_id {
                            primary_stored = true;
                        }
                        info!(
                            "Stored reading from {}: {:.1} kn @ {}°",
                            station.id, measurement.wind_speed_knots, measurement.wind_direction_deg
                        );
                    }
                    Err(e) => {
                        failed += 1;
                        warn!("Failed to store reading from {}: {:#}", station.id, e);
                    }
                },
                Err(e) => {
                    failed += 1;
                    warn!("Station {} fetch failed: {:#}", station.id, e);
                }
            }
        }

        if stored == 0 {
            warn!("Ingestion cycle failed: all {} stations unavailable", failed);
            return Err(anyhow!("all stations failed"));
        }

        // Hand back the stored (and calibrated) primary reading for the
        // stream and notification paths.
        let primary = if primary_stored {
            self.storage.latest_measurement(&self.primary_id).await?
        } else {
            None
        };

        Ok(CycleOutcome {
            stored,
            failed,
            primary,
        })
    }
}

/// Current state of the primary station as a stream event: the latest
/// reading plus the derived trend. `None` until the first row lands.
pub async fn wind_update_event(
    storage: &Storage,
    station_id: &str,
) -> Result<Option<serde_json::Value>> {
    let Some(latest) = storage.latest_measurement(station_id).await? else {
        return Ok(None);
    };
    let recent = storage.recent_measurements(station_id, 12).await?;
    let speeds: Vec<f64> = recent.iter().map(|m| m.wind_speed_knots).collect();
    let dirs: Vec<f64> = recent.iter().map(|m| m.wind_direction_deg as f64).collect();
    let trend = crate::utils::trend::compute_trend(&speeds, &dirs);

    Ok(Some(serde_json::json!({
        "type": "wind_update",
        "measurement": latest,
        "trend": trend,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// One full collect cycle: ingest, then fan the primary reading out to the
/// live stream and the notification engine. Shared by the scheduler tick
/// and the admin force-run.
pub async fn run_cycle_pipeline(
    ingestion: &IngestionService,
    storage: &Storage,
    hub: &crate::services::stream::StreamHub,
    notifications: &crate::services::notifications::NotificationEngine,
) -> Result<CycleOutcome> {
    let outcome = ingestion.run_cycle().await?;

    if let Some(primary) = &outcome.primary {
        match wind_update_event(storage, &primary.station_id).await {
            Ok(Some(event)) => {
                let delivered = hub.broadcast(&event);
                if delivered > 0 {
                    info!("Broadcast wind_update to {} stream clients", delivered);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to build wind_update event: {:#}", e),
        }

        if let Err(e) = notifications.on_cycle().await {
            warn!("Notification evaluation failed: {:#}", e);
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_public_array_converts_units() {
        let body = r#"{
            "data": [{
                "lastData": {
                    "dateutc": 1767250800000,
                    "windspeedmph": 15.0,
                    "windgustmph": 18.0,
                    "maxdailygust": 25.0,
                    "winddir": 70,
                    "winddir_avg10m": 72,
                    "tempf": 68.0,
                    "humidity": 55.0,
                    "baromrelin": 29.92
                }
            }]
        }"#;
        let m = parse_public_array("pier", body).unwrap();
        assert_eq!(m.station_id, "pier");
        assert_eq!(m.wind_speed_knots, 13.0);
        assert_eq!(m.wind_gust_knots, Some(15.6));
        assert_eq!(m.wind_direction_deg, 70);
        assert_eq!(m.wind_direction_avg_deg, Some(72));
        assert!((m.temperature.unwrap() - 20.0).abs() < 1e-9);
        assert!((m.pressure.unwrap() - 1013.208).abs() < 0.01);
    }

    #[test]
    fn test_parse_public_array_empty_devices() {
        assert!(parse_public_array("pier", r#"{"data": []}"#).is_err());
    }

    #[test]
    fn test_parse_snapshot_converts_units() {
        let body = r#"{"epoch": 1767250800, "wspd": 7.0, "wspdhi": 9.5, "wdir": 310, "wdiravg": 305, "bar": 1015.2}"#;
        let m = parse_snapshot("harbor", body).unwrap();
        assert_eq!(m.wind_speed_knots, 13.6);
        assert_eq!(m.wind_gust_knots, Some(18.5));
        assert_eq!(m.wind_direction_deg, 310);
        assert_eq!(m.max_gust_knots, None);
    }

    #[test]
    fn test_parse_snapshot_rejects_garbage() {
        assert!(parse_snapshot("harbor", "<html>gateway timeout</html>").is_err());
    }

    #[test]
    fn test_wrap_deg_normalises() {
        assert_eq!(wrap_deg(360.0), 0);
        assert_eq!(wrap_deg(365.4), 5);
        assert_eq!(wrap_deg(-10.0), 350);
    }
}

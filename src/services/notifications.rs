use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::models::push::{DeviceToken, NotificationPayload, WebPushSubscription};
use crate::models::Measurement;
use crate::services::apns::{ApnsClient, TokenStore};
use crate::services::storage::Storage;
use crate::services::webpush::{SubscriptionStore, WebPushChannel};
use crate::services::PushError;
use crate::utils::circular;
use crate::utils::config::Config;
use crate::utils::stats;
use crate::utils::units::round1;

/// Why the stability predicate declined to notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityRejection {
    InsufficientSamples,
    BelowThreshold,
    DirectionUnstable,
    TooGusty,
    Fading,
}

impl fmt::Display for StabilityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientSamples => write!(f, "not enough recent samples"),
            Self::BelowThreshold => write!(f, "wind dropped below threshold"),
            Self::DirectionUnstable => write!(f, "direction swinging too widely"),
            Self::TooGusty => write!(f, "gust spread above limit"),
            Self::Fading => write!(f, "wind fading across the window"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StabilityParams {
    pub min_knots: f64,
    pub sample_count: usize,
    pub max_gust_delta: f64,
    pub max_deviation_deg: f64,
}

/// What holds when the predicate passes, feeding the payload text.
#[derive(Debug, Clone)]
pub struct StabilitySnapshot {
    pub current_speed: f64,
    pub avg_speed: f64,
    pub observed_at: DateTime<Utc>,
}

/// The rideable-conditions predicate over the most recent primary-station
/// readings (newest first, as storage returns them). All four conditions
/// must hold across the whole window.
pub fn evaluate_stability(
    measurements: &[Measurement],
    params: &StabilityParams,
) -> Result<StabilitySnapshot, StabilityRejection> {
    if measurements.len() < params.sample_count {
        return Err(StabilityRejection::InsufficientSamples);
    }
    let window = &measurements[..params.sample_count];

    // Chronological order for the fading check
    let speeds: Vec<f64> = window.iter().rev().map(|m| m.wind_speed_knots).collect();
    let dirs: Vec<f64> = window
        .iter()
        .map(|m| m.wind_direction_deg as f64)
        .collect();
    let gusts: Vec<f64> = window
        .iter()
        .map(|m| m.wind_gust_knots.unwrap_or(m.wind_speed_knots))
        .collect();

    if speeds.iter().any(|s| *s < params.min_knots) {
        return Err(StabilityRejection::BelowThreshold);
    }

    match circular::max_deviation(&dirs) {
        Some(dev) if dev <= params.max_deviation_deg => {}
        _ => return Err(StabilityRejection::DirectionUnstable),
    }

    let avg_speed = stats::mean(&speeds).unwrap_or(0.0);
    let max_gust = stats::max(&gusts).unwrap_or(0.0);
    if max_gust - avg_speed > params.max_gust_delta {
        return Err(StabilityRejection::TooGusty);
    }

    let half = speeds.len() / 2;
    let first = stats::mean(&speeds[..half]).unwrap_or(0.0);
    let second = stats::mean(&speeds[half..]).unwrap_or(0.0);
    if second - first < -1.0 {
        return Err(StabilityRejection::Fading);
    }

    let latest = &window[0];
    Ok(StabilitySnapshot {
        current_speed: latest.wind_speed_knots,
        avg_speed,
        observed_at: latest.ts,
    })
}

/// One notification per recipient per local calendar day. Stores the last
/// notified instant and compares local-zone dates; formatted-string date
/// comparison is exactly the bug this replaces.
pub struct DailyCap {
    ledger: Mutex<HashMap<String, DateTime<Utc>>>,
    timezone: Tz,
}

impl DailyCap {
    pub fn new(timezone: Tz) -> Self {
        Self {
            ledger: Mutex::new(HashMap::new()),
            timezone,
        }
    }

    pub fn allows(&self, recipient: &str, now: DateTime<Utc>) -> bool {
        let ledger = self.ledger.lock().expect("ledger lock poisoned");
        match ledger.get(recipient) {
            Some(last) => {
                last.with_timezone(&self.timezone).date_naive()
                    != now.with_timezone(&self.timezone).date_naive()
            }
            None => true,
        }
    }

    pub fn record(&self, recipient: &str, now: DateTime<Utc>) {
        let mut ledger = self.ledger.lock().expect("ledger lock poisoned");
        ledger.insert(recipient.to_string(), now);
    }

    pub fn count_on_day(&self, now: DateTime<Utc>) -> usize {
        let date = now.with_timezone(&self.timezone).date_naive();
        let ledger = self.ledger.lock().expect("ledger lock poisoned");
        ledger
            .values()
            .filter(|ts| ts.with_timezone(&self.timezone).date_naive() == date)
            .count()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchSummary {
    pub sent: usize,
    pub capped: usize,
    pub pruned: usize,
    pub transient: usize,
}

/// Evaluates the stability predicate on every ingestion cycle and fans out
/// to both delivery channels, one notification per recipient per local
/// calendar day.
pub struct NotificationEngine {
    storage: Arc<Storage>,
    webpush: Option<WebPushChannel>,
    subscriptions: SubscriptionStore,
    apns: Option<ApnsClient>,
    tokens: TokenStore,
    cap: DailyCap,
    params: StabilityParams,
    primary_station: String,
    locales: HashMap<String, (String, String)>,
    default_locale: String,
    click_url: String,
    icon: String,
    badge: String,
}

impl NotificationEngine {
    pub fn new(
        config: &Config,
        storage: Arc<Storage>,
        webpush: Option<WebPushChannel>,
        subscriptions: SubscriptionStore,
        apns: Option<ApnsClient>,
        tokens: TokenStore,
    ) -> Self {
        Self {
            storage,
            webpush,
            subscriptions,
            apns,
            tokens,
            cap: DailyCap::new(config.timezone),
            params: StabilityParams {
                min_knots: config.notify_min_knots,
                sample_count: config.notify_sample_count,
                max_gust_delta: config.notify_max_gust_delta,
                max_deviation_deg: config.notify_max_deviation_deg,
            },
            primary_station: config.primary_station().id.clone(),
            locales: config.notification_locales(),
            default_locale: config.default_locale.clone(),
            click_url: config.notify_click_url.clone(),
            icon: config.notify_icon.clone(),
            badge: config.notify_badge.clone(),
        }
    }

    // --- registration surface ---

    pub async fn subscribe_web(&self, sub: WebPushSubscription) -> Result<bool> {
        self.subscriptions.add(sub).await
    }

    pub async fn unsubscribe_web(&self, endpoint: &str) -> Result<bool> {
        self.subscriptions.remove(endpoint).await
    }

    pub async fn register_token(&self, token: DeviceToken) -> Result<bool> {
        self.tokens.add(token).await
    }

    pub async fn unregister_token(&self, token: &str) -> Result<bool> {
        self.tokens.remove(token).await
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn notified_today(&self) -> usize {
        self.cap.count_on_day(Utc::now())
    }

    // --- dispatch ---

    fn payload_for_locale(&self, locale: Option<&str>, snapshot: &StabilitySnapshot) -> NotificationPayload {
        let key = locale.unwrap_or(&self.default_locale);
        let (title, body_template) = self
            .locales
            .get(key)
            .or_else(|| self.locales.get(&self.default_locale))
            .cloned()
            .unwrap_or_else(|| {
                (
                    "Wind is on!".to_string(),
                    "Steady {speed} kn at the spot right now.".to_string(),
                )
            });

        NotificationPayload {
            title,
            body: body_template.replace("{speed}", &format!("{:.0}", snapshot.current_speed)),
            speed_knots: round1(snapshot.current_speed),
            avg_speed_20min: round1(snapshot.avg_speed),
            url: self.click_url.clone(),
            icon: self.icon.clone(),
            badge: self.badge.clone(),
            timestamp: snapshot.observed_at.to_rfc3339(),
        }
    }

    async fn dispatch(&self, snapshot: &StabilitySnapshot) -> DispatchSummary {
        let now = Utc::now();
        let mut summary = DispatchSummary::default();

        if let Some(channel) = &self.webpush {
            for sub in self.subscriptions.all() {
                if !self.cap.allows(&sub.endpoint, now) {
                    summary.capped += 1;
                    continue;
                }
                let payload = self.payload_for_locale(sub.locale.as_deref(), snapshot);
                match channel.send(&sub, &payload).await {
                    Ok(()) => {
                        self.cap.record(&sub.endpoint, now);
                        summary.sent += 1;
                    }
                    Err(PushError::Permanent(reason)) => {
                        warn!("Removing dead web subscription {}: {}", sub.endpoint, reason);
                        if let Err(e) = self.subscriptions.remove(&sub.endpoint).await {
                            warn!("Failed to prune subscription: {:#}", e);
                        }
                        summary.pruned += 1;
                    }
                    Err(PushError::Transient(reason)) => {
                        warn!("Web push to {} failed: {}", sub.endpoint, reason);
                        summary.transient += 1;
                    }
                }
            }
        }

        if let Some(apns) = &self.apns {
            for device in self.tokens.all() {
                if !self.cap.allows(&device.token, now) {
                    summary.capped += 1;
                    continue;
                }
                let payload = self.payload_for_locale(None, snapshot);
                match apns.send(&device.token, &payload).await {
                    Ok(()) => {
                        self.cap.record(&device.token, now);
                        summary.sent += 1;
                    }
                    Err(PushError::Permanent(reason)) => {
                        warn!("Removing dead device token: {}", reason);
                        if let Err(e) = self.tokens.remove(&device.token).await {
                            warn!("Failed to prune device token: {:#}", e);
                        }
                        summary.pruned += 1;
                    }
                    Err(PushError::Transient(reason)) => {
                        warn!("APNs push failed: {}", reason);
                        summary.transient += 1;
                    }
                }
            }
        }

        summary
    }

    /// Called after every successful ingestion cycle with fresh primary
    /// data in storage.
    pub async fn on_cycle(&self) -> Result<DispatchSummary> {
        let recent = self
            .storage
            .recent_measurements(&self.primary_station, self.params.sample_count as i64)
            .await?;

        match evaluate_stability(&recent, &self.params) {
            Ok(snapshot) => {
                let summary = self.dispatch(&snapshot).await;
                if summary.sent > 0 {
                    info!(
                        "Rideable conditions: notified {} recipients ({} capped, {} pruned, {} transient)",
                        summary.sent, summary.capped, summary.pruned, summary.transient
                    );
                }
                Ok(summary)
            }
            Err(reason) => {
                info!("Notification suppressed: {}", reason);
                Ok(DispatchSummary::default())
            }
        }
    }

    /// Admin test fire: skips the predicate and the daily cap.
    pub async fn send_test(&self) -> DispatchSummary {
        let snapshot = StabilitySnapshot {
            current_speed: 12.0,
            avg_speed: 11.5,
            observed_at: Utc::now(),
        };
        let mut summary = DispatchSummary::default();

        if let Some(channel) = &self.webpush {
            for sub in self.subscriptions.all() {
                let payload = self.payload_for_locale(sub.locale.as_deref(), &snapshot);
                match channel.send(&sub, &payload).await {
                    Ok(()) => summary.sent += 1,
                    Err(PushError::Permanent(_)) => summary.pruned += 1,
                    Err(PushError::Transient(_)) => summary.transient += 1,
                }
            }
        }
        if let Some(apns) = &self.apns {
            for device in self.tokens.all() {
                let payload = self.payload_for_locale(None, &snapshot);
                match apns.send(&device.token, &payload).await {
                    Ok(()) => summary.sent += 1,
                    Err(PushError::Permanent(_)) => summary.pruned += 1,
                    Err(PushError::Transient(_)) => summary.transient += 1,
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn params() -> StabilityParams {
        StabilityParams {
            min_knots: 8.0,
            sample_count: 4,
            max_gust_delta: 7.0,
            max_deviation_deg: 30.0,
        }
    }

    /// Newest-first window; speeds given oldest-first for readability.
    fn window(speeds_chrono: &[f64], dirs_chrono: &[i32], gust: Option<f64>) -> Vec<Measurement> {
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap();
        let mut out: Vec<Measurement> = speeds_chrono
            .iter()
            .zip(dirs_chrono)
            .enumerate()
            .map(|(i, (speed, dir))| Measurement {
                id: i as i64,
                ts: start + Duration::minutes(5 * i as i64),
                station_id: "pier".to_string(),
                wind_speed_knots: *speed,
                wind_gust_knots: gust,
                max_gust_knots: None,
                wind_direction_deg: *dir,
                wind_direction_avg_deg: None,
                temperature: None,
                humidity: None,
                pressure: None,
            })
            .collect();
        out.reverse();
        out
    }

    #[test]
    fn test_predicate_holds_on_building_wind() {
        // Speeds 9..12 inside a 20° cone, gusts capped at 15
        let w = window(&[9.0, 10.0, 11.0, 12.0], &[80, 85, 90, 95], Some(15.0));
        let snapshot = evaluate_stability(&w, &params()).unwrap();
        assert_eq!(snapshot.current_speed, 12.0);
        assert!((snapshot.avg_speed - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_predicate_rejects_single_low_reading() {
        let w = window(&[9.0, 7.0, 11.0, 12.0], &[80, 85, 90, 95], Some(13.0));
        assert_eq!(
            evaluate_stability(&w, &params()).unwrap_err(),
            StabilityRejection::BelowThreshold
        );
    }

    #[test]
    fn test_predicate_rejects_swinging_direction() {
        let w = window(&[10.0, 10.0, 10.0, 10.0], &[10, 80, 160, 240], Some(12.0));
        assert_eq!(
            evaluate_stability(&w, &params()).unwrap_err(),
            StabilityRejection::DirectionUnstable
        );
    }

    #[test]
    fn test_predicate_rejects_gust_spread() {
        // avg 10, gusts to 18: spread 8 > 7
        let w = window(&[10.0, 10.0, 10.0, 10.0], &[90, 90, 90, 90], Some(18.0));
        assert_eq!(
            evaluate_stability(&w, &params()).unwrap_err(),
            StabilityRejection::TooGusty
        );
    }

    #[test]
    fn test_predicate_rejects_fading_wind() {
        // First half 14, second half 9: drop of 5 knots
        let w = window(&[14.0, 14.0, 9.0, 9.0], &[90, 90, 90, 90], Some(15.0));
        assert_eq!(
            evaluate_stability(&w, &params()).unwrap_err(),
            StabilityRejection::Fading
        );
    }

    #[test]
    fn test_predicate_needs_full_window() {
        let w = window(&[10.0, 11.0, 12.0], &[90, 90, 90], None);
        assert_eq!(
            evaluate_stability(&w, &params()).unwrap_err(),
            StabilityRejection::InsufficientSamples
        );
    }

    #[test]
    fn test_gust_falls_back_to_speed() {
        // No gust channel at all: spread is zero, predicate holds
        let w = window(&[10.0, 10.0, 10.0, 10.0], &[90, 90, 90, 90], None);
        assert!(evaluate_stability(&w, &params()).is_ok());
    }

    #[test]
    fn test_daily_cap_one_per_local_day() {
        let cap = DailyCap::new(chrono_tz::UTC);
        let morning = Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap();

        assert!(cap.allows("endpoint-a", morning));
        cap.record("endpoint-a", morning);

        // The predicate holding for hours afterwards must not re-notify
        for minutes in (5i64..120).step_by(5) {
            assert!(!cap.allows("endpoint-a", morning + Duration::minutes(minutes)));
        }
        // Another recipient is unaffected
        assert!(cap.allows("endpoint-b", morning));
        // Next local day opens the cap again
        assert!(cap.allows("endpoint-a", morning + Duration::days(1)));
        assert_eq!(cap.count_on_day(morning), 1);
    }

    #[test]
    fn test_daily_cap_uses_local_dates_not_utc() {
        // 10:00 UTC on July 1st is 22:00 the same evening in Auckland (+12)
        let cap = DailyCap::new(chrono_tz::Pacific::Auckland);
        let late_utc = Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap();
        cap.record("endpoint-a", late_utc);

        // An hour later Auckland is at 23:00, still the same local date
        assert!(!cap.allows("endpoint-a", late_utc + Duration::hours(1)));
        // Three hours later Auckland has crossed midnight while the UTC
        // date has not changed: the cap must reopen
        assert!(cap.allows("endpoint-a", late_utc + Duration::hours(3)));
    }
}

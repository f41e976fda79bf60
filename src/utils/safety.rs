//! Rideability classification shared by the request handlers and the
//! notification labels. Direction classes follow the coastal orientation at
//! the spot: 225–315° blows offshore, 45–135° onshore, anything else is
//! sideshore.

use serde::Serialize;

pub const OFFSHORE_FROM: f64 = 225.0;
pub const OFFSHORE_TO: f64 = 315.0;
pub const ONSHORE_FROM: f64 = 45.0;
pub const ONSHORE_TO: f64 = 135.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Low,
    Good,
    Medium,
    High,
    Danger,
}

pub fn is_offshore(direction_deg: f64) -> bool {
    (OFFSHORE_FROM..=OFFSHORE_TO).contains(&direction_deg)
}

pub fn is_onshore(direction_deg: f64) -> bool {
    (ONSHORE_FROM..=ONSHORE_TO).contains(&direction_deg)
}

pub fn classify(direction_deg: f64, speed_knots: f64) -> SafetyLevel {
    let offshore = is_offshore(direction_deg);
    let onshore = is_onshore(direction_deg);

    if speed_knots < 5.0 {
        SafetyLevel::Low
    } else if offshore || speed_knots > 30.0 {
        SafetyLevel::Danger
    } else if onshore && (12.0..=25.0).contains(&speed_knots) {
        SafetyLevel::High
    } else if onshore && (5.0..12.0).contains(&speed_knots) {
        SafetyLevel::Good
    } else if !onshore && (8.0..=15.0).contains(&speed_knots) {
        SafetyLevel::Good
    } else {
        SafetyLevel::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_wind_wins() {
        assert_eq!(classify(90.0, 4.9), SafetyLevel::Low);
        // Even offshore, calm is calm
        assert_eq!(classify(270.0, 2.0), SafetyLevel::Low);
    }

    #[test]
    fn test_offshore_is_danger() {
        assert_eq!(classify(225.0, 10.0), SafetyLevel::Danger);
        assert_eq!(classify(315.0, 10.0), SafetyLevel::Danger);
        assert_eq!(classify(270.0, 15.0), SafetyLevel::Danger);
    }

    #[test]
    fn test_storm_is_danger() {
        assert_eq!(classify(90.0, 30.1), SafetyLevel::Danger);
    }

    #[test]
    fn test_onshore_excellent() {
        assert_eq!(classify(90.0, 12.0), SafetyLevel::High);
        assert_eq!(classify(45.0, 25.0), SafetyLevel::High);
    }

    #[test]
    fn test_onshore_good() {
        assert_eq!(classify(135.0, 5.0), SafetyLevel::Good);
        assert_eq!(classify(90.0, 11.9), SafetyLevel::Good);
    }

    #[test]
    fn test_sideshore_good() {
        assert_eq!(classify(0.0, 8.0), SafetyLevel::Good);
        assert_eq!(classify(180.0, 15.0), SafetyLevel::Good);
    }

    #[test]
    fn test_fallthrough_medium() {
        // Sideshore, above the good band, below storm
        assert_eq!(classify(0.0, 20.0), SafetyLevel::Medium);
        // Onshore but above excellent band
        assert_eq!(classify(90.0, 26.0), SafetyLevel::Medium);
    }
}

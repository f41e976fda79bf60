use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{info, warn};

pub const OFFSET_MIN: f64 = -180.0;
pub const OFFSET_MAX: f64 = 180.0;

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationDoc {
    offset: f64,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

/// Process-wide direction offset, applied on the way out of every storage
/// read that returns a wind direction. Reads are lock-cheap; the lock is
/// only contended on the rare admin write, which also rewrites the backing
/// JSON document.
pub struct Calibration {
    state: RwLock<(f64, DateTime<Utc>)>,
    path: PathBuf,
}

impl Calibration {
    pub fn load(path: PathBuf) -> Self {
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CalibrationDoc>(&raw) {
                Ok(doc) if (OFFSET_MIN..=OFFSET_MAX).contains(&doc.offset) => {
                    info!("Loaded calibration offset {}° from {:?}", doc.offset, path);
                    (doc.offset, doc.updated_at)
                }
                Ok(doc) => {
                    warn!("Persisted calibration offset {} out of bounds, resetting to 0", doc.offset);
                    (0.0, Utc::now())
                }
                Err(e) => {
                    warn!("Unreadable calibration document {:?}: {}", path, e);
                    (0.0, Utc::now())
                }
            },
            Err(_) => (0.0, Utc::now()),
        };
        Self {
            state: RwLock::new(state),
            path,
        }
    }

    pub fn offset(&self) -> f64 {
        self.state.read().expect("calibration lock poisoned").0
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.state.read().expect("calibration lock poisoned").1
    }

    /// Update the offset and write it through to disk. Out-of-bounds values
    /// are rejected and leave both memory and disk untouched.
    pub async fn set_offset(&self, offset: f64) -> Result<()> {
        if !(OFFSET_MIN..=OFFSET_MAX).contains(&offset) || !offset.is_finite() {
            return Err(anyhow!(
                "calibration offset must be within [{}, {}]",
                OFFSET_MIN,
                OFFSET_MAX
            ));
        }
        let now = Utc::now();
        let doc = CalibrationDoc {
            offset,
            updated_at: now,
        };
        let raw = serde_json::to_string_pretty(&doc)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("failed to persist calibration to {:?}", self.path))?;

        let mut state = self.state.write().expect("calibration lock poisoned");
        *state = (offset, now);
        info!("Calibration offset set to {}°", offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");

        let cal = Calibration::load(path.clone());
        assert_eq!(cal.offset(), 0.0);

        cal.set_offset(30.0).await.unwrap();
        assert_eq!(cal.offset(), 30.0);

        let reloaded = Calibration::load(path);
        assert_eq!(reloaded.offset(), 30.0);
    }

    #[tokio::test]
    async fn test_out_of_bounds_rejected_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let cal = Calibration::load(dir.path().join("calibration.json"));

        cal.set_offset(-15.0).await.unwrap();
        assert!(cal.set_offset(181.0).await.is_err());
        assert!(cal.set_offset(-180.5).await.is_err());
        assert!(cal.set_offset(f64::NAN).await.is_err());
        assert_eq!(cal.offset(), -15.0);
    }
}

pub mod aggregation;
pub mod apns;
pub mod calibration;
pub mod forecast;
pub mod ingestion;
pub mod notifications;
pub mod scheduler;
pub mod scoring;
pub mod storage;
pub mod stream;
pub mod webpush;

/// Push delivery failure taxonomy. Permanent failures (dead endpoint or
/// token) cause immediate removal of the recipient; transient ones are
/// counted and left for the next qualifying cycle.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("permanent push failure: {0}")]
    Permanent(String),
    #[error("transient push failure: {0}")]
    Transient(String),
}

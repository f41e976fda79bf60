pub mod circular;
pub mod config;
pub mod safety;
pub mod stats;
pub mod trend;
pub mod units;

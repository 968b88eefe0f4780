//! Water-quality alert pipeline and push-notification relay.
//!
//! - [`thresholds`]: safe band per monitored parameter
//! - [`classifier`]: reading to alerts
//! - [`tokens`]: device token registry (JSON file or Postgres)
//! - [`dispatch`]: providers, middleware, retry and fan-out
//! - [`monitor`]: periodic poll of the sensor source
//! - [`routes`]: the HTTP surface

pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod monitor;
pub mod routes;
pub mod schema;
pub mod thresholds;
pub mod tokens;

pub use classifier::{classify, classify_document};
pub use config::Config;
pub use dispatch::{DeliveryResult, DispatchConfig, Dispatcher, Envelope, Provider};
pub use models::{most_severe, Alert, SensorReading, Severity, Zone};
pub use monitor::{HttpSensorSource, Monitor, MonitorConfig, SensorSource};
pub use thresholds::{default_thresholds, Threshold, ThresholdTable};
pub use tokens::{FileTokenStore, PgTokenStore, TokenMetadata, TokenRecord, TokenStore};

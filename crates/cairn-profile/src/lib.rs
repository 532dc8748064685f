pub mod broadcast;
pub mod engine;
pub mod error;
pub mod types;

pub use broadcast::BroadcastTracker;
pub use engine::ProfileEngine;
pub use error::{ProfileError, Result};
pub use types::{AutoPostConfig, BroadcastConfig, Metrics, MetricsConfig, MetricsSnapshot, ProfileConfig};

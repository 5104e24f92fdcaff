//! Infrastructure - configuration and metrics
//!
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free session counters

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, LocationProviderKind};
pub use metrics::{Metrics, MetricsSummary};

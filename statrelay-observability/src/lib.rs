pub mod access_log;
pub mod logger;
pub mod metrics;

pub use access_log::AccessLogEntry;
pub use metrics::MetricsCollector;

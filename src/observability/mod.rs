pub mod exporter;
pub mod metrics;

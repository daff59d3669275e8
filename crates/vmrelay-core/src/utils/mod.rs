//! Utility modules for vmrelay-core
//!
//! - metrics: process-wide relay counters and gauges, Prometheus export

mod metrics;

pub use metrics::{
    global as metrics_global, names as metric_names, Counter, Gauge, GaugeGuard, Histogram,
    MetricsRegistry, Timer,
};

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use super::types::{Counter, Gauge, Histogram};

/// A named metric with its help text
#[derive(Debug, Clone)]
struct Entry<M> {
    help: &'static str,
    metric: M,
}

type Family<M> = Arc<RwLock<BTreeMap<String, Entry<M>>>>;

/// Metrics registry for managing multiple metrics
#[derive(Debug, Default, Clone)]
pub struct MetricsRegistry {
    counters: Family<Counter>,
    gauges: Family<Gauge>,
    histograms: Family<Histogram>,
}

fn get_or_create<M: Clone + Default>(family: &Family<M>, name: &str, help: &'static str) -> M {
    {
        let entries = family.read().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(name) {
            return entry.metric.clone();
        }
    }

    let mut entries = family.write().unwrap_or_else(|e| e.into_inner());
    entries
        .entry(name.to_string())
        .or_insert_with(|| Entry {
            help,
            metric: M::default(),
        })
        .metric
        .clone()
}

impl MetricsRegistry {
    /// Create a new metrics registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a counter
    pub fn counter(&self, name: &str, help: &'static str) -> Counter {
        get_or_create(&self.counters, name, help)
    }

    /// Get or create a gauge
    pub fn gauge(&self, name: &str, help: &'static str) -> Gauge {
        get_or_create(&self.gauges, name, help)
    }

    /// Get or create a histogram
    pub fn histogram(&self, name: &str, help: &'static str) -> Histogram {
        get_or_create(&self.histograms, name, help)
    }

    /// Export metrics in Prometheus text format, sorted by name
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        for (name, entry) in counters.iter() {
            let _ = write!(
                output,
                "# HELP {name} {}\n# TYPE {name} counter\n{name} {}\n",
                entry.help,
                entry.metric.get()
            );
        }
        drop(counters);

        let gauges = self.gauges.read().unwrap_or_else(|e| e.into_inner());
        for (name, entry) in gauges.iter() {
            let _ = write!(
                output,
                "# HELP {name} {}\n# TYPE {name} gauge\n{name} {}\n",
                entry.help,
                entry.metric.get()
            );
        }
        drop(gauges);

        let histograms = self.histograms.read().unwrap_or_else(|e| e.into_inner());
        for (name, entry) in histograms.iter() {
            let histogram = &entry.metric;
            let _ = write!(
                output,
                "# HELP {name} {}\n# TYPE {name} histogram\n",
                entry.help
            );
            for (bound, count) in histogram.bucket_counts() {
                let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {count}");
            }
            let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {}", histogram.count());
            let _ = writeln!(output, "{name}_sum {}", histogram.sum());
            let _ = writeln!(output, "{name}_count {}", histogram.count());
        }

        output
    }
}

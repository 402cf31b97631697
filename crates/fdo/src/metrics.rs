//! Metrics collection using `metrics-rs`, wired only in this binary. Library
//! crates (`fdo-raw`, `fdo-profile`, ...) only ever call
//! `metrics::counter!`/`gauge!`; they never install a recorder.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{
    describe_counter, describe_gauge, Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};
use parking_lot::RwLock;

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "fdo_samples_ingested_total",
        Unit::Count,
        "Raw LBR samples folded into the aggregated profile"
    );
    describe_counter!(
        "fdo_lines_ignored_total",
        Unit::Count,
        "Raw sample lines skipped for malformed format (spec §7 BadSampleFormat)"
    );
    describe_gauge!(
        "fdo_functions_decoded",
        Unit::Count,
        "Functions interned while decoding addresses"
    );
    describe_gauge!(
        "fdo_functions_attributed",
        Unit::Count,
        "Functions with a successful CFG attribution pass"
    );
    describe_counter!(
        "fdo_malformed_traces_total",
        Unit::Count,
        "Fall-through traces rejected as backward or unreachable"
    );
}

#[derive(Default)]
struct CounterStorage {
    values: RwLock<HashMap<String, u64>>,
}

#[derive(Default)]
struct GaugeStorage {
    values: RwLock<HashMap<String, f64>>,
}

struct CliCounter {
    key: String,
    storage: Arc<CounterStorage>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        *self.storage.values.write().entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.storage.values.write().insert(self.key.clone(), value);
    }
}

struct CliGauge {
    key: String,
    storage: Arc<GaugeStorage>,
}

impl metrics::GaugeFn for CliGauge {
    fn increment(&self, value: f64) {
        *self.storage.values.write().entry(self.key.clone()).or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        *self.storage.values.write().entry(self.key.clone()).or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        self.storage.values.write().insert(self.key.clone(), value);
    }
}

struct NullHistogram;

impl metrics::HistogramFn for NullHistogram {
    fn record(&self, _value: f64) {}
}

/// Records `counter!`/`gauge!` calls in memory and prints them on request.
/// Histograms aren't needed by this pipeline's metric set, so they're
/// discarded rather than stored.
pub struct CliRecorder {
    counters: Arc<CounterStorage>,
    gauges: Arc<GaugeStorage>,
}

impl CliRecorder {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(CounterStorage::default()),
            gauges: Arc::new(GaugeStorage::default()),
        }
    }

    pub fn install(self) -> Option<CliRecorderHandle> {
        let counters = Arc::clone(&self.counters);
        let gauges = Arc::clone(&self.gauges);
        metrics::set_global_recorder(self).ok()?;
        Some(CliRecorderHandle { counters, gauges })
    }
}

impl Default for CliRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn key_to_string(key: &Key) -> String {
    let name = key.name();
    let labels: Vec<String> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
    if labels.is_empty() {
        name.to_string()
    } else {
        format!("{name}{{{}}}", labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            storage: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(CliGauge {
            key: key_to_string(key),
            storage: Arc::clone(&self.gauges),
        }))
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(NullHistogram))
    }
}

pub struct CliRecorderHandle {
    counters: Arc<CounterStorage>,
    gauges: Arc<GaugeStorage>,
}

impl CliRecorderHandle {
    pub fn print_summary(&self) {
        let counters = self.counters.values.read();
        let gauges = self.gauges.values.read();
        if counters.is_empty() && gauges.is_empty() {
            return;
        }
        eprintln!();
        eprintln!("## Metrics Summary");
        let mut keys: Vec<_> = counters.keys().collect();
        keys.sort();
        for key in keys {
            eprintln!("  {key}: {}", counters[key]);
        }
        let mut keys: Vec<_> = gauges.keys().collect();
        keys.sort();
        for key in keys {
            eprintln!("  {key}: {}", gauges[key]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_to_string_without_labels() {
        let key = Key::from_name("fdo_functions_decoded");
        assert_eq!(key_to_string(&key), "fdo_functions_decoded");
    }
}

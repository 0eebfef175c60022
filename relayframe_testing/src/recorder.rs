use metrics::LocalRecorderGuard;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// Thread-local metrics recorder active until dropped.
///
/// Async code on a current-thread runtime records into it as well. The
/// recorder is leaked so the guard can outlive the constructor.
pub struct MetricsCapture {
    snapshotter: Snapshotter,
    _guard: LocalRecorderGuard<'static>,
}

impl MetricsCapture {
    pub fn start() -> Self {
        let recorder: &'static DebuggingRecorder = Box::leak(Box::new(DebuggingRecorder::new()));
        let snapshotter = recorder.snapshotter();
        let guard = metrics::set_default_local_recorder(recorder);
        Self {
            snapshotter,
            _guard: guard,
        }
    }

    /// Sum of the counter `name` across label sets matching `labels`.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        counter_value(&self.snapshotter, name, labels)
    }

    /// Current value of the gauge `name`, if recorded.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find_map(|(key, _, _, value)| match value {
                DebugValue::Gauge(gauge) if key.key().name() == name => Some(gauge.into_inner()),
                _ => None,
            })
    }
}

/// Sum of the counter `name` whose labels include every pair in `labels`.
pub fn counter_value(snapshotter: &Snapshotter, name: &str, labels: &[(&str, &str)]) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && labels.iter().all(|(k, v)| {
                    key.key()
                        .labels()
                        .any(|label| label.key() == *k && label.value() == *v)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .sum()
}

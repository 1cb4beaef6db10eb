//! Per-endpoint call tallies.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Tallies for one endpoint URI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub successes: u64,
    pub failures: u64,
    pub total_time: Duration,
    pub max_time: Duration,
}

impl EndpointStats {
    pub fn calls(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn average_time(&self) -> Option<Duration> {
        let calls = u32::try_from(self.calls()).ok().filter(|c| *c > 0)?;
        Some(self.total_time / calls)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    endpoints: Mutex<BTreeMap<String, EndpointStats>>,
}

impl Counters {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, EndpointStats>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record(&self, uri: &str, success: bool, elapsed: Duration) {
        let mut endpoints = self.lock();
        let stats = endpoints.entry(uri.to_string()).or_default();
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.total_time += elapsed;
        stats.max_time = stats.max_time.max(elapsed);
    }

    pub(crate) fn get(&self, uri: &str) -> Option<EndpointStats> {
        self.lock().get(uri).copied()
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, EndpointStats> {
        self.lock().clone()
    }

    pub(crate) fn reset(&self) {
        self.lock().clear();
    }
}

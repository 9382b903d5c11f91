//! Per-machine rolling window of recent samples
//!
//! Every insertion upserts the sample by timestamp and then evicts in two
//! passes, always oldest first:
//!
//! 1. **Time bound**: drop entries with `now - timestamp > max_age_secs`
//! 2. **Count bound**: drop entries while the window holds more than `capacity`

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::sample::{PathError, Sample};

/// Default window length in seconds, also used as the default entry cap
pub const WINDOW_SECONDS: i64 = 16;

/// Eviction limits for a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WindowPolicy {
    pub max_age_secs: i64,
    pub capacity: usize,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            max_age_secs: WINDOW_SECONDS,
            capacity: WINDOW_SECONDS as usize,
        }
    }
}

/// Bounded, chronologically ordered store of samples keyed by timestamp
#[derive(Debug, Clone, Default)]
pub struct WindowBuffer {
    policy: WindowPolicy,
    samples: BTreeMap<i64, Sample>,
}

impl WindowBuffer {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            samples: BTreeMap::new(),
        }
    }

    /// Upsert `sample` and apply both eviction passes relative to `now`
    ///
    /// Samples older than the window are accepted and evicted right away.
    pub fn insert(&mut self, now: i64, sample: Sample) {
        self.samples.insert(sample.timestamp, sample);
        self.evict(now);
    }

    fn evict(&mut self, now: i64) {
        while let Some(oldest) = self.samples.first_entry() {
            if now.saturating_sub(*oldest.key()) <= self.policy.max_age_secs {
                break;
            }
            oldest.remove();
        }

        while self.samples.len() > self.policy.capacity {
            self.samples.pop_first();
        }
    }

    /// Chronologically ordered copy of the window
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.values().cloned().collect()
    }

    /// `(timestamp, value)` pairs for one payload path
    ///
    /// Samples lacking the path are skipped. Fails only when no sample in a
    /// non-empty window has the path, reporting the first sample's error.
    pub fn series(&self, path: &str) -> Result<Vec<(i64, Value)>, PathError> {
        let mut first_error = None;
        let mut points = Vec::with_capacity(self.samples.len());

        for sample in self.samples.values() {
            match sample.lookup(path) {
                Ok(value) => points.push((sample.timestamp, value.clone())),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if points.is_empty() => Err(e),
            _ => Ok(points),
        }
    }

    pub fn get(&self, timestamp: i64) -> Option<&Sample> {
        self.samples.get(&timestamp)
    }

    pub fn latest_timestamp(&self) -> Option<i64> {
        self.samples.last_key_value().map(|(ts, _)| *ts)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }
}

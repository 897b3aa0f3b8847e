//! Rolling per-(vehicle, pollutant) window state.
//!
//! Time is partitioned into fixed-length buckets aligned on the unix epoch;
//! each key accumulates `current/sum/count/peak` for the bucket it is in and
//! keeps the previous bucket's average as the trend baseline. One bucket of
//! history per key keeps memory O(1) per entity instead of retaining raw
//! readings.

use crate::error::IngestError;
use crate::reading::{EntityId, Pollutant, Reading};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub entity_id: EntityId,
    pub pollutant: Pollutant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    pub current: f64,
    pub sum: f64,
    pub count: u64,
    pub peak: f64,
    pub window_start: OffsetDateTime,
    pub window_end: OffsetDateTime,
    /// Average of the immediately preceding completed window, if any.
    pub previous_average: Option<f64>,
    /// Timestamp of the last accepted reading; drives the out-of-order check
    /// and idle eviction.
    pub last_timestamp: OffsetDateTime,
}

impl WindowState {
    fn open(reading: &Reading, window: Duration) -> Self {
        let (window_start, window_end) = bucket_bounds(reading.timestamp, window);
        Self {
            current: reading.value,
            sum: reading.value,
            count: 1,
            peak: reading.value,
            window_start,
            window_end,
            previous_average: None,
            last_timestamp: reading.timestamp,
        }
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Debug)]
pub struct RollingAggregator {
    windows: RwLock<HashMap<WindowKey, Arc<Mutex<WindowState>>>>,
    window: Duration,
    skew_tolerance: Duration,
}

impl RollingAggregator {
    pub fn new(window: Duration, skew_tolerance: Duration) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            window: window.max(Duration::from_secs(1)),
            skew_tolerance,
        }
    }

    /// Fold one reading into its window, creating the window on first sight
    /// of an entity/pollutant pair.
    ///
    /// The ordering check happens under the same per-key lock as the update,
    /// so concurrent producers cannot interleave a stale reading between the
    /// check and the fold. Readings older than the last accepted one by more
    /// than the skew tolerance are rejected, not reordered.
    pub fn fold(&self, reading: &Reading) -> Result<(), IngestError> {
        let (entry, created) = self.entry(reading);
        if created {
            // The freshly opened window already holds this reading.
            return Ok(());
        }
        let mut state = match entry.lock() {
            Ok(state) => state,
            // A poisoned per-key lock only ever means a panic mid-update in
            // another thread; the tuple may be torn, so rebuild from scratch.
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                *state = WindowState::open(reading, self.window);
                return Ok(());
            }
        };

        let floor = state.last_timestamp - self.skew_tolerance;
        if reading.timestamp < floor {
            return Err(IngestError::InvalidTimestamp {
                entity: reading.entity_id.clone(),
                pollutant: reading.pollutant.as_str().to_string(),
            });
        }

        if reading.timestamp >= state.window_end {
            let (new_start, new_end) = bucket_bounds(reading.timestamp, self.window);
            // Trend history is one boundary deep: the baseline survives only
            // when the new bucket immediately follows the closed one.
            state.previous_average = if new_start == state.window_end {
                Some(state.average())
            } else {
                None
            };
            state.current = reading.value;
            state.sum = reading.value;
            state.count = 1;
            state.peak = reading.value;
            state.window_start = new_start;
            state.window_end = new_end;
            state.last_timestamp = reading.timestamp;
            return Ok(());
        }

        // A reading within skew tolerance of a just-crossed boundary lands
        // here and is folded into the open window; closed windows never
        // reopen.
        state.sum += reading.value;
        state.count += 1;
        if reading.value > state.peak {
            state.peak = reading.value;
        }
        if reading.timestamp >= state.last_timestamp {
            state.current = reading.value;
            state.last_timestamp = reading.timestamp;
        }
        Ok(())
    }

    fn entry(&self, reading: &Reading) -> (Arc<Mutex<WindowState>>, bool) {
        let key = WindowKey {
            entity_id: reading.entity_id.clone(),
            pollutant: reading.pollutant,
        };
        if let Ok(windows) = self.windows.read()
            && let Some(entry) = windows.get(&key)
        {
            return (Arc::clone(entry), false);
        }
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
        let mut created = false;
        let entry = windows.entry(key).or_insert_with(|| {
            created = true;
            Arc::new(Mutex::new(WindowState::open(reading, self.window)))
        });
        (Arc::clone(entry), created)
    }

    pub fn average(&self, entity_id: &str, pollutant: Pollutant) -> f64 {
        self.with_state(entity_id, pollutant, WindowState::average)
            .unwrap_or(0.0)
    }

    pub fn peak(&self, entity_id: &str, pollutant: Pollutant) -> f64 {
        self.with_state(entity_id, pollutant, |state| state.peak)
            .unwrap_or(0.0)
    }

    pub fn current(&self, entity_id: &str, pollutant: Pollutant) -> f64 {
        self.with_state(entity_id, pollutant, |state| state.current)
            .unwrap_or(0.0)
    }

    fn with_state<T>(
        &self,
        entity_id: &str,
        pollutant: Pollutant,
        read: impl FnOnce(&WindowState) -> T,
    ) -> Option<T> {
        let key = WindowKey {
            entity_id: entity_id.to_string(),
            pollutant,
        };
        let entry = {
            let windows = self.windows.read().ok()?;
            Arc::clone(windows.get(&key)?)
        };
        let state = entry.lock().ok()?;
        Some(read(&state))
    }

    /// Copy every window state for snapshotting. Each tuple is read under its
    /// key's lock, so a concurrent fold can never expose a torn
    /// `(sum, count, peak, previous_average)`.
    pub fn views(&self) -> Vec<(WindowKey, WindowState)> {
        let entries: Vec<(WindowKey, Arc<Mutex<WindowState>>)> = match self.windows.read() {
            Ok(windows) => windows
                .iter()
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect(),
            Err(_) => return Vec::new(),
        };

        entries
            .into_iter()
            .filter_map(|(key, entry)| {
                let state = entry.lock().ok()?;
                Some((key, state.clone()))
            })
            .collect()
    }

    /// Drop keys with no accepted reading for `idle_after`. Returns how many
    /// were evicted.
    pub fn evict_idle(&self, now: OffsetDateTime, idle_after: Duration) -> usize {
        let Ok(mut windows) = self.windows.write() else {
            return 0;
        };
        let before = windows.len();
        let idle_secs = idle_after.as_secs() as i64;
        windows.retain(|_, entry| match entry.lock() {
            Ok(state) => (now - state.last_timestamp).whole_seconds() <= idle_secs,
            Err(_) => false,
        });
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.read().map(|windows| windows.len()).unwrap_or(0)
    }
}

fn bucket_bounds(ts: OffsetDateTime, window: Duration) -> (OffsetDateTime, OffsetDateTime) {
    let window_secs = window.as_secs().max(1) as i64;
    let start_secs = ts.unix_timestamp().div_euclid(window_secs) * window_secs;
    let start = OffsetDateTime::from_unix_timestamp(start_secs).unwrap_or(ts);
    (start, start + window)
}

//! The telemetry engine: owns the rolling aggregator, the current-cycle
//! reading buffer, ingest counters, and the snapshot publisher.
//!
//! One worker task applies queued readings; a periodic scheduler drives
//! `tick`. Producers submit through a bounded queue and never block.

use crate::error::IngestError;
use crate::hotspot::{self, ThresholdTable};
use crate::reading::{Pollutant, Reading};
use crate::snapshot::{PollutantSummary, Snapshot, SnapshotPublisher};
use crate::trend;
use crate::window::{RollingAggregator, WindowKey, WindowState};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Rolling window length; also the bucket the wall clock is partitioned
    /// into for rollover.
    pub window: Duration,
    pub tick_interval: Duration,
    pub trend_epsilon: f64,
    pub skew_tolerance: Duration,
    pub idle_eviction: Duration,
    pub thresholds: ThresholdTable,
    pub snapshot_stream_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(24 * 3600),
            tick_interval: Duration::from_secs(10),
            trend_epsilon: trend::DEFAULT_EPSILON,
            skew_tolerance: Duration::from_secs(5),
            idle_eviction: Duration::from_secs(3 * 24 * 3600),
            thresholds: ThresholdTable::default(),
            snapshot_stream_capacity: 32,
        }
    }
}

/// Drop-and-count bookkeeping for the ingest path. Nothing here is fatal;
/// the operational collaborator reads these via the stats endpoint.
#[derive(Debug, Default)]
pub struct IngestCounters {
    pub accepted: AtomicU64,
    pub invalid_value: AtomicU64,
    pub invalid_timestamp: AtomicU64,
    pub overflow_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterTotals {
    pub accepted: u64,
    pub invalid_value: u64,
    pub invalid_timestamp: u64,
    pub overflow_dropped: u64,
}

impl IngestCounters {
    pub fn totals(&self) -> CounterTotals {
        CounterTotals {
            accepted: self.accepted.load(Ordering::Relaxed),
            invalid_value: self.invalid_value.load(Ordering::Relaxed),
            invalid_timestamp: self.invalid_timestamp.load(Ordering::Relaxed),
            overflow_dropped: self.overflow_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    settings: EngineSettings,
    aggregator: RollingAggregator,
    cycle_readings: Mutex<Vec<Reading>>,
    counters: Arc<IngestCounters>,
    publisher: SnapshotPublisher,
    cycle: AtomicU64,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        let aggregator = RollingAggregator::new(settings.window, settings.skew_tolerance);
        let publisher = SnapshotPublisher::new(settings.snapshot_stream_capacity);
        Self {
            settings,
            aggregator,
            cycle_readings: Mutex::new(Vec::new()),
            counters: Arc::new(IngestCounters::default()),
            publisher,
            cycle: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        Arc::clone(&self.counters)
    }

    /// Validate one reading and fold it into the rolling state. Rejected
    /// readings are dropped and counted, never reordered or retried.
    pub fn ingest(&self, reading: Reading) -> Result<(), IngestError> {
        if !reading.value.is_finite() || reading.value < 0.0 {
            self.counters.invalid_value.fetch_add(1, Ordering::Relaxed);
            return Err(IngestError::InvalidValue(reading.value));
        }

        if let Err(err) = self.aggregator.fold(&reading) {
            if matches!(err, IngestError::InvalidTimestamp { .. }) {
                self.counters.invalid_timestamp.fetch_add(1, Ordering::Relaxed);
            }
            return Err(err);
        }

        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        self.cycle_readings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(reading);
        Ok(())
    }

    /// Build and publish one snapshot: hotspots from the readings seen since
    /// the last tick, alerts from the high-severity hotspots, and per-
    /// pollutant summaries combined across every live entity window.
    pub fn tick(&self, now: OffsetDateTime) -> Snapshot {
        let readings = std::mem::take(
            &mut *self
                .cycle_readings
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        let hotspots: Vec<_> = readings
            .iter()
            .enumerate()
            .map(|(index, reading)| {
                hotspot::classify_reading(index as u32 + 1, reading, &self.settings.thresholds)
            })
            .collect();
        let alerts = hotspot::evaluate_alerts(&hotspots, now);

        let evicted = self.aggregator.evict_idle(now, self.settings.idle_eviction);
        if evicted > 0 {
            tracing::info!(evicted, "evicted idle entity windows");
        }

        let views = self.aggregator.views();
        let summaries = Pollutant::ALL
            .iter()
            .map(|pollutant| self.summarize(&views, *pollutant))
            .collect();

        let snapshot = Snapshot {
            generated_at: now,
            cycle: self.cycle.fetch_add(1, Ordering::Relaxed) + 1,
            summaries,
            hotspots,
            alerts,
        };
        self.publisher.publish(snapshot.clone());
        snapshot
    }

    fn summarize(&self, views: &[(WindowKey, WindowState)], pollutant: Pollutant) -> PollutantSummary {
        let mut total_sum = 0.0;
        let mut total_count = 0u64;
        let mut peak = 0.0f64;
        let mut latest: Option<(OffsetDateTime, f64)> = None;
        let mut baselines = Vec::new();

        for (key, state) in views {
            if key.pollutant != pollutant {
                continue;
            }
            total_sum += state.sum;
            total_count += state.count;
            if state.peak > peak {
                peak = state.peak;
            }
            if latest.map(|(ts, _)| state.last_timestamp > ts).unwrap_or(true) {
                latest = Some((state.last_timestamp, state.current));
            }
            if let Some(previous) = state.previous_average {
                baselines.push(previous);
            }
        }

        let average = if total_count == 0 {
            0.0
        } else {
            total_sum / total_count as f64
        };
        let previous = if baselines.is_empty() {
            0.0
        } else {
            baselines.iter().sum::<f64>() / baselines.len() as f64
        };

        PollutantSummary {
            pollutant,
            current: latest.map(|(_, value)| value).unwrap_or(0.0),
            average,
            peak,
            trend: trend::classify(average, previous, self.settings.trend_epsilon),
        }
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.publisher.latest()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<Option<Snapshot>> {
        self.publisher.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.publisher.subscribe()
    }

    pub fn tracked_keys(&self) -> usize {
        self.aggregator.tracked_keys()
    }
}

/// Producer-facing handle over the bounded ingest queue. `submit` is
/// fire-and-forget: a full queue drops the reading and counts the drop.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<Reading>,
    counters: Arc<IngestCounters>,
}

impl IngestQueue {
    pub fn submit(&self, reading: Reading) {
        if self.tx.try_send(reading).is_err() {
            self.counters.overflow_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub fn ingest_queue(engine: &Engine, capacity: usize) -> (IngestQueue, mpsc::Receiver<Reading>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        IngestQueue {
            tx,
            counters: engine.counters(),
        },
        rx,
    )
}

/// Drain the ingest queue into the engine. Exits when every producer handle
/// has been dropped, which is how shutdown guarantees pending readings are
/// flushed before the final snapshot.
pub fn spawn_ingest_worker(
    engine: Arc<Engine>,
    mut rx: mpsc::Receiver<Reading>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(reading) = rx.recv().await {
            if let Err(err) = engine.ingest(reading) {
                tracing::debug!(error = %err, "reading rejected");
            }
        }
        tracing::debug!("ingest queue closed; worker exiting");
    })
}

pub fn spawn_scheduler(
    engine: Arc<Engine>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(engine.settings().tick_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = engine.tick(OffsetDateTime::now_utc());
                    tracing::debug!(
                        cycle = snapshot.cycle,
                        hotspots = snapshot.hotspots.len(),
                        alerts = snapshot.alerts.len(),
                        "snapshot published"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotspot::Severity;
    use crate::reading::GeoPoint;
    use crate::trend::TrendDirection;

    fn ts(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).expect("valid timestamp")
    }

    fn reading(entity: &str, pollutant: Pollutant, value: f64, at: i64) -> Reading {
        Reading {
            entity_id: entity.to_string(),
            pollutant,
            value,
            location: GeoPoint { lat: 40.71, lng: -74.0 },
            timestamp: ts(at),
        }
    }

    fn engine() -> Engine {
        Engine::new(EngineSettings {
            window: Duration::from_secs(3600),
            ..EngineSettings::default()
        })
    }

    #[test]
    fn non_finite_and_negative_values_are_rejected_and_counted() {
        let engine = engine();

        assert!(matches!(
            engine.ingest(reading("veh-1", Pollutant::Co, -1.0, 100)),
            Err(IngestError::InvalidValue(_))
        ));
        assert!(matches!(
            engine.ingest(reading("veh-1", Pollutant::Co, f64::NAN, 100)),
            Err(IngestError::InvalidValue(_))
        ));

        let totals = engine.counters().totals();
        assert_eq!(totals.invalid_value, 2);
        assert_eq!(totals.accepted, 0);
        assert_eq!(engine.tracked_keys(), 0);
    }

    #[test]
    fn excessively_out_of_order_readings_are_rejected_and_counted() {
        let engine = engine();
        engine
            .ingest(reading("veh-1", Pollutant::Co, 2.0, 100))
            .expect("accepted");

        assert!(matches!(
            engine.ingest(reading("veh-1", Pollutant::Co, 3.0, 50)),
            Err(IngestError::InvalidTimestamp { .. })
        ));

        let totals = engine.counters().totals();
        assert_eq!(totals.invalid_timestamp, 1);
        assert_eq!(totals.accepted, 1);
    }

    #[test]
    fn tick_classifies_the_cycle_readings_into_hotspots() {
        let engine = engine();
        engine.ingest(reading("veh-1", Pollutant::Co, 2.0, 100)).expect("accepted");
        engine.ingest(reading("veh-2", Pollutant::Co, 5.0, 101)).expect("accepted");
        engine.ingest(reading("veh-3", Pollutant::Co, 9.0, 102)).expect("accepted");

        let snapshot = engine.tick(ts(110));

        assert_eq!(snapshot.cycle, 1);
        assert_eq!(snapshot.hotspots.len(), 3);
        assert_eq!(
            snapshot.hotspots.iter().map(|h| h.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(snapshot.hotspots[0].severity, Severity::Low);
        assert_eq!(snapshot.hotspots[1].severity, Severity::Medium);
        assert_eq!(snapshot.hotspots[2].severity, Severity::High);

        assert_eq!(snapshot.alerts.len(), 1);
        assert_eq!(snapshot.alerts[0].hotspot_id, 3);
        assert_eq!(snapshot.alerts[0].raised_at, ts(110));
    }

    #[test]
    fn summaries_combine_windows_across_entities() {
        let engine = engine();
        engine.ingest(reading("veh-1", Pollutant::Co, 2.0, 100)).expect("accepted");
        engine.ingest(reading("veh-1", Pollutant::Co, 4.0, 101)).expect("accepted");
        engine.ingest(reading("veh-2", Pollutant::Co, 6.0, 102)).expect("accepted");
        engine.ingest(reading("veh-1", Pollutant::Co2, 400.0, 103)).expect("accepted");

        let snapshot = engine.tick(ts(110));

        let co = snapshot.summary(Pollutant::Co).expect("CO summary");
        assert!((co.average - 4.0).abs() < 1e-9);
        assert_eq!(co.peak, 6.0);
        // veh-2 holds the most recent CO reading.
        assert_eq!(co.current, 6.0);

        let co2 = snapshot.summary(Pollutant::Co2).expect("CO2 summary");
        assert!((co2.average - 400.0).abs() < 1e-9);
        assert_eq!(co2.current, 400.0);
    }

    #[test]
    fn tick_without_new_readings_repeats_aggregates() {
        let engine = engine();
        engine.ingest(reading("veh-1", Pollutant::Co, 2.0, 100)).expect("accepted");
        engine.ingest(reading("veh-1", Pollutant::Co, 4.0, 101)).expect("accepted");

        let first = engine.tick(ts(110));
        let second = engine.tick(ts(120));

        assert_eq!(first.summaries, second.summaries);
        assert!(second.hotspots.is_empty());
        assert!(second.alerts.is_empty());
        assert_ne!(first.cycle, second.cycle);
    }

    #[test]
    fn trend_reflects_previous_window_after_rollover() {
        let engine = engine();
        engine.ingest(reading("veh-1", Pollutant::Co, 4.0, 100)).expect("accepted");
        // Next hour bucket, 10% above the archived average.
        engine.ingest(reading("veh-1", Pollutant::Co, 4.4, 3700)).expect("accepted");

        let snapshot = engine.tick(ts(3710));
        let co = snapshot.summary(Pollutant::Co).expect("CO summary");

        assert_eq!(co.trend.direction, TrendDirection::Up);
        assert_eq!(co.trend.percentage, 10);
    }

    #[test]
    fn queue_overflow_drops_newest_and_counts() {
        let engine = engine();
        let (queue, _rx) = ingest_queue(&engine, 2);

        queue.submit(reading("veh-1", Pollutant::Co, 1.0, 100));
        queue.submit(reading("veh-1", Pollutant::Co, 2.0, 101));
        queue.submit(reading("veh-1", Pollutant::Co, 3.0, 102));

        assert_eq!(engine.counters().totals().overflow_dropped, 1);
    }

    #[test]
    fn tick_publishes_to_subscribers() {
        let engine = engine();
        let mut stream = engine.subscribe();

        engine.ingest(reading("veh-1", Pollutant::Co, 2.0, 100)).expect("accepted");
        let snapshot = engine.tick(ts(110));

        assert_eq!(engine.latest(), Some(snapshot.clone()));
        assert_eq!(stream.try_recv().expect("streamed snapshot"), snapshot);
    }
}

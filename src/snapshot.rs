//! Immutable per-cycle snapshots and their fan-out.
//!
//! The publisher keeps the latest snapshot on a watch channel and streams
//! every snapshot over a bounded broadcast channel. A slow subscriber lags
//! and loses the oldest entries; it never blocks the tick or ingest path.

use crate::hotspot::{Alert, Hotspot};
use crate::reading::Pollutant;
use crate::trend::TrendResult;
use time::OffsetDateTime;
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, PartialEq)]
pub struct PollutantSummary {
    pub pollutant: Pollutant,
    pub current: f64,
    pub average: f64,
    pub peak: f64,
    pub trend: TrendResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub generated_at: OffsetDateTime,
    pub cycle: u64,
    pub summaries: Vec<PollutantSummary>,
    pub hotspots: Vec<Hotspot>,
    pub alerts: Vec<Alert>,
}

impl Snapshot {
    pub fn summary(&self, pollutant: Pollutant) -> Option<&PollutantSummary> {
        self.summaries
            .iter()
            .find(|summary| summary.pollutant == pollutant)
    }
}

#[derive(Debug)]
pub struct SnapshotPublisher {
    latest_tx: watch::Sender<Option<Snapshot>>,
    stream_tx: broadcast::Sender<Snapshot>,
}

impl SnapshotPublisher {
    pub fn new(stream_capacity: usize) -> Self {
        let (latest_tx, _latest_rx) = watch::channel(None);
        let (stream_tx, _stream_rx) = broadcast::channel(stream_capacity.max(1));
        Self {
            latest_tx,
            stream_tx,
        }
    }

    pub fn publish(&self, snapshot: Snapshot) {
        self.latest_tx.send_replace(Some(snapshot.clone()));
        // No subscribers is not an error; the latest value is still retained.
        let _ = self.stream_tx.send(snapshot);
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.latest_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Snapshot>> {
        self.latest_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.stream_tx.subscribe()
    }
}

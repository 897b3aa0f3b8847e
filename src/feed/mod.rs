//! Inbound reading feed boundary.
//!
//! The engine is identical whether it is driven by live hardware or a
//! simulator; both sit behind `ReadingFeed`. The feed task absorbs poll
//! failures and retries on the next interval, so a feed outage costs only
//! the readings produced during the outage — never the in-memory window
//! state.

use crate::engine::IngestQueue;
use crate::error::FeedError;
use crate::reading::Reading;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub mod synthetic;

pub trait ReadingFeed: Send {
    /// Label used in logs.
    fn label(&self) -> &str;

    /// Collect the readings that arrived since the last poll.
    fn poll(&mut self) -> Result<Vec<Reading>, FeedError>;
}

/// Drive a feed on a fixed interval, submitting every reading to the bounded
/// ingest queue. Stops when the shutdown signal flips, dropping its queue
/// handle so the ingest worker can drain and exit.
pub fn spawn_feed_task<F>(
    mut feed: F,
    queue: IngestQueue,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    F: ReadingFeed + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match feed.poll() {
                        Ok(readings) => {
                            debug!(feed = feed.label(), count = readings.len(), "feed batch");
                            for reading in readings {
                                queue.submit(reading);
                            }
                        }
                        Err(err) => {
                            warn!(feed = feed.label(), error = %err, "feed poll failed; retrying next interval");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(feed = feed.label(), "feed task stopped");
    })
}

use plume_watch::engine::{Engine, EngineSettings};
use plume_watch::feed::ReadingFeed;
use plume_watch::feed::synthetic::{SyntheticFeed, SyntheticFeedConfig};
use plume_watch::hotspot::Severity;
use plume_watch::reading::{GeoPoint, Pollutant, Reading};
use plume_watch::window::RollingAggregator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

fn ts(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs).expect("valid timestamp")
}

fn test_settings() -> EngineSettings {
    EngineSettings {
        window: Duration::from_secs(3600),
        ..EngineSettings::default()
    }
}

#[test]
fn synthetic_feed_drives_a_full_snapshot_cycle() {
    let engine = Engine::new(test_settings());
    let mut feed = SyntheticFeed::new(SyntheticFeedConfig {
        vehicles: 4,
        seed: Some(7),
        ..SyntheticFeedConfig::default()
    });

    let readings = feed.poll().expect("synthetic poll never fails");
    assert_eq!(readings.len(), 8);
    for reading in readings {
        engine.ingest(reading).expect("synthetic readings are valid");
    }

    let snapshot = engine.tick(OffsetDateTime::now_utc());

    assert_eq!(snapshot.cycle, 1);
    assert_eq!(snapshot.summaries.len(), 2);
    assert_eq!(snapshot.hotspots.len(), 8);
    let high = snapshot
        .hotspots
        .iter()
        .filter(|h| h.severity == Severity::High)
        .count();
    assert_eq!(snapshot.alerts.len(), high);
    assert_eq!(engine.counters().totals().accepted, 8);

    for pollutant in Pollutant::ALL {
        let summary = snapshot.summary(pollutant).expect("summary per pollutant");
        assert!(summary.average > 0.0);
        assert!(summary.peak >= summary.current);
    }
}

#[test]
fn alerts_match_high_hotspots_in_input_order() {
    let engine = Engine::new(test_settings());
    let values = [9.0, 2.0, 8.5, 4.0];
    for (index, value) in values.iter().enumerate() {
        engine
            .ingest(Reading {
                entity_id: format!("veh-{index}"),
                pollutant: Pollutant::Co,
                value: *value,
                location: GeoPoint { lat: 40.71, lng: -74.0 },
                timestamp: ts(100 + index as i64),
            })
            .expect("accepted");
    }

    let snapshot = engine.tick(ts(200));

    assert_eq!(snapshot.alerts.len(), 2);
    assert_eq!(snapshot.alerts[0].hotspot_id, 1);
    assert_eq!(snapshot.alerts[1].hotspot_id, 3);
}

#[test]
fn repeated_ticks_without_readings_keep_aggregates_stable() {
    let engine = Engine::new(test_settings());
    engine
        .ingest(Reading {
            entity_id: "veh-1".to_string(),
            pollutant: Pollutant::Co2,
            value: 420.0,
            location: GeoPoint { lat: 40.71, lng: -74.0 },
            timestamp: ts(100),
        })
        .expect("accepted");

    let first = engine.tick(ts(110));
    let second = engine.tick(ts(120));
    let third = engine.tick(ts(130));

    assert_eq!(first.summaries, second.summaries);
    assert_eq!(second.summaries, third.summaries);
    assert!(second.hotspots.is_empty() && third.hotspots.is_empty());
}

#[test]
fn concurrent_producers_lose_nothing_and_readers_see_consistent_tuples() {
    let aggregator = Arc::new(RollingAggregator::new(
        Duration::from_secs(3600),
        Duration::from_secs(5),
    ));
    let done = Arc::new(AtomicBool::new(false));
    let producers = 4;
    let per_producer = 500;

    let reader = {
        let aggregator = Arc::clone(&aggregator);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                for (_, state) in aggregator.views() {
                    // Every value folded is 1.0, so any consistent tuple has
                    // sum == count exactly; a torn pair would not.
                    assert!((state.sum - state.count as f64).abs() < 1e-9);
                    assert!(state.peak >= state.current);
                }
            }
        })
    };

    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let aggregator = Arc::clone(&aggregator);
            std::thread::spawn(move || {
                for _ in 0..per_producer {
                    aggregator
                        .fold(&Reading {
                            entity_id: "veh-shared".to_string(),
                            pollutant: Pollutant::Co,
                            value: 1.0,
                            location: GeoPoint { lat: 40.71, lng: -74.0 },
                            timestamp: ts(100),
                        })
                        .expect("accepted");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("producer thread panicked");
    }
    done.store(true, Ordering::Relaxed);
    reader.join().expect("reader thread panicked");

    let views = aggregator.views();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].1.count, (producers * per_producer) as u64);
}

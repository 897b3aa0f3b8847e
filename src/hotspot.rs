//! Severity classification of readings into geographically anchored hotspots,
//! and alert evaluation over the classified set.
//!
//! Thresholds are configuration, not constants: safe limits differ per
//! pollutant. Classification is stateless per call; the hotspot set of a
//! snapshot is simply the classified readings of one cycle.

use crate::reading::{GeoPoint, Pollutant, Reading};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Half-open severity bands: `value < low` is low, `value < high` is medium,
/// anything else is high. A value exactly on a boundary lands in the higher
/// tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityThresholds {
    pub low: f64,
    pub high: f64,
}

impl SeverityThresholds {
    pub fn classify(&self, value: f64) -> Severity {
        if value < self.low {
            Severity::Low
        } else if value < self.high {
            Severity::Medium
        } else {
            Severity::High
        }
    }
}

/// Per-pollutant threshold set supplied at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTable {
    pub co: SeverityThresholds,
    pub co2: SeverityThresholds,
}

impl ThresholdTable {
    pub fn for_pollutant(&self, pollutant: Pollutant) -> SeverityThresholds {
        match pollutant {
            Pollutant::Co => self.co,
            Pollutant::Co2 => self.co2,
        }
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            co: SeverityThresholds { low: 3.0, high: 8.0 },
            co2: SeverityThresholds {
                low: 450.0,
                high: 600.0,
            },
        }
    }
}

/// One classified reading. Ids are insertion order within a snapshot and are
/// not durable across cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub id: u32,
    pub location: GeoPoint,
    pub pollutant: Pollutant,
    pub reading: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub hotspot_id: u32,
    pub severity: Severity,
    pub raised_at: OffsetDateTime,
}

pub fn classify_reading(id: u32, reading: &Reading, thresholds: &ThresholdTable) -> Hotspot {
    let severity = thresholds
        .for_pollutant(reading.pollutant)
        .classify(reading.value);
    Hotspot {
        id,
        location: reading.location,
        pollutant: reading.pollutant,
        reading: reading.value,
        severity,
    }
}

/// One alert per high-severity hotspot, in the input's insertion order.
/// Cross-cycle deduplication is left to the alerting collaborator.
pub fn evaluate_alerts(hotspots: &[Hotspot], raised_at: OffsetDateTime) -> Vec<Alert> {
    hotspots
        .iter()
        .filter(|hotspot| hotspot.severity == Severity::High)
        .map(|hotspot| Alert {
            hotspot_id: hotspot.id,
            severity: Severity::High,
            raised_at,
        })
        .collect()
}

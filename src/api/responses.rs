use crate::engine::CounterTotals;
use crate::hotspot::{Alert, Hotspot, Severity};
use crate::reading::Pollutant;
use crate::snapshot::{PollutantSummary, Snapshot};
use crate::trend::TrendDirection;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotSuccessResponse {
    pub cycle: u64,
    pub summaries: Vec<SummaryBody>,
    pub hotspots: Vec<HotspotBody>,
    pub alerts: Vec<AlertBody>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SummaryBody {
    pub pollutant: Pollutant,
    pub current: f64,
    pub average: f64,
    pub peak: f64,
    pub trend: TrendDirection,
    pub trend_percentage: u32,
    pub unit: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HotspotBody {
    pub id: u32,
    pub lat: f64,
    pub lng: f64,
    pub pollutant: Pollutant,
    pub reading: f64,
    pub severity: Severity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AlertBody {
    pub hotspot_id: u32,
    pub severity: Severity,
    pub raised_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotErrorResponse {
    pub error_code: SnapshotErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotErrorCode {
    NoData,
    InternalError,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthErrorResponse {
    pub error_code: HealthErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthErrorCode {
    InternalError,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StatsSuccessResponse {
    #[serde(flatten)]
    pub counters: CounterTotals,
    pub tracked_windows: usize,
    pub timestamp: String,
}

impl SummaryBody {
    pub fn from_summary(summary: &PollutantSummary) -> Self {
        Self {
            pollutant: summary.pollutant,
            current: summary.current,
            average: summary.average,
            peak: summary.peak,
            trend: summary.trend.direction,
            trend_percentage: summary.trend.percentage,
            unit: "ppm",
        }
    }
}

impl HotspotBody {
    pub fn from_hotspot(hotspot: &Hotspot) -> Self {
        Self {
            id: hotspot.id,
            lat: hotspot.location.lat,
            lng: hotspot.location.lng,
            pollutant: hotspot.pollutant,
            reading: hotspot.reading,
            severity: hotspot.severity,
        }
    }
}

impl AlertBody {
    pub fn from_alert(alert: &Alert) -> Self {
        let raised_at = alert
            .raised_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
        Self {
            hotspot_id: alert.hotspot_id,
            severity: alert.severity,
            raised_at,
        }
    }
}

impl SnapshotSuccessResponse {
    pub fn from_snapshot(snapshot: &Snapshot, timestamp: String) -> Self {
        Self {
            cycle: snapshot.cycle,
            summaries: snapshot
                .summaries
                .iter()
                .map(SummaryBody::from_summary)
                .collect(),
            hotspots: snapshot
                .hotspots
                .iter()
                .map(HotspotBody::from_hotspot)
                .collect(),
            alerts: snapshot.alerts.iter().map(AlertBody::from_alert).collect(),
            timestamp,
        }
    }
}

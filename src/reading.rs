use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Vehicle identifier as reported by the sensor feed.
pub type EntityId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pollutant {
    #[serde(rename = "CO")]
    Co,
    #[serde(rename = "CO2")]
    Co2,
}

impl Pollutant {
    pub const ALL: [Pollutant; 2] = [Pollutant::Co, Pollutant::Co2];

    pub fn as_str(self) -> &'static str {
        match self {
            Pollutant::Co => "CO",
            Pollutant::Co2 => "CO2",
        }
    }
}

impl std::fmt::Display for Pollutant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// One sensor sample: immutable once created, never persisted beyond window
/// retention.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub entity_id: EntityId,
    pub pollutant: Pollutant,
    /// Concentration in ppm.
    pub value: f64,
    pub location: GeoPoint,
    pub timestamp: OffsetDateTime,
}

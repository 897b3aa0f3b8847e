use thiserror::Error;

/// Rejection reasons for a single reading. Rejected readings are dropped and
/// counted, never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IngestError {
    #[error("reading value not finite or negative: {0}")]
    InvalidValue(f64),
    #[error("reading for {entity}/{pollutant} older than last accepted minus skew tolerance")]
    InvalidTimestamp { entity: String, pollutant: String },
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed disconnected: {0}")]
    Disconnected(String),
    #[error("feed produced malformed batch: {0}")]
    Malformed(String),
}

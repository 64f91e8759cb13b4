use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = StaError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StaError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode JSON from {url}")]
    JsonDecode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Thing {thing} is missing required field '{field}'")]
    MissingField { thing: String, field: &'static str },

    #[error("Thing {0} has no datastreams")]
    NoDatastream(String),

    #[error("Start date {start} is after end date {end}")]
    InvalidWindow { start: time::Date, end: time::Date },

    #[error("Invalid timestamp '{value}'")]
    Timestamp {
        value: String,
        #[source]
        source: time::error::Parse,
    },

    #[error("Pagination stopped at offset {offset} for {url}; results would be truncated")]
    PaginationLimit { url: String, offset: u64 },

    #[error("Failed to format timestamp")]
    TimeFormat(#[from] time::error::Format),

    #[error("I/O error on output file '{0}'")]
    OutputIo(PathBuf, #[source] std::io::Error),

    #[error("Failed to write frame to '{0}'")]
    OutputFrame(PathBuf, #[source] PolarsError),

    #[error("Failed to build output frame")]
    Frame(#[from] PolarsError),
}

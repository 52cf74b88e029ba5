//! Error types for the demand pipeline.
//!
//! Empty partitions and an empty final table are valid states and are
//! represented as empty tables, never as errors.

use thiserror::Error;

/// Failures raised while deriving features or aggregating partitions.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed departure timestamp {value:?} on ticket {ticket_key}")]
    MalformedTimestamp { ticket_key: String, value: String },

    #[error("partition for service {service} failed: {source}")]
    PartitionFailed {
        service: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("worker for service {service} did not complete: {message}")]
    WorkerFailed { service: String, message: String },
}

/// Failures raised while reading the ticket dataset.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("missing column {0:?}")]
    MissingColumn(String),

    #[error("null value in column {column:?} at row {row}")]
    NullValue { column: String, row: usize },

    #[error("invalid price {value:?} on ticket {ticket_key}")]
    InvalidPrice { ticket_key: String, value: String },

    #[error("invalid confirmation flag {value:?} at row {row}")]
    InvalidFlag { row: usize, value: String },

    #[error("invalid S3 URI {0:?}, expected s3://bucket/key")]
    InvalidUri(String),

    #[error("unsupported dataset format for {0:?}")]
    UnsupportedFormat(String),

    #[error("S3 read failed: {0}")]
    S3(String),
}

/// Failures raised by a [`Sink`](crate::sink::Sink).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("sink write failed: {0}")]
    Write(String),

    #[error("invalid table name {0:?}")]
    InvalidTableName(String),
}

/// Failures of a whole run: load, aggregate, publish.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

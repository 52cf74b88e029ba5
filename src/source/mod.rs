//! Loading of the ticket snapshot.
//!
//! A source is a local path or an `s3://bucket/key` URI pointing at a Parquet
//! file or a CSV file (optionally gzip-compressed).

mod csv_reader;
mod parquet_reader;

pub use csv_reader::read_csv;
pub use parquet_reader::read_parquet;

use bytes::Bytes;
use flate2::read::GzDecoder;
use std::fs::File;
use tracing::info;

use crate::error::SourceError;
use crate::pipeline::types::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Parquet,
    Csv,
    CsvGz,
}

impl SourceFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &str) -> Result<Self, SourceError> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".parquet") || lower.ends_with(".pq") {
            Ok(Self::Parquet)
        } else if lower.ends_with(".csv.gz") {
            Ok(Self::CsvGz)
        } else if lower.ends_with(".csv") {
            Ok(Self::Csv)
        } else {
            Err(SourceError::UnsupportedFormat(path.to_string()))
        }
    }
}

/// Splits `s3://bucket/key` into bucket and key.
pub fn parse_s3_uri(uri: &str) -> Result<(&str, &str), SourceError> {
    uri.strip_prefix("s3://")
        .and_then(|rest| rest.split_once('/'))
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .ok_or_else(|| SourceError::InvalidUri(uri.to_string()))
}

fn decode(format: SourceFormat, bytes: Bytes) -> Result<Vec<Ticket>, SourceError> {
    match format {
        SourceFormat::Parquet => read_parquet(bytes),
        SourceFormat::Csv => read_csv(bytes.as_ref()),
        SourceFormat::CsvGz => read_csv(GzDecoder::new(bytes.as_ref())),
    }
}

async fn fetch_object(bucket: &str, key: &str) -> Result<Bytes, SourceError> {
    let config = aws_config::load_from_env().await;
    let client = aws_sdk_s3::Client::new(&config);

    let object = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| SourceError::S3(format!("{e:?}")))?;

    let body = object
        .body
        .collect()
        .await
        .map_err(|e| SourceError::S3(e.to_string()))?;

    Ok(body.into_bytes())
}

/// Loads all tickets from `location`.
#[tracing::instrument]
pub async fn load_tickets(location: &str) -> Result<Vec<Ticket>, SourceError> {
    info!("Loading data");

    let tickets = if location.starts_with("s3://") {
        let (bucket, key) = parse_s3_uri(location)?;
        let format = SourceFormat::from_path(key)?;
        let bytes = fetch_object(bucket, key).await?;
        decode(format, bytes)?
    } else {
        match SourceFormat::from_path(location)? {
            SourceFormat::Parquet => read_parquet(File::open(location)?)?,
            SourceFormat::Csv => read_csv(File::open(location)?)?,
            SourceFormat::CsvGz => read_csv(GzDecoder::new(File::open(location)?))?,
        }
    };

    info!(tickets = tickets.len(), "Data loaded");
    Ok(tickets)
}

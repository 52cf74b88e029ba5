//! Destinations for the final table.
//!
//! Every sink has replace semantics: a table written under an existing name
//! fully replaces the previous one. After writing, the sink reads back the
//! number of rows the destination now holds.

mod csv_file;
mod postgres;
mod s3;

pub use csv_file::CsvSink;
pub use postgres::PostgresSink;
pub use s3::S3Sink;

use async_trait::async_trait;
use tracing::info;

use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::pipeline::types::FinalAggregate;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Replaces `table_name` with `table` and returns the resulting row count.
    async fn replace_table(&self, table: &FinalAggregate, table_name: &str)
    -> Result<u64, SinkError>;
}

/// Accepts plain SQL identifiers: a letter or `_`, then letters, digits or `_`,
/// at most 63 bytes.
pub fn validate_table_name(name: &str) -> Result<(), SinkError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_head && valid_tail && name.len() <= 63 {
        Ok(())
    } else {
        Err(SinkError::InvalidTableName(name.to_string()))
    }
}

/// Builds the sink described by `config`.
pub async fn connect(config: &SinkConfig) -> Result<Box<dyn Sink>, SinkError> {
    match config {
        SinkConfig::Postgres { url } => {
            info!("Connecting to PostgreSQL");
            Ok(Box::new(PostgresSink::connect(url).await?))
        }
        SinkConfig::Csv { dir } => Ok(Box::new(CsvSink::new(dir))),
        SinkConfig::S3 {
            bucket,
            prefix,
            gzip,
        } => {
            info!(bucket = %bucket, gzip, "S3 sink enabled");
            let aws = aws_config::load_from_env().await;
            Ok(Box::new(S3Sink::new(
                aws_sdk_s3::Client::new(&aws),
                bucket,
                prefix,
                *gzip,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_table_names() {
        assert!(validate_table_name("od_demand").is_ok());
        assert!(validate_table_name("_tmp2").is_ok());
    }

    #[test]
    fn test_invalid_table_names() {
        let long = "a".repeat(64);
        for name in ["", "1table", "od-demand", "x; DROP TABLE y", "naïve", long.as_str()] {
            assert!(
                matches!(validate_table_name(name), Err(SinkError::InvalidTableName(_))),
                "{name:?} should be rejected"
            );
        }
    }
}

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::Write;
use tracing::info;

use super::csv_file::{count_csv_rows, write_csv};
use super::{Sink, validate_table_name};
use crate::error::SinkError;
use crate::pipeline::types::FinalAggregate;

/// Connectivity failures mean the bucket could not be reached at all.
fn classify<E, R>(err: SdkError<E, R>) -> SinkError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            SinkError::Unavailable(format!("{err:?}"))
        }
        other => SinkError::Write(format!("{other:?}")),
    }
}

/// Uploads the table as a CSV object, optionally gzip-compressed.
///
/// A PUT replaces any existing object under the same key.
pub struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    gzip: bool,
}

impl S3Sink {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, prefix: &str, gzip: bool) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            gzip,
        }
    }

    pub fn object_key(&self, table_name: &str) -> String {
        let file = if self.gzip {
            format!("{table_name}.csv.gz")
        } else {
            format!("{table_name}.csv")
        };
        if self.prefix.is_empty() {
            file
        } else {
            format!("{}/{}", self.prefix, file)
        }
    }

    fn encode(&self, table: &FinalAggregate) -> Result<Vec<u8>, SinkError> {
        let mut csv_bytes = Vec::new();
        write_csv(table, &mut csv_bytes).map_err(|e| SinkError::Write(e.to_string()))?;

        if !self.gzip {
            return Ok(csv_bytes);
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&csv_bytes)
            .map_err(|e| SinkError::Write(e.to_string()))?;
        encoder.finish().map_err(|e| SinkError::Write(e.to_string()))
    }
}

#[async_trait]
impl Sink for S3Sink {
    #[tracing::instrument(skip(self, table), fields(bucket = %self.bucket, rows = table.len()))]
    async fn replace_table(
        &self,
        table: &FinalAggregate,
        table_name: &str,
    ) -> Result<u64, SinkError> {
        validate_table_name(table_name)?;
        let key = self.object_key(table_name);
        let body = self.encode(table)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("text/csv")
            .send()
            .await
            .map_err(classify)?;
        info!(key = %key, "S3 upload complete");

        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(classify)?;
        let stored = object
            .body
            .collect()
            .await
            .map_err(|e| SinkError::Write(e.to_string()))?
            .into_bytes();

        let rows = if self.gzip {
            count_csv_rows(GzDecoder::new(stored.as_ref()))
        } else {
            count_csv_rows(stored.as_ref())
        };
        rows.map_err(|e| SinkError::Write(e.to_string()))
    }
}

//! CSV persistence for the final table.

use async_trait::async_trait;
use csv::{ReaderBuilder, WriterBuilder};
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Sink, validate_table_name};
use crate::error::SinkError;
use crate::pipeline::types::{FINAL_COLUMNS, FinalAggregate};

/// Writes the table as CSV, header first.
///
/// The header is written explicitly so an empty table still carries its schema.
pub(crate) fn write_csv<W: Write>(table: &FinalAggregate, out: W) -> Result<(), csv::Error> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);

    writer.write_record(FINAL_COLUMNS)?;
    for row in &table.rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Counts data rows of a CSV document with a header line.
pub(crate) fn count_csv_rows<R: Read>(input: R) -> Result<u64, csv::Error> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(input);
    let mut rows = 0;
    for record in reader.records() {
        record?;
        rows += 1;
    }
    Ok(rows)
}

fn write_error(path: &Path, e: impl Display) -> SinkError {
    SinkError::Write(format!("{}: {e}", path.display()))
}

/// Stores each table as `<dir>/<table_name>.csv`.
///
/// The file is written beside the target and renamed over it, so readers see
/// either the old table or the new one.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn table_path(&self, table_name: &str) -> PathBuf {
        self.dir.join(format!("{table_name}.csv"))
    }
}

#[async_trait]
impl Sink for CsvSink {
    #[tracing::instrument(skip(self, table), fields(dir = %self.dir.display(), rows = table.len()))]
    async fn replace_table(
        &self,
        table: &FinalAggregate,
        table_name: &str,
    ) -> Result<u64, SinkError> {
        validate_table_name(table_name)?;

        fs::create_dir_all(&self.dir).map_err(|e| {
            SinkError::Unavailable(format!("cannot open {}: {e}", self.dir.display()))
        })?;

        let target = self.table_path(table_name);
        let staging = self.dir.join(format!(".{table_name}.csv.tmp"));
        debug!(path = %target.display(), "Replacing CSV table");

        let file = File::create(&staging).map_err(|e| write_error(&target, e))?;
        let staged = write_csv(table, file)
            .map_err(|e| write_error(&target, e))
            .and_then(|()| fs::rename(&staging, &target).map_err(|e| write_error(&target, e)));
        if let Err(e) = staged {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        let file = File::open(&target).map_err(|e| write_error(&target, e))?;
        count_csv_rows(file).map_err(|e| write_error(&target, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::FinalRow;
    use std::env;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir); // clean up any prior run
        dir
    }

    fn row(origin: &str, demand: u64) -> FinalRow {
        FinalRow {
            origin: origin.to_string(),
            destination: "Porto".to_string(),
            total_demand: demand,
            mean_price: 12.5,
            departure_year: 2024,
            departure_month: 5,
            departure_day: 1,
            departure_isoweekday: 3,
            timezone: "Europe/Lisbon".to_string(),
            departure_time: 600,
        }
    }

    #[tokio::test]
    async fn test_write_then_replace() {
        let dir = temp_dir("od_demand_test_csv_replace");
        let sink = CsvSink::new(&dir);

        let big = FinalAggregate {
            rows: vec![row("Lisboa", 3), row("Braga", 1)],
        };
        assert_eq!(sink.replace_table(&big, "od_demand").await.unwrap(), 2);

        let small = FinalAggregate {
            rows: vec![row("Faro", 7)],
        };
        assert_eq!(sink.replace_table(&small, "od_demand").await.unwrap(), 1);

        let content = fs::read_to_string(sink.table_path("od_demand")).unwrap();
        assert!(content.starts_with("origin,destination,total_demand,mean_price"));
        assert!(content.contains("Faro"));
        assert!(!content.contains("Lisboa"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_empty_table_keeps_header() {
        let dir = temp_dir("od_demand_test_csv_empty");
        let sink = CsvSink::new(&dir);

        let rows = sink
            .replace_table(&FinalAggregate::empty(), "empty_table")
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let content = fs::read_to_string(sink.table_path("empty_table")).unwrap();
        assert_eq!(content.trim_end(), FINAL_COLUMNS.join(","));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_rejects_bad_table_name() {
        let sink = CsvSink::new(temp_dir("od_demand_test_csv_name"));
        let err = sink
            .replace_table(&FinalAggregate::empty(), "../escape")
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::InvalidTableName(_)));
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_unavailable() {
        let blocker = env::temp_dir().join("od_demand_test_csv_blocker");
        let _ = fs::remove_dir_all(&blocker);
        fs::write(&blocker, b"not a directory").unwrap();

        let sink = CsvSink::new(blocker.join("nested"));
        let err = sink
            .replace_table(&FinalAggregate::empty(), "od_demand")
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));

        fs::remove_file(&blocker).unwrap();
    }

    #[tokio::test]
    async fn test_failed_rename_removes_staging_file() {
        let dir = temp_dir("od_demand_test_csv_staging");
        let sink = CsvSink::new(&dir);

        // a directory in place of the target makes the rename fail
        fs::create_dir_all(sink.table_path("od_demand").join("occupied")).unwrap();

        let err = sink
            .replace_table(&FinalAggregate::empty(), "od_demand")
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Write(_)));
        assert!(!dir.join(".od_demand.csv.tmp").exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_count_csv_rows() {
        let table = FinalAggregate {
            rows: vec![row("A", 1), row("B", 2), row("C", 3)],
        };
        let mut buf = Vec::new();
        write_csv(&table, &mut buf).unwrap();
        assert_eq!(count_csv_rows(buf.as_slice()).unwrap(), 3);
    }
}

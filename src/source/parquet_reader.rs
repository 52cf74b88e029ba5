//! Columnar ticket reader.
//!
//! Columns are cast to a canonical Arrow type before rows are built, so
//! integer ticket keys, dictionary-encoded station names, timestamp or string
//! departures, and float or decimal prices are all accepted. A NaN price is
//! read as missing. Text confirmation flags go through the same parser as the
//! CSV reader, and a null flag reads as unconfirmed.

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, StringArray};
use arrow::compute::{CastOptions, cast, cast_with_options};
use arrow::datatypes::{DataType, Float64Type};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::ChunkReader;
use tracing::debug;

use crate::error::SourceError;
use crate::pipeline::types::{Ticket, parse_flag, parse_price};

const TICKET_KEY: &str = "ticket_key";
const IS_CONFIRMED: &str = "is_confirmed";
const SERVICE: &str = "service_number";
const ORIGIN: &str = "od_origin_station_name";
const DESTINATION: &str = "od_destination_station_name";
const TIMEZONE: &str = "timezone";
const DEPARTURE: &str = "service_departure_datetime";
const PRICE: &str = "price_vat_inc";

/// Reads every row group of a Parquet file into tickets.
pub fn read_parquet<R: ChunkReader + 'static>(input: R) -> Result<Vec<Ticket>, SourceError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(input)?.build()?;
    let mut tickets = Vec::new();

    for batch in reader {
        let batch = batch?;
        debug!(rows = batch.num_rows(), "Decoding record batch");
        tickets.extend(batch_to_tickets(&batch)?);
    }

    Ok(tickets)
}

fn raw_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, SourceError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SourceError::MissingColumn(name.to_string()))
}

fn column(batch: &RecordBatch, name: &str, to: &DataType) -> Result<ArrayRef, SourceError> {
    Ok(cast(raw_column(batch, name)?, to)?)
}

/// Prices as text, with float NaN turned into null.
fn price_column(batch: &RecordBatch) -> Result<ArrayRef, SourceError> {
    let array = raw_column(batch, PRICE)?;
    if !array.data_type().is_floating() {
        return Ok(cast(array, &DataType::Utf8)?);
    }

    let floats = cast(array, &DataType::Float64)?;
    let cleaned: Float64Array = floats
        .as_primitive::<Float64Type>()
        .iter()
        .map(|price| price.filter(|p| !p.is_nan()))
        .collect();
    Ok(cast(&cleaned, &DataType::Utf8)?)
}

/// Confirmation flags. Nulls stay null; anything unparseable is an error.
fn confirmation_column(batch: &RecordBatch) -> Result<BooleanArray, SourceError> {
    let array = raw_column(batch, IS_CONFIRMED)?;

    if matches!(
        array.data_type(),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    ) {
        let text = cast(array, &DataType::Utf8)?;
        return strings(&text, IS_CONFIRMED)?
            .iter()
            .enumerate()
            .map(|(row, raw)| match raw {
                None => Ok(None),
                Some(raw) => parse_flag(raw).map(Some).ok_or_else(|| SourceError::InvalidFlag {
                    row,
                    value: raw.to_string(),
                }),
            })
            .collect();
    }

    let strict = CastOptions {
        safe: false,
        ..Default::default()
    };
    let flags = cast_with_options(array, &DataType::Boolean, &strict)?;
    flags
        .as_boolean_opt()
        .cloned()
        .ok_or_else(|| SourceError::MissingColumn(IS_CONFIRMED.to_string()))
}

fn strings<'a>(array: &'a ArrayRef, name: &str) -> Result<&'a StringArray, SourceError> {
    array
        .as_string_opt::<i32>()
        .ok_or_else(|| SourceError::MissingColumn(name.to_string()))
}

fn required(array: &StringArray, name: &str, row: usize) -> Result<String, SourceError> {
    if array.is_null(row) {
        return Err(SourceError::NullValue {
            column: name.to_string(),
            row,
        });
    }
    Ok(array.value(row).to_string())
}

fn optional(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

pub(crate) fn batch_to_tickets(batch: &RecordBatch) -> Result<Vec<Ticket>, SourceError> {
    let keys = column(batch, TICKET_KEY, &DataType::Utf8)?;
    let confirmed = confirmation_column(batch)?;
    let services = column(batch, SERVICE, &DataType::Utf8)?;
    let origins = column(batch, ORIGIN, &DataType::Utf8)?;
    let destinations = column(batch, DESTINATION, &DataType::Utf8)?;
    let timezones = column(batch, TIMEZONE, &DataType::Utf8)?;
    let departures = column(batch, DEPARTURE, &DataType::Utf8)?;
    let prices = price_column(batch)?;

    let keys = strings(&keys, TICKET_KEY)?;
    let services = strings(&services, SERVICE)?;
    let origins = strings(&origins, ORIGIN)?;
    let destinations = strings(&destinations, DESTINATION)?;
    let timezones = strings(&timezones, TIMEZONE)?;
    let departures = strings(&departures, DEPARTURE)?;
    let prices = strings(&prices, PRICE)?;

    (0..batch.num_rows())
        .map(|row| {
            let ticket_key = required(keys, TICKET_KEY, row)?;
            let price = match optional(prices, row) {
                None => None,
                Some(raw) => match parse_price(&raw) {
                    Some(price) if !price.is_sign_negative() => Some(price),
                    _ => {
                        return Err(SourceError::InvalidPrice {
                            ticket_key,
                            value: raw,
                        });
                    }
                },
            };

            Ok(Ticket {
                is_confirmed: !confirmed.is_null(row) && confirmed.value(row),
                service_number: required(services, SERVICE, row)?,
                origin: required(origins, ORIGIN, row)?,
                destination: required(destinations, DESTINATION, row)?,
                timezone: required(timezones, TIMEZONE, row)?,
                departure: optional(departures, row),
                price,
                ticket_key,
            })
        })
        .collect()
}

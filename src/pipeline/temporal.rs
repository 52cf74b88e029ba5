//! Calendar and time-of-day features derived from departure timestamps.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::PipelineError;
use crate::pipeline::types::{DerivedTicket, TemporalFeatures, Ticket};

/// Naive date-time layouts accepted in addition to RFC 3339.
static NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parses a departure timestamp into its wall-clock date-time.
///
/// An explicit UTC offset is accepted but discarded: departure times are
/// grouped on the local clock of the station, which is what the raw value shows.
pub fn parse_departure(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

pub fn features_of(dt: NaiveDateTime) -> TemporalFeatures {
    TemporalFeatures {
        departure_year: dt.year(),
        departure_month: dt.month(),
        departure_day: dt.day(),
        departure_isoweekday: dt.weekday().num_days_from_monday() + 1,
        departure_time: dt.hour() * 60 + dt.minute(),
    }
}

/// Returns derived copies of `rows` carrying their temporal features.
///
/// Features are always recomputed from the ticket's raw timestamp, so feeding
/// already-derived rows back in yields the same features.
///
/// # Errors
///
/// Returns [`PipelineError::MalformedTimestamp`] for the first row whose
/// departure timestamp is missing or unparseable.
pub fn derive_temporal_features<T: AsRef<Ticket>>(
    rows: &[T],
) -> Result<Vec<DerivedTicket>, PipelineError> {
    rows.iter()
        .map(|row| {
            let ticket = row.as_ref();
            let raw = ticket.departure.as_deref().unwrap_or_default();
            let dt = parse_departure(raw).ok_or_else(|| PipelineError::MalformedTimestamp {
                ticket_key: ticket.ticket_key.clone(),
                value: raw.to_string(),
            })?;

            Ok(DerivedTicket {
                ticket: ticket.clone(),
                features: features_of(dt),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(key: &str, departure: Option<&str>) -> Ticket {
        Ticket {
            ticket_key: key.to_string(),
            is_confirmed: true,
            service_number: "S1".to_string(),
            origin: "Madrid".to_string(),
            destination: "Sevilla".to_string(),
            timezone: "Europe/Madrid".to_string(),
            departure: departure.map(str::to_string),
            price: None,
        }
    }

    #[test]
    fn test_wednesday_is_three() {
        // 2024-01-03 is a Wednesday
        let rows = derive_temporal_features(&[ticket("t1", Some("2024-01-03 08:00:00"))]).unwrap();
        assert_eq!(rows[0].features.departure_isoweekday, 3);
    }

    #[test]
    fn test_sunday_is_seven() {
        let rows = derive_temporal_features(&[ticket("t1", Some("2024-01-07 08:00:00"))]).unwrap();
        assert_eq!(rows[0].features.departure_isoweekday, 7);
    }

    #[test]
    fn test_minute_of_day() {
        let rows = derive_temporal_features(&[ticket("t1", Some("2024-01-03 14:05:00"))]).unwrap();
        let f = rows[0].features;
        assert_eq!(f.departure_time, 845);
        assert_eq!((f.departure_year, f.departure_month, f.departure_day), (2024, 1, 3));
    }

    #[test]
    fn test_minute_of_day_bounds() {
        let rows = derive_temporal_features(&[
            ticket("t1", Some("2024-01-03 00:00:00")),
            ticket("t2", Some("2024-01-03 23:59:59")),
        ])
        .unwrap();
        assert_eq!(rows[0].features.departure_time, 0);
        assert_eq!(rows[1].features.departure_time, 1439);
    }

    #[test]
    fn test_accepted_layouts() {
        for raw in [
            "2024-01-03T14:05:00",
            "2024-01-03T14:05:00.250",
            "2024-01-03 14:05",
            "2024-01-03T14:05",
            "2024-01-03T14:05:00+01:00",
            "2024-01-03T14:05:00Z",
        ] {
            let dt = parse_departure(raw).unwrap_or_else(|| panic!("failed to parse {raw}"));
            assert_eq!(features_of(dt).departure_time, 845, "layout {raw}");
        }
        let midnight = parse_departure("2024-01-03").unwrap();
        assert_eq!(features_of(midnight).departure_time, 0);
    }

    #[test]
    fn test_malformed_timestamp_propagates() {
        let err = derive_temporal_features(&[
            ticket("ok", Some("2024-01-03 14:05:00")),
            ticket("bad", Some("not a date")),
        ])
        .unwrap_err();

        match err {
            PipelineError::MalformedTimestamp { ticket_key, value } => {
                assert_eq!(ticket_key, "bad");
                assert_eq!(value, "not a date");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_timestamp_is_malformed() {
        let err = derive_temporal_features(&[ticket("t1", None)]).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedTimestamp { .. }));
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let input = vec![
            ticket("t1", Some("2024-01-03 14:05:00")),
            ticket("t2", Some("2024-02-29T23:10:00")),
        ];
        let once = derive_temporal_features(&input).unwrap();
        let twice = derive_temporal_features(&once).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let input = vec![ticket("t1", Some("2024-01-03 14:05:00"))];
        let before = input.clone();
        let _ = derive_temporal_features(&input).unwrap();
        assert_eq!(input, before);
    }
}

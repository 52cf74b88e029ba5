//! Data types used by the aggregation pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// A single ticket row as read from the source dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_key: String,
    #[serde(deserialize_with = "deserialize_flag")]
    pub is_confirmed: bool,
    pub service_number: String,
    #[serde(rename = "od_origin_station_name")]
    pub origin: String,
    #[serde(rename = "od_destination_station_name")]
    pub destination: String,
    pub timezone: String,
    /// Zone-naive departure timestamp, kept raw until feature derivation.
    #[serde(rename = "service_departure_datetime")]
    pub departure: Option<String>,
    #[serde(rename = "price_vat_inc", deserialize_with = "deserialize_price")]
    pub price: Option<Decimal>,
}

impl AsRef<Ticket> for Ticket {
    fn as_ref(&self) -> &Ticket {
        self
    }
}

/// Parses a price string, accepting plain and scientific notation.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Parses a confirmation flag the way dataframe exports spell it.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_flag(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid confirmation flag {raw:?}")))
}

fn deserialize_price<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Decimal>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => match parse_price(value) {
            Some(price) if price.is_sign_negative() => Err(serde::de::Error::custom(format!(
                "negative price {value:?}"
            ))),
            Some(price) => Ok(Some(price)),
            None => Err(serde::de::Error::custom(format!("invalid price {value:?}"))),
        },
    }
}

/// Calendar and time-of-day fields derived from a departure timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TemporalFeatures {
    pub departure_year: i32,
    pub departure_month: u32,
    pub departure_day: u32,
    /// 1 = Monday .. 7 = Sunday.
    pub departure_isoweekday: u32,
    /// Minutes since midnight, 0..=1439.
    pub departure_time: u32,
}

/// A ticket augmented with its temporal features.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedTicket {
    pub ticket: Ticket,
    pub features: TemporalFeatures,
}

impl DerivedTicket {
    pub fn key(&self) -> PartitionKey {
        PartitionKey {
            origin: self.ticket.origin.clone(),
            destination: self.ticket.destination.clone(),
            departure_year: self.features.departure_year,
            departure_month: self.features.departure_month,
            departure_day: self.features.departure_day,
            departure_isoweekday: self.features.departure_isoweekday,
            timezone: self.ticket.timezone.clone(),
            departure_time: self.features.departure_time,
        }
    }
}

impl AsRef<Ticket> for DerivedTicket {
    fn as_ref(&self) -> &Ticket {
        &self.ticket
    }
}

/// Grouping key: itinerary plus departure instant at minute granularity.
///
/// Field order doubles as the sort order of the final table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PartitionKey {
    pub origin: String,
    pub destination: String,
    pub departure_year: i32,
    pub departure_month: u32,
    pub departure_day: u32,
    pub departure_isoweekday: u32,
    pub timezone: String,
    pub departure_time: u32,
}

/// Additive statistics for one key. Combining two values is key-wise addition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartialStats {
    pub total_demand: u64,
    pub sum_of_prices: Decimal,
    pub ticket_count_for_mean: u64,
}

impl PartialStats {
    /// Counts one ticket; only priced tickets feed the mean accumulators.
    pub fn observe(&mut self, price: Option<Decimal>) {
        self.total_demand += 1;
        if let Some(price) = price {
            self.sum_of_prices += price;
            self.ticket_count_for_mean += 1;
        }
    }

    pub fn combine(&mut self, other: &PartialStats) {
        self.total_demand += other.total_demand;
        self.sum_of_prices += other.sum_of_prices;
        self.ticket_count_for_mean += other.ticket_count_for_mean;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRow {
    pub key: PartitionKey,
    pub stats: PartialStats,
}

/// Per-partition result: one row per key observed in that partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialAggregate {
    pub rows: Vec<PartialRow>,
}

impl PartialAggregate {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn total_demand(&self) -> u64 {
        self.rows.iter().map(|r| r.stats.total_demand).sum()
    }
}

/// Column order of the final table.
pub const FINAL_COLUMNS: [&str; 10] = [
    "origin",
    "destination",
    "total_demand",
    "mean_price",
    "departure_year",
    "departure_month",
    "departure_day",
    "departure_isoweekday",
    "timezone",
    "departure_time",
];

/// One row of the final table. Field order matches [`FINAL_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRow {
    pub origin: String,
    pub destination: String,
    pub total_demand: u64,
    pub mean_price: f64,
    pub departure_year: i32,
    pub departure_month: u32,
    pub departure_day: u32,
    pub departure_isoweekday: u32,
    pub timezone: String,
    pub departure_time: u32,
}

/// The merged, schema-complete output table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinalAggregate {
    pub rows: Vec<FinalRow>,
}

impl FinalAggregate {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &'static [&'static str] {
        &FINAL_COLUMNS
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn total_demand(&self) -> u64 {
        self.rows.iter().map(|r| r.total_demand).sum()
    }
}

/// The confirmed tickets of one service.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub service: String,
    pub tickets: Vec<Ticket>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_variants() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_parse_price_plain_and_scientific() {
        assert_eq!(parse_price("12.50"), Some(Decimal::new(1250, 2)));
        assert_eq!(parse_price("1.5e1"), Some(Decimal::new(15, 0)));
        assert_eq!(parse_price("abc"), None);
    }

    #[test]
    fn test_partial_stats_unpriced_ticket_counts_demand_only() {
        let mut stats = PartialStats::default();
        stats.observe(Some(Decimal::new(10, 0)));
        stats.observe(None);

        assert_eq!(stats.total_demand, 2);
        assert_eq!(stats.ticket_count_for_mean, 1);
        assert_eq!(stats.sum_of_prices, Decimal::new(10, 0));
    }

    #[test]
    fn test_partial_stats_combine_is_additive() {
        let mut a = PartialStats::default();
        a.observe(Some(Decimal::new(5, 0)));
        let mut b = PartialStats::default();
        b.observe(Some(Decimal::new(7, 0)));
        b.observe(None);

        a.combine(&b);
        assert_eq!(a.total_demand, 3);
        assert_eq!(a.ticket_count_for_mean, 2);
        assert_eq!(a.sum_of_prices, Decimal::new(12, 0));
    }

    #[test]
    fn test_empty_final_aggregate_keeps_schema() {
        let table = FinalAggregate::empty();
        assert!(table.is_empty());
        assert_eq!(table.columns().len(), 10);
        assert_eq!(table.columns()[3], "mean_price");
    }
}

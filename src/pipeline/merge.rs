//! Key-wise merge of partial aggregates into the final demand table.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;
use tracing::info;

use crate::pipeline::types::{FinalAggregate, FinalRow, PartialAggregate, PartialStats, PartitionKey};

/// Denominator used in place of a zero price count.
pub const MEAN_EPSILON: f64 = 1e-9;

/// Mean price of a key, guarded against a zero count.
///
/// Non-zero counts divide exactly in decimal arithmetic, so prices
/// `[10, 20, 30]` give exactly `20.0`.
pub fn mean_price(sum_of_prices: Decimal, ticket_count_for_mean: u64) -> f64 {
    if ticket_count_for_mean == 0 {
        return sum_of_prices.to_f64().unwrap_or_default() / MEAN_EPSILON;
    }
    (sum_of_prices / Decimal::from(ticket_count_for_mean))
        .to_f64()
        .unwrap_or_default()
}

/// Combines every partition's partial aggregate into the final table.
///
/// Statistics are summed per key, so the result does not depend on how the
/// tickets were partitioned or in which order partitions arrive. Rows come
/// out sorted by key.
pub fn merge_partials<I>(partials: I) -> FinalAggregate
where
    I: IntoIterator<Item = PartialAggregate>,
{
    let mut merged: BTreeMap<PartitionKey, PartialStats> = BTreeMap::new();
    let mut input_rows = 0usize;

    for partial in partials {
        input_rows += partial.len();
        for row in partial.rows {
            merged.entry(row.key).or_default().combine(&row.stats);
        }
    }

    info!(input_rows, "Performing final aggregation");

    let rows: Vec<FinalRow> = merged
        .into_iter()
        .map(|(key, stats)| FinalRow {
            mean_price: mean_price(stats.sum_of_prices, stats.ticket_count_for_mean),
            total_demand: stats.total_demand,
            origin: key.origin,
            destination: key.destination,
            departure_year: key.departure_year,
            departure_month: key.departure_month,
            departure_day: key.departure_day,
            departure_isoweekday: key.departure_isoweekday,
            timezone: key.timezone,
            departure_time: key.departure_time,
        })
        .collect();

    info!(rows = rows.len(), "Final dataset created");

    FinalAggregate { rows }
}

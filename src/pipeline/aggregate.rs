//! Per-partition reduction of derived tickets into additive statistics.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::pipeline::temporal::derive_temporal_features;
use crate::pipeline::types::{
    DerivedTicket, PartialAggregate, PartialRow, PartialStats, Partition, PartitionKey,
};

/// Reduces one partition's derived rows into per-key additive statistics.
///
/// Only keys present in `rows` appear in the result; an empty partition
/// yields an empty aggregate.
pub fn aggregate_partition(rows: &[DerivedTicket]) -> PartialAggregate {
    if rows.is_empty() {
        warn!("Received an empty partition, skipping");
        return PartialAggregate::default();
    }

    let mut groups: BTreeMap<PartitionKey, PartialStats> = BTreeMap::new();
    for row in rows {
        groups.entry(row.key()).or_default().observe(row.ticket.price);
    }

    PartialAggregate {
        rows: groups
            .into_iter()
            .map(|(key, stats)| PartialRow { key, stats })
            .collect(),
    }
}

/// Derives temporal features for a partition and aggregates it.
///
/// # Errors
///
/// Returns [`PipelineError::PartitionFailed`] naming the service when any
/// ticket in the partition cannot be processed.
#[tracing::instrument(skip_all, fields(service = %partition.service, tickets = partition.tickets.len()))]
pub fn process_partition(partition: &Partition) -> Result<PartialAggregate, PipelineError> {
    let derived = derive_temporal_features(&partition.tickets).map_err(|e| {
        PipelineError::PartitionFailed {
            service: partition.service.clone(),
            source: Box::new(e),
        }
    })?;

    let partial = aggregate_partition(&derived);
    debug!(keys = partial.len(), "Partition aggregated");

    Ok(partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Ticket;
    use rust_decimal::Decimal;

    fn ticket(key: &str, departure: &str, price: Option<i64>) -> Ticket {
        Ticket {
            ticket_key: key.to_string(),
            is_confirmed: true,
            service_number: "S1".to_string(),
            origin: "Madrid".to_string(),
            destination: "Barcelona".to_string(),
            timezone: "Europe/Madrid".to_string(),
            departure: Some(departure.to_string()),
            price: price.map(|p| Decimal::new(p, 0)),
        }
    }

    fn partition(tickets: Vec<Ticket>) -> Partition {
        Partition {
            service: "S1".to_string(),
            tickets,
        }
    }

    #[test]
    fn test_groups_by_departure_minute() {
        let p = partition(vec![
            ticket("t1", "2024-01-03 14:05:00", Some(10)),
            ticket("t2", "2024-01-03 14:05:30", Some(20)),
            ticket("t3", "2024-01-03 14:06:00", Some(30)),
        ]);
        let partial = process_partition(&p).unwrap();

        assert_eq!(partial.len(), 2);
        let first = &partial.rows[0];
        assert_eq!(first.key.departure_time, 845);
        assert_eq!(first.stats.total_demand, 2);
        assert_eq!(first.stats.sum_of_prices, Decimal::new(30, 0));
        assert_eq!(first.stats.ticket_count_for_mean, 2);
    }

    #[test]
    fn test_unpriced_ticket_counts_as_demand_only() {
        let p = partition(vec![
            ticket("t1", "2024-01-03 14:05:00", Some(10)),
            ticket("t2", "2024-01-03 14:05:00", None),
        ]);
        let partial = process_partition(&p).unwrap();

        assert_eq!(partial.rows[0].stats.total_demand, 2);
        assert_eq!(partial.rows[0].stats.ticket_count_for_mean, 1);
    }

    #[test]
    fn test_empty_partition_is_empty_result() {
        let partial = process_partition(&partition(Vec::new())).unwrap();
        assert!(partial.is_empty());
    }

    #[test]
    fn test_malformed_timestamp_names_service() {
        let p = partition(vec![ticket("t1", "31/12/2024", Some(10))]);
        let err = process_partition(&p).unwrap_err();

        match err {
            PipelineError::PartitionFailed { service, source } => {
                assert_eq!(service, "S1");
                assert!(matches!(*source, PipelineError::MalformedTimestamp { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_distinct_itineraries_are_separate_keys() {
        let mut other = ticket("t2", "2024-01-03 14:05:00", Some(10));
        other.destination = "Valencia".to_string();
        let p = partition(vec![ticket("t1", "2024-01-03 14:05:00", Some(10)), other]);

        let partial = process_partition(&p).unwrap();
        assert_eq!(partial.len(), 2);
        assert_eq!(partial.total_demand(), 2);
    }
}

//! Demand aggregation pipeline.
//!
//! Confirmed tickets are split per service, each partition is reduced to
//! additive per-key statistics, and the partial results are merged into the
//! final table that a [`Sink`](crate::sink::Sink) persists.

pub mod aggregate;
pub mod executor;
pub mod filter;
pub mod merge;
pub mod temporal;
pub mod types;

use serde::Serialize;
use tracing::info;

use crate::error::{PipelineError, RunError, SinkError};
use crate::pipeline::executor::PartitionExecutor;
use crate::pipeline::filter::{filter_confirmed, split_by_service};
use crate::pipeline::merge::merge_partials;
use crate::pipeline::types::{FinalAggregate, Ticket};
use crate::sink::Sink;

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub confirmed_tickets: usize,
    pub services: usize,
    pub table: FinalAggregate,
}

/// What a published run wrote, logged at the end of `run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub table_name: String,
    pub confirmed_tickets: usize,
    pub services: usize,
    pub rows_written: u64,
    pub total_demand: u64,
}

/// Filters, fans out per service, and merges into the final table.
///
/// When no ticket is confirmed the executor is never invoked and the result
/// is an empty table.
pub async fn aggregate_tickets<E>(tickets: &[Ticket], executor: &E) -> Result<Aggregation, PipelineError>
where
    E: PartitionExecutor + ?Sized,
{
    let confirmed = filter_confirmed(tickets);
    let confirmed_tickets = confirmed.tickets.len();
    let services = confirmed.services.len();

    if confirmed.tickets.is_empty() {
        return Ok(Aggregation {
            confirmed_tickets,
            services,
            table: FinalAggregate::empty(),
        });
    }

    let partitions = split_by_service(confirmed.tickets);
    info!(partitions = partitions.len(), "Fanning out per service");

    let partials = executor.map_partitions(partitions).await?;
    let table = merge_partials(partials);

    Ok(Aggregation {
        confirmed_tickets,
        services,
        table,
    })
}

/// Runs the pipeline and replaces `table_name` in `sink` with the result.
///
/// # Errors
///
/// Fails if aggregation fails, if the sink fails, or if the row count the
/// sink reports back differs from the number of rows written.
pub async fn run<E, S>(
    tickets: &[Ticket],
    executor: &E,
    sink: &S,
    table_name: &str,
) -> Result<RunSummary, RunError>
where
    E: PartitionExecutor + ?Sized,
    S: Sink + ?Sized,
{
    let aggregation = aggregate_tickets(tickets, executor).await?;
    let expected = aggregation.table.len() as u64;

    info!(table_name, rows = expected, "Saving final table");
    let rows_written = sink.replace_table(&aggregation.table, table_name).await?;
    info!(table_name, rows_written, "Check: destination row count");

    if rows_written != expected {
        return Err(SinkError::Write(format!(
            "table {table_name} contains {rows_written} rows after write, expected {expected}"
        ))
        .into());
    }

    Ok(RunSummary {
        table_name: table_name.to_string(),
        confirmed_tickets: aggregation.confirmed_tickets,
        services: aggregation.services,
        rows_written,
        total_demand: aggregation.table.total_demand(),
    })
}

//! Confirmed-ticket selection and per-service partitioning.

use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::pipeline::types::{Partition, Ticket};

/// Confirmed tickets and the distinct services they belong to.
///
/// `services` drives the fan-out cardinality; its order carries no meaning.
#[derive(Debug, Clone, Default)]
pub struct ConfirmedTickets {
    pub tickets: Vec<Ticket>,
    pub services: Vec<String>,
}

/// Keeps only confirmed tickets, rows unchanged.
#[tracing::instrument(skip_all, fields(total = tickets.len()))]
pub fn filter_confirmed(tickets: &[Ticket]) -> ConfirmedTickets {
    let confirmed: Vec<Ticket> = tickets.iter().filter(|t| t.is_confirmed).cloned().collect();

    if confirmed.is_empty() {
        warn!("No confirmed tickets found");
    } else {
        info!(confirmed = confirmed.len(), "Confirmed tickets found");
    }

    let services: HashSet<&str> = confirmed.iter().map(|t| t.service_number.as_str()).collect();
    let services = services.into_iter().map(str::to_string).collect();

    ConfirmedTickets {
        tickets: confirmed,
        services,
    }
}

/// Splits tickets into one partition per service.
pub fn split_by_service(tickets: Vec<Ticket>) -> Vec<Partition> {
    let mut by_service: HashMap<String, Vec<Ticket>> = HashMap::new();

    for ticket in tickets {
        by_service
            .entry(ticket.service_number.clone())
            .or_default()
            .push(ticket);
    }

    by_service
        .into_iter()
        .map(|(service, tickets)| Partition { service, tickets })
        .collect()
}

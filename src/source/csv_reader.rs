use std::io::Read;

use crate::error::SourceError;
use crate::pipeline::types::Ticket;

/// Reads ticket rows from CSV with a header line.
pub fn read_csv<R: Read>(input: R) -> Result<Vec<Ticket>, SourceError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(input);
    let mut tickets = Vec::new();

    for result in rdr.deserialize() {
        let ticket: Ticket = result?;
        tickets.push(ticket);
    }

    Ok(tickets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const HEADER: &str = "ticket_key,is_confirmed,service_number,od_origin_station_name,od_destination_station_name,timezone,service_departure_datetime,price_vat_inc\n";

    #[test]
    fn test_reads_rows() {
        let data = format!(
            "{HEADER}1,True,S1,Madrid,Sevilla,Europe/Madrid,2024-01-03 14:05:00,45.10\n\
             2,False,S2,Madrid,Malaga,Europe/Madrid,2024-01-04 08:00:00,\n"
        );
        let tickets = read_csv(data.as_bytes()).unwrap();

        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].ticket_key, "1");
        assert!(tickets[0].is_confirmed);
        assert_eq!(tickets[0].origin, "Madrid");
        assert_eq!(tickets[0].price, Some(Decimal::new(4510, 2)));
        assert!(!tickets[1].is_confirmed);
        assert_eq!(tickets[1].price, None);
    }

    #[test]
    fn test_empty_departure_is_none() {
        let data = format!("{HEADER}1,true,S1,A,B,UTC,,10\n");
        let tickets = read_csv(data.as_bytes()).unwrap();
        assert_eq!(tickets[0].departure, None);
    }

    #[test]
    fn test_rejects_negative_price() {
        let data = format!("{HEADER}1,true,S1,A,B,UTC,2024-01-03 14:05:00,-3\n");
        assert!(read_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_unknown_flag() {
        let data = format!("{HEADER}1,perhaps,S1,A,B,UTC,2024-01-03 14:05:00,3\n");
        assert!(read_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_column_fails() {
        let data = "ticket_key,is_confirmed\n1,true\n";
        assert!(read_csv(data.as_bytes()).is_err());
    }
}

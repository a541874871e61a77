// 📈 Market Data - the two questions we ask the outside world
//
// 1. SymbolResolver: which ticker is this CUSIP?
// 2. ExdateLookup:   when were the ex-dividend dates of these securities in a
//                    tax year, and how much per share did each pay?
//
// Implementations:
// - StaticMarketData: offline JSON/CSV files (tests, reproducible reruns)
// - YahooClient:      live Yahoo Finance queries (feature "yahoo")

use crate::entities::SecurityIdentifier;
use crate::error::Result;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

pub mod static_data;
#[cfg(feature = "yahoo")]
pub mod yahoo;

pub use static_data::StaticMarketData;
#[cfg(feature = "yahoo")]
pub use yahoo::YahooClient;

/// Exdate -> per-share amount for one security, ordered by date
pub type ExdateSeries = BTreeMap<NaiveDate, f64>;

/// Symbol -> exdate series
pub type ExdateTable = HashMap<String, ExdateSeries>;

pub trait SymbolResolver {
    /// Resolve a CUSIP to a ticker. Never returns an ambiguous answer silently.
    fn resolve_symbol(&self, cusip: &str) -> Result<String>;
}

pub trait ExdateLookup {
    /// Exdates for every (hydrated) security within `tax_year`.
    ///
    /// An Err is a LookupFailure the caller must treat as fatal.
    fn get_exdates(&self, securities: &[SecurityIdentifier], tax_year: i32) -> Result<ExdateTable>;
}

/// Distinct symbols of hydrated identifiers, first-seen order
pub(crate) fn distinct_symbols(securities: &[SecurityIdentifier]) -> Result<Vec<String>> {
    let mut symbols: Vec<String> = Vec::new();
    for security in securities {
        let symbol = security.hash_key()?;
        if !symbols.iter().any(|s| s == symbol) {
            symbols.push(symbol.to_string());
        }
    }
    Ok(symbols)
}

/// First and last day of a tax year
pub(crate) fn tax_year_bounds(tax_year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(tax_year, 1, 1)?,
        NaiveDate::from_ymd_opt(tax_year, 12, 31)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_symbols_keeps_order() {
        let securities = vec![
            SecurityIdentifier::from_symbol("VTI").unwrap(),
            SecurityIdentifier::from_symbol("O").unwrap(),
            SecurityIdentifier::from_symbol("vti").unwrap(),
        ];
        assert_eq!(distinct_symbols(&securities).unwrap(), vec!["VTI", "O"]);
    }

    #[test]
    fn test_distinct_symbols_rejects_unhydrated() {
        let securities = vec![SecurityIdentifier::from_cusip("922908769").unwrap()];
        assert!(distinct_symbols(&securities).is_err());
    }

    #[test]
    fn test_tax_year_bounds() {
        let (start, end) = tax_year_bounds(2023).unwrap();
        assert_eq!(start.to_string(), "2023-01-01");
        assert_eq!(end.to_string(), "2023-12-31");
    }
}

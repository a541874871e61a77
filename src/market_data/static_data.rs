// Offline market data loaded from files
//
// exdates JSON:  { "VTI": { "2023-03-23": 0.7386, "2023-06-26": 0.7903 } }
// symbols CSV:   cusip,symbol

use super::{distinct_symbols, tax_year_bounds, ExdateLookup, ExdateSeries, ExdateTable, SymbolResolver};
use crate::entities::SecurityIdentifier;
use crate::error::{AnalysisError, Result};
use anyhow::Context as AnyhowContext;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct StaticMarketData {
    exdates: ExdateTable,
    symbols: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SymbolRow {
    cusip: String,
    symbol: String,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: one exdate for a symbol
    pub fn with_exdate(mut self, symbol: &str, exdate: NaiveDate, per_share: f64) -> Self {
        self.exdates
            .entry(symbol.to_uppercase())
            .or_default()
            .insert(exdate, per_share);
        self
    }

    /// Builder: one cusip -> symbol mapping
    pub fn with_symbol(mut self, cusip: &str, symbol: &str) -> Self {
        self.symbols.insert(cusip.to_string(), symbol.to_uppercase());
        self
    }

    /// Load an exdates JSON file
    pub fn load_exdates(mut self, path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read exdates file: {}", path.display()))?;

        let raw: HashMap<String, BTreeMap<String, f64>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse exdates JSON: {}", path.display()))?;

        for (symbol, series) in raw {
            for (date, per_share) in series {
                let exdate = NaiveDate::parse_from_str(&date, "%Y-%m-%d").with_context(|| {
                    format!("Bad exdate '{}' for {} in {}", date, symbol, path.display())
                })?;
                self = self.with_exdate(&symbol, exdate, per_share);
            }
        }

        tracing::debug!("Loaded exdates for {} securities from {}", self.exdates.len(), path.display());
        Ok(self)
    }

    /// Load a cusip,symbol CSV file
    pub fn load_symbols(mut self, path: &Path) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open symbols file: {}", path.display()))?;

        for (line_num, row) in reader.deserialize::<SymbolRow>().enumerate() {
            let row = row.with_context(|| {
                format!("Failed to parse line {} of {}", line_num + 2, path.display())
            })?;
            self = self.with_symbol(row.cusip.trim(), row.symbol.trim());
        }

        Ok(self)
    }
}

impl SymbolResolver for StaticMarketData {
    fn resolve_symbol(&self, cusip: &str) -> Result<String> {
        self.symbols.get(cusip).cloned().ok_or_else(|| {
            AnalysisError::LookupFailure(format!("no symbol known for CUSIP {}", cusip))
        })
    }
}

impl ExdateLookup for StaticMarketData {
    fn get_exdates(&self, securities: &[SecurityIdentifier], tax_year: i32) -> Result<ExdateTable> {
        let (start, end) = tax_year_bounds(tax_year)
            .ok_or_else(|| AnalysisError::LookupFailure(format!("invalid tax year {}", tax_year)))?;

        let mut table = ExdateTable::new();
        for symbol in distinct_symbols(securities)? {
            let series: ExdateSeries = self
                .exdates
                .get(&symbol)
                .map(|all| {
                    all.range(start..=end)
                        .map(|(d, v)| (*d, *v))
                        .collect()
                })
                .unwrap_or_default();

            if series.is_empty() {
                tracing::warn!("No exdates on file for {} in {}", symbol, tax_year);
            }
            table.insert(symbol, series);
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_exdates_filtered_to_tax_year() {
        let data = StaticMarketData::new()
            .with_exdate("vti", date(2022, 12, 20), 0.93)
            .with_exdate("VTI", date(2023, 3, 23), 0.74)
            .with_exdate("VTI", date(2024, 3, 21), 0.91);

        let securities = vec![SecurityIdentifier::from_symbol("VTI").unwrap()];
        let table = data.get_exdates(&securities, 2023).unwrap();

        let series = &table["VTI"];
        assert_eq!(series.len(), 1);
        assert_eq!(series[&date(2023, 3, 23)], 0.74);
    }

    #[test]
    fn test_unknown_symbol_gets_empty_series() {
        let data = StaticMarketData::new();
        let securities = vec![SecurityIdentifier::from_symbol("XYZ").unwrap()];
        let table = data.get_exdates(&securities, 2023).unwrap();
        assert!(table["XYZ"].is_empty());
    }

    #[test]
    fn test_resolve_symbol() {
        let data = StaticMarketData::new().with_symbol("922908769", "vti");
        assert_eq!(data.resolve_symbol("922908769").unwrap(), "VTI");
        assert!(matches!(
            data.resolve_symbol("000000000"),
            Err(AnalysisError::LookupFailure(_))
        ));
    }

    #[test]
    fn test_load_files() {
        let dir = std::env::temp_dir().join(format!("divreq-static-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let exdates = dir.join("exdates.json");
        let symbols = dir.join("symbols.csv");
        fs::write(&exdates, r#"{"O": {"2023-01-31": 0.248, "2023-02-28": 0.248}}"#).unwrap();
        fs::write(&symbols, "cusip,symbol\n756109104,O\n").unwrap();

        let data = StaticMarketData::new()
            .load_exdates(&exdates)
            .unwrap()
            .load_symbols(&symbols)
            .unwrap();

        assert_eq!(data.resolve_symbol("756109104").unwrap(), "O");
        let table = data
            .get_exdates(&[SecurityIdentifier::from_symbol("O").unwrap()], 2023)
            .unwrap();
        assert_eq!(table["O"].len(), 2);

        fs::remove_dir_all(&dir).unwrap();
    }
}

// Yahoo Finance lookups (blocking)
//
// - CUSIP search:    GET /v1/finance/search?q=<cusip>
// - Dividend events: GET /v8/finance/chart/<symbol>?events=div
//
// The dates Yahoo reports for dividend events are the ex-dividend dates.

use super::{distinct_symbols, ExdateLookup, ExdateSeries, ExdateTable, SymbolResolver};
use crate::entities::SecurityIdentifier;
use crate::error::{AnalysisError, Result};
use crate::selection::Chooser;
use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) divreq";

// ============================================================================
// RESPONSE SHAPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
struct SearchQuote {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct YahooClient<'a> {
    http: Client,
    chooser: &'a dyn Chooser,
}

impl<'a> YahooClient<'a> {
    /// `chooser` settles CUSIPs with zero or several ticker hits
    pub fn new(chooser: &'a dyn Chooser) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AnalysisError::LookupFailure(e.to_string()))?;

        Ok(YahooClient { http, chooser })
    }

    fn search(&self, cusip: &str) -> Result<Vec<String>> {
        tracing::debug!("Looking up {} with Yahoo search", cusip);
        let response: SearchResponse = self
            .http
            .get(SEARCH_URL)
            .query(&[("q", cusip), ("quotesCount", "5"), ("newsCount", "0")])
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| AnalysisError::LookupFailure(format!("search for {}: {}", cusip, e)))?;

        Ok(response.quotes.into_iter().map(|q| q.symbol).collect())
    }

    fn dividend_history(&self, symbol: &str, tax_year: i32) -> Result<ExdateSeries> {
        let (period1, period2) = epoch_bounds(tax_year)?;
        let url = format!("{}/{}", CHART_URL, symbol);

        tracing::debug!("Fetching {} dividend events for {}", symbol, tax_year);
        let response: ChartResponse = self
            .http
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "div".to_string()),
            ])
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| AnalysisError::LookupFailure(format!("dividend history for {}: {}", symbol, e)))?;

        parse_chart(symbol, response)
    }
}

impl SymbolResolver for YahooClient<'_> {
    fn resolve_symbol(&self, cusip: &str) -> Result<String> {
        let tickers = self.search(cusip)?;

        match tickers.len() {
            0 => {
                tracing::warn!("Yahoo returned no ticker for CUSIP {}", cusip);
                let typed = self
                    .chooser
                    .enter(&format!("Failed to lookup ticker for CUSIP {}. Enter it manually:", cusip))?;
                let typed = typed.trim().to_string();
                if typed.is_empty() {
                    return Err(AnalysisError::LookupFailure(format!("no ticker for CUSIP {}", cusip)));
                }
                Ok(typed)
            }
            1 => Ok(tickers[0].clone()),
            _ => {
                tracing::warn!("Got multiple hits for CUSIP {}: {}", cusip, tickers.join(","));
                let idx = self.chooser.choose(
                    &format!("Got multiple hits for CUSIP {}. Which is the right symbol?", cusip),
                    &tickers,
                )?;
                Ok(tickers[idx].clone())
            }
        }
    }
}

impl ExdateLookup for YahooClient<'_> {
    fn get_exdates(&self, securities: &[SecurityIdentifier], tax_year: i32) -> Result<ExdateTable> {
        let symbols = distinct_symbols(securities)?;
        tracing::info!("Fetching dividend information for {} from Yahoo", symbols.join(","));

        let mut table = ExdateTable::new();
        for symbol in symbols {
            let series = self.dividend_history(&symbol, tax_year)?;
            table.insert(symbol, series);
        }
        Ok(table)
    }
}

/// Jan 1 of the tax year to Jan 1 of the next, as unix seconds
fn epoch_bounds(tax_year: i32) -> Result<(i64, i64)> {
    let midnight = |year: i32| {
        NaiveDate::from_ymd_opt(year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t.and_utc().timestamp())
    };
    match (midnight(tax_year), midnight(tax_year + 1)) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(AnalysisError::LookupFailure(format!("invalid tax year {}", tax_year))),
    }
}

fn parse_chart(symbol: &str, response: ChartResponse) -> Result<ExdateSeries> {
    if let Some(err) = response.chart.error {
        return Err(AnalysisError::LookupFailure(format!(
            "{}: {} ({})",
            symbol, err.description, err.code
        )));
    }

    let mut series = ExdateSeries::new();
    let results = response.chart.result.unwrap_or_default();
    for result in results {
        let Some(events) = result.events else { continue };
        for event in events.dividends.into_values() {
            let exdate = DateTime::from_timestamp(event.date, 0)
                .ok_or_else(|| {
                    AnalysisError::LookupFailure(format!("{}: bad event timestamp {}", symbol, event.date))
                })?
                .date_naive();
            series.insert(exdate, event.amount);
        }
    }

    Ok(series)
}

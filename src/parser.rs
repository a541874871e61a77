// 🏗️ Parser - broker CSV exports -> ClosedLot / Dividend
//
// Brokers name their columns differently, so the canonical fields are
// found by case-insensitive header aliases. Lot date columns are the one
// place where guessing is unsafe ("Date Acquired" vs "Trade Date" vs
// "Settlement Date"); when they are not obvious the operator picks them.
//
// Every column that is not canonical is carried into the dividend's field
// bag so the corrected CSV keeps what the broker exported.

use crate::entities::{
    ClosedLot, Dividend, DividendType, FieldValue, Requalification, SecurityIdentifier,
};
use crate::error::{AnalysisError, Result};
use crate::rules::TypeRuleSet;
use crate::selection::Chooser;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// chrono formats tried in order
    pub date_formats: Vec<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            date_formats: vec!["%Y-%m-%d".to_string(), "%m/%d/%Y".to_string()],
        }
    }
}

impl ParseOptions {
    pub fn with_date_formats(date_formats: Vec<String>) -> Self {
        ParseOptions { date_formats }
    }

    pub fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        self.date_formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    }
}

// ============================================================================
// COLUMN ALIASES
// ============================================================================

const SYMBOL: &[&str] = &["symbol", "ticker"];
const CUSIP: &[&str] = &["cusip"];
const QUANTITY: &[&str] = &["quantity", "shares", "qty"];
const OPEN_DATE: &[&str] = &["open date", "date acquired", "acquired", "opened", "open"];
const CLOSE_DATE: &[&str] = &["close date", "date sold", "sold", "closed", "close"];
const DIVIDEND_DATE: &[&str] = &["date", "pay date", "payment date", "paid"];
const VALUE: &[&str] = &["amount", "value"];
const TYPE: &[&str] = &["type", "description"];
const NOTES: &[&str] = &["notes"];
const REQUALIFIED: &[&str] = &["requalified"];

const OPEN_DATE_PROMPT: &str = "Which of these should be the open date for the lot?";
const CLOSE_DATE_PROMPT: &str = "Which of these should be the close date for the lot?";

fn same_name(header: &str, alias: &str) -> bool {
    header.trim().eq_ignore_ascii_case(alias)
}

/// First header matching the earliest alias
fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| same_name(h, alias)))
}

/// Every header matching any alias
fn candidate_columns(headers: &[String], aliases: &[&str]) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, h)| aliases.iter().any(|a| same_name(h, a)))
        .map(|(i, _)| i)
        .collect()
}

/// Lot date column: inferred when exactly one header fits, else the operator picks
fn date_column(
    headers: &[String],
    aliases: &[&str],
    prompt: &str,
    chooser: &dyn Chooser,
) -> Result<usize> {
    match candidate_columns(headers, aliases).as_slice() {
        [only] => Ok(*only),
        _ => chooser.choose(prompt, headers),
    }
}

// ============================================================================
// VALUE PARSING
// ============================================================================

/// Parse a money amount: `12.34`, `$1,234.56`, `-$855.94`, `(12.34)`
pub fn parse_amount(text: &str) -> Option<f64> {
    let mut s = text.trim();
    let mut negative = false;
    if s.len() >= 2 && s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = &s[1..s.len() - 1];
    }

    let cleaned: String = s
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Type an auxiliary column value without losing its text
fn typed_field(text: &str, opts: &ParseOptions) -> FieldValue {
    let trimmed = text.trim();
    if let Some(date) = opts.parse_date(trimmed) {
        return FieldValue::Date(date);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        // only when it prints back the same
        if n.is_finite() && n.to_string() == trimmed {
            return FieldValue::Number(n);
        }
    }
    FieldValue::Text(text.to_string())
}

// ============================================================================
// ROW CONTEXT
// ============================================================================

/// A file being read: name for error messages plus its headers
struct Sheet {
    source_name: String,
    headers: Vec<String>,
    rows: Vec<(usize, StringRecord)>,
}

impl Sheet {
    fn open(path: &Path) -> Result<Self> {
        let source_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AnalysisError::malformed(&source_name, 1, "header", e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            // +2 because: 1-indexed + header row
            let line = line_num + 2;
            let record =
                result.map_err(|e| AnalysisError::malformed(&source_name, line, "row", e.to_string()))?;
            rows.push((line, record));
        }

        tracing::debug!("Read {} rows from {}", rows.len(), source_name);
        Ok(Sheet {
            source_name,
            headers,
            rows,
        })
    }

    fn require(&self, aliases: &[&str]) -> Result<usize> {
        find_column(&self.headers, aliases).ok_or_else(|| {
            AnalysisError::malformed(
                &self.source_name,
                1,
                aliases[0],
                format!("no column named any of: {}", aliases.join(", ")),
            )
        })
    }

    fn malformed(&self, line: usize, col: usize, reason: impl Into<String>) -> AnalysisError {
        let field = self.headers.get(col).map(|s| s.as_str()).unwrap_or("?");
        AnalysisError::malformed(&self.source_name, line, field, reason)
    }

    fn cell<'r>(record: &'r StringRecord, col: Option<usize>) -> Option<&'r str> {
        col.and_then(|c| record.get(c))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    fn security(
        &self,
        line: usize,
        record: &StringRecord,
        cusip_col: Option<usize>,
        symbol_col: Option<usize>,
    ) -> Result<SecurityIdentifier> {
        let cusip = Self::cell(record, cusip_col).map(String::from);
        let symbol = Self::cell(record, symbol_col).map(String::from);
        SecurityIdentifier::new(cusip, symbol).map_err(|_| {
            AnalysisError::malformed(&self.source_name, line, "symbol", "row has neither a symbol nor a CUSIP")
        })
    }

    fn date(&self, line: usize, record: &StringRecord, col: usize, opts: &ParseOptions) -> Result<NaiveDate> {
        let text = record.get(col).unwrap_or("");
        opts.parse_date(text).ok_or_else(|| {
            self.malformed(
                line,
                col,
                format!("cannot parse date '{}' with {}", text, opts.date_formats.join(" or ")),
            )
        })
    }

    fn amount(&self, line: usize, record: &StringRecord, col: usize) -> Result<f64> {
        let text = record.get(col).unwrap_or("");
        parse_amount(text).ok_or_else(|| self.malformed(line, col, format!("cannot parse amount '{}'", text)))
    }

    /// Symbol and CUSIP columns: at least one must exist
    fn identifier_columns(&self) -> Result<(Option<usize>, Option<usize>)> {
        let cusip = find_column(&self.headers, CUSIP);
        let symbol = find_column(&self.headers, SYMBOL);
        if cusip.is_none() && symbol.is_none() {
            return Err(AnalysisError::malformed(
                &self.source_name,
                1,
                "symbol",
                "needs a symbol or a cusip column",
            ));
        }
        Ok((cusip, symbol))
    }
}

// ============================================================================
// CLOSED LOTS
// ============================================================================

pub fn read_closed_lots(path: &Path, opts: &ParseOptions, chooser: &dyn Chooser) -> Result<Vec<ClosedLot>> {
    let sheet = Sheet::open(path)?;

    let (cusip_col, symbol_col) = sheet.identifier_columns()?;
    let quantity_col = sheet.require(QUANTITY)?;
    let open_col = date_column(&sheet.headers, OPEN_DATE, OPEN_DATE_PROMPT, chooser)?;
    let close_col = date_column(&sheet.headers, CLOSE_DATE, CLOSE_DATE_PROMPT, chooser)?;
    tracing::debug!(
        "{}: open date column '{}', close date column '{}'",
        sheet.source_name,
        sheet.headers[open_col],
        sheet.headers[close_col]
    );

    let mut lots = Vec::with_capacity(sheet.rows.len());
    for (line, record) in &sheet.rows {
        let line = *line;
        let security = sheet.security(line, record, cusip_col, symbol_col)?;
        let quantity = sheet.amount(line, record, quantity_col)?;
        let open = sheet.date(line, record, open_col, opts)?;
        let close = sheet.date(line, record, close_col, opts)?;

        let lot = ClosedLot::new(security, quantity, open, close).map_err(|e| match e {
            AnalysisError::MalformedInput { field, reason, .. } => {
                AnalysisError::malformed(&sheet.source_name, line, &field, reason)
            }
            other => other,
        })?;
        lots.push(lot);
    }

    tracing::info!("Read {} closed lots from {}", lots.len(), sheet.source_name);
    Ok(lots)
}

// ============================================================================
// DIVIDENDS
// ============================================================================

pub fn read_dividends(
    path: &Path,
    opts: &ParseOptions,
    chooser: &dyn Chooser,
    rules: &TypeRuleSet,
) -> Result<Vec<Dividend>> {
    let sheet = Sheet::open(path)?;

    let (cusip_col, symbol_col) = sheet.identifier_columns()?;
    let date_col = sheet.require(DIVIDEND_DATE)?;
    let value_col = sheet.require(VALUE)?;
    let type_col = sheet.require(TYPE)?;
    let notes_col = find_column(&sheet.headers, NOTES);
    let requalified_col = find_column(&sheet.headers, REQUALIFIED);

    let canonical: Vec<usize> = [
        cusip_col,
        symbol_col,
        Some(date_col),
        Some(value_col),
        Some(type_col),
        notes_col,
        requalified_col,
    ]
    .into_iter()
    .flatten()
    .collect();

    // each unknown description is asked about once per file
    let mut classified: HashMap<String, DividendType> = HashMap::new();

    let mut dividends = Vec::with_capacity(sheet.rows.len());
    for (line, record) in &sheet.rows {
        let line = *line;
        let security = sheet.security(line, record, cusip_col, symbol_col)?;
        let date = sheet.date(line, record, date_col, opts)?;
        let value = sheet.amount(line, record, value_col)?;

        let type_text = record.get(type_col).unwrap_or("").trim();
        let dividend_type = match classified.get(type_text) {
            Some(t) => *t,
            None => {
                let t = classify_type(type_text, rules, chooser)
                    .map_err(|reason| sheet.malformed(line, type_col, reason))?;
                classified.insert(type_text.to_string(), t);
                t
            }
        };

        let requalified = match Sheet::cell(record, requalified_col) {
            None => None,
            Some(text) => Some(Requalification::parse(text).ok_or_else(|| {
                sheet.malformed(line, requalified_col.unwrap_or(0), format!("unknown marker '{}'", text))
            })?),
        };

        let mut dividend = Dividend::new(security, date, value, dividend_type).with_requalified(requalified);

        if let Some(text) = notes_col.and_then(|c| record.get(c)) {
            dividend = dividend.with_notes(typed_field(text, opts));
        }

        for (col, text) in record.iter().enumerate() {
            if canonical.contains(&col) {
                continue;
            }
            let Some(name) = sheet.headers.get(col) else { continue };
            dividend = dividend.with_field(name, typed_field(text, opts));
        }

        dividends.push(dividend);
    }

    tracing::info!("Read {} dividends from {}", dividends.len(), sheet.source_name);
    Ok(dividends)
}

/// Rule table first, then the operator
fn classify_type(
    text: &str,
    rules: &TypeRuleSet,
    chooser: &dyn Chooser,
) -> std::result::Result<DividendType, String> {
    if let Some(rule) = rules.classify(text) {
        tracing::debug!("'{}' classified as {} by rule {}", text, rule.dividend_type, rule.id);
        return Ok(rule.dividend_type);
    }

    let options: Vec<String> = DividendType::ALL.iter().map(|t| t.to_string()).collect();
    let prompt = format!("How should the dividend type '{}' be classified?", text);
    match chooser.choose(&prompt, &options) {
        Ok(idx) => DividendType::ALL
            .get(idx)
            .copied()
            .ok_or_else(|| format!("selection {} is not a dividend type", idx)),
        Err(e) => Err(format!("unknown dividend type '{}' ({})", text, e)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

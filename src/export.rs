// 📤 Export - corrected dividends back to CSV
//
// Canonical columns first, then every broker column in first-seen order,
// so the file reads back through `read_dividends` unchanged. A broker column
// named like a canonical header is written as `Original_<name>`.

use crate::entities::{Dividend, FieldValue, EXDATE_FIELD};
use crate::error::Result;
use chrono::Local;
use std::path::{Path, PathBuf};

pub const CANONICAL_HEADERS: [&str; 8] = [
    "Date",
    "Symbol",
    "CUSIP",
    "Value",
    "Type",
    EXDATE_FIELD,
    "Requalified",
    "Notes",
];

/// Write `adjusted_dividends_<YYYY-MM-DD_HH-MM>.csv` into `dir`
pub fn write_dividends(dividends: &[Dividend], dir: &Path) -> Result<PathBuf> {
    let filename = format!("adjusted_dividends_{}.csv", Local::now().format("%Y-%m-%d_%H-%M"));
    let path = dir.join(filename);
    write_dividends_to(dividends, &path)?;
    tracing::info!("Wrote adjusted dividends to {}", path.display());
    Ok(path)
}

/// Write to an exact path
pub fn write_dividends_to(dividends: &[Dividend], path: &Path) -> Result<()> {
    let extra = extra_headers(dividends);

    let mut writer = csv::Writer::from_path(path).map_err(std::io::Error::from)?;

    let header: Vec<&str> = CANONICAL_HEADERS
        .iter()
        .copied()
        .chain(extra.iter().map(|c| c.header.as_str()))
        .collect();
    writer.write_record(&header).map_err(std::io::Error::from)?;

    for dividend in dividends {
        writer.write_record(row(dividend, &extra)).map_err(std::io::Error::from)?;
    }

    writer.flush()?;
    Ok(())
}

/// Prefix for broker columns whose name is taken by a canonical header
const ORIGINAL_PREFIX: &str = "Original_";

/// An extra column: header written to the file, field name in the bag
#[derive(Debug, Clone, PartialEq)]
struct ExtraColumn {
    header: String,
    field: String,
}

/// Non-canonical fields across all dividends, first-seen order.
///
/// The exdate recorded by the engine has its own canonical column; any other
/// field whose name collides with a canonical header is renamed.
fn extra_headers(dividends: &[Dividend]) -> Vec<ExtraColumn> {
    let mut columns: Vec<ExtraColumn> = Vec::new();
    for dividend in dividends {
        for key in dividend.extra_fields.keys() {
            if key.eq_ignore_ascii_case(EXDATE_FIELD)
                || columns.iter().any(|c| c.field.eq_ignore_ascii_case(key))
            {
                continue;
            }
            let header = if CANONICAL_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(key)) {
                format!("{}{}", ORIGINAL_PREFIX, key)
            } else {
                key.to_string()
            };
            columns.push(ExtraColumn {
                header,
                field: key.to_string(),
            });
        }
    }
    columns
}

fn row(dividend: &Dividend, extra: &[ExtraColumn]) -> Vec<String> {
    let field = |name: &str| {
        dividend
            .extra_fields
            .get(name)
            .map(FieldValue::to_string)
            .unwrap_or_default()
    };

    let mut row = vec![
        dividend.date.format("%Y-%m-%d").to_string(),
        dividend.security.symbol.clone().unwrap_or_default(),
        dividend.security.cusip.clone().unwrap_or_default(),
        format!("{:.2}", dividend.value),
        dividend.dividend_type.to_string(),
        field(EXDATE_FIELD),
        dividend
            .requalified
            .map(|r| r.as_str().to_string())
            .unwrap_or_default(),
        dividend.notes().unwrap_or_default(),
    ];
    row.extend(extra.iter().map(|c| field(&c.field)));
    row
}

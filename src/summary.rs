// 📊 Summaries - 1099-DIV boxes and the per-run report
//
//   1a Total ordinary dividends  = NonQualified + Qualified + Section199A
//   1b Qualified dividends       = Qualified
//   5  Section 199A dividends    = Section199A
//   7  Foreign tax paid          = TaxWithheld
//   12 Exempt-interest dividends = TaxExempt

use crate::entities::{Dividend, DividendType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::ops::{Add, AddAssign};

// ============================================================================
// DIVIDEND SUMMARY
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DividendSummary {
    pub total_ordinary: f64,
    pub qualified: f64,
    pub section_199a: f64,
    pub foreign_tax_paid: f64,
    pub exempt_interest: f64,
}

impl DividendSummary {
    pub fn from_dividends(dividends: &[Dividend]) -> Self {
        let sum = |t: DividendType| -> f64 {
            dividends
                .iter()
                .filter(|d| d.dividend_type == t)
                .map(|d| d.value)
                .sum()
        };

        let qualified = sum(DividendType::Qualified);
        let section_199a = sum(DividendType::Section199A);

        DividendSummary {
            total_ordinary: sum(DividendType::NonQualified) + qualified + section_199a,
            qualified,
            section_199a,
            foreign_tax_paid: sum(DividendType::TaxWithheld),
            exempt_interest: sum(DividendType::TaxExempt),
        }
    }

    pub fn render(&self) -> String {
        format!(
            ">>> Dividends and Distributions\n\
             >>> 1a Total ordinary dividends:      {:.2}\n\
             >>> 1b Qualified dividends:           {:.2}\n\
             >>> 5  Section 199A dividends:        {:.2}\n\
             >>> 7  Foreign tax paid:              {:.2}\n\
             >>> 12 Exempt-interest dividends:     {:.2}\n",
            self.total_ordinary,
            self.qualified,
            self.section_199a,
            self.foreign_tax_paid,
            self.exempt_interest
        )
    }
}

impl Add for DividendSummary {
    type Output = DividendSummary;

    fn add(self, other: DividendSummary) -> DividendSummary {
        DividendSummary {
            total_ordinary: self.total_ordinary + other.total_ordinary,
            qualified: self.qualified + other.qualified,
            section_199a: self.section_199a + other.section_199a,
            foreign_tax_paid: self.foreign_tax_paid + other.foreign_tax_paid,
            exempt_interest: self.exempt_interest + other.exempt_interest,
        }
    }
}

impl AddAssign for DividendSummary {
    fn add_assign(&mut self, other: DividendSummary) {
        *self = *self + other;
    }
}

impl std::iter::Sum for DividendSummary {
    fn sum<I: Iterator<Item = DividendSummary>>(iter: I) -> Self {
        iter.fold(DividendSummary::default(), |acc, s| acc + s)
    }
}

// ============================================================================
// VERBOSE BREAKDOWN
// ============================================================================

/// Values summed per (security, date, type), ordered by security then date
#[derive(Debug, Clone, Default)]
pub struct DividendBreakdown {
    entries: BTreeMap<(String, NaiveDate, &'static str), f64>,
}

impl DividendBreakdown {
    pub fn from_dividends(dividends: &[Dividend]) -> Self {
        let mut entries = BTreeMap::new();
        for d in dividends {
            let key = (d.security.to_string(), d.date, d.dividend_type.as_str());
            *entries.entry(key).or_insert(0.0) += d.value;
        }
        DividendBreakdown { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One line per entry, a running total after each security
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut last_security: Option<&str> = None;
        let mut running = 0.0;

        for ((security, date, kind), value) in &self.entries {
            if last_security != Some(security.as_str()) {
                if last_security.is_some() {
                    let _ = writeln!(out, "{:>62}\n", format!("Total: {:.2}", running));
                    running = 0.0;
                }
                let _ = write!(out, "{:<20}", security);
                last_security = Some(security.as_str());
            } else {
                let _ = write!(out, "{:<20}", "");
            }

            let _ = writeln!(
                out,
                "{:<15}{:<20}{:>7.2}",
                date.format("%Y-%m-%d").to_string(),
                kind,
                value
            );
            running += value;
        }

        if last_security.is_some() {
            let _ = writeln!(out, "{:>62}\n", format!("Total: {:.2}", running));
        }
        out
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub dividends_read: usize,
    pub lots_read: usize,
    pub short_lots: usize,
    pub splits: usize,
    pub disqualified_total: f64,
    pub no_applicable_exdate: usize,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "Requalification: {} dividends, {} lots ({} short), {} splits, ${:.2} disqualified, {} without an applicable exdate",
            self.dividends_read,
            self.lots_read,
            self.short_lots,
            self.splits,
            self.disqualified_total,
            self.no_applicable_exdate
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::SecurityIdentifier;
    use pretty_assertions::assert_eq;

    fn dividend(symbol: &str, day: u32, value: f64, t: DividendType) -> Dividend {
        Dividend::new(
            SecurityIdentifier::from_symbol(symbol).unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, day).unwrap(),
            value,
            t,
        )
    }

    fn sample() -> Vec<Dividend> {
        vec![
            dividend("VTI", 31, 60.0, DividendType::Qualified),
            dividend("VTI", 31, 40.0, DividendType::NonQualified),
            dividend("VTI", 31, -5.0, DividendType::TaxWithheld),
            dividend("O", 15, 25.0, DividendType::Section199A),
            dividend("MUB", 1, 12.5, DividendType::TaxExempt),
        ]
    }

    #[test]
    fn test_boxes() {
        let summary = DividendSummary::from_dividends(&sample());

        assert_eq!(
            summary,
            DividendSummary {
                total_ordinary: 125.0,
                qualified: 60.0,
                section_199a: 25.0,
                foreign_tax_paid: -5.0,
                exempt_interest: 12.5,
            }
        );
    }

    #[test]
    fn test_summaries_add() {
        let one = DividendSummary::from_dividends(&sample());
        let total: DividendSummary = vec![one, one].into_iter().sum();

        assert_eq!(total.total_ordinary, 250.0);
        assert_eq!(total.exempt_interest, 25.0);

        let mut acc = DividendSummary::default();
        acc += one;
        assert_eq!(acc, one);
    }

    #[test]
    fn test_render() {
        let rendered = DividendSummary::from_dividends(&sample()).render();
        assert!(rendered.contains("1a Total ordinary dividends:      125.00"));
        assert!(rendered.contains("7  Foreign tax paid:              -5.00"));
    }

    #[test]
    fn test_breakdown_groups_and_totals() {
        let mut divs = sample();
        divs.push(dividend("VTI", 31, 10.0, DividendType::Qualified));
        let breakdown = DividendBreakdown::from_dividends(&divs);

        assert_eq!(breakdown.len(), 5);
        let rendered = breakdown.render();
        let lines: Vec<&str> = rendered.lines().filter(|l| !l.trim().is_empty()).collect();

        // MUB, O, VTI in order, each followed by its total
        assert!(lines[0].starts_with("MUB"));
        assert!(lines[1].trim_start().starts_with("Total: 12.50"));
        assert!(lines[2].starts_with("O"));
        assert!(lines[4].starts_with("VTI"));
        assert!(lines[4].contains("NonQualified"));
        assert!(lines[5].contains("Qualified"));
        assert!(lines[5].trim_end().ends_with("70.00"));
        assert!(lines.last().unwrap().trim_start().starts_with("Total: 105.00"));
    }

    #[test]
    fn test_run_report_summary() {
        let report = RunReport {
            dividends_read: 5,
            lots_read: 3,
            short_lots: 1,
            splits: 1,
            disqualified_total: 25.0,
            no_applicable_exdate: 0,
        };
        assert!(report.summary().contains("$25.00 disqualified"));
    }
}

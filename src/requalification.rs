// ⚖️ Requalification Engine - holding-period test per dividend
//
// For every Qualified / Section 199A dividend:
//
//   exdate  = latest ex-dividend date strictly before the payment date
//   culprits = lots of the same security held across the exdate
//              (open < exdate <= close) for fewer days than the type allows
//   disqualified = round(Σ culprit shares × per-share amount × qualified %, 2)
//
// and the dividend is replaced by two records: the reduced remainder (same
// type) and a synthesized NonQualified dividend carrying the difference.
//
// Only lots that actually spanned the exdate could have produced the
// dividend, so a short lot spanning it is both necessary and sufficient to
// fail the 61-of-121 (46-of-91) day test.

use crate::entities::{round_cents, ClosedLot, Dividend, HoldingRule, SecurityIdentifier};
use crate::error::Result;
use crate::market_data::{ExdateSeries, ExdateTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Preferential dividends that reached the holding-period test
    pub evaluated: usize,
    /// Dividends with no exdate before their payment date
    pub no_applicable_exdate: usize,
    /// Dividends split into remainder + synthesized
    pub splits: usize,
    /// Sum of all synthesized NonQualified values
    pub disqualified_total: f64,
}

#[derive(Debug, Clone)]
pub struct RequalificationOutcome {
    pub dividends: Vec<Dividend>,
    pub changed: bool,
    pub stats: EngineStats,
}

/// Why one dividend lost (part of) its preferential treatment
#[derive(Debug, Clone)]
struct Disqualification<'a> {
    exdate: NaiveDate,
    per_share: f64,
    qualified_percentage: f64,
    shares: f64,
    value: f64,
    rule: HoldingRule,
    lots: Vec<&'a ClosedLot>,
}

impl Disqualification<'_> {
    fn lot_list(&self) -> String {
        self.lots
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(";")
    }

    fn remainder_note(&self) -> String {
        format!(
            "Disqualified ${:.2}. The dividend with exdate {} paid ${} per share. \
             {:.2}% of the dividend value was reported as preferential. \
             {} shares were not held for {} days of the {} day window around the exdate: {}",
            self.value,
            self.exdate.format("%Y-%m-%d"),
            self.per_share,
            self.qualified_percentage * 100.0,
            self.shares,
            self.rule.min_days,
            self.rule.window_days,
            self.lot_list()
        )
    }

    fn synthesized_note(&self) -> String {
        format!("Synthesized nonqualified dividend due to: {}", self.lot_list())
    }
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Default)]
pub struct RequalificationEngine;

impl RequalificationEngine {
    pub fn new() -> Self {
        RequalificationEngine
    }

    /// Run the holding-period test over one analysis run.
    ///
    /// `securities` are the (hydrated) securities that had any preferential
    /// dividend; `exdates` holds their exdate series for the tax year.
    /// Output order: non-preferential dividends first in input order, then
    /// per security (first-seen order) the evaluated dividends and splits.
    pub fn requalify(
        &self,
        dividends: &[Dividend],
        lots: &[ClosedLot],
        securities: &[SecurityIdentifier],
        exdates: &ExdateTable,
    ) -> Result<RequalificationOutcome> {
        let mut stats = EngineStats::default();
        let mut changed = false;

        let mut output: Vec<Dividend> = dividends
            .iter()
            .filter(|d| !d.is_preferential())
            .cloned()
            .collect();

        let lots_by_security = group_lots(lots)?;
        let mut handled = vec![false; dividends.len()];

        let mut visited: Vec<&str> = Vec::new();
        for security in securities {
            let key = security.hash_key()?;
            if visited.contains(&key) {
                continue;
            }
            visited.push(key);

            let empty = ExdateSeries::new();
            let series = exdates.get(key).unwrap_or(&empty);
            let security_lots: &[&ClosedLot] = lots_by_security
                .get(key)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);

            for (idx, dividend) in dividends.iter().enumerate() {
                if !dividend.is_preferential() || dividend.security.hash_key()? != key {
                    continue;
                }
                handled[idx] = true;

                let (replacement, split) =
                    self.evaluate(dividend, dividends, security_lots, series, &mut stats)?;
                if split {
                    changed = true;
                }
                output.extend(replacement);
            }
        }

        // preferential dividends whose security was not handed in
        for (idx, dividend) in dividends.iter().enumerate() {
            if dividend.is_preferential() && !handled[idx] {
                tracing::warn!("{} was not part of the analyzed securities; left unchanged", dividend);
                output.push(dividend.clone());
            }
        }

        Ok(RequalificationOutcome {
            dividends: output,
            changed,
            stats,
        })
    }

    /// Evaluate one preferential dividend; returns its replacement records
    /// and whether it was split.
    fn evaluate(
        &self,
        dividend: &Dividend,
        all_dividends: &[Dividend],
        lots: &[&ClosedLot],
        series: &ExdateSeries,
        stats: &mut EngineStats,
    ) -> Result<(Vec<Dividend>, bool)> {
        if dividend.requalified.is_some() {
            tracing::debug!("{} was already requalified; leaving it alone", dividend);
            return Ok((vec![dividend.clone()], false));
        }

        let Some((exdate, per_share)) = governing_exdate(series, dividend.date) else {
            let known = series
                .keys()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>()
                .join(",");
            tracing::warn!("For dividend {} got no valid exdates (out of: {})", dividend, known);
            stats.no_applicable_exdate += 1;
            return Ok((vec![dividend.clone()], false));
        };

        stats.evaluated += 1;
        let mut dividend = dividend.clone();
        dividend.record_exdate(exdate);

        let Some(rule) = dividend.dividend_type.holding_rule() else {
            return Ok((vec![dividend], false));
        };

        let culprits: Vec<&ClosedLot> = lots
            .iter()
            .copied()
            .filter(|lot| lot.spans_exdate(exdate) && rule.is_disqualifying(lot.holding_period_days()))
            .collect();

        if culprits.is_empty() {
            return Ok((vec![dividend], false));
        }

        // sometimes only a fraction of the payment is preferential; negative
        // foreign-tax lines stay out of the base
        let mut related_total = 0.0;
        for other in all_dividends {
            if other.date == dividend.date && other.value > 0.0 && other.security.try_eq(&dividend.security)? {
                related_total += other.value;
            }
        }

        if dividend.value <= 0.0 || related_total <= 0.0 {
            tracing::debug!("{} has no positive value to disqualify", dividend);
            return Ok((vec![dividend], false));
        }

        let qualified_percentage = dividend.value / related_total;
        let shares: f64 = culprits.iter().map(|l| l.quantity()).sum();
        let mut value = round_cents(shares * per_share * qualified_percentage);

        if value > dividend.value {
            tracing::warn!(
                "Computed ${:.2} to disqualify from {}; capping at the reported value",
                value,
                dividend
            );
            value = dividend.value;
        }

        if value <= 0.0 {
            return Ok((vec![dividend], false));
        }

        let reason = Disqualification {
            exdate,
            per_share,
            qualified_percentage,
            shares,
            value,
            rule,
            lots: culprits,
        };

        let (mut remainder, mut synthesized) = dividend.split(value)?;
        remainder.add_note(&reason.remainder_note());
        synthesized.add_note(&reason.synthesized_note());

        tracing::info!(
            "Disqualified ${:.2} of {} ({} short lots)",
            value,
            dividend,
            reason.lots.len()
        );
        stats.splits += 1;
        stats.disqualified_total = round_cents(stats.disqualified_total + value);

        Ok((vec![remainder, synthesized], true))
    }
}

/// Latest exdate strictly before `paid`, with its per-share amount
pub fn governing_exdate(series: &ExdateSeries, paid: NaiveDate) -> Option<(NaiveDate, f64)> {
    series.range(..paid).next_back().map(|(d, v)| (*d, *v))
}

fn group_lots(lots: &[ClosedLot]) -> Result<HashMap<&str, Vec<&ClosedLot>>> {
    let mut grouped: HashMap<&str, Vec<&ClosedLot>> = HashMap::new();
    for lot in lots {
        grouped.entry(lot.security().hash_key()?).or_default().push(lot);
    }
    Ok(grouped)
}

// ============================================================================
// TESTS
// ============================================================================

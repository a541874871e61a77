// 🔎 Analyzer - one requalification run end to end
//
//   read lots + dividends
//     → hydrate identifiers (one SymbolCache per run)
//     → securities with preferential dividends
//     → their lots held too briefly to ever qualify
//     → exdates for those securities only (failure is fatal)
//     → RequalificationEngine
//     → adjusted CSV when anything changed

use crate::config::AnalysisConfig;
use crate::entities::{ClosedLot, Dividend, DividendType, SecurityIdentifier, SymbolCache};
use crate::error::{AnalysisError, Result};
use crate::export::write_dividends;
use crate::market_data::{ExdateLookup, SymbolResolver};
use crate::parser::{read_closed_lots, read_dividends, ParseOptions};
use crate::requalification::RequalificationEngine;
use crate::rules::TypeRuleSet;
use crate::selection::Chooser;
use crate::summary::{DividendBreakdown, DividendSummary, RunReport};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub dividends: Vec<Dividend>,
    pub changed: bool,
    /// Adjusted CSV, when one was written
    pub output: Option<PathBuf>,
    pub report: RunReport,
}

#[derive(Debug, Clone)]
pub struct FileSummary {
    pub path: PathBuf,
    pub summary: DividendSummary,
    pub breakdown: Option<DividendBreakdown>,
}

pub struct Analyzer<'a> {
    config: &'a AnalysisConfig,
    chooser: &'a dyn Chooser,
    rules: &'a TypeRuleSet,
    resolver: &'a dyn SymbolResolver,
    exdates: &'a dyn ExdateLookup,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        chooser: &'a dyn Chooser,
        rules: &'a TypeRuleSet,
        resolver: &'a dyn SymbolResolver,
        exdates: &'a dyn ExdateLookup,
    ) -> Self {
        Analyzer {
            config,
            chooser,
            rules,
            resolver,
            exdates,
        }
    }

    fn parse_options(&self) -> ParseOptions {
        self.config.parse_options()
    }

    pub fn read_inputs(&self, lot_files: &[PathBuf], dividend_files: &[PathBuf]) -> Result<(Vec<ClosedLot>, Vec<Dividend>)> {
        let opts = self.parse_options();

        let mut lots = Vec::new();
        for path in lot_files {
            lots.extend(read_closed_lots(path, &opts, self.chooser)?);
        }

        let mut dividends = Vec::new();
        for path in dividend_files {
            dividends.extend(read_dividends(path, &opts, self.chooser, self.rules)?);
        }

        Ok((lots, dividends))
    }

    /// Run the analysis and write the adjusted dividends if anything changed
    pub fn analyze_qualified_dividends(
        &self,
        lot_files: &[PathBuf],
        dividend_files: &[PathBuf],
    ) -> Result<AnalysisOutcome> {
        tracing::info!("Running qualified dividends analysis for {}", self.config.tax_year);

        let (mut lots, mut dividends) = self.read_inputs(lot_files, dividend_files)?;
        let mut report = RunReport {
            dividends_read: dividends.len(),
            lots_read: lots.len(),
            ..RunReport::default()
        };

        let mut cache = SymbolCache::new();
        for lot in &mut lots {
            if !lot.security().is_hydrated() {
                lot.security_mut().hydrate(self.resolver, &mut cache)?;
            }
        }
        for dividend in &mut dividends {
            if !dividend.security.is_hydrated() {
                dividend.security.hydrate(self.resolver, &mut cache)?;
            }
        }
        tracing::debug!("Hydrated identifiers with {} symbol lookups", cache.lookups());

        let preferential = preferential_securities(&dividends)?;
        let short_lots = short_lots(&lots, &preferential)?;
        report.short_lots = short_lots.len();

        if short_lots.is_empty() {
            tracing::info!("No lots with short holding periods; every dividend stands");
            tracing::info!("{}", report.summary());
            return Ok(AnalysisOutcome {
                dividends,
                changed: false,
                output: None,
                report,
            });
        }

        let to_fetch: Vec<SecurityIdentifier> = short_lots.iter().map(|l| l.security().clone()).collect();
        let exdates = self.exdates.get_exdates(&to_fetch, self.config.tax_year).map_err(|e| {
            tracing::error!("Encountered an error fetching dividend exdate information: {}", e);
            e
        })?;
        if exdates.values().all(|series| series.is_empty()) {
            tracing::error!("Exdate lookup returned nothing for {} securities", to_fetch.len());
            return Err(AnalysisError::LookupFailure(format!(
                "no exdates found for any of {} securities in {}",
                to_fetch.len(),
                self.config.tax_year
            )));
        }

        let outcome = RequalificationEngine::new().requalify(&dividends, &short_lots, &preferential, &exdates)?;
        report.splits = outcome.stats.splits;
        report.disqualified_total = outcome.stats.disqualified_total;
        report.no_applicable_exdate = outcome.stats.no_applicable_exdate;

        let output = if outcome.changed {
            Some(write_dividends(&outcome.dividends, &self.config.output_dir)?)
        } else {
            tracing::info!("No dividends were disqualified");
            None
        };

        tracing::info!("{}", report.summary());
        Ok(AnalysisOutcome {
            dividends: outcome.dividends,
            changed: outcome.changed,
            output,
            report,
        })
    }

    /// 1099-DIV boxes per dividend file
    pub fn summarize(&self, dividend_files: &[PathBuf], verbose: bool) -> Result<Vec<FileSummary>> {
        tracing::info!("Summarizing {} dividend files", dividend_files.len());
        let opts = self.parse_options();

        dividend_files
            .iter()
            .map(|path| summarize_file(path, &opts, self.chooser, self.rules, verbose))
            .collect()
    }
}

fn summarize_file(
    path: &Path,
    opts: &ParseOptions,
    chooser: &dyn Chooser,
    rules: &TypeRuleSet,
    verbose: bool,
) -> Result<FileSummary> {
    let dividends = read_dividends(path, opts, chooser, rules)?;
    Ok(FileSummary {
        path: path.to_path_buf(),
        summary: DividendSummary::from_dividends(&dividends),
        breakdown: verbose.then(|| DividendBreakdown::from_dividends(&dividends)),
    })
}

/// Distinct securities with a Qualified / Section 199A dividend, first-seen order
pub fn preferential_securities(dividends: &[Dividend]) -> Result<Vec<SecurityIdentifier>> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut securities = Vec::new();
    for dividend in dividends.iter().filter(|d| d.is_preferential()) {
        if seen.insert(dividend.security.hash_key()?) {
            securities.push(dividend.security.clone());
        }
    }
    Ok(securities)
}

/// Lots of `securities` held fewer days than the longest holding requirement
pub fn short_lots(lots: &[ClosedLot], securities: &[SecurityIdentifier]) -> Result<Vec<ClosedLot>> {
    let threshold = DividendType::ALL
        .iter()
        .filter_map(|t| t.holding_rule())
        .map(|rule| rule.min_days)
        .max()
        .unwrap_or(0);

    let keys = securities
        .iter()
        .map(|s| s.hash_key())
        .collect::<Result<HashSet<&str>>>()?;

    let mut short = Vec::new();
    for lot in lots {
        if keys.contains(lot.security().hash_key()?) && lot.holding_period_days() < threshold {
            short.push(lot.clone());
        }
    }
    Ok(short)
}

// ============================================================================
// TESTS
// ============================================================================

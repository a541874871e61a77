// Dividend Requalification - Core Library
// Exposes all modules for use in the CLI and tests

pub mod analyzer;         // Orchestration: read -> hydrate -> requalify -> write
pub mod config;           // AnalysisConfig (JSON)
pub mod entities;         // SecurityIdentifier, ClosedLot, Dividend
pub mod error;            // AnalysisError
pub mod export;           // Adjusted dividends CSV
pub mod market_data;      // Symbol + exdate lookups (static files, Yahoo)
pub mod parser;           // Broker CSV ingestion
pub mod requalification;  // Holding-period engine
pub mod rules;            // Dividend type rules
pub mod selection;        // Operator choices + replay
pub mod summary;          // 1099-DIV boxes, run report

// Re-export commonly used types
pub use analyzer::{preferential_securities, short_lots, AnalysisOutcome, Analyzer, FileSummary};
pub use config::AnalysisConfig;
pub use entities::{
    ClosedLot, Dividend, DividendType, FieldBag, FieldValue, HoldingRule, Requalification,
    SecurityIdentifier, SymbolCache,
};
pub use error::{AnalysisError, Result};
pub use export::{write_dividends, write_dividends_to};
pub use market_data::{ExdateLookup, ExdateSeries, ExdateTable, StaticMarketData, SymbolResolver};
#[cfg(feature = "yahoo")]
pub use market_data::YahooClient;
pub use parser::{parse_amount, read_closed_lots, read_dividends, ParseOptions};
pub use requalification::{governing_exdate, EngineStats, RequalificationEngine, RequalificationOutcome};
pub use rules::{TypeRule, TypeRuleSet};
pub use selection::{Chooser, InteractivePrompt, NonInteractive, ReplayChooser, SelectionRecord};
pub use summary::{DividendBreakdown, DividendSummary, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

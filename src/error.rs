// ⚠️ Error taxonomy for a requalification run
//
// Fatal conditions are values of AnalysisError and abort the run.
// Recoverable conditions (no applicable exdate) are logged and counted
// in the RunReport instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required field is absent or unparsable
    #[error("Malformed input in {source_name} line {line}, field '{field}': {reason}")]
    MalformedInput {
        source_name: String,
        line: usize,
        field: String,
        reason: String,
    },

    /// A security identifier was compared or hashed before hydration
    #[error("Unhydrated security identifier {0}; hydrate all identifiers before grouping them")]
    UnhydratedIdentifier(String),

    /// Symbol -> CUSIP resolution has never been supported
    #[error("Cannot hydrate {0}: resolving a CUSIP from a symbol is not supported")]
    UnsupportedHydration(String),

    /// The market-data collaborator could not answer
    #[error("Market data lookup failed: {0}")]
    LookupFailure(String),

    /// Several equally valid answers and nobody to pick one
    #[error("Ambiguous resolution: {0}")]
    AmbiguousResolution(String),

    /// A split asked to carve out more than the dividend is worth
    #[error("Cannot disqualify ${amount:.2} out of a ${value:.2} dividend")]
    InvalidSplit { amount: f64, value: f64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    pub fn malformed(source_name: &str, line: usize, field: &str, reason: impl Into<String>) -> Self {
        AnalysisError::MalformedInput {
            source_name: source_name.to_string(),
            line,
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message_names_location() {
        let err = AnalysisError::malformed("divs.csv", 7, "Date", "expected %Y-%m-%d");
        let msg = err.to_string();

        assert!(msg.contains("divs.csv"));
        assert!(msg.contains("line 7"));
        assert!(msg.contains("'Date'"));
    }
}

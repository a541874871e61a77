// 🏷️ Security Identifier - CUSIP and/or ticker symbol
//
// "A CUSIP is an identity, a ticker is how people talk about it"
//
// Identifiers come out of the CSVs half-filled: some brokers only report the
// CUSIP, others only the symbol. Before any grouping the identifier must be
// hydrated so that both sides of every comparison share a populated field.

use crate::error::{AnalysisError, Result};
use crate::market_data::SymbolResolver;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// SECURITY IDENTIFIER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityIdentifier {
    pub cusip: Option<String>,
    pub symbol: Option<String>,
}

impl SecurityIdentifier {
    /// Build an identifier; blank strings count as missing
    pub fn new(cusip: Option<String>, symbol: Option<String>) -> Result<Self> {
        let cusip = normalize(cusip);
        let symbol = normalize(symbol).map(|s| s.to_uppercase());

        if cusip.is_none() && symbol.is_none() {
            return Err(AnalysisError::malformed(
                "security identifier",
                0,
                "cusip/symbol",
                "a security must be identified by either a CUSIP or a symbol",
            ));
        }

        Ok(SecurityIdentifier { cusip, symbol })
    }

    pub fn from_symbol(symbol: &str) -> Result<Self> {
        Self::new(None, Some(symbol.to_string()))
    }

    pub fn from_cusip(cusip: &str) -> Result<Self> {
        Self::new(Some(cusip.to_string()), None)
    }

    /// Hydrated = symbol known. Grouping keys on the symbol.
    pub fn is_hydrated(&self) -> bool {
        self.symbol.is_some()
    }

    /// Fill in the missing symbol from the resolver, going through the run cache.
    ///
    /// Symbol -> CUSIP is not supported and fails loudly.
    pub fn hydrate(&mut self, resolver: &dyn SymbolResolver, cache: &mut SymbolCache) -> Result<()> {
        match (&self.cusip, &self.symbol) {
            (Some(cusip), None) => {
                let symbol = cache.resolve(cusip, resolver)?;
                self.symbol = Some(symbol);
                Ok(())
            }
            (None, Some(_)) => {
                tracing::error!("Asked to hydrate symbol-only identifier {}", self);
                Err(AnalysisError::UnsupportedHydration(self.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Compare two identifiers.
    ///
    /// Errors when the two share no populated field of the same kind: that is a
    /// missing hydration step, not an inequality.
    pub fn try_eq(&self, other: &SecurityIdentifier) -> Result<bool> {
        let symbols = match (&self.symbol, &other.symbol) {
            (Some(a), Some(b)) => Some(a == b),
            _ => None,
        };
        let cusips = match (&self.cusip, &other.cusip) {
            (Some(a), Some(b)) => Some(a == b),
            _ => None,
        };

        match (symbols, cusips) {
            (None, None) => {
                tracing::error!(
                    "Comparing securities which don't share a populated field: {} vs {}",
                    self,
                    other
                );
                Err(AnalysisError::UnhydratedIdentifier(format!("{} vs {}", self, other)))
            }
            (s, c) => Ok(s.unwrap_or(false) || c.unwrap_or(false)),
        }
    }

    /// Grouping key (the symbol)
    pub fn hash_key(&self) -> Result<&str> {
        self.symbol
            .as_deref()
            .ok_or_else(|| AnalysisError::UnhydratedIdentifier(self.to_string()))
    }
}

impl fmt::Display for SecurityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.symbol, &self.cusip) {
            (Some(symbol), Some(cusip)) => write!(f, "{} ({})", symbol, cusip),
            (Some(symbol), None) => write!(f, "{}", symbol),
            (None, Some(cusip)) => write!(f, "<unhydrated> ({})", cusip),
            (None, None) => write!(f, "<unidentified>"),
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// SYMBOL CACHE
// ============================================================================

/// CUSIP -> symbol answers for one run.
///
/// Owned by the orchestration layer and handed to every hydration, so each
/// distinct CUSIP hits the resolver at most once. Entries are never evicted.
#[derive(Debug, Default, Clone)]
pub struct SymbolCache {
    entries: HashMap<String, String>,
    lookups: usize,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, cusip: &str, resolver: &dyn SymbolResolver) -> Result<String> {
        if let Some(symbol) = self.entries.get(cusip) {
            tracing::debug!("CUSIP {} already resolved to {}", cusip, symbol);
            return Ok(symbol.clone());
        }

        let symbol = resolver.resolve_symbol(cusip)?.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(AnalysisError::LookupFailure(format!(
                "no symbol returned for CUSIP {}",
                cusip
            )));
        }

        self.lookups += 1;
        self.entries.insert(cusip.to_string(), symbol.clone());
        Ok(symbol)
    }

    /// How many times the resolver was actually consulted
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingResolver {
        calls: Cell<usize>,
    }

    impl SymbolResolver for CountingResolver {
        fn resolve_symbol(&self, cusip: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            match cusip {
                "037833100" => Ok("aapl".to_string()),
                _ => Err(AnalysisError::LookupFailure(format!("unknown {}", cusip))),
            }
        }
    }

    #[test]
    fn test_new_requires_one_field() {
        assert!(SecurityIdentifier::new(None, None).is_err());
        assert!(SecurityIdentifier::new(Some("  ".into()), Some("".into())).is_err());
        assert!(SecurityIdentifier::from_symbol("msft").is_ok());
    }

    #[test]
    fn test_symbol_is_uppercased() {
        let id = SecurityIdentifier::from_symbol("msft").unwrap();
        assert_eq!(id.symbol.as_deref(), Some("MSFT"));
    }

    #[test]
    fn test_symbol_only_equality() {
        let a = SecurityIdentifier::from_symbol("VTI").unwrap();
        let b = SecurityIdentifier::from_symbol("VTI").unwrap();
        let c = SecurityIdentifier::from_symbol("VXUS").unwrap();

        assert!(a.try_eq(&b).unwrap());
        assert!(!a.try_eq(&c).unwrap());
    }

    #[test]
    fn test_cusip_vs_symbol_comparison_errors() {
        let a = SecurityIdentifier::from_cusip("037833100").unwrap();
        let b = SecurityIdentifier::from_symbol("AAPL").unwrap();

        let result = a.try_eq(&b);
        assert!(matches!(result, Err(AnalysisError::UnhydratedIdentifier(_))));
    }

    #[test]
    fn test_cusip_match_is_equal_even_without_symbols() {
        let a = SecurityIdentifier::from_cusip("037833100").unwrap();
        let b = SecurityIdentifier::new(Some("037833100".into()), Some("AAPL".into())).unwrap();
        assert!(a.try_eq(&b).unwrap());
    }

    #[test]
    fn test_hash_key_requires_symbol() {
        let id = SecurityIdentifier::from_cusip("037833100").unwrap();
        assert!(matches!(id.hash_key(), Err(AnalysisError::UnhydratedIdentifier(_))));
    }

    #[test]
    fn test_hydrate_resolves_once_per_cusip() {
        let resolver = CountingResolver { calls: Cell::new(0) };
        let mut cache = SymbolCache::new();

        let mut first = SecurityIdentifier::from_cusip("037833100").unwrap();
        let mut second = SecurityIdentifier::from_cusip("037833100").unwrap();
        first.hydrate(&resolver, &mut cache).unwrap();
        second.hydrate(&resolver, &mut cache).unwrap();

        assert_eq!(first.symbol.as_deref(), Some("AAPL"));
        assert_eq!(second.hash_key().unwrap(), "AAPL");
        assert_eq!(resolver.calls.get(), 1);
        assert_eq!(cache.lookups(), 1);
    }

    #[test]
    fn test_hydrate_symbol_only_is_unsupported() {
        let resolver = CountingResolver { calls: Cell::new(0) };
        let mut cache = SymbolCache::new();
        let mut id = SecurityIdentifier::from_symbol("AAPL").unwrap();

        let result = id.hydrate(&resolver, &mut cache);
        assert!(matches!(result, Err(AnalysisError::UnsupportedHydration(_))));
        assert_eq!(resolver.calls.get(), 0);
    }

    #[test]
    fn test_failed_resolution_is_not_cached() {
        let resolver = CountingResolver { calls: Cell::new(0) };
        let mut cache = SymbolCache::new();

        let mut id = SecurityIdentifier::from_cusip("922908769").unwrap();
        assert!(id.hydrate(&resolver, &mut cache).is_err());
        assert!(id.hydrate(&resolver, &mut cache).is_err());

        assert!(!id.is_hydrated());
        assert_eq!(resolver.calls.get(), 2);
        assert_eq!(cache.lookups(), 0);
    }

    #[test]
    fn test_display_hydrated() {
        let resolver = CountingResolver { calls: Cell::new(0) };
        let mut cache = SymbolCache::new();
        let mut id = SecurityIdentifier::from_cusip("037833100").unwrap();
        id.hydrate(&resolver, &mut cache).unwrap();

        assert_eq!(id.to_string(), "AAPL (037833100)");
    }

    #[test]
    fn test_display_unhydrated() {
        let id = SecurityIdentifier::from_cusip("037833100").unwrap();
        assert_eq!(id.to_string(), "<unhydrated> (037833100)");
    }
}

// 🏷️ Type Rules - Rules as Data
// Pattern matching from a broker's dividend description to a DividendType

use crate::entities::DividendType;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRule {
    /// Rule ID for tracking
    pub id: String,

    /// Pattern to match (supports wildcards with *)
    pub pattern: String,

    /// Type assigned on match
    pub dividend_type: DividendType,

    /// Priority (higher = applied first)
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    0
}

impl TypeRule {
    pub fn new(id: &str, pattern: &str, dividend_type: DividendType, priority: i32) -> Self {
        TypeRule {
            id: id.to_string(),
            pattern: pattern.to_string(),
            dividend_type,
            priority,
        }
    }

    /// Check if pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        let pattern_lower = self.pattern.to_lowercase();
        let text_lower = text.trim().to_lowercase();

        if !pattern_lower.contains('*') {
            // no wildcard: whole description, case-insensitive
            return text_lower == pattern_lower;
        }

        let parts: Vec<&str> = pattern_lower.split('*').collect();
        let first = parts[0];
        let last = parts[parts.len() - 1];

        if !text_lower.starts_with(first) {
            return false;
        }

        // middle parts appear in order
        let mut current_pos = first.len();
        for part in &parts[1..parts.len() - 1] {
            if part.is_empty() {
                continue;
            }
            match text_lower[current_pos..].find(part) {
                Some(pos) => current_pos += pos + part.len(),
                None => return false,
            }
        }

        text_lower.len() >= current_pos + last.len() && text_lower.ends_with(last)
    }
}

// ============================================================================
// RULE ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct TypeRuleSet {
    rules: Vec<TypeRule>,
}

impl TypeRuleSet {
    /// Empty rule set
    pub fn new() -> Self {
        TypeRuleSet { rules: Vec::new() }
    }

    /// Built-in phrasing seen on broker 1099 exports
    pub fn builtin() -> Self {
        use DividendType::*;

        let mut rules = vec![
            TypeRule::new("foreign-tax", "*foreign tax*", TaxWithheld, 50),
            TypeRule::new("tax-withheld", "*withh*", TaxWithheld, 40),
            TypeRule::new("section-199a", "*199a*", Section199A, 40),
            TypeRule::new("non-qualified", "*non*qualified*", NonQualified, 30),
            TypeRule::new("ordinary", "*ordinary*", NonQualified, 20),
            TypeRule::new("qualified", "*qualified*", Qualified, 10),
            TypeRule::new("exempt", "*exempt*", TaxExempt, 10),
        ];
        // canonical names match exactly and win
        for (i, t) in DividendType::ALL.iter().enumerate() {
            rules.push(TypeRule::new(
                &format!("canonical-{}", i),
                t.as_str(),
                *t,
                100,
            ));
        }

        TypeRuleSet::from_rules(rules)
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read type rules file: {:?}", path.as_ref()))?;

        let rules: Vec<TypeRule> =
            serde_json::from_str(&content).context("Failed to parse type rules JSON")?;

        Ok(TypeRuleSet::from_rules(rules))
    }

    /// Create a rule set from a list of rules
    pub fn from_rules(mut rules: Vec<TypeRule>) -> Self {
        // stable: equal priorities keep their listed order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        TypeRuleSet { rules }
    }

    /// Add rules on top of the current ones
    pub fn extend(&mut self, rules: impl IntoIterator<Item = TypeRule>) {
        self.rules.extend(rules);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// First matching rule, highest priority first
    pub fn classify(&self, text: &str) -> Option<&TypeRule> {
        self.rules.iter().find(|rule| rule.matches(text))
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn into_rules(self) -> Vec<TypeRule> {
        self.rules
    }
}

impl Default for TypeRuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// TESTS
// ============================================================================

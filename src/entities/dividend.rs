// 💵 Dividend Entity - one reported payment
//
// Typed core (security, date, value, type) plus an ordered bag of every
// other column the broker exported, carried through untouched so the
// corrected CSV round-trips.
//
// Identity: UUID (a split produces two NEW dividends, both pointing back
// at the original through `derived_from`)

use crate::entities::SecurityIdentifier;
use crate::error::{AnalysisError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column the governing exdate is recorded under
pub const EXDATE_FIELD: &str = "Exdate";

/// Column a non-text notes value is moved to before text notes accumulate
pub const ORIGINAL_NOTES_FIELD: &str = "Original_Notes";

const NOTE_SEPARATOR: &str = "; ";

// ============================================================================
// DIVIDEND TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DividendType {
    NonQualified,
    Qualified,
    Section199A,
    TaxExempt,
    TaxWithheld,
}

/// Holding-period test for a preferential dividend type.
///
/// A lot spanning the exdate fails when `holding_period_days < min_days`
/// (more than `min_days - 1` days out of a `window_days` window).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldingRule {
    pub min_days: i64,
    pub window_days: i64,
}

impl HoldingRule {
    pub fn is_disqualifying(&self, holding_period_days: i64) -> bool {
        holding_period_days < self.min_days
    }
}

const HOLDING_RULES: &[(DividendType, HoldingRule)] = &[
    (DividendType::Qualified, HoldingRule { min_days: 61, window_days: 121 }),
    (DividendType::Section199A, HoldingRule { min_days: 46, window_days: 91 }),
];

impl DividendType {
    pub const ALL: [DividendType; 5] = [
        DividendType::NonQualified,
        DividendType::Qualified,
        DividendType::Section199A,
        DividendType::TaxExempt,
        DividendType::TaxWithheld,
    ];

    /// Canonical name, also what the export writes
    pub fn as_str(&self) -> &'static str {
        match self {
            DividendType::NonQualified => "NonQualified",
            DividendType::Qualified => "Qualified",
            DividendType::Section199A => "Section199A",
            DividendType::TaxExempt => "TaxExempt",
            DividendType::TaxWithheld => "TaxWithheld",
        }
    }

    /// The holding-period test, or None when the type is never requalified
    pub fn holding_rule(&self) -> Option<HoldingRule> {
        HOLDING_RULES
            .iter()
            .find(|(t, _)| t == self)
            .map(|(_, rule)| *rule)
    }

    pub fn is_preferential(&self) -> bool {
        self.holding_rule().is_some()
    }
}

impl fmt::Display for DividendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FIELD BAG
// ============================================================================

/// A non-canonical column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Ordered column name -> value. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldBag {
    entries: Vec<(String, FieldValue)>,
}

impl FieldBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace in place (first-seen position is kept)
    pub fn insert(&mut self, name: &str, value: FieldValue) {
        match self.position(name) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.position(name).map(|idx| &self.entries[idx].1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// REQUALIFICATION MARKER
// ============================================================================

/// Which side of a split a dividend came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requalification {
    /// Original type kept, value reduced
    Remainder,
    /// New NonQualified record carrying the disqualified value
    Synthesized,
}

impl Requalification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Requalification::Remainder => "remainder",
            Requalification::Synthesized => "synthesized",
        }
    }

    pub fn parse(text: &str) -> Option<Requalification> {
        match text.trim().to_lowercase().as_str() {
            "remainder" => Some(Requalification::Remainder),
            "synthesized" => Some(Requalification::Synthesized),
            _ => None,
        }
    }
}

// ============================================================================
// DIVIDEND
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dividend {
    /// Stable identity for this record within the run
    pub id: String,

    /// Set on both halves of a split
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,

    pub security: SecurityIdentifier,
    pub date: NaiveDate,
    pub value: f64,
    pub dividend_type: DividendType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requalified: Option<Requalification>,

    /// Audit trail. Usually text; a non-text value came straight from the input.
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<FieldValue>,

    /// Every non-canonical column, in input order
    pub extra_fields: FieldBag,
}

impl Dividend {
    pub fn new(
        security: SecurityIdentifier,
        date: NaiveDate,
        value: f64,
        dividend_type: DividendType,
    ) -> Self {
        Dividend {
            id: uuid::Uuid::new_v4().to_string(),
            derived_from: None,
            security,
            date,
            value,
            dividend_type,
            requalified: None,
            notes: None,
            extra_fields: FieldBag::new(),
        }
    }

    /// Builder: notes column value as read from the input
    pub fn with_notes(mut self, notes: FieldValue) -> Self {
        self.notes = match notes {
            FieldValue::Text(ref s) if s.trim().is_empty() => None,
            other => Some(other),
        };
        self
    }

    /// Builder: carry a non-canonical column
    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.extra_fields.insert(name, value);
        self
    }

    pub fn with_requalified(mut self, marker: Option<Requalification>) -> Self {
        self.requalified = marker;
        self
    }

    pub fn is_preferential(&self) -> bool {
        self.dividend_type.is_preferential()
    }

    /// Text rendering of the notes trail
    pub fn notes(&self) -> Option<String> {
        self.notes.as_ref().map(|n| n.to_string())
    }

    /// Append to the audit trail.
    ///
    /// A non-text notes value from the input is moved to `Original_Notes`
    /// first so it is not lost.
    pub fn add_note(&mut self, text: &str) {
        self.notes = match self.notes.take() {
            None => Some(FieldValue::Text(text.to_string())),
            Some(FieldValue::Text(existing)) => Some(FieldValue::Text(format!(
                "{}{}{}",
                existing, NOTE_SEPARATOR, text
            ))),
            Some(original) => {
                tracing::warn!(
                    "Dividend {} had non-text notes '{}'; moved to {}",
                    self,
                    original,
                    ORIGINAL_NOTES_FIELD
                );
                self.extra_fields.insert(ORIGINAL_NOTES_FIELD, original);
                Some(FieldValue::Text(text.to_string()))
            }
        };
    }

    /// Keep the exdate used for this dividend's evaluation with the record
    pub fn record_exdate(&mut self, exdate: NaiveDate) {
        self.extra_fields.insert(EXDATE_FIELD, FieldValue::Date(exdate));
    }

    pub fn exdate(&self) -> Option<NaiveDate> {
        match self.extra_fields.get(EXDATE_FIELD) {
            Some(FieldValue::Date(d)) => Some(*d),
            _ => None,
        }
    }

    /// Carve `disqualified_amount` out of this dividend.
    ///
    /// Returns (qualified_remainder, disqualified_new). Both are new records
    /// with the same security and extra fields; `self` is left untouched.
    pub fn split(&self, disqualified_amount: f64) -> Result<(Dividend, Dividend)> {
        if !disqualified_amount.is_finite()
            || disqualified_amount < 0.0
            || disqualified_amount > self.value + 0.005
        {
            return Err(AnalysisError::InvalidSplit {
                amount: disqualified_amount,
                value: self.value,
            });
        }

        let mut remainder = self.derive(Requalification::Remainder);
        remainder.value = round_cents(self.value - disqualified_amount);

        let mut disqualified = self.derive(Requalification::Synthesized);
        disqualified.dividend_type = DividendType::NonQualified;
        disqualified.value = disqualified_amount;
        disqualified.notes = None;

        Ok((remainder, disqualified))
    }

    fn derive(&self, marker: Requalification) -> Dividend {
        Dividend {
            id: uuid::Uuid::new_v4().to_string(),
            derived_from: Some(self.id.clone()),
            security: self.security.clone(),
            date: self.date,
            value: self.value,
            dividend_type: self.dividend_type,
            requalified: Some(marker),
            notes: self.notes.clone(),
            extra_fields: self.extra_fields.clone(),
        }
    }
}

impl fmt::Display for Dividend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dividend: {} DATE {} AMOUNT {:.2} TYPE {}",
            self.security,
            self.date.format("%Y-%m-%d"),
            self.value,
            self.dividend_type
        )
    }
}

/// Round to the nearest cent
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f64, dividend_type: DividendType) -> Dividend {
        let security = SecurityIdentifier::new(Some("922908769".into()), Some("VTI".into())).unwrap();
        Dividend::new(security, NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(), value, dividend_type)
            .with_field("Account", FieldValue::Text("Taxable".into()))
            .with_field("Shares", FieldValue::Number(200.0))
    }

    #[test]
    fn test_is_preferential() {
        assert!(sample(1.0, DividendType::Qualified).is_preferential());
        assert!(sample(1.0, DividendType::Section199A).is_preferential());
        assert!(!sample(1.0, DividendType::NonQualified).is_preferential());
        assert!(!sample(1.0, DividendType::TaxExempt).is_preferential());
        assert!(!sample(-1.0, DividendType::TaxWithheld).is_preferential());
    }

    #[test]
    fn test_holding_rule_table() {
        let qualified = DividendType::Qualified.holding_rule().unwrap();
        assert_eq!(qualified.min_days, 61);
        assert_eq!(qualified.window_days, 121);
        assert!(qualified.is_disqualifying(60));
        assert!(!qualified.is_disqualifying(61));

        let reit = DividendType::Section199A.holding_rule().unwrap();
        assert!(reit.is_disqualifying(45));
        assert!(!reit.is_disqualifying(46));

        assert!(DividendType::NonQualified.holding_rule().is_none());
    }

    #[test]
    fn test_split_preserves_total() {
        let original = sample(100.0, DividendType::Qualified);
        let (remainder, disqualified) = original.split(37.45).unwrap();

        assert_eq!(remainder.value, 62.55);
        assert_eq!(disqualified.value, 37.45);
        assert!((remainder.value + disqualified.value - original.value).abs() < 0.005);
    }

    #[test]
    fn test_split_types_and_fields() {
        let original = sample(100.0, DividendType::Section199A);
        let (remainder, disqualified) = original.split(10.0).unwrap();

        assert_eq!(remainder.dividend_type, DividendType::Section199A);
        assert_eq!(disqualified.dividend_type, DividendType::NonQualified);
        assert_eq!(remainder.extra_fields, original.extra_fields);
        assert_eq!(disqualified.extra_fields, original.extra_fields);
        assert_eq!(disqualified.security.symbol.as_deref(), Some("VTI"));
        assert_eq!(disqualified.security.cusip.as_deref(), Some("922908769"));
    }

    #[test]
    fn test_split_leaves_original_untouched() {
        let original = sample(100.0, DividendType::Qualified);
        let (remainder, disqualified) = original.split(100.0).unwrap();

        assert_eq!(original.value, 100.0);
        assert_eq!(original.requalified, None);
        assert_eq!(remainder.value, 0.0);
        assert_eq!(remainder.derived_from.as_deref(), Some(original.id.as_str()));
        assert_eq!(disqualified.derived_from.as_deref(), Some(original.id.as_str()));
        assert_ne!(remainder.id, original.id);
        assert_eq!(remainder.requalified, Some(Requalification::Remainder));
        assert_eq!(disqualified.requalified, Some(Requalification::Synthesized));
    }

    #[test]
    fn test_split_rejects_excess() {
        let original = sample(100.0, DividendType::Qualified);
        assert!(matches!(original.split(100.50), Err(AnalysisError::InvalidSplit { .. })));
        assert!(original.split(-1.0).is_err());
    }

    #[test]
    fn test_add_note_concatenates() {
        let mut d = sample(1.0, DividendType::Qualified);
        d.add_note("first");
        d.add_note("second");
        assert_eq!(d.notes().as_deref(), Some("first; second"));
    }

    #[test]
    fn test_add_note_keeps_non_text_original() {
        let mut d = sample(1.0, DividendType::Qualified).with_notes(FieldValue::Number(42.0));
        d.add_note("disqualified");

        assert_eq!(d.notes().as_deref(), Some("disqualified"));
        assert_eq!(d.extra_fields.get(ORIGINAL_NOTES_FIELD), Some(&FieldValue::Number(42.0)));
    }

    #[test]
    fn test_blank_notes_are_absent() {
        let d = sample(1.0, DividendType::Qualified).with_notes(FieldValue::Text("  ".into()));
        assert_eq!(d.notes(), None);
    }

    #[test]
    fn test_record_exdate_replaces() {
        let mut d = sample(1.0, DividendType::Qualified)
            .with_field("exdate", FieldValue::Text("stale".into()));
        let exdate = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        d.record_exdate(exdate);

        assert_eq!(d.exdate(), Some(exdate));
        assert_eq!(d.extra_fields.keys().filter(|k| k.eq_ignore_ascii_case("exdate")).count(), 1);
    }

    #[test]
    fn test_field_bag_keeps_order() {
        let mut bag = FieldBag::new();
        bag.insert("b", FieldValue::Number(1.0));
        bag.insert("a", FieldValue::Number(2.0));
        bag.insert("B", FieldValue::Number(3.0));

        let keys: Vec<&str> = bag.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(bag.get("b"), Some(&FieldValue::Number(3.0)));
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(12.345_1), 12.35);
        assert_eq!(round_cents(0.004), 0.0);
    }
}

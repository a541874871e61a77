// Entity Models
//
// - SecurityIdentifier: who (CUSIP / symbol), hydrated before grouping
// - ClosedLot: a realized buy -> sell, immutable
// - Dividend: a reported payment, split when it fails a holding-period test

pub mod dividend;
pub mod lot;
pub mod security;

pub use dividend::{
    round_cents, Dividend, DividendType, FieldBag, FieldValue, HoldingRule, Requalification,
    EXDATE_FIELD, ORIGINAL_NOTES_FIELD,
};
pub use lot::ClosedLot;
pub use security::{SecurityIdentifier, SymbolCache};

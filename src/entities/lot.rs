// 📦 Closed Lot - one realized buy -> sell
//
// Immutable once built. The holding period is the only derived value.

use crate::entities::SecurityIdentifier;
use crate::error::{AnalysisError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedLot {
    security: SecurityIdentifier,
    quantity: f64,
    open_date: NaiveDate,
    close_date: NaiveDate,
}

impl ClosedLot {
    /// Validates quantity > 0 and close_date >= open_date
    pub fn new(
        security: SecurityIdentifier,
        quantity: f64,
        open_date: NaiveDate,
        close_date: NaiveDate,
    ) -> Result<Self> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(AnalysisError::malformed(
                "closed lot",
                0,
                "quantity",
                format!("quantity must be positive, got {}", quantity),
            ));
        }

        if close_date < open_date {
            return Err(AnalysisError::malformed(
                "closed lot",
                0,
                "close date",
                format!("closed {} before it was opened {}", close_date, open_date),
            ));
        }

        Ok(ClosedLot {
            security,
            quantity,
            open_date,
            close_date,
        })
    }

    pub fn security(&self) -> &SecurityIdentifier {
        &self.security
    }

    /// Ingestion hydrates the identifier before the lot is shared
    pub(crate) fn security_mut(&mut self) -> &mut SecurityIdentifier {
        &mut self.security
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn open_date(&self) -> NaiveDate {
        self.open_date
    }

    pub fn close_date(&self) -> NaiveDate {
        self.close_date
    }

    /// Days between open and close
    pub fn holding_period_days(&self) -> i64 {
        (self.close_date - self.open_date).num_days()
    }

    /// Was this lot held at market open on `exdate`?
    ///
    /// Bought on the exdate: no dividend. Sold on the exdate: still gets it.
    pub fn spans_exdate(&self, exdate: NaiveDate) -> bool {
        self.open_date < exdate && exdate <= self.close_date
    }
}

impl fmt::Display for ClosedLot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Closed Lot: {} {} shares Open {} Close {}",
            self.security,
            self.quantity,
            self.open_date.format("%Y-%m-%d"),
            self.close_date.format("%Y-%m-%d")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lot(open: NaiveDate, close: NaiveDate) -> ClosedLot {
        let security = SecurityIdentifier::from_symbol("XYZ").unwrap();
        ClosedLot::new(security, 10.0, open, close).unwrap()
    }

    #[test]
    fn test_holding_period_days() {
        let l = lot(date(2023, 2, 13), date(2023, 3, 15));
        assert_eq!(l.holding_period_days(), 30);

        let same_day = lot(date(2023, 3, 15), date(2023, 3, 15));
        assert_eq!(same_day.holding_period_days(), 0);
    }

    #[test]
    fn test_holding_period_crosses_leap_day() {
        let l = lot(date(2024, 2, 1), date(2024, 3, 1));
        assert_eq!(l.holding_period_days(), 29);
    }

    #[test]
    fn test_rejects_close_before_open() {
        let security = SecurityIdentifier::from_symbol("XYZ").unwrap();
        let result = ClosedLot::new(security, 10.0, date(2023, 3, 15), date(2023, 3, 14));
        assert!(matches!(result, Err(AnalysisError::MalformedInput { .. })));
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        let security = SecurityIdentifier::from_symbol("XYZ").unwrap();
        assert!(ClosedLot::new(security.clone(), 0.0, date(2023, 1, 1), date(2023, 2, 1)).is_err());
        assert!(ClosedLot::new(security.clone(), -5.0, date(2023, 1, 1), date(2023, 2, 1)).is_err());
        assert!(ClosedLot::new(security, f64::NAN, date(2023, 1, 1), date(2023, 2, 1)).is_err());
    }

    #[test]
    fn test_spans_exdate_boundaries() {
        let exdate = date(2023, 3, 15);

        // bought on the exdate: not entitled
        assert!(!lot(exdate, date(2023, 4, 1)).spans_exdate(exdate));
        // sold on the exdate: entitled
        assert!(lot(date(2023, 3, 1), exdate).spans_exdate(exdate));
        // held across
        assert!(lot(date(2023, 3, 1), date(2023, 4, 1)).spans_exdate(exdate));
        // sold before
        assert!(!lot(date(2023, 3, 1), date(2023, 3, 14)).spans_exdate(exdate));
    }

    #[test]
    fn test_display() {
        let l = lot(date(2023, 2, 13), date(2023, 3, 15));
        assert_eq!(l.to_string(), "Closed Lot: XYZ 10 shares Open 2023-02-13 Close 2023-03-15");
    }
}

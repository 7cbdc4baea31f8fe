//! Monetary types for capital, share, and rate representation.

use rust_decimal::Decimal;

/// Capital or token amount represented as a Decimal for precision.
pub type Amount = Decimal;

/// Exchange or interest rate represented as a Decimal.
pub type Rate = Decimal;

/// Fraction in `[0, 1]` (quorum thresholds, allocation limits, splits).
pub type Fraction = Decimal;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amounts_are_decimal() {
        let capital: Amount = dec!(1.5);
        let rate: Rate = dec!(2000);

        assert_eq!(capital * rate, dec!(3000.0));
    }
}

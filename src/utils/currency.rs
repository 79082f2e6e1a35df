/// Currency utility functions for commission amounts.
///
/// Upstream sends commissions as decimal numbers. Sums are rounded through
/// minor units (cents) so two-decimal totals stay stable.

/// Convert a decimal amount to minor units (multiply by 100)
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Convert minor units back to a decimal amount (divide by 100)
pub fn from_minor_units(minor: i64) -> f64 {
    minor as f64 / 100.0
}

pub fn round_to_cents(amount: f64) -> f64 {
    from_minor_units(to_minor_units(amount))
}

/// Parse an amount sent as text, e.g. `"12.50"`. Non-finite values are rejected.
pub fn parse_amount(amount_str: &str) -> Option<f64> {
    amount_str
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
}

/// Display format for money: two decimals followed by the currency suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyFormat {
    pub suffix: String,
}

impl CurrencyFormat {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self { suffix: suffix.into() }
    }

    pub fn format(&self, amount: f64) -> String {
        if self.suffix.is_empty() {
            format!("{:.2}", amount)
        } else {
            format!("{:.2} {}", amount, self.suffix)
        }
    }
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self::new("$")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(100.0), 10000);
        assert_eq!(to_minor_units(0.50), 50);
        assert_eq!(to_minor_units(123.45), 12345);
    }

    #[test]
    fn test_round_to_cents() {
        assert_eq!(round_to_cents(15.0), 15.0);
        assert_eq!(round_to_cents(0.1 + 0.2), 0.3);
        assert_eq!(round_to_cents(10.004), 10.0);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 12.50 "), Some(12.5));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn test_format() {
        assert_eq!(CurrencyFormat::default().format(10.0), "10.00 $");
        assert_eq!(CurrencyFormat::new("€").format(0.5), "0.50 €");
        assert_eq!(CurrencyFormat::new("").format(3.456), "3.46");
    }
}

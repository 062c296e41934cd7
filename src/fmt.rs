use crate::category::CalculationMethod;

/// Format a float as a dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    let sign = if val < 0.0 && cents != "0.00" { "-" } else { "" };
    format!("{sign}${grouped}.{dec_part}")
}

/// Percentage without trailing zeros: 12.5%, 10%, 1.25%
pub fn percent(val: f64) -> String {
    let s = format!("{val:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    format!("{s}%")
}

/// How a rate column reads under each method. Methods without a rate show a dash.
pub fn rate(method: CalculationMethod, val: f64) -> String {
    match method {
        CalculationMethod::Percentage => percent(val),
        CalculationMethod::FlatRate => money(val),
        CalculationMethod::SumOnly | CalculationMethod::Custom => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(1234.56), "$1,234.56");
        assert_eq!(money(-500.00), "-$500.00");
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1000000.99), "$1,000,000.99");
        assert_eq!(money(42.10), "$42.10");
        assert_eq!(money(999.999), "$1,000.00");
    }

    #[test]
    fn test_money_negative_zero() {
        assert_eq!(money(-0.001), "$0.00");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(12.5), "12.5%");
        assert_eq!(percent(10.0), "10%");
        assert_eq!(percent(1.25), "1.25%");
        assert_eq!(percent(0.0), "0%");
    }

    #[test]
    fn test_rate_by_method() {
        assert_eq!(rate(CalculationMethod::Percentage, 7.5), "7.5%");
        assert_eq!(rate(CalculationMethod::FlatRate, 300.0), "$300.00");
        assert_eq!(rate(CalculationMethod::SumOnly, 0.0), "-");
    }
}

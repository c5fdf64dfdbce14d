//! Recurrence period grammar.
//!
//! A period is an optional ordinal count followed by a unit word, with
//! optional whitespace between them: `3w`, `2 months`, `weekly`, `mo`.
//! Only validity matters to the server; periods are stored as the client
//! wrote them and interpreted client-side.

/// Recognized unit words, longest spelling first within each family.
const UNITS: &[&str] = &[
    "annual",
    "biannual",
    "bimonthly",
    "biweekly",
    "biyearly",
    "daily",
    "days",
    "day",
    "d",
    "fortnight",
    "hours",
    "hour",
    "hrs",
    "hr",
    "h",
    "minutes",
    "mins",
    "min",
    "monthly",
    "months",
    "month",
    "mnths",
    "mths",
    "mth",
    "mos",
    "mo",
    "m",
    "quarterly",
    "quarters",
    "quarter",
    "qrtrs",
    "qtrs",
    "qtr",
    "q",
    "seconds",
    "secs",
    "sec",
    "s",
    "semiannual",
    "sennight",
    "weekdays",
    "weekly",
    "weeks",
    "week",
    "wks",
    "wk",
    "w",
    "yearly",
    "years",
    "year",
    "yrs",
    "yr",
    "y",
];

/// Whether `input` parses as a period.
pub fn valid(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return false;
    }

    let unit = trimmed
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start();

    !unit.is_empty() && UNITS.contains(&unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_periods() {
        let tests = [
            "daily", "weekly", "monthly", "yearly", "quarterly", "3w", "2 weeks", "1d", "mo",
            "2mo", "10 days", "fortnight", "annual", "5m",
        ];

        for input in tests {
            assert!(valid(input), "expected '{input}' to be valid");
        }
    }

    #[test]
    fn test_invalid_periods() {
        let tests = ["", "3", "sometimes", "w3", "week s", "3x", "-2w"];

        for input in tests {
            assert!(!valid(input), "expected '{input}' to be invalid");
        }
    }
}

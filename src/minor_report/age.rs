//! Age and duration arithmetic for minor reports
//!
//! Ban and expiry math uses a fixed 365-day year. This is an intentional
//! approximation of "until the user turns 18"; do not add leap-year handling.

use crate::minor_report::{ReportError, ReportResult};
use chrono::{DateTime, Duration, Utc};

/// Fixed year length used for all age-out arithmetic.
const DAYS_PER_YEAR: i64 = 365;

/// Validate a raw suspected-age input (e.g. from a slash command option).
pub fn validate_suspected_age(age: i64) -> ReportResult<u8> {
    if (1..=17).contains(&age) {
        // Range checked above, the cast cannot truncate.
        Ok(age as u8)
    } else {
        Err(ReportError::InvalidAge(age))
    }
}

/// Number of years until a user with the given suspected age turns 18.
pub fn years_until_18(suspected_age: u8) -> ReportResult<u8> {
    if (1..=17).contains(&suspected_age) {
        Ok(18 - suspected_age)
    } else {
        Err(ReportError::InvalidAge(i64::from(suspected_age)))
    }
}

/// Unix timestamp (seconds) at which a ban for the given suspected age should end.
pub fn ban_end_epoch(suspected_age: u8, now: DateTime<Utc>) -> ReportResult<i64> {
    let years = years_until_18(suspected_age)?;
    Ok((now + Duration::days(DAYS_PER_YEAR * i64::from(years))).timestamp())
}

/// Instant at which the protective role should be removed for a report
/// created at `created_at` with the given suspected age.
pub fn expiry_instant(
    created_at: DateTime<Utc>,
    suspected_age: u8,
) -> ReportResult<DateTime<Utc>> {
    let years = years_until_18(suspected_age)?;
    Ok(created_at + Duration::days(DAYS_PER_YEAR * i64::from(years)))
}

/// Parse a reviewer-supplied ban duration like `5y`, `3w`, `2d`, `4h` or `30m`
/// into the Unix timestamp at which the ban ends.
pub fn parse_ban_duration(input: &str, now: DateTime<Utc>) -> ReportResult<i64> {
    let text = input.trim();
    let invalid = || ReportError::InvalidDuration(input.to_string());

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (amount, unit) = text.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let offset = match unit.trim().to_ascii_lowercase().as_str() {
        "y" => Duration::days(DAYS_PER_YEAR * amount),
        "w" => Duration::weeks(amount),
        "d" => Duration::days(amount),
        "h" => Duration::hours(amount),
        "m" => Duration::minutes(amount),
        _ => return Err(invalid()),
    };

    Ok((now + offset).timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_years_until_18_exact_values() {
        assert_eq!(years_until_18(15).unwrap(), 3);
        assert_eq!(years_until_18(1).unwrap(), 17);
        assert_eq!(years_until_18(17).unwrap(), 1);
    }

    #[test]
    fn test_years_until_18_bounds() {
        assert!(years_until_18(0).is_err());
        assert!(years_until_18(18).is_err());
        assert!(years_until_18(200).is_err());
    }

    #[test]
    fn test_validate_suspected_age_rejects_negative() {
        assert!(validate_suspected_age(-3).is_err());
        assert!(validate_suspected_age(0).is_err());
        assert!(validate_suspected_age(18).is_err());
        assert_eq!(validate_suspected_age(17).unwrap(), 17);
    }

    #[test]
    fn test_ban_end_epoch() {
        let now = anchor();
        let end = ban_end_epoch(15, now).unwrap();
        assert_eq!(end, (now + Duration::days(365 * 3)).timestamp());
    }

    #[test]
    fn test_expiry_monotonic_in_age() {
        // Lower suspected age means later expiry for a fixed created_at.
        let created = anchor();
        let mut previous = expiry_instant(created, 1).unwrap();
        for age in 2..=17 {
            let current = expiry_instant(created, age).unwrap();
            assert!(current < previous, "expiry must shrink as age grows");
            previous = current;
        }
    }

    #[test]
    fn test_parse_ban_duration() {
        let now = anchor();
        assert_eq!(
            parse_ban_duration("5y", now).unwrap(),
            (now + Duration::days(365 * 5)).timestamp()
        );
        assert_eq!(
            parse_ban_duration(" 2w ", now).unwrap(),
            (now + Duration::weeks(2)).timestamp()
        );
        assert_eq!(
            parse_ban_duration("30m", now).unwrap(),
            (now + Duration::minutes(30)).timestamp()
        );
    }

    #[test]
    fn test_parse_ban_duration_rejects_garbage() {
        let now = anchor();
        assert!(parse_ban_duration("", now).is_err());
        assert!(parse_ban_duration("y", now).is_err());
        assert!(parse_ban_duration("0d", now).is_err());
        assert!(parse_ban_duration("5 parsecs", now).is_err());
        assert!(parse_ban_duration("-3y", now).is_err());
    }
}

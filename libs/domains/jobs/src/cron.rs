//! 5-field POSIX cron evaluation, UTC.
//!
//! The `cron` crate parses a seconds-first, Quartz-flavoured form: a
//! literal `0` seconds field is prepended, and numeric day-of-week values
//! are shifted from POSIX numbering (0 or 7 = Sunday) to the crate's
//! 1 = Sunday. Second-resolution expressions and @macros are rejected.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::error::{JobError, JobResult};

/// A validated 5-field cron expression.
#[derive(Debug, Clone)]
pub struct CronExpr {
    expression: String,
    schedule: Schedule,
}

impl CronExpr {
    /// Parse and validate. Accepts the standard POSIX form
    /// (minute hour day-of-month month day-of-week) with ranges, lists,
    /// steps and wildcards.
    pub fn parse(expression: &str) -> JobResult<Self> {
        let trimmed = expression.trim();

        if trimmed.starts_with('@') {
            return Err(JobError::Cron(format!(
                "macros are not supported: {}",
                trimmed
            )));
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(JobError::Cron(format!(
                "expected 5 fields (minute hour day-of-month month day-of-week), got {}: {}",
                fields.len(),
                trimmed
            )));
        }

        let dow = translate_day_of_week(fields[4])
            .map_err(|e| JobError::Cron(format!("{}: {}", trimmed, e)))?;
        let with_seconds = format!(
            "0 {} {} {} {} {}",
            fields[0], fields[1], fields[2], fields[3], dow
        );
        let schedule = Schedule::from_str(&with_seconds)
            .map_err(|e| JobError::Cron(format!("{}: {}", trimmed, e)))?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The smallest tick strictly greater than `after`, in UTC.
    pub fn next_after(&self, after: DateTime<Utc>) -> JobResult<DateTime<Utc>> {
        self.schedule.after(&after).next().ok_or_else(|| {
            JobError::Cron(format!("no future tick for expression: {}", self.expression))
        })
    }
}

/// Shift numeric day-of-week tokens from POSIX (0-7, both 0 and 7 being
/// Sunday) to the parser's 1-7 with 1 = Sunday. Names and wildcards pass
/// through untouched.
fn translate_day_of_week(field: &str) -> Result<String, String> {
    let shift = |token: &str| -> Result<String, String> {
        if token.is_empty() {
            return Err("empty day-of-week token".to_string());
        }
        match token.parse::<u8>() {
            Ok(n) if n <= 7 => Ok(((n % 7) + 1).to_string()),
            Ok(n) => Err(format!("day-of-week value out of range: {}", n)),
            // Names (MON, fri, ...) and "*" are handled by the parser
            Err(_) => Ok(token.to_string()),
        }
    };

    let parts: Result<Vec<String>, String> = field
        .split(',')
        .map(|part| {
            let (body, step) = match part.split_once('/') {
                Some((body, step)) => (body, Some(step)),
                None => (part, None),
            };

            let shifted = match body.split_once('-') {
                Some((lo, hi)) => format!("{}-{}", shift(lo)?, shift(hi)?),
                None => shift(body)?,
            };

            Ok(match step {
                Some(step) => format!("{}/{}", shifted, step),
                None => shifted,
            })
        })
        .collect();

    Ok(parts?.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_every_five_minutes() {
        let expr = CronExpr::parse("*/5 * * * *").unwrap();

        let next = expr.next_after(at(2026, 3, 12, 10, 2, 30)).unwrap();
        assert_eq!(next, at(2026, 3, 12, 10, 5, 0));

        // Strictly greater: a tick exactly on the boundary advances
        let next = expr.next_after(at(2026, 3, 12, 10, 5, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 12, 10, 10, 0));
    }

    #[test]
    fn test_daily_at_midnight() {
        let expr = CronExpr::parse("0 0 * * *").unwrap();
        let next = expr.next_after(at(2026, 3, 12, 13, 30, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 13, 0, 0, 0));
    }

    #[test]
    fn test_ranges_lists_steps() {
        // Weekdays at 9 and 17
        let expr = CronExpr::parse("0 9,17 * * 1-5").unwrap();
        // 2026-03-13 is a Friday
        let next = expr.next_after(at(2026, 3, 13, 10, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 13, 17, 0, 0));
        // After Friday 17:00, the next weekday tick is Monday 09:00
        let next = expr.next_after(at(2026, 3, 13, 17, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 16, 9, 0, 0));
    }

    #[test]
    fn test_posix_sunday_numbering() {
        // POSIX: both 0 and 7 mean Sunday. 2026-03-15 is a Sunday.
        for expr in ["0 9 * * 0", "0 9 * * 7"] {
            let expr = CronExpr::parse(expr).unwrap();
            let next = expr.next_after(at(2026, 3, 13, 12, 0, 0)).unwrap();
            assert_eq!(next, at(2026, 3, 15, 9, 0, 0));
        }
    }

    #[test]
    fn test_day_of_week_names_pass_through() {
        let expr = CronExpr::parse("0 9 * * MON").unwrap();
        let next = expr.next_after(at(2026, 3, 13, 12, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 16, 9, 0, 0));
    }

    #[test]
    fn test_day_of_week_step_translation() {
        // POSIX 0/2 = {Sun, Tue, Thu, Sat}
        let expr = CronExpr::parse("0 0 * * 0/2").unwrap();
        assert_eq!(expr.expression(), "0 0 * * 0/2");
        let next = expr.next_after(at(2026, 3, 13, 12, 0, 0)).unwrap();
        // 2026-03-14 is a Saturday
        assert_eq!(next, at(2026, 3, 14, 0, 0, 0));
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        assert!(CronExpr::parse("* * * *").is_err());
        assert!(CronExpr::parse("0 */5 * * * *").is_err());
        assert!(CronExpr::parse("").is_err());
    }

    #[test]
    fn test_rejects_macros() {
        assert!(CronExpr::parse("@hourly").is_err());
        assert!(CronExpr::parse("@reboot").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(CronExpr::parse("61 * * * *").is_err());
        assert!(CronExpr::parse("a b c d e").is_err());
    }

    #[test]
    fn test_catch_up_skips_missed_ticks() {
        // An hour of missed */5 ticks still yields a single next tick
        // strictly after "now"
        let expr = CronExpr::parse("*/5 * * * *").unwrap();
        let now = at(2026, 3, 12, 11, 3, 0);
        let next = expr.next_after(now).unwrap();
        assert_eq!(next, at(2026, 3, 12, 11, 5, 0));
        assert!(next > now);
    }
}

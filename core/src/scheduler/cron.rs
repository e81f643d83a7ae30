//! Dependency-free 5-field cron expression matcher: `*`, lists (`,`),
//! ranges (`-`), and `*/N` steps in every field.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::error::{CommanderError, Result};

/// How far ahead `next_after` will scan before giving up. Cron expressions
/// that only match, say, Feb 29 on a leap year still resolve within this.
const MAX_LOOKAHEAD: Duration = Duration::days(4 * 366);

#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: BTreeSet<u32>,
    hour: BTreeSet<u32>,
    day_of_month: BTreeSet<u32>,
    month: BTreeSet<u32>,
    day_of_week: BTreeSet<u32>,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CommanderError::InvalidCron {
                expr: expr.to_string(),
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        Ok(Self {
            minute: parse_field(fields[0], 0, 59, expr)?,
            hour: parse_field(fields[1], 0, 23, expr)?,
            day_of_month: parse_field(fields[2], 1, 31, expr)?,
            month: parse_field(fields[3], 1, 12, expr)?,
            day_of_week: parse_field(fields[4], 0, 7, expr)?,
        })
    }

    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        let dow = at.weekday().num_days_from_sunday();
        self.minute.contains(&at.minute())
            && self.hour.contains(&at.hour())
            && self.day_of_month.contains(&at.day())
            && self.month.contains(&at.month())
            && (self.day_of_week.contains(&dow) || self.day_of_week.contains(&7) && dow == 0)
    }

    /// First matching minute strictly after `after`, truncated to minute
    /// resolution. Brute-force minute-by-minute scan; cron granularity
    /// never needs anything finer.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = truncate_to_minute(after) + Duration::minutes(1);
        let deadline = after + MAX_LOOKAHEAD;
        let mut candidate = start;
        while candidate <= deadline {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

fn truncate_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt - Duration::seconds(dt.second() as i64) - Duration::nanoseconds(dt.nanosecond() as i64)
}

fn parse_field(field: &str, min: u32, max: u32, expr: &str) -> Result<BTreeSet<u32>> {
    let mut values = BTreeSet::new();
    for part in field.split(',') {
        values.extend(parse_field_part(part, min, max, expr)?);
    }
    if values.is_empty() {
        return Err(CommanderError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("field '{field}' produced no values"),
        });
    }
    Ok(values)
}

fn parse_field_part(part: &str, min: u32, max: u32, expr: &str) -> Result<Vec<u32>> {
    let (range_part, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step.parse().map_err(|_| CommanderError::InvalidCron {
                expr: expr.to_string(),
                reason: format!("invalid step '{step}' in '{part}'"),
            })?;
            if step == 0 {
                return Err(CommanderError::InvalidCron {
                    expr: expr.to_string(),
                    reason: format!("step cannot be zero in '{part}'"),
                });
            }
            (range, step)
        }
        None => (part, 1),
    };

    let (lo, hi) = if range_part == "*" {
        (min, max)
    } else if let Some((lo, hi)) = range_part.split_once('-') {
        let lo: u32 = lo.parse().map_err(|_| CommanderError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("invalid range start '{lo}' in '{part}'"),
        })?;
        let hi: u32 = hi.parse().map_err(|_| CommanderError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("invalid range end '{hi}' in '{part}'"),
        })?;
        (lo, hi)
    } else {
        let value: u32 = range_part.parse().map_err(|_| CommanderError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("invalid value '{range_part}'"),
        })?;
        (value, value)
    };

    if lo < min || hi > max || lo > hi {
        return Err(CommanderError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("range {lo}-{hi} out of bounds {min}-{max} in '{part}'"),
        });
    }

    Ok((lo..=hi).step_by(step as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn every_minute_matches_anything() {
        let cron = CronSchedule::parse("* * * * *").unwrap();
        assert!(cron.matches(dt(2026, 8, 1, 3, 17)));
    }

    #[test]
    fn step_and_range_fields() {
        let cron = CronSchedule::parse("*/15 9-17 * * 1-5").unwrap();
        assert!(cron.matches(dt(2026, 8, 3, 9, 0))); // Monday
        assert!(!cron.matches(dt(2026, 8, 3, 9, 5)));
        assert!(!cron.matches(dt(2026, 8, 1, 9, 0))); // Saturday
    }

    #[test]
    fn list_field() {
        let cron = CronSchedule::parse("0 6,18 * * *").unwrap();
        assert!(cron.matches(dt(2026, 8, 1, 6, 0)));
        assert!(cron.matches(dt(2026, 8, 1, 18, 0)));
        assert!(!cron.matches(dt(2026, 8, 1, 12, 0)));
    }

    #[test]
    fn sunday_accepts_both_zero_and_seven() {
        let cron = CronSchedule::parse("0 0 * * 0").unwrap();
        // 2026-08-02 is a Sunday.
        assert!(cron.matches(dt(2026, 8, 2, 0, 0)));
    }

    #[test]
    fn next_after_scans_forward() {
        let cron = CronSchedule::parse("30 9 * * *").unwrap();
        let next = cron.next_after(dt(2026, 8, 1, 10, 0)).unwrap();
        assert_eq!(next, dt(2026, 8, 2, 9, 30));
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(CronSchedule::parse("* * *").is_err());
        assert!(CronSchedule::parse("60 * * * *").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
    }
}

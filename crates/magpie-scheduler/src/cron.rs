//! Five-field cron expression parsing and matching.
//!
//! `minute hour day-of-month month day-of-week`, with `*`, lists,
//! ranges, and `*/n` steps. Day-of-week runs 0–6 from Sunday; 7 is
//! accepted as Sunday too. Day matching follows the classic rule: when
//! both day fields are restricted, either may match.

use chrono::{DateTime, Datelike, Timelike, Utc};
use thiserror::Error;

/// Errors raised while parsing a cron expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid field '{field}': {reason}")]
    BadField { field: String, reason: String },

    #[error("value {value} out of range {min}..={max}")]
    OutOfRange { value: u32, min: u32, max: u32 },
}

/// One parsed field: a bitmask of allowed values plus whether the field
/// was written as `*` (needed for the day-matching rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    mask: u64,
    is_star: bool,
}

impl Field {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.mask & (1 << value) != 0
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl CronExpr {
    /// Parse a five-field expression.
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        Ok(Self {
            minute: parse_field(fields[0], 0, 59)?,
            hour: parse_field(fields[1], 0, 23)?,
            day_of_month: parse_field(fields[2], 1, 31)?,
            month: parse_field(fields[3], 1, 12)?,
            day_of_week: parse_dow(fields[4])?,
        })
    }

    /// Whether the expression fires at the given minute.
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        if !self.minute.contains(t.minute())
            || !self.hour.contains(t.hour())
            || !self.month.contains(t.month())
        {
            return false;
        }

        let dom_ok = self.day_of_month.contains(t.day());
        let dow_ok = self
            .day_of_week
            .contains(t.weekday().num_days_from_sunday());

        match (self.day_of_month.is_star, self.day_of_week.is_star) {
            // Both restricted: either day field may match.
            (false, false) => dom_ok || dow_ok,
            (false, true) => dom_ok,
            (true, false) => dow_ok,
            (true, true) => true,
        }
    }
}

impl std::str::FromStr for CronExpr {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Day-of-week with 7 folded into Sunday.
fn parse_dow(field: &str) -> Result<Field, CronError> {
    let mut parsed = parse_field(field, 0, 7)?;
    if parsed.contains(7) {
        parsed.mask |= 1; // 7 == Sunday == 0
        parsed.mask &= !(1 << 7);
    }
    Ok(parsed)
}

/// Parse one field: `*`, `*/n`, `a`, `a-b`, `a-b/n`, and comma lists.
fn parse_field(field: &str, min: u32, max: u32) -> Result<Field, CronError> {
    if field == "*" {
        return Ok(Field {
            mask: range_mask(min, max, 1),
            is_star: true,
        });
    }

    let bad = |reason: &str| CronError::BadField {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let mut mask = 0u64;
    for part in field.split(',') {
        if part.is_empty() {
            return Err(bad("empty list element"));
        }

        let (range_part, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| bad("step is not a number"))?;
                if step == 0 {
                    return Err(bad("step must be at least 1"));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range_part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| bad("range start is not a number"))?;
            let hi: u32 = hi.parse().map_err(|_| bad("range end is not a number"))?;
            if lo > hi {
                return Err(bad("range start exceeds range end"));
            }
            (lo, hi)
        } else {
            let value: u32 = range_part
                .parse()
                .map_err(|_| bad("value is not a number"))?;
            (value, value)
        };

        for bound in [lo, hi] {
            if bound < min || bound > max {
                return Err(CronError::OutOfRange {
                    value: bound,
                    min,
                    max,
                });
            }
        }

        mask |= range_mask(lo, hi, step);
    }

    Ok(Field {
        mask,
        is_star: false,
    })
}

fn range_mask(lo: u32, hi: u32, step: u32) -> u64 {
    let mut mask = 0u64;
    let mut value = lo;
    while value <= hi {
        mask |= 1 << value;
        value += step;
    }
    mask
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

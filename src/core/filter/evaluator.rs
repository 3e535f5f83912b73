use chrono::{DateTime, Utc};
use rayon::prelude::*;

use super::{Comparator, ConditionGroup, Constraint, Field, FilterExpression};
use crate::core::image::ImageRecord;
use crate::core::units::{self, DAY, Unit};

/// Relative tolerance of `=` on sizes.
const SIZE_TOLERANCE: f64 = 0.01;
/// Relative tolerance of `=` on megapixel counts.
const MEGAPIXEL_TOLERANCE: f64 = 0.05;

/// Whether `record` satisfies `expr` at the reference instant `now`.
pub fn matches(expr: &FilterExpression, record: &ImageRecord, now: DateTime<Utc>) -> bool {
    expr.matches(record, now)
}

/// Evaluate `expr` over all records in parallel, keeping input order.
///
/// `now` is sampled once by the caller so every record is judged against the
/// same instant.
pub fn filter_records<'a>(
    expr: &FilterExpression,
    records: &'a [ImageRecord],
    now: DateTime<Utc>,
) -> Vec<&'a ImageRecord> {
    warn_future_dates(expr, now);

    let matched: Vec<&ImageRecord> = records
        .par_iter()
        .filter(|record| expr.matches(record, now))
        .collect();

    log::debug!("Filter kept {} of {} records", matched.len(), records.len());
    matched
}

fn warn_future_dates(expr: &FilterExpression, now: DateTime<Utc>) {
    let now = now.timestamp() as f64;
    let future = expr
        .groups
        .iter()
        .flat_map(|group| group.constraints.iter())
        .any(|c| c.unit == Unit::Date && c.value > now);
    if future {
        log::warn!("Filter contains a date in the future; its age is treated as zero");
    }
}

impl FilterExpression {
    pub fn matches(&self, record: &ImageRecord, now: DateTime<Utc>) -> bool {
        self.groups.is_empty() || self.groups.iter().any(|group| group.matches(record, now))
    }
}

impl ConditionGroup {
    pub fn matches(&self, record: &ImageRecord, now: DateTime<Utc>) -> bool {
        if let Some(pattern) = &self.substring {
            let name = record.display_name().to_lowercase();
            if !name.contains(&pattern.to_lowercase()) {
                return false;
            }
        }
        self.constraints.iter().all(|c| c.matches(record, now))
    }
}

impl Constraint {
    /// Missing record fields (unprobed dimensions) never match.
    pub fn matches(&self, record: &ImageRecord, now: DateTime<Utc>) -> bool {
        match self.field {
            Field::Age if self.unit == Unit::Date => self.matches_date(record, now),
            Field::Age => self.compare(record.age_seconds(now), self.value),
            Field::Size => self.compare(record.size as f64, self.value),
            Field::Width => record
                .width
                .is_some_and(|w| self.compare(f64::from(w), self.value)),
            Field::Height => record
                .height
                .is_some_and(|h| self.compare(f64::from(h), self.value)),
            Field::Megapixels => record
                .pixel_count()
                .is_some_and(|pixels| self.compare(pixels as f64, self.value)),
        }
    }

    fn compare(&self, actual: f64, expected: f64) -> bool {
        match self.comparator {
            Comparator::Less => actual < expected,
            Comparator::Greater => actual > expected,
            Comparator::Equal => (actual - expected).abs() <= self.tolerance(expected),
        }
    }

    /// Half-width of the window an `=` accepts, chosen by the literal's unit.
    fn tolerance(&self, expected: f64) -> f64 {
        match self.unit {
            Unit::Kilobytes | Unit::Megabytes | Unit::Gigabytes => expected * SIZE_TOLERANCE,
            Unit::Megapixels => expected * MEGAPIXEL_TOLERANCE,
            Unit::Pixels => 0.0,
            unit => unit.scale() / 2.0,
        }
    }

    /// Absolute dates compare ages against the age of the date's local
    /// midnight. `=` selects files modified on that local calendar day.
    fn matches_date(&self, record: &ImageRecord, now: DateTime<Utc>) -> bool {
        let day_start = self.value;
        match self.comparator {
            Comparator::Equal => {
                let day_end = units::next_local_midnight(day_start as i64)
                    .map_or(day_start + DAY, |end| end as f64);
                let modified = record.modified.timestamp() as f64;
                modified >= day_start && modified < day_end
            }
            _ => {
                let threshold = (now.timestamp() as f64 - day_start).max(0.0);
                self.compare(record.age_seconds(now), threshold)
            }
        }
    }
}

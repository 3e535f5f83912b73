use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;

pub const MINUTE: f64 = 60.0;
pub const HOUR: f64 = 60.0 * MINUTE;
pub const DAY: f64 = 24.0 * HOUR;
pub const WEEK: f64 = 7.0 * DAY;
pub const MONTH: f64 = 30.0 * DAY;
pub const YEAR: f64 = 365.0 * DAY;

pub const KIB: f64 = 1024.0;
pub const MIB: f64 = 1024.0 * KIB;
pub const GIB: f64 = 1024.0 * MIB;

pub const MEGAPIXEL: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("missing numeric value in '{token}'")]
    MissingNumber { token: String },

    #[error("invalid number '{number}'")]
    InvalidNumber { number: String },

    #[error("missing unit suffix after '{token}'")]
    MissingSuffix { token: String },

    #[error("unknown unit suffix '{suffix}'")]
    UnknownSuffix { suffix: String },

    #[error("invalid date '{token}', expected YYYY-MM-DD")]
    InvalidDate { token: String },

    #[error("invalid dimensions '{token}', expected WIDTHxHEIGHT")]
    InvalidDimensions { token: String },
}

/// Where a normalized value came from. Evaluation uses it to pick the
/// tolerance of an `=` comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Unit {
    Kilobytes,
    Megabytes,
    Gigabytes,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
    Date,
    Megapixels,
    Pixels,
}

impl Unit {
    /// Size of one unit in its canonical measure (bytes, seconds or pixels).
    pub fn scale(self) -> f64 {
        match self {
            Unit::Kilobytes => KIB,
            Unit::Megabytes => MIB,
            Unit::Gigabytes => GIB,
            Unit::Minutes => MINUTE,
            Unit::Hours => HOUR,
            Unit::Days | Unit::Date => DAY,
            Unit::Weeks => WEEK,
            Unit::Months => MONTH,
            Unit::Years => YEAR,
            Unit::Megapixels => MEGAPIXEL,
            Unit::Pixels => 1.0,
        }
    }
}

/// A constraint literal converted to canonical units.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Size { bytes: f64, unit: Unit },
    Age { seconds: f64, unit: Unit },
    Date(NaiveDate),
    PixelCount(f64),
    Dimensions {
        width: Option<u32>,
        height: Option<u32>,
    },
}

/// Convert a literal token (operator already stripped) into canonical units.
///
/// Suffixes are case-insensitive except `m` (minute) versus `M` (month).
pub fn normalize(token: &str) -> Result<Literal, UnitError> {
    if token.starts_with(|c: char| c.is_ascii_digit()) && token.contains('-') {
        return parse_date(token);
    }
    if token.contains('x') {
        return parse_dimensions(token);
    }

    let split = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(token.len());
    let (number, suffix) = token.split_at(split);

    if number.is_empty() {
        return Err(UnitError::MissingNumber {
            token: token.to_string(),
        });
    }
    let value: f64 = number.parse().map_err(|_| UnitError::InvalidNumber {
        number: number.to_string(),
    })?;

    let size = |unit: Unit| Literal::Size {
        bytes: value * unit.scale(),
        unit,
    };
    let age = |unit: Unit| Literal::Age {
        seconds: value * unit.scale(),
        unit,
    };

    // `m`/`M` must be decided before lowering the suffix
    match suffix {
        "m" => return Ok(age(Unit::Minutes)),
        "M" => return Ok(age(Unit::Months)),
        "" => {
            return Err(UnitError::MissingSuffix {
                token: token.to_string(),
            });
        }
        _ => {}
    }

    match suffix.to_ascii_lowercase().as_str() {
        "kb" => Ok(size(Unit::Kilobytes)),
        "mb" => Ok(size(Unit::Megabytes)),
        "gb" => Ok(size(Unit::Gigabytes)),
        "mp" => Ok(Literal::PixelCount(value * MEGAPIXEL)),
        "h" => Ok(age(Unit::Hours)),
        "d" => Ok(age(Unit::Days)),
        "w" => Ok(age(Unit::Weeks)),
        "y" => Ok(age(Unit::Years)),
        _ => Err(UnitError::UnknownSuffix {
            suffix: suffix.to_string(),
        }),
    }
}

fn parse_date(token: &str) -> Result<Literal, UnitError> {
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .map(Literal::Date)
        .map_err(|_| UnitError::InvalidDate {
            token: token.to_string(),
        })
}

/// Epoch seconds of the first instant of `date` in the local time zone.
///
/// Where a DST jump skips midnight the day starts at the first hour that
/// exists.
pub fn local_midnight(date: NaiveDate) -> Option<i64> {
    (0..3).find_map(|hour| {
        date.and_hms_opt(hour, 0, 0)?
            .and_local_timezone(Local)
            .earliest()
            .map(|dt| dt.timestamp())
    })
}

/// Start of the local day following the one that begins at `day_start`.
pub fn next_local_midnight(day_start: i64) -> Option<i64> {
    let date = DateTime::from_timestamp(day_start, 0)?
        .with_timezone(&Local)
        .date_naive();
    local_midnight(date.succ_opt()?)
}

fn parse_dimensions(token: &str) -> Result<Literal, UnitError> {
    let invalid = || UnitError::InvalidDimensions {
        token: token.to_string(),
    };
    let (width, height) = token.split_once('x').ok_or_else(invalid)?;

    let axis = |text: &str| -> Result<Option<u32>, UnitError> {
        if text.is_empty() {
            Ok(None)
        } else {
            text.parse().map(Some).map_err(|_| invalid())
        }
    };

    let width = axis(width)?;
    let height = axis(height)?;
    if width.is_none() && height.is_none() {
        return Err(invalid());
    }
    Ok(Literal::Dimensions { width, height })
}

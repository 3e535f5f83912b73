//! Query language for narrowing a directory listing.
//!
//! A query is a `/`-separated list of condition groups. A record matches when
//! any group matches; inside a group the optional name substring and every
//! constraint must hold:
//!
//! ```text
//! holiday >2w <1y / <10kb / =800x600
//! ```

pub mod evaluator;
pub mod parser;

use serde::Serialize;
use std::str::FromStr;

use crate::core::units::Unit;

pub use evaluator::{filter_records, matches};
pub use parser::{FilterError, parse};

/// Record property a constraint reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Field {
    Age,
    Size,
    Width,
    Height,
    Megapixels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Comparator {
    Less,
    Greater,
    Equal,
}

impl Comparator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '<' => Some(Comparator::Less),
            '>' => Some(Comparator::Greater),
            '=' => Some(Comparator::Equal),
            _ => None,
        }
    }
}

/// A single typed comparison. `value` is in canonical units: bytes, seconds,
/// pixels, or epoch seconds of midnight UTC for `Unit::Date`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constraint {
    pub field: Field,
    pub comparator: Comparator,
    pub value: f64,
    pub unit: Unit,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConditionGroup {
    pub substring: Option<String>,
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterExpression {
    pub groups: Vec<ConditionGroup>,
}

impl FilterExpression {
    /// True when the expression has no groups and therefore accepts everything.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl FromStr for FilterExpression {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

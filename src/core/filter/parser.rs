use thiserror::Error;

use super::{Comparator, ConditionGroup, Constraint, Field, FilterExpression};
use crate::core::units::{self, Literal, Unit, UnitError};

/// Rejected query text. `position` is the character offset of the offending
/// token, suitable for placing a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("invalid value '{token}' at position {position}: {source}")]
    Unit {
        position: usize,
        token: String,
        source: UnitError,
    },
}

impl FilterError {
    pub fn position(&self) -> usize {
        match self {
            FilterError::Syntax { position, .. } | FilterError::Unit { position, .. } => *position,
        }
    }
}

fn is_operator(c: char) -> bool {
    Comparator::from_char(c).is_some()
}

/// Parse query text into an expression.
///
/// Whitespace-only text yields the empty expression, which matches every
/// record. Any `/`-separated segment without a substring or constraint is an
/// error.
pub fn parse(text: &str) -> Result<FilterExpression, FilterError> {
    if text.trim().is_empty() {
        return Ok(FilterExpression::default());
    }

    let mut groups = Vec::new();
    let mut offset = 0;
    for segment in text.split('/') {
        groups.push(parse_segment(text, segment, offset)?);
        offset += segment.len() + 1;
    }
    Ok(FilterExpression { groups })
}

fn parse_segment(text: &str, segment: &str, base: usize) -> Result<ConditionGroup, FilterError> {
    let (head, tail, tail_base) = match segment.find(is_operator) {
        Some(at) => (&segment[..at], &segment[at..], base + at),
        None => (segment, "", base + segment.len()),
    };

    let substring = head.trim();
    let substring = (!substring.is_empty()).then(|| substring.to_string());
    let constraints = parse_constraints(text, tail, tail_base)?;

    if substring.is_none() && constraints.is_empty() {
        return Err(syntax(text, base, "empty condition group"));
    }
    Ok(ConditionGroup {
        substring,
        constraints,
    })
}

fn parse_constraints(text: &str, tail: &str, base: usize) -> Result<Vec<Constraint>, FilterError> {
    let mut constraints = Vec::new();
    // operator written as its own token, waiting for a value
    let mut pending: Option<(Comparator, usize)> = None;

    for (at, token) in tokens(tail) {
        let start = base + at;
        let mut chars = token.chars();
        let operator = chars.next().and_then(Comparator::from_char);

        match operator {
            Some(comparator) => {
                let rest = chars.as_str();
                if pending.is_some() || rest.starts_with(is_operator) {
                    return Err(syntax(text, start, "invalid operator sequence"));
                }
                if rest.is_empty() {
                    pending = Some((comparator, start));
                    continue;
                }
                push_literal(&mut constraints, text, comparator, rest, start + 1)?;
            }
            None => {
                let comparator = pending
                    .take()
                    .map(|(comparator, _)| comparator)
                    .unwrap_or(Comparator::Equal);
                push_literal(&mut constraints, text, comparator, token, start)?;
            }
        }
    }

    if let Some((_, start)) = pending {
        return Err(syntax(text, start, "missing value after operator"));
    }
    Ok(constraints)
}

fn push_literal(
    constraints: &mut Vec<Constraint>,
    text: &str,
    comparator: Comparator,
    token: &str,
    start: usize,
) -> Result<(), FilterError> {
    let unit_error = |source: UnitError| FilterError::Unit {
        position: char_position(text, start),
        token: token.to_string(),
        source,
    };
    let literal = units::normalize(token).map_err(unit_error)?;

    let constraint = |field: Field, value: f64, unit: Unit| Constraint {
        field,
        comparator,
        value,
        unit,
    };

    match literal {
        Literal::Size { bytes, unit } => constraints.push(constraint(Field::Size, bytes, unit)),
        Literal::Age { seconds, unit } => constraints.push(constraint(Field::Age, seconds, unit)),
        Literal::Date(date) => {
            let midnight = units::local_midnight(date).ok_or_else(|| {
                unit_error(UnitError::InvalidDate {
                    token: token.to_string(),
                })
            })?;
            constraints.push(constraint(Field::Age, midnight as f64, Unit::Date));
        }
        Literal::PixelCount(pixels) => {
            constraints.push(constraint(Field::Megapixels, pixels, Unit::Megapixels))
        }
        Literal::Dimensions { width, height } => {
            if let Some(width) = width {
                constraints.push(constraint(Field::Width, f64::from(width), Unit::Pixels));
            }
            if let Some(height) = height {
                constraints.push(constraint(Field::Height, f64::from(height), Unit::Pixels));
            }
        }
    }
    Ok(())
}

/// Whitespace-separated tokens with their byte offsets.
fn tokens(s: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            if let Some(begin) = start.take() {
                out.push((begin, &s[begin..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(begin) = start {
        out.push((begin, &s[begin..]));
    }
    out
}

fn char_position(text: &str, byte: usize) -> usize {
    text[..byte.min(text.len())].chars().count()
}

fn syntax(text: &str, byte: usize, message: &str) -> FilterError {
    FilterError::Syntax {
        position: char_position(text, byte),
        message: message.to_string(),
    }
}

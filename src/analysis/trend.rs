use serde::{Serialize, Serializer};
use std::fmt;

const STABLE_BELOW: f64 = 0.1;
const STRONG_ABOVE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increasing,
    Decreasing,
}

/// Qualitative change of a metric across a window.
///
/// The cut-offs are fixed heuristics on `(last - first) / count`, not a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendLabel {
    InsufficientData,
    Stable,
    Moderate(Direction),
    Strong(Direction),
}

impl TrendLabel {
    pub fn classify(values: &[f64]) -> Self {
        match slope(values) {
            None => TrendLabel::InsufficientData,
            Some(trend) if trend.abs() < STABLE_BELOW => TrendLabel::Stable,
            Some(trend) => {
                let direction = if trend > 0.0 {
                    Direction::Increasing
                } else {
                    Direction::Decreasing
                };
                if trend.abs() > STRONG_ABOVE {
                    TrendLabel::Strong(direction)
                } else {
                    TrendLabel::Moderate(direction)
                }
            }
        }
    }
}

/// `(last - first) / count`, or `None` for fewer than two values.
pub fn slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let first = values.first()?;
    let last = values.last()?;
    Some((last - first) / values.len() as f64)
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Increasing => f.write_str("Increasing"),
            Direction::Decreasing => f.write_str("Decreasing"),
        }
    }
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendLabel::InsufficientData => f.write_str("Insufficient data"),
            TrendLabel::Stable => f.write_str("Stable"),
            TrendLabel::Moderate(direction) => write!(f, "Moderate {direction}"),
            TrendLabel::Strong(direction) => write!(f, "Strong {direction}"),
        }
    }
}

impl Serialize for TrendLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

//! Topic pattern matching
//!
//! Patterns are compared segment by segment against `/`-separated topics.
//! The `+` token stands for exactly one non-empty segment; there is no
//! multi-level wildcard.

use std::fmt;

/// Separator between topic segments
pub const SEPARATOR: char = '/';

/// Single-level wildcard token
pub const WILDCARD: &str = "+";

/// A segment in a topic pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Must equal the topic segment exactly
    Literal(String),
    /// Matches any single non-empty segment
    Wildcard,
}

/// A subscription pattern that may contain single-level wildcards.
///
/// - Exact: `coffeeMachine/7/temperature`
/// - Wildcard: `coffeeMachine/+/temperature`, `coffeeMachine/7/+`
/// - Plain topics without separators (`connection`) are one-segment patterns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parse a pattern string. Never fails: any string is a valid pattern.
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split(SEPARATOR)
            .map(|s| {
                if s == WILDCARD {
                    Segment::Wildcard
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();

        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    /// True if at least one segment is the wildcard token.
    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| *s == Segment::Wildcard)
    }

    /// Check whether a concrete topic matches this pattern.
    ///
    /// Segment counts must be equal; a wildcard never spans a separator.
    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split(SEPARATOR);

        for segment in &self.segments {
            let Some(part) = parts.next() else {
                return false;
            };
            match segment {
                Segment::Literal(lit) => {
                    if part != lit {
                        return false;
                    }
                }
                Segment::Wildcard => {
                    if part.is_empty() {
                        return false;
                    }
                }
            }
        }

        parts.next().is_none()
    }

    /// Get the raw pattern string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<&str> for TopicPattern {
    fn from(s: &str) -> Self {
        TopicPattern::new(s)
    }
}

//! Version identifiers and closed range tables.
//!
//! Catalog version keys are arbitrary strings ("6.5.1", "4313"), but rule
//! gating must compare them numerically: `"10.0"` sorts after `"3.0"`, which a
//! plain string comparison gets wrong. [`Version`] parses the numeric dot
//! components once and compares component-wise; [`VersionSpan`] is a closed
//! inclusive range checked by that ordering.
//!
//! Span tables in strategies are written newest-rule-first, so a version
//! sitting exactly on a shared boundary resolves to the newer rule.

use std::cmp::Ordering;
use std::fmt;

/// A version identifier compared by numeric dot components.
///
/// Parsing is lenient and never fails: each dot segment contributes its
/// leading ASCII digits (so `"6.14-beta"` reads as `6.14`), and segments with
/// no digits compare as zero. Missing trailing components also compare as
/// zero, making `"7"` and `"7.0"` equal.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    raw: String,
    components: Vec<u64>,
}

impl Version {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let components = raw
            .split('.')
            .map(|segment| {
                let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect();
        Self {
            raw: raw.to_string(),
            components,
        }
    }

    /// The original identifier as written in the instance record.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn component(&self, idx: usize) -> u64 {
        self.components.get(idx).copied().unwrap_or(0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for idx in 0..len {
            match self.component(idx).cmp(&other.component(idx)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

/// Closed inclusive version range.
#[derive(Debug, Clone)]
pub struct VersionSpan {
    min: Version,
    max: Version,
}

impl VersionSpan {
    #[must_use]
    pub fn new(min: &str, max: &str) -> Self {
        Self {
            min: Version::parse(min),
            max: Version::parse(max),
        }
    }

    /// A span covering exactly one version.
    #[must_use]
    pub fn single(version: &str) -> Self {
        Self::new(version, version)
    }

    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        *version >= self.min && *version <= self.max
    }
}

/// True when any span in the table contains `version`.
#[must_use]
pub fn in_any_span(spans: &[VersionSpan], version: &Version) -> bool {
    spans.iter().any(|span| span.contains(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numeric_ordering_beats_lexicographic() {
        // "10.0" < "3.0" as strings; numerically it is the other way around.
        assert!(Version::parse("10.0") > Version::parse("3.0"));
        assert!(Version::parse("8.6") < Version::parse("10.2"));
    }

    #[test]
    fn test_missing_components_compare_as_zero() {
        assert_eq!(Version::parse("7"), Version::parse("7.0"));
        assert!(Version::parse("7.0.1") > Version::parse("7"));
    }

    #[test]
    fn test_lenient_segments() {
        assert_eq!(Version::parse("6.14-beta"), Version::parse("6.14"));
        assert_eq!(Version::parse("abc"), Version::parse("0"));
        assert_eq!(Version::parse("4313").raw(), "4313");
    }

    #[test]
    fn test_span_inclusion_is_closed() {
        let span = VersionSpan::new("6.1", "6.6");
        assert!(span.contains(&Version::parse("6.1")));
        assert!(span.contains(&Version::parse("6.5.1")));
        assert!(span.contains(&Version::parse("6.6")));
        assert!(!span.contains(&Version::parse("6.7")));
        assert!(!span.contains(&Version::parse("6.0.9")));
    }

    #[test]
    fn test_span_table_membership() {
        let spans = [
            VersionSpan::new("6.1", "6.6"),
            VersionSpan::new("5.1", "5.3"),
            VersionSpan::new("4.3", "4.6"),
        ];
        assert!(in_any_span(&spans, &Version::parse("4.4")));
        assert!(in_any_span(&spans, &Version::parse("6.5.1")));
        assert!(!in_any_span(&spans, &Version::parse("7.1")));
        assert!(!in_any_span(&spans, &Version::parse("4.7")));
    }

    #[test]
    fn test_single_span() {
        let span = VersionSpan::single("9.5");
        assert!(span.contains(&Version::parse("9.5")));
        assert!(!span.contains(&Version::parse("9.5.1")));
    }
}

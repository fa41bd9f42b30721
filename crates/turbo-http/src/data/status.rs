use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status code range {0:?}")]
pub struct StatusRangeError(pub String);

/// Set of HTTP status codes a session treats as success.
///
/// Stored as sorted, non-overlapping inclusive ranges. Deserializes from a
/// list of `"N"` or `"A-B"` strings, e.g. `["200-299", "304"]`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AcceptedStatusCodes {
    ranges: Vec<RangeInclusive<u16>>,
}

impl AcceptedStatusCodes {
    /// An empty set; nothing is accepted.
    pub fn empty() -> Self { Self { ranges: Vec::new() } }

    /// The 2xx range.
    pub fn success() -> Self { Self { ranges: vec![200..=299] } }

    pub fn contains(&self, code: u16) -> bool {
        self.ranges.iter().any(|range| range.contains(&code))
    }

    pub fn insert(&mut self, code: u16) { self.insert_range(code..=code); }

    pub fn insert_range(&mut self, range: RangeInclusive<u16>) {
        if range.is_empty() {
            return;
        }
        self.ranges.push(range);
        self.normalize();
    }

    #[must_use]
    pub fn with(mut self, code: u16) -> Self {
        self.insert(code);
        self
    }

    #[must_use]
    pub fn with_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.insert_range(range);
        self
    }

    pub fn ranges(&self) -> &[RangeInclusive<u16>] { &self.ranges }

    pub fn is_empty(&self) -> bool { self.ranges.is_empty() }

    fn normalize(&mut self) {
        self.ranges.sort_by_key(|range| *range.start());
        let mut merged: Vec<RangeInclusive<u16>> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if *range.start() <= last.end().saturating_add(1) => {
                    let end = (*last.end()).max(*range.end());
                    *last = *last.start()..=end;
                }
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }
}

impl Default for AcceptedStatusCodes {
    fn default() -> Self { Self::success() }
}

impl fmt::Debug for AcceptedStatusCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(Vec::<String>::from(self.clone())).finish()
    }
}

impl FromIterator<u16> for AcceptedStatusCodes {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        let mut codes = Self::empty();
        codes.extend(iter);
        codes
    }
}

impl Extend<u16> for AcceptedStatusCodes {
    fn extend<I: IntoIterator<Item = u16>>(&mut self, iter: I) {
        self.ranges.extend(iter.into_iter().map(|code| code..=code));
        self.normalize();
    }
}

impl From<RangeInclusive<u16>> for AcceptedStatusCodes {
    fn from(range: RangeInclusive<u16>) -> Self { Self::empty().with_range(range) }
}

/// Parses a comma-separated list such as `"200-299,304"`.
impl FromStr for AcceptedStatusCodes {
    type Err = StatusRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut codes = Self::empty();
        for entry in s.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            codes.ranges.push(parse_range(entry)?);
        }
        codes.normalize();
        Ok(codes)
    }
}

impl TryFrom<Vec<String>> for AcceptedStatusCodes {
    type Error = StatusRangeError;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        let mut codes = Self::empty();
        for entry in &entries {
            codes.ranges.push(parse_range(entry.trim())?);
        }
        codes.normalize();
        Ok(codes)
    }
}

impl From<AcceptedStatusCodes> for Vec<String> {
    fn from(codes: AcceptedStatusCodes) -> Self {
        codes
            .ranges
            .iter()
            .map(|range| {
                if range.start() == range.end() {
                    range.start().to_string()
                } else {
                    format!("{}-{}", range.start(), range.end())
                }
            })
            .collect()
    }
}

fn parse_range(entry: &str) -> Result<RangeInclusive<u16>, StatusRangeError> {
    let invalid = || StatusRangeError(entry.to_string());
    let (start, end) = match entry.split_once('-') {
        Some((start, end)) => (start.trim(), end.trim()),
        None => (entry, entry),
    };
    let start: u16 = start.parse().map_err(|_| invalid())?;
    let end: u16 = end.parse().map_err(|_| invalid())?;
    if start > end || !(100..=999).contains(&start) || end > 999 {
        return Err(invalid());
    }
    Ok(start..=end)
}

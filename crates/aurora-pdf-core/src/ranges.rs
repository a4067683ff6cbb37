//! Page range expressions.
//!
//! Users type 1-based expressions such as `"1-3,5,7-9"`. Parsing produces
//! zero-based inclusive [`PageRange`]s in the order the tokens were written.
//! Overlapping or out-of-order ranges are kept exactly as given: split emits
//! one document per range, so reordering them would change the output.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroUsize;
use tracing::warn;

/// Inclusive zero-based page span, `start <= end < page_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PageRange {
    start: usize,
    end: usize,
}

impl PageRange {
    /// Build a range that fits a document of `page_count` pages.
    pub const fn new(start: usize, end: usize, page_count: usize) -> Option<Self> {
        if start <= end && end < page_count {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub const fn single(index: usize, page_count: usize) -> Option<Self> {
        Self::new(index, index, page_count)
    }

    pub const fn start(&self) -> usize {
        self.start
    }

    pub const fn end(&self) -> usize {
        self.end
    }

    pub const fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Page indices in ascending order.
    pub const fn indices(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.indices().collect()
    }
}

impl fmt::Display for PageRange {
    /// Formats as the 1-based expression a user would type.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start + 1)
        } else {
            write!(f, "{}-{}", self.start + 1, self.end + 1)
        }
    }
}

/// Why a token was left out of the parsed ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotANumber,
    OutOfBounds,
    Reversed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotANumber => "not a number",
            Self::OutOfBounds => "outside the document",
            Self::Reversed => "start after end",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedToken {
    pub token: String,
    pub reason: SkipReason,
}

/// Result of [`parse_ranges`]: the usable ranges plus whatever was dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedRanges {
    pub ranges: Vec<PageRange>,
    pub skipped: Vec<SkippedToken>,
}

impl ParsedRanges {
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Every page index in token order, duplicates included.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(PageRange::indices)
    }

    /// The distinct pages touched by any range.
    pub fn index_set(&self) -> BTreeSet<usize> {
        self.indices().collect()
    }
}

/// Parse a comma-separated list of `N` and `N-M` tokens (1-based).
///
/// Tokens that do not parse, fall outside `[1, page_count]`, or run
/// backwards are dropped and reported in [`ParsedRanges::skipped`].
pub fn parse_ranges(expression: &str, page_count: usize) -> ParsedRanges {
    let mut parsed = ParsedRanges::default();

    for token in expression.split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }

        match parse_token(token, page_count) {
            Ok(range) => parsed.ranges.push(range),
            Err(reason) => {
                warn!("Skipping page range token '{}': {}", token, reason);
                parsed.skipped.push(SkippedToken {
                    token: token.to_string(),
                    reason,
                });
            }
        }
    }

    parsed
}

fn parse_token(token: &str, page_count: usize) -> Result<PageRange, SkipReason> {
    let (start, end) = match token.split_once('-') {
        Some((start, end)) => (parse_page_number(start)?, parse_page_number(end)?),
        None => {
            let page = parse_page_number(token)?;
            (page, page)
        }
    };

    // 1-based to 0-based; page 0 does not exist
    let (Some(start), Some(end)) = (start.checked_sub(1), end.checked_sub(1)) else {
        return Err(SkipReason::OutOfBounds);
    };

    if start >= page_count || end >= page_count {
        return Err(SkipReason::OutOfBounds);
    }

    PageRange::new(start, end, page_count).ok_or(SkipReason::Reversed)
}

fn parse_page_number(text: &str) -> Result<usize, SkipReason> {
    text.trim().parse().map_err(|_| SkipReason::NotANumber)
}

/// Walk the document in fixed strides of `interval` pages.
pub fn split_by_interval(page_count: usize, interval: NonZeroUsize) -> Vec<PageRange> {
    let step = interval.get();
    (0..page_count)
        .step_by(step)
        .filter_map(|start| {
            let end = (start + step - 1).min(page_count - 1);
            PageRange::new(start, end, page_count)
        })
        .collect()
}

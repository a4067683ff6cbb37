//! Page index newtype for conversion between zero-based indices and the
//! 1-based page numbers users type.

use crate::error::Error;

/// A zero-based page index validated against a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageIndex(usize);

impl PageIndex {
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Validate a zero-based index against the total page count.
    pub const fn try_from_index(index: usize, total_pages: usize) -> Result<Self, Error> {
        if index >= total_pages {
            return Err(Error::PageOutOfRange {
                index,
                total: total_pages,
            });
        }
        Ok(Self(index))
    }

    /// Convert a 1-based page number and validate it.
    pub const fn try_from_page_number(page_number: usize, total_pages: usize) -> Result<Self, Error> {
        match page_number.checked_sub(1) {
            Some(index) => Self::try_from_index(index, total_pages),
            None => Err(Error::PageOutOfRange {
                index: 0,
                total: total_pages,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_try_from_index_valid() {
        let idx = PageIndex::try_from_index(4, 5).unwrap();
        assert_eq!(idx.as_usize(), 4);
    }

    #[test]
    fn test_try_from_index_out_of_range() {
        let result = PageIndex::try_from_index(5, 5);
        assert!(matches!(result, Err(Error::PageOutOfRange { index: 5, total: 5 })));
    }

    #[test]
    fn test_try_from_page_number() {
        assert_eq!(PageIndex::try_from_page_number(1, 3).unwrap().as_usize(), 0);
        assert!(PageIndex::try_from_page_number(0, 3).is_err());
        assert!(PageIndex::try_from_page_number(4, 3).is_err());
    }
}

//! One page of a server-side list, in the backend's Spring-style envelope.

use serde::{Deserialize, Serialize};

use crate::core::errors::{LabError, Result};

/// `{ content, totalElements, number, size, ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(content: Vec<T>, total_elements: u64, number: u32, size: u32) -> Self {
        Self {
            content,
            total_elements,
            number,
            size,
        }
    }

    /// Placeholder shown before the first response arrives.
    #[must_use]
    pub fn empty(number: u32, size: u32) -> Self {
        Self::new(Vec::new(), 0, number, size)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// `ceil(total / size)`; zero when the page size is unknown.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(u64::from(self.size))
    }

    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.number == 0
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        u64::from(self.number) + 1 >= self.total_pages()
    }

    /// Whether anything exists beyond this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        let seen = u64::from(self.number) * u64::from(self.size) + self.content.len() as u64;
        seen < self.total_elements
    }

    /// 1-based row number of the row at `index` on this page.
    #[must_use]
    pub fn ordinal(&self, index: usize) -> u64 {
        u64::from(self.number) * u64::from(self.size) + index as u64 + 1
    }

    /// Reject envelopes that cannot be true.
    pub fn validate(&self) -> Result<()> {
        if self.size > 0 && self.content.len() > self.size as usize {
            return Err(malformed(format!(
                "page holds {} rows but its size is {}",
                self.content.len(),
                self.size
            )));
        }
        if (self.content.len() as u64) > self.total_elements {
            return Err(malformed(format!(
                "page holds {} rows but the total is {}",
                self.content.len(),
                self.total_elements
            )));
        }
        Ok(())
    }
}

fn malformed(details: String) -> LabError {
    LabError::Backend {
        status: 200,
        message: format!("malformed page: {details}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_placeholder_is_valid_and_last() {
        let page: Page<u32> = Page::empty(2, 10);
        assert!(page.validate().is_ok());
        assert_eq!(page.number, 2);
        assert_eq!(page.total_pages(), 0);
        assert!(page.is_last());
        assert!(!page.has_more());
    }

    #[test]
    fn decodes_spring_envelope_ignoring_extras() {
        let page: Page<u32> = serde_json::from_value(json!({
            "content": [1, 2],
            "totalElements": 12,
            "totalPages": 6,
            "number": 1,
            "size": 2,
            "first": false,
            "last": false
        }))
        .unwrap();
        assert_eq!(page.content, vec![1, 2]);
        assert_eq!(page.total_pages(), 6);
        assert!(!page.is_first());
        assert!(!page.is_last());
        assert!(page.has_more());
    }

    #[test]
    fn missing_content_is_empty() {
        let page: Page<String> = serde_json::from_value(json!({"totalElements": 0})).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_pages(), 0);
    }

    #[test]
    fn ordinals_continue_across_pages() {
        let page = Page::new(vec!['a', 'b', 'c'], 23, 2, 10);
        assert_eq!(page.ordinal(0), 21);
        assert_eq!(page.ordinal(2), 23);
        assert!(page.is_last());
        assert!(!page.has_more());
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(Page::<u8>::new(Vec::new(), 21, 0, 10).total_pages(), 3);
        assert_eq!(Page::<u8>::new(Vec::new(), 20, 0, 10).total_pages(), 2);
        assert_eq!(Page::<u8>::new(Vec::new(), 5, 0, 0).total_pages(), 0);
    }

    #[test]
    fn validate_rejects_overfull_page() {
        assert!(Page::new(vec![1, 2, 3], 3, 0, 2).validate().is_err());
        assert!(Page::new(vec![1, 2], 3, 0, 2).validate().is_ok());
        let err = Page::new(vec![1, 2], 1, 0, 10).validate().unwrap_err();
        assert!(err.display_message().starts_with("malformed page"));
    }
}

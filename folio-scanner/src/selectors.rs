use serde::{Deserialize, Serialize};

/// Where a page keeps its chapter title, body and next-page control.
///
/// The three fields are CSS selectors handed straight to the HTML parser. A set is only
/// usable when `content_selector` is non-empty; the other two may stay blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorSet {
    pub title_selector: String,
    pub content_selector: String,
    pub next_page_selector: String,
}

impl SelectorSet {
    pub fn new(title: &str, content: &str, next_page: &str) -> Self {
        Self {
            title_selector: title.trim().to_string(),
            content_selector: content.trim().to_string(),
            next_page_selector: next_page.trim().to_string(),
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.content_selector.trim().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.title_selector.trim().is_empty()
            && self.content_selector.trim().is_empty()
            && self.next_page_selector.trim().is_empty()
    }

    /// Fill any blank field from `candidate`. Fields already set are left alone.
    pub fn merge_missing(&mut self, candidate: &SelectorSet) {
        fill(&mut self.title_selector, &candidate.title_selector);
        fill(&mut self.content_selector, &candidate.content_selector);
        fill(&mut self.next_page_selector, &candidate.next_page_selector);
    }
}

fn fill(slot: &mut String, value: &str) {
    if slot.is_empty() {
        let value = value.trim();
        if !value.is_empty() {
            *slot = value.to_string();
        }
    }
}

/// Merge per-chunk candidates into one selector set.
///
/// Earlier chunks win: for each field the first non-empty value in sequence order is
/// kept. `None` candidates contribute nothing.
pub fn aggregate<I>(candidates: I) -> SelectorSet
where
    I: IntoIterator<Item = Option<SelectorSet>>,
{
    let mut resolved = SelectorSet::default();
    for candidate in candidates.into_iter().flatten() {
        resolved.merge_missing(&candidate);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_non_empty_wins_per_field() {
        let resolved = aggregate(vec![
            Some(SelectorSet::new("h1.title", "", "")),
            None,
            Some(SelectorSet::new("h2", "div.chapter p", "")),
            Some(SelectorSet::new("h3", "article p", "a.next")),
        ]);

        assert_eq!(resolved.title_selector, "h1.title");
        assert_eq!(resolved.content_selector, "div.chapter p");
        assert_eq!(resolved.next_page_selector, "a.next");
    }

    #[test]
    fn test_single_late_content_selector_is_found() {
        let resolved = aggregate(vec![
            None,
            Some(SelectorSet::default()),
            None,
            Some(SelectorSet::new("", "X", "")),
            Some(SelectorSet::default()),
        ]);

        assert_eq!(resolved.content_selector, "X");
        assert!(resolved.title_selector.is_empty());
        assert!(resolved.next_page_selector.is_empty());
    }

    #[test]
    fn test_reaggregating_is_idempotent() {
        let once = aggregate(vec![
            Some(SelectorSet::new("h1", "", "")),
            Some(SelectorSet::new("", "p", "a[rel=next]")),
        ]);
        let twice = aggregate(vec![Some(once.clone())]);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_order_matters() {
        let a = Some(SelectorSet::new("", "p.a", ""));
        let b = Some(SelectorSet::new("", "p.b", ""));

        assert_eq!(aggregate(vec![a.clone(), b.clone()]).content_selector, "p.a");
        assert_eq!(aggregate(vec![b, a]).content_selector, "p.b");
    }

    #[test]
    fn test_whitespace_only_counts_as_empty() {
        let resolved = aggregate(vec![
            Some(SelectorSet {
                title_selector: "   ".to_string(),
                content_selector: "\n".to_string(),
                next_page_selector: String::new(),
            }),
            Some(SelectorSet::new("h1", "p", "")),
        ]);

        assert_eq!(resolved.title_selector, "h1");
        assert_eq!(resolved.content_selector, "p");
    }

    #[test]
    fn test_nothing_found_is_not_usable() {
        let resolved = aggregate(vec![None, None]);
        assert!(!resolved.is_usable());
        assert!(resolved.is_empty());
    }
}

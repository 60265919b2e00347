use crate::page::{Page, element_text};
use crate::selectors::SelectorSet;
use scraper::{ElementRef, Selector};
use tracing::debug;

/// Attributes that can carry a navigation target.
const HREF_ATTRS: [&str; 3] = ["href", "data-href", "data-url"];

/// Works out which page follows the current one.
///
/// Tiers, first hit wins:
/// 1. the inferred `next_page_selector`
/// 2. any element with a `rel="next"` relation
/// 3. any `a` or `button` whose text contains "Next"
///
/// The text probe is case-sensitive unless [`with_case_insensitive_text`] turns that off.
///
/// [`with_case_insensitive_text`]: NextPageResolver::with_case_insensitive_text
#[derive(Debug, Clone, Copy, Default)]
pub struct NextPageResolver {
    case_insensitive_text: bool,
}

impl NextPageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_insensitive_text(mut self, enabled: bool) -> Self {
        self.case_insensitive_text = enabled;
        self
    }

    /// Absolute URL of the next page, or `None` when the chain ends here.
    pub fn resolve(&self, page: &Page, selectors: &SelectorSet) -> Option<String> {
        if let Some(url) = self.from_inferred_selector(page, &selectors.next_page_selector) {
            debug!("Next page via inferred selector: {}", url);
            return Some(url);
        }
        if let Some(url) = self.from_rel_next(page) {
            debug!("Next page via rel=next: {}", url);
            return Some(url);
        }
        if let Some(url) = self.from_next_text(page) {
            debug!("Next page via link text: {}", url);
            return Some(url);
        }

        debug!("No next page found on {}", page.url());
        None
    }

    fn from_inferred_selector(&self, page: &Page, selector: &str) -> Option<String> {
        page.select(selector)
            .iter()
            .find_map(|element| link_target(page, element))
    }

    fn from_rel_next(&self, page: &Page) -> Option<String> {
        page.select("[rel]")
            .iter()
            .filter(|element| {
                element
                    .value()
                    .attr("rel")
                    .is_some_and(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("next")))
            })
            .find_map(|element| own_target(page, element))
    }

    fn from_next_text(&self, page: &Page) -> Option<String> {
        page.select("a, button")
            .iter()
            .filter(|element| self.mentions_next(&element_text(element)))
            .find_map(|element| own_target(page, element))
    }

    fn mentions_next(&self, text: &str) -> bool {
        if self.case_insensitive_text {
            text.to_lowercase().contains("next")
        } else {
            text.contains("Next")
        }
    }
}

/// Target of the element itself, else of the first descendant that carries one.
fn link_target(page: &Page, element: &ElementRef<'_>) -> Option<String> {
    if let Some(url) = own_target(page, element) {
        return Some(url);
    }
    let Ok(nested) = Selector::parse("[href], [data-href], [data-url]") else {
        return None;
    };
    element
        .select(&nested)
        .find_map(|inner| own_target(page, &inner))
}

fn own_target(page: &Page, element: &ElementRef<'_>) -> Option<String> {
    HREF_ATTRS
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .find_map(|href| page.resolve(href))
}

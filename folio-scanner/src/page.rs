use crate::error::{Result, ScanError};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// A fetched page parsed into a DOM, together with the URL it came from.
///
/// `scraper::Html` is not `Send`, so a `Page` lives inside a synchronous section and is
/// dropped before the next await point.
pub struct Page {
    url: Url,
    document: Html,
}

impl Page {
    pub fn parse(url: &str, markup: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self {
            url,
            document: Html::parse_document(markup),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// All elements matching `selector`, in document order.
    ///
    /// A blank or unparseable selector matches nothing.
    pub fn select(&self, selector: &str) -> Vec<ElementRef<'_>> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Vec::new();
        }
        match Selector::parse(selector) {
            Ok(parsed) => self.document.select(&parsed).collect(),
            Err(e) => {
                debug!("Ignoring unparseable selector '{}': {}", selector, e);
                Vec::new()
            }
        }
    }

    /// Resolve `href` against this page's URL.
    ///
    /// Empty, fragment-only, `javascript:`, `mailto:` and `tel:` targets are not pages.
    pub fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            return None;
        }

        let mut resolved = self.url.join(href).ok()?;
        resolved.set_fragment(None);
        Some(resolved.to_string())
    }
}

/// Whitespace-trimmed text content of an element and its descendants.
pub fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

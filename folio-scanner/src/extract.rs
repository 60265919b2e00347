use crate::page::{Page, element_text};
use crate::result::{ChapterContent, ChapterRecord, ContentType};
use crate::selectors::SelectorSet;
use scraper::{ElementRef, Selector};

const IMAGE_SOURCE_ATTRS: [&str; 2] = ["src", "data-src"];

/// Pull one chapter out of a parsed page.
///
/// Never fails. A selector that is blank, unparseable or matches nothing gives an empty
/// title or an empty body; callers treat that as a valid, empty chapter.
pub fn extract_chapter(
    page: &Page,
    selectors: &SelectorSet,
    content_type: ContentType,
) -> ChapterRecord {
    let title = extract_title(page, &selectors.title_selector);
    let content = match content_type {
        ContentType::Text => ChapterContent::Paragraphs(extract_paragraphs(page, &selectors.content_selector)),
        ContentType::Image => ChapterContent::Images(extract_images(page, &selectors.content_selector)),
    };

    ChapterRecord::new(page.url().to_string(), title, content)
}

/// Text of every title match joined in document order, trimmed as a whole.
pub fn extract_title(page: &Page, selector: &str) -> String {
    page.select(selector)
        .iter()
        .flat_map(|element| element.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Trimmed text of every match, in document order.
pub fn extract_paragraphs(page: &Page, selector: &str) -> Vec<String> {
    page.select(selector).iter().map(element_text).collect()
}

/// Absolute image URLs for every match, in document order.
///
/// A match that carries no source itself contributes the `<img>` elements inside it.
pub fn extract_images(page: &Page, selector: &str) -> Vec<String> {
    let Ok(img_selector) = Selector::parse("img") else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for element in page.select(selector) {
        if let Some(src) = image_source(&element) {
            images.extend(page.resolve(src));
            continue;
        }
        for img in element.select(&img_selector) {
            if let Some(src) = image_source(&img) {
                images.extend(page.resolve(src));
            }
        }
    }
    images
}

fn image_source<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    IMAGE_SOURCE_ATTRS
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .map(str::trim)
        .find(|src| !src.is_empty())
}

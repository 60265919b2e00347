// Collection export

use crate::model::Collection;
use folio_scanner::{ChapterContent, ChapterRecord, ContentType};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Text,
    Json,
    Markdown,
    Html,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ExportFormat::Text),
            "json" => Some(ExportFormat::Json),
            "markdown" | "md" => Some(ExportFormat::Markdown),
            "html" | "htm" => Some(ExportFormat::Html),
            _ => None,
        }
    }

    /// Guess the format from an output path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_str)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
        }
    }
}

pub fn render_collection(
    collection: &Collection,
    format: ExportFormat,
) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Text => Ok(generate_text_export(collection)),
        ExportFormat::Json => generate_json_export(collection),
        ExportFormat::Markdown => Ok(generate_markdown_export(collection)),
        ExportFormat::Html => Ok(generate_html_export(collection)),
    }
}

const HEAVY_RULE: &str =
    "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";
const LIGHT_RULE: &str =
    "────────────────────────────────────────────────────────────────────────────────\n";

pub fn generate_text_export(collection: &Collection) -> String {
    let mut report = String::new();

    // Header
    report.push_str(HEAVY_RULE);
    report.push_str(&center(&collection.name.to_uppercase(), 80));
    report.push('\n');
    report.push_str(HEAVY_RULE);
    report.push('\n');

    report.push_str(&format!("Source:       {}\n", collection.source_url));
    report.push_str(&format!("Type:         {}\n", collection.content_type.as_str()));
    report.push_str(&format!("Chapters:     {}\n", collection.chapters.len()));
    report.push_str(&format!(
        "Saved:        {}\n",
        format_timestamp(collection.updated_at)
    ));
    report.push('\n');

    for (idx, chapter) in collection.chapters.iter().enumerate() {
        report.push_str(LIGHT_RULE);
        report.push_str(&format!("[{}] {}\n", idx + 1, chapter_heading(chapter, idx)));
        report.push_str(LIGHT_RULE);
        report.push('\n');

        match &chapter.content {
            ChapterContent::Paragraphs(paragraphs) => {
                for paragraph in paragraphs.iter().filter(|p| !p.is_empty()) {
                    report.push_str(&wrap_text(paragraph, 80, ""));
                    report.push('\n');
                }
            }
            ChapterContent::Images(images) => {
                for (n, image) in images.iter().enumerate() {
                    report.push_str(&format!("  {:>3}. {}\n", n + 1, image));
                }
                report.push('\n');
            }
        }
    }

    // Footer
    report.push_str(HEAVY_RULE);
    report.push_str(&center("End of Collection", 80));
    report.push('\n');
    report.push_str(HEAVY_RULE);
    report.push_str("\nExported by Folio\n");

    report
}

pub fn generate_json_export(collection: &Collection) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "collection": {
            "metadata": {
                "generator": "Folio",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "id": collection.id,
            "name": collection.name,
            "sourceUrl": collection.source_url,
            "contentType": collection.content_type,
            "selectors": collection.selectors,
            "createdAt": format_iso8601_timestamp(collection.created_at),
            "updatedAt": format_iso8601_timestamp(collection.updated_at),
            "chapterCount": collection.chapters.len(),
            "chapters": collection.chapters
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_markdown_export(collection: &Collection) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", collection.name));
    md.push_str(&format!("*Source:* <{}>  \n", collection.source_url));
    md.push_str(&format!("*Chapters:* {}\n\n", collection.chapters.len()));

    if collection.chapters.len() > 1 {
        md.push_str("## Contents\n\n");
        for (idx, chapter) in collection.chapters.iter().enumerate() {
            md.push_str(&format!("{}. {}\n", idx + 1, chapter_heading(chapter, idx)));
        }
        md.push('\n');
    }

    for (idx, chapter) in collection.chapters.iter().enumerate() {
        md.push_str(&format!("## {}\n\n", chapter_heading(chapter, idx)));
        match &chapter.content {
            ChapterContent::Paragraphs(paragraphs) => {
                for paragraph in paragraphs.iter().filter(|p| !p.is_empty()) {
                    md.push_str(paragraph);
                    md.push_str("\n\n");
                }
            }
            ChapterContent::Images(images) => {
                for (n, image) in images.iter().enumerate() {
                    md.push_str(&format!("![Page {}]({})\n\n", n + 1, image));
                }
            }
        }
    }

    md
}

pub fn generate_html_export(collection: &Collection) -> String {
    let mut html = String::new();
    let title = escape_html(&collection.name);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", title));
    html.push_str(
        "<style>\
body{max-width:42em;margin:2em auto;padding:0 1em;font-family:Georgia,serif;line-height:1.6}\
h2{margin-top:3em}img{max-width:100%;display:block;margin:1em auto}\
.meta{color:#666;font-size:.9em}\
</style>\n",
    );
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{}</h1>\n", title));
    html.push_str(&format!(
        "<p class=\"meta\">Source: <a href=\"{0}\">{0}</a><br>{1} chapter(s)</p>\n",
        escape_html(&collection.source_url),
        collection.chapters.len()
    ));

    for (idx, chapter) in collection.chapters.iter().enumerate() {
        html.push_str(&format!(
            "<section id=\"chapter-{}\">\n<h2>{}</h2>\n",
            idx + 1,
            escape_html(&chapter_heading(chapter, idx))
        ));
        match &chapter.content {
            ChapterContent::Paragraphs(paragraphs) => {
                for paragraph in paragraphs.iter().filter(|p| !p.is_empty()) {
                    html.push_str(&format!("<p>{}</p>\n", escape_html(paragraph)));
                }
            }
            ChapterContent::Images(images) => {
                for (n, image) in images.iter().enumerate() {
                    html.push_str(&format!(
                        "<img src=\"{}\" alt=\"Page {}\" loading=\"lazy\">\n",
                        escape_html(image),
                        n + 1
                    ));
                }
            }
        }
        html.push_str("</section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// One line per collection chapter, for `collection show`.
pub fn generate_chapter_listing(collection: &Collection) -> String {
    let unit = match collection.content_type {
        ContentType::Text => "paragraphs",
        ContentType::Image => "images",
    };

    let mut listing = String::new();
    for (idx, chapter) in collection.chapters.iter().enumerate() {
        listing.push_str(&format!(
            "  {:>4}  {}  ({} {})\n",
            idx + 1,
            chapter_heading(chapter, idx),
            chapter.content.len(),
            unit
        ));
    }
    if listing.is_empty() {
        listing.push_str("  (no chapters)\n");
    }
    listing
}

fn chapter_heading(chapter: &ChapterRecord, idx: usize) -> String {
    if chapter.title.trim().is_empty() {
        format!("Chapter {}", idx + 1)
    } else {
        chapter.title.clone()
    }
}

fn center(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", " ".repeat((width - len) / 2), text)
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_iso8601_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
    datetime.to_rfc3339()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();
    let limit = width.saturating_sub(indent.len()).max(1);

    for word in text.split_whitespace() {
        if !current_line.is_empty()
            && current_line.chars().count() + word.chars().count() + 1 > limit
        {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}

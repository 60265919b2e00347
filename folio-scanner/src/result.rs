use serde::{Deserialize, Serialize};

/// What a collection holds. Fixed for a whole traversal run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Some(ContentType::Text),
            "image" | "images" => Some(ContentType::Image),
            _ => None,
        }
    }
}

/// Body of one chapter: paragraphs of text, or image URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterContent {
    Paragraphs(Vec<String>),
    Images(Vec<String>),
}

impl ChapterContent {
    pub fn empty(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Text => ChapterContent::Paragraphs(Vec::new()),
            ContentType::Image => ChapterContent::Images(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChapterContent::Paragraphs(items) | ChapterContent::Images(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One extracted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    #[serde(rename = "chapterTitle")]
    pub title: String,
    #[serde(flatten)]
    pub content: ChapterContent,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl ChapterRecord {
    pub fn new(url: String, title: String, content: ChapterContent) -> Self {
        Self {
            title,
            content,
            url,
        }
    }

    pub fn paragraphs(&self) -> Option<&[String]> {
        match &self.content {
            ChapterContent::Paragraphs(p) => Some(p),
            ChapterContent::Images(_) => None,
        }
    }

    pub fn images(&self) -> Option<&[String]> {
        match &self.content {
            ChapterContent::Images(i) => Some(i),
            ChapterContent::Paragraphs(_) => None,
        }
    }
}

use folio_scanner::{ChapterRecord, ContentType, SelectorSet};
use serde::{Deserialize, Serialize};
use url::Url;

/// A named run of chapters pulled from one source, the unit the store reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub content_type: ContentType,
    pub selectors: SelectorSet,
    pub chapters: Vec<ChapterRecord>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Collection {
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        content_type: ContentType,
        selectors: SelectorSet,
        chapters: Vec<ChapterRecord>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            source_url: source_url.into(),
            content_type,
            selectors,
            chapters,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn chapter(&self, index: usize) -> Option<&ChapterRecord> {
        self.chapters.get(index)
    }

    pub fn item_count(&self) -> usize {
        self.chapters.iter().map(|c| c.content.len()).sum()
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            source_url: self.source_url.clone(),
            content_type: self.content_type,
            chapter_count: self.chapters.len(),
            updated_at: self.updated_at,
        }
    }
}

/// What `collection list` shows without loading any chapter bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub content_type: ContentType,
    pub chapter_count: usize,
    pub updated_at: i64,
}

/// Name for a collection the user did not name: the host plus the last path segment.
pub fn default_collection_name(source_url: &str) -> String {
    let Ok(url) = Url::parse(source_url) else {
        return source_url.to_string();
    };

    let host = url.host_str().unwrap_or("untitled");
    let last_segment = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|s| s.to_string());

    match last_segment {
        Some(segment) => format!("{} - {}", host, segment),
        None => host.to_string(),
    }
}

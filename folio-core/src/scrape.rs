use crate::model::{Collection, default_collection_name};
use folio_scanner::{
    CancellationToken, ChapterRecord, ContentType, DEFAULT_CHUNK_CHARS, NextPageResolver,
    PageFetcher, ProgressCallback, ScanError, SelectorInference, SelectorSet, StopReason,
    Traversal, aggregate, chunk_markup, infer_chunks, inference::DEFAULT_CONCURRENCY,
    traversal::page_limit,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Options for configuring a scrape run
pub struct ScrapeOptions {
    pub url: String,
    pub start_chapter: u32,
    pub end_chapter: u32,
    pub content_type: ContentType,
    /// Model requests in flight at once while inferring selectors
    pub concurrency: usize,
    pub chunk_chars: usize,
    pub next_case_insensitive: bool,
    pub show_progress_bars: bool,
}

impl ScrapeOptions {
    pub fn new(url: impl Into<String>, start_chapter: u32, end_chapter: u32) -> Self {
        Self {
            url: url.into(),
            start_chapter,
            end_chapter,
            content_type: ContentType::Text,
            concurrency: DEFAULT_CONCURRENCY,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            next_case_insensitive: false,
            show_progress_bars: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("invalid chapter range {start}..={end}: chapters start at 1 and the end may not precede the start")]
    InvalidRange { start: u32, end: u32 },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: ScanError,
    },

    #[error("content location could not be determined")]
    UnresolvedContentSelector,

    #[error("scrape cancelled before any chapter was extracted")]
    Cancelled,
}

impl ScrapeError {
    /// Stable machine-readable identifier for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::InvalidRange { .. } => "invalid_range",
            ScrapeError::InvalidUrl(_) => "invalid_url",
            ScrapeError::Fetch { .. } => "fetch_error",
            ScrapeError::UnresolvedContentSelector => "unresolved_content_selector",
            ScrapeError::Cancelled => "cancelled",
        }
    }
}

/// Outcome of a run that got as far as traversal.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub url: String,
    pub content_type: ContentType,
    pub selectors: SelectorSet,
    pub chapters: Vec<ChapterRecord>,
    pub stop_reason: StopReason,
    pub pages_scraped: usize,
}

impl ScrapeReport {
    /// Human-readable status line for the run.
    pub fn message(&self) -> String {
        let count = self.chapters.len();
        match &self.stop_reason {
            StopReason::Completed | StopReason::NoNextPage => {
                format!("Scraped {} chapter(s) successfully", count)
            }
            StopReason::FetchFailed { url, .. } => {
                format!("Scraped {} chapter(s); stopped early, could not fetch {}", count, url)
            }
            StopReason::Cancelled => format!("Cancelled after {} chapter(s)", count),
            StopReason::EmptyRange => "No chapters requested".to_string(),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.stop_reason.is_partial()
    }

    pub fn into_collection(self, name: Option<String>) -> Collection {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_collection_name(&self.url));
        Collection::new(name, self.url, self.content_type, self.selectors, self.chapters)
    }
}

/// Infer selectors from the seed page and walk the requested chapter range.
///
/// Fails before traversal on a bad range or URL, an unreachable seed page, or when no
/// content selector could be inferred. Once traversal starts the run always yields a
/// report, partial or not.
pub async fn execute_scrape<F, I>(
    options: ScrapeOptions,
    fetcher: &F,
    inference: &I,
    cancel: CancellationToken,
    progress_callback: Option<ProgressCallback>,
) -> Result<ScrapeReport, ScrapeError>
where
    F: PageFetcher,
    I: SelectorInference,
{
    let ScrapeOptions {
        url,
        start_chapter,
        end_chapter,
        content_type,
        concurrency,
        chunk_chars,
        next_case_insensitive,
        show_progress_bars,
    } = options;

    if start_chapter == 0 || end_chapter < start_chapter {
        return Err(ScrapeError::InvalidRange {
            start: start_chapter,
            end: end_chapter,
        });
    }

    let seed_url = Url::parse(&url)
        .map_err(|e| ScrapeError::InvalidUrl(format!("{}: {}", url, e)))?
        .to_string();

    if cancel.is_cancelled() {
        return Err(ScrapeError::Cancelled);
    }

    let spinner = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Fetching {}", seed_url));
        Some(pb)
    } else {
        None
    };

    let seed_markup = match fetcher.fetch(&seed_url).await {
        Ok(markup) => markup,
        Err(source) => {
            if let Some(pb) = &spinner {
                pb.finish_and_clear();
            }
            return Err(ScrapeError::Fetch {
                url: seed_url,
                source,
            });
        }
    };

    let chunks = chunk_markup(&seed_markup, chunk_chars);
    info!(
        "Inferring selectors from {} chunk(s) of {} with concurrency {}",
        chunks.len(),
        seed_url,
        concurrency
    );
    if let Some(pb) = &spinner {
        pb.set_message(format!("Locating chapter content ({} chunks)", chunks.len()));
    }

    let candidates = infer_chunks(inference, &chunks, concurrency, &cancel).await;
    let selectors = aggregate(candidates);

    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    if cancel.is_cancelled() {
        return Err(ScrapeError::Cancelled);
    }
    if !selectors.is_usable() {
        warn!("No content selector could be inferred for {}", seed_url);
        return Err(ScrapeError::UnresolvedContentSelector);
    }
    info!("Resolved selectors: {:?}", selectors);

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new(page_limit(start_chapter, end_chapter) as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} chapters  {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let bar_for_callback = progress_bar.clone();
    let internal_callback: ProgressCallback = Arc::new(move |chapter: &ChapterRecord, percent: f64| {
        if let Some(pb) = &bar_for_callback {
            pb.inc(1);
            pb.set_message(chapter.title.clone());
        }
        if let Some(callback) = &progress_callback {
            callback(chapter, percent);
        }
    });

    let resolver = NextPageResolver::new().with_case_insensitive_text(next_case_insensitive);
    let traversal = Traversal::new()
        .with_content_type(content_type)
        .with_resolver(resolver)
        .with_cancellation(cancel)
        .with_progress_callback(internal_callback);

    let outcome = traversal
        .run(
            fetcher,
            &seed_url,
            Some(seed_markup),
            &selectors,
            start_chapter,
            end_chapter,
        )
        .await;

    if let Some(pb) = &progress_bar {
        pb.finish_and_clear();
    }

    Ok(ScrapeReport {
        url: seed_url,
        content_type,
        selectors,
        chapters: outcome.chapters,
        stop_reason: outcome.stop_reason,
        pages_scraped: outcome.pages_scraped,
    })
}

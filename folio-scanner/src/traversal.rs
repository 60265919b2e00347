use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::extract::extract_chapter;
use crate::fetcher::PageFetcher;
use crate::next_page::NextPageResolver;
use crate::page::Page;
use crate::result::{ChapterRecord, ContentType};
use crate::selectors::SelectorSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Called once per extracted chapter with the run's completion percentage.
pub type ProgressCallback = Arc<dyn Fn(&ChapterRecord, f64) + Send + Sync>;

/// Progress relayed over a channel, one per extracted chapter.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub chapter_number: u32,
    pub chapter: ChapterRecord,
    pub percent: f64,
    pub pages_scraped: usize,
    pub page_limit: usize,
}

/// Why a traversal stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The requested chapter range was exhausted.
    Completed,
    /// The last page had no way forward.
    NoNextPage,
    FetchFailed { url: String, message: String },
    Cancelled,
    /// `end_chapter` came before `start_chapter`.
    EmptyRange,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::NoNextPage => "no_next_page",
            StopReason::FetchFailed { .. } => "fetch_failed",
            StopReason::Cancelled => "cancelled",
            StopReason::EmptyRange => "empty_range",
        }
    }

    /// True when the run ended before the range was covered for a reason other than
    /// the story running out of pages.
    pub fn is_partial(&self) -> bool {
        matches!(self, StopReason::FetchFailed { .. } | StopReason::Cancelled)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => write!(f, "requested chapter range completed"),
            StopReason::NoNextPage => write!(f, "no next page found"),
            StopReason::FetchFailed { url, message } => {
                write!(f, "failed to fetch {}: {}", url, message)
            }
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::EmptyRange => write!(f, "empty chapter range"),
        }
    }
}

/// Everything a traversal produced, including a partial run.
#[derive(Debug, Clone)]
pub struct TraversalOutcome {
    pub chapters: Vec<ChapterRecord>,
    pub stop_reason: StopReason,
    pub pages_scraped: usize,
}

/// Number of pages a `start..=end` chapter range allows. Zero when `end < start`.
pub fn page_limit(start_chapter: u32, end_chapter: u32) -> usize {
    if end_chapter < start_chapter {
        0
    } else {
        (end_chapter - start_chapter) as usize + 1
    }
}

/// Walks a chain of pages, one chapter per page, following next-page links.
///
/// Fetching is strictly sequential: each URL is only known once the previous page has
/// been parsed. Every run returns what it gathered, whatever made it stop.
pub struct Traversal {
    content_type: ContentType,
    resolver: NextPageResolver,
    progress_callback: Option<ProgressCallback>,
    progress_channel: Option<mpsc::Sender<ProgressEvent>>,
    cancel: CancellationToken,
}

impl Traversal {
    pub fn new() -> Self {
        Self {
            content_type: ContentType::Text,
            resolver: NextPageResolver::new(),
            progress_callback: None,
            progress_channel: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_resolver(mut self, resolver: NextPageResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Relay progress over a bounded channel. Sending waits for capacity, so a slow
    /// consumer slows the traversal instead of losing events.
    pub fn with_progress_channel(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress_channel = Some(sender);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Extract chapters `start_chapter..=end_chapter` starting at `seed_url`.
    ///
    /// When `seed_markup` is given it stands in for the first fetch.
    pub async fn run<F>(
        &self,
        fetcher: &F,
        seed_url: &str,
        seed_markup: Option<String>,
        selectors: &SelectorSet,
        start_chapter: u32,
        end_chapter: u32,
    ) -> TraversalOutcome
    where
        F: PageFetcher,
    {
        let page_limit = page_limit(start_chapter, end_chapter);
        let mut chapters = Vec::with_capacity(page_limit.min(64));

        if page_limit == 0 {
            info!(
                "Chapter range {}..={} is empty, nothing to traverse",
                start_chapter, end_chapter
            );
            return TraversalOutcome {
                chapters,
                stop_reason: StopReason::EmptyRange,
                pages_scraped: 0,
            };
        }

        info!(
            "Traversing chapters {}..={} from {}",
            start_chapter, end_chapter, seed_url
        );
        let started = Instant::now();

        let mut current_url = seed_url.to_string();
        let mut current_chapter = start_chapter;
        let mut pages_scraped = 0usize;
        let mut prefetched = seed_markup;

        let stop_reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let markup = match prefetched.take() {
                Some(markup) => markup,
                None => match fetcher.fetch(&current_url).await {
                    Ok(markup) => markup,
                    Err(e) => {
                        warn!("Stopping traversal, fetch of {} failed: {}", current_url, e);
                        break StopReason::FetchFailed {
                            url: current_url,
                            message: e.to_string(),
                        };
                    }
                },
            };

            let (chapter, next_url) = match self.process_page(&current_url, &markup, selectors) {
                Ok(processed) => processed,
                Err(e) => {
                    warn!("Stopping traversal, could not read {}: {}", current_url, e);
                    break StopReason::FetchFailed {
                        url: current_url,
                        message: e.to_string(),
                    };
                }
            };

            pages_scraped += 1;
            let percent = 100.0 * pages_scraped as f64 / page_limit as f64;
            info!(
                "Chapter {} ({} items) from {} [{:.0}%]",
                current_chapter,
                chapter.content.len(),
                current_url,
                percent
            );

            self.report_progress(&chapter, current_chapter, percent, pages_scraped, page_limit)
                .await;
            chapters.push(chapter);

            if current_chapter >= end_chapter || pages_scraped >= page_limit {
                break StopReason::Completed;
            }
            current_chapter += 1;

            match next_url {
                Some(next) => current_url = next,
                None => break StopReason::NoNextPage,
            }
        };

        info!(
            "Traversal finished after {} page(s) in {:?}: {}",
            pages_scraped,
            started.elapsed(),
            stop_reason
        );

        TraversalOutcome {
            chapters,
            stop_reason,
            pages_scraped,
        }
    }

    /// Parse, extract and resolve the next URL without crossing an await point.
    fn process_page(
        &self,
        url: &str,
        markup: &str,
        selectors: &SelectorSet,
    ) -> Result<(ChapterRecord, Option<String>)> {
        let page = Page::parse(url, markup)?;
        let chapter = extract_chapter(&page, selectors, self.content_type);
        let next_url = self.resolver.resolve(&page, selectors);
        Ok((chapter, next_url))
    }

    async fn report_progress(
        &self,
        chapter: &ChapterRecord,
        chapter_number: u32,
        percent: f64,
        pages_scraped: usize,
        page_limit: usize,
    ) {
        if let Some(callback) = &self.progress_callback {
            callback(chapter, percent);
        }

        if let Some(sender) = &self.progress_channel {
            let event = ProgressEvent {
                chapter_number,
                chapter: chapter.clone(),
                percent,
                pages_scraped,
                page_limit,
            };
            if sender.send(event).await.is_err() {
                debug!("Progress receiver dropped, continuing without it");
            }
        }
    }
}

impl Default for Traversal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::fetcher::HttpFetcher;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn chapter_page(n: u32, next: Option<&str>) -> String {
        let link = next
            .map(|href| format!(r#"<a class="next" href="{}">Next</a>"#, href))
            .unwrap_or_default();
        format!(
            r#"<html><body>
                <h1 class="title">Chapter {n}</h1>
                <div class="text"><p>First of {n}.</p><p>Second of {n}.</p></div>
                {link}
            </body></html>"#
        )
    }

    fn selectors() -> SelectorSet {
        SelectorSet::new("h1.title", "div.text p", "a.next")
    }

    async fn mount_page(server: &MockServer, n: u32, next: Option<u32>, expected_hits: u64) {
        let next_href = next.map(|m| format!("/chapter-{}", m));
        Mock::given(method("GET"))
            .and(path(format!("/chapter-{}", n)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(chapter_page(n, next_href.as_deref())),
            )
            .expect(expected_hits)
            .mount(server)
            .await;
    }

    /// In-memory page host keyed by absolute URL.
    struct MapFetcher {
        pages: HashMap<String, String>,
        hits: AtomicUsize,
    }

    impl MapFetcher {
        fn new(pages: Vec<(&str, String)>) -> Self {
            Self {
                pages: pages.into_iter().map(|(u, p)| (u.to_string(), p)).collect(),
                hits: AtomicUsize::new(0),
            }
        }
    }

    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            self.pages.get(url).cloned().ok_or(ScanError::StatusError {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    // ============================================================================
    // Termination
    // ============================================================================

    #[tokio::test]
    async fn test_endless_chain_stops_at_range_end() {
        let mock_server = MockServer::start().await;
        for n in 1..=3 {
            mount_page(&mock_server, n, Some(n + 1), 1).await;
        }
        mount_page(&mock_server, 4, Some(5), 0).await;

        let fetcher = HttpFetcher::new().unwrap();
        let seed = format!("{}/chapter-1", mock_server.uri());
        let outcome = Traversal::new()
            .run(&fetcher, &seed, None, &selectors(), 1, 3)
            .await;

        assert_eq!(outcome.chapters.len(), 3);
        assert_eq!(outcome.pages_scraped, 3);
        assert_eq!(outcome.stop_reason, StopReason::Completed);
        assert_eq!(outcome.chapters[2].title, "Chapter 3");
        assert_eq!(
            outcome.chapters[0].paragraphs().unwrap(),
            &["First of 1.", "Second of 1."]
        );
    }

    #[tokio::test]
    async fn test_short_chain_stops_early_without_error() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, 1, Some(2), 1).await;
        mount_page(&mock_server, 2, None, 1).await;

        let fetcher = HttpFetcher::new().unwrap();
        let seed = format!("{}/chapter-1", mock_server.uri());
        let outcome = Traversal::new()
            .run(&fetcher, &seed, None, &selectors(), 1, 10)
            .await;

        assert_eq!(outcome.chapters.len(), 2);
        assert_eq!(outcome.stop_reason, StopReason::NoNextPage);
        assert!(!outcome.stop_reason.is_partial());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_partial_result() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, 1, Some(2), 1).await;
        Mock::given(method("GET"))
            .and(path("/chapter-2"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;
        mount_page(&mock_server, 3, Some(4), 0).await;

        let fetcher = HttpFetcher::new().unwrap();
        let seed = format!("{}/chapter-1", mock_server.uri());
        let outcome = Traversal::new()
            .run(&fetcher, &seed, None, &selectors(), 1, 5)
            .await;

        assert_eq!(outcome.chapters.len(), 1);
        assert_eq!(outcome.chapters[0].title, "Chapter 1");
        match &outcome.stop_reason {
            StopReason::FetchFailed { url, message } => {
                assert_eq!(url, &format!("{}/chapter-2", mock_server.uri()));
                assert!(message.contains("503"));
            }
            other => panic!("unexpected stop reason {:?}", other),
        }
        assert!(outcome.stop_reason.is_partial());
    }

    #[tokio::test]
    async fn test_reversed_range_does_nothing() {
        let fetcher = MapFetcher::new(vec![]);
        let outcome = Traversal::new()
            .run(&fetcher, "https://example.com/1", None, &selectors(), 5, 2)
            .await;

        assert!(outcome.chapters.is_empty());
        assert_eq!(outcome.stop_reason, StopReason::EmptyRange);
        assert_eq!(fetcher.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chapter_numbers_offset_the_range_only() {
        let fetcher = MapFetcher::new(vec![
            ("https://example.com/a", chapter_page(7, Some("/b"))),
            ("https://example.com/b", chapter_page(8, Some("/c"))),
            ("https://example.com/c", chapter_page(9, None)),
        ]);
        let outcome = Traversal::new()
            .run(&fetcher, "https://example.com/a", None, &selectors(), 7, 8)
            .await;

        assert_eq!(outcome.chapters.len(), 2);
        assert_eq!(outcome.stop_reason, StopReason::Completed);
        assert_eq!(fetcher.hits.load(Ordering::SeqCst), 2);
    }

    // ============================================================================
    // Extraction and seed reuse
    // ============================================================================

    #[tokio::test]
    async fn test_unmatched_content_gives_empty_chapter() {
        let fetcher = MapFetcher::new(vec![(
            "https://example.com/1",
            "<html><body><h1 class=\"title\">Lonely</h1></body></html>".to_string(),
        )]);
        let outcome = Traversal::new()
            .run(&fetcher, "https://example.com/1", None, &selectors(), 1, 1)
            .await;

        assert_eq!(outcome.chapters.len(), 1);
        assert_eq!(outcome.chapters[0].title, "Lonely");
        assert_eq!(outcome.chapters[0].paragraphs(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_seed_markup_is_not_fetched_again() {
        let fetcher = MapFetcher::new(vec![(
            "https://example.com/2",
            chapter_page(2, None),
        )]);
        let outcome = Traversal::new()
            .run(
                &fetcher,
                "https://example.com/1",
                Some(chapter_page(1, Some("/2"))),
                &selectors(),
                1,
                5,
            )
            .await;

        assert_eq!(outcome.chapters.len(), 2);
        assert_eq!(fetcher.hits.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.chapters[0].url, "https://example.com/1");
        assert_eq!(outcome.chapters[1].url, "https://example.com/2");
    }

    #[tokio::test]
    async fn test_image_traversal() {
        let fetcher = MapFetcher::new(vec![(
            "https://comics.example.com/issue/1",
            r#"<html><body><h2>Issue 1</h2>
               <div class="panels"><img src="p1.jpg"><img src="/art/p2.jpg"></div>
               </body></html>"#
                .to_string(),
        )]);
        let outcome = Traversal::new()
            .with_content_type(ContentType::Image)
            .run(
                &fetcher,
                "https://comics.example.com/issue/1",
                None,
                &SelectorSet::new("h2", ".panels img", ""),
                1,
                3,
            )
            .await;

        assert_eq!(outcome.stop_reason, StopReason::NoNextPage);
        assert_eq!(
            outcome.chapters[0].images().unwrap(),
            &[
                "https://comics.example.com/issue/p1.jpg",
                "https://comics.example.com/art/p2.jpg"
            ]
        );
    }

    // ============================================================================
    // Progress and cancellation
    // ============================================================================

    #[tokio::test]
    async fn test_progress_callback_order_and_percent() {
        let fetcher = MapFetcher::new(vec![
            ("https://example.com/1", chapter_page(1, Some("/2"))),
            ("https://example.com/2", chapter_page(2, Some("/3"))),
            ("https://example.com/3", chapter_page(3, Some("/4"))),
        ]);
        let seen: Arc<Mutex<Vec<(String, f64)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();

        Traversal::new()
            .with_progress_callback(Arc::new(move |chapter: &ChapterRecord, percent: f64| {
                seen_cb.lock().unwrap().push((chapter.title.clone(), percent));
            }))
            .run(&fetcher, "https://example.com/1", None, &selectors(), 1, 3)
            .await;

        let seen = seen.lock().unwrap();
        let titles: Vec<&str> = seen.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(titles, vec!["Chapter 1", "Chapter 2", "Chapter 3"]);
        assert!((seen[0].1 - 100.0 / 3.0).abs() < 1e-9);
        assert!((seen[1].1 - 200.0 / 3.0).abs() < 1e-9);
        assert!((seen[2].1 - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_progress_channel_preserves_order() {
        let fetcher = MapFetcher::new(vec![
            ("https://example.com/1", chapter_page(1, Some("/2"))),
            ("https://example.com/2", chapter_page(2, Some("/3"))),
            ("https://example.com/3", chapter_page(3, None)),
        ]);
        let (tx, mut rx) = mpsc::channel(1);
        let collector = tokio::spawn(async move {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        });

        let traversal = Traversal::new().with_progress_channel(tx);
        let outcome = traversal
            .run(&fetcher, "https://example.com/1", None, &selectors(), 1, 4)
            .await;
        drop(traversal);

        let events = collector.await.unwrap();
        assert_eq!(outcome.chapters.len(), 3);
        assert_eq!(
            events.iter().map(|e| e.chapter_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(events[2].percent, 75.0);
        assert_eq!(events[2].page_limit, 4);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let fetcher = MapFetcher::new(vec![(
            "https://example.com/1",
            chapter_page(1, None),
        )]);
        let cancel = CancellationToken::new();
        cancel.cancel("user abort");

        let outcome = Traversal::new()
            .with_cancellation(cancel)
            .run(&fetcher, "https://example.com/1", None, &selectors(), 1, 3)
            .await;

        assert!(outcome.chapters.is_empty());
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert_eq!(fetcher.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_between_iterations_keeps_chapters() {
        let fetcher = MapFetcher::new(vec![
            ("https://example.com/1", chapter_page(1, Some("/2"))),
            ("https://example.com/2", chapter_page(2, Some("/3"))),
            ("https://example.com/3", chapter_page(3, None)),
        ]);
        let cancel = CancellationToken::new();
        let cancel_cb = cancel.clone();

        let outcome = Traversal::new()
            .with_cancellation(cancel)
            .with_progress_callback(Arc::new(move |_: &ChapterRecord, percent: f64| {
                if percent > 50.0 {
                    cancel_cb.cancel("enough");
                }
            }))
            .run(&fetcher, "https://example.com/1", None, &selectors(), 1, 3)
            .await;

        assert_eq!(outcome.chapters.len(), 2);
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    }

    #[test]
    fn test_page_limit() {
        assert_eq!(page_limit(1, 3), 3);
        assert_eq!(page_limit(4, 4), 1);
        assert_eq!(page_limit(5, 4), 0);
        assert_eq!(StopReason::NoNextPage.as_str(), "no_next_page");
    }
}

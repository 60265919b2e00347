pub mod cancel;
pub mod chunk;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod inference;
pub mod next_page;
pub mod page;
pub mod result;
pub mod selectors;
pub mod traversal;

pub use cancel::CancellationToken;
pub use chunk::{DEFAULT_CHUNK_CHARS, chunk_markup};
pub use error::ScanError;
pub use fetcher::{HttpFetcher, PageFetcher};
pub use inference::{ModelConfig, OpenAiSelectorClient, SelectorInference, infer_chunks};
pub use next_page::NextPageResolver;
pub use result::{ChapterContent, ChapterRecord, ContentType};
pub use selectors::{SelectorSet, aggregate};
pub use traversal::{ProgressCallback, ProgressEvent, StopReason, Traversal, TraversalOutcome};

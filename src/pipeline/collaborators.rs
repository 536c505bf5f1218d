//! External collaborator interfaces and the data they exchange
//!
//! Methods return boxed futures so the traits stay object safe and can be
//! shared as `Arc<dyn ...>` between concurrently running steps.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::ChainLink;
use crate::error::PipelineResult;

/// A chapter as returned by a [`Fetcher`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedChapter {
    pub url: String,
    pub title: String,
    pub content: String,
    pub next_url: Option<String>,
}

/// Retrieves chapters by identifier
pub trait Fetcher: Send + Sync {
    /// Fails with [`PipelineError::NotFound`](crate::PipelineError::NotFound)
    /// when the identifier does not exist
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, PipelineResult<FetchedChapter>>;
}

/// A remote text transformation such as translation or speech synthesis
pub trait Transformer: Send + Sync {
    /// Stable id used for health tracking and cache keys
    fn provider_id(&self) -> &str;

    fn transform<'a>(&'a self, text: &'a str) -> BoxFuture<'a, PipelineResult<String>>;
}

/// Persists a finished chapter
pub trait Writer: Send + Sync {
    /// Returns where the chapter was written, if anywhere
    fn write<'a>(&'a self, outcome: &'a ChapterOutcome) -> BoxFuture<'a, PipelineResult<Option<PathBuf>>>;
}

/// A fully processed chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterOutcome {
    pub url: String,
    pub title: String,
    pub source_text: String,
    pub transformed_text: String,
    /// Transformer that produced `transformed_text`
    pub provider: String,
    pub next_url: Option<String>,
    pub output_path: Option<PathBuf>,
    /// True when the transformation came from the cache
    pub from_cache: bool,
    pub elapsed: Duration,
}

impl ChainLink for ChapterOutcome {
    fn title(&self) -> Option<&str> {
        Some(self.title.as_str())
    }

    fn next_identifier(&self) -> Option<&str> {
        self.next_url.as_deref()
    }
}

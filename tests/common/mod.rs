//! Test utilities shared by the integration suites

use chapterflow::{FailureKind, FetchedChapter, Fetcher, PipelineError, PipelineResult, Transformer};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Install a test logger once per binary; honours `RUST_LOG`
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fetcher backed by an in-memory chain of chapters
#[allow(dead_code)]
pub struct ChainFetcher {
    chapters: HashMap<String, FetchedChapter>,
    failures: HashMap<String, FailureKind>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ChainFetcher {
    /// `links` pairs each URL with its declared next URL
    pub fn new(links: &[(&str, Option<&str>)]) -> Self {
        let chapters = links
            .iter()
            .map(|(url, next)| {
                (
                    url.to_string(),
                    FetchedChapter {
                        url: url.to_string(),
                        title: format!("Chapter at {url}"),
                        content: format!("original text of {url}"),
                        next_url: next.map(str::to_string),
                    },
                )
            })
            .collect();
        Self {
            chapters,
            failures: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every fetch of `url` fail with a transient `kind` error
    pub fn with_failure(mut self, url: &str, kind: FailureKind) -> Self {
        self.failures.insert(url.to_string(), kind);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for ChainFetcher {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, PipelineResult<FetchedChapter>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(&kind) = self.failures.get(identifier) {
            let error = PipelineError::operational(kind, format!("{identifier}: connection reset"));
            return Box::pin(async move { Err(error) });
        }
        let result = self
            .chapters
            .get(identifier)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(identifier));
        Box::pin(async move { result })
    }
}

/// Transformer that upper-cases text, or always fails with `failure`
#[allow(dead_code)]
pub struct ScriptedTransformer {
    id: String,
    failure: Option<FailureKind>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedTransformer {
    pub fn working(id: &str) -> Self {
        Self {
            id: id.to_string(),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(id: &str, kind: FailureKind) -> Self {
        Self {
            id: id.to_string(),
            failure: Some(kind),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transformer for ScriptedTransformer {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn transform<'a>(&'a self, text: &'a str) -> BoxFuture<'a, PipelineResult<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.failure {
            Some(kind) => Err(PipelineError::operational(kind, format!("{} unavailable", self.id))),
            None => Ok(text.to_uppercase()),
        };
        Box::pin(async move { result })
    }
}

//! Chain discovery by following `next_url` links through a [`Fetcher`]
//!
//! Fetched chapters are stored in the content cache, so the batch run that
//! follows discovery does not fetch them a second time.

use futures::future::BoxFuture;
use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

use super::chapter::FETCH_OPERATION;
use super::collaborators::Fetcher;
use crate::cache::{CacheManager, CacheNamespace};
use crate::engine::{ChainDiscovery, RetryPolicy, with_retry};
use crate::error::PipelineResult;

pub struct FetcherDiscovery {
    fetcher: Arc<dyn Fetcher>,
    cache: Option<Arc<CacheManager>>,
    retry: RetryPolicy,
}

impl FetcherDiscovery {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            cache: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Store discovered chapters in `cache` under the fetch key the pipeline reads
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn walk(&self, start: &str, max_items: usize) -> PipelineResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(start.to_string());

        while let Some(identifier) = current.take() {
            if chain.len() >= max_items || !seen.insert(identifier.clone()) {
                break;
            }

            let context = format!("discover {identifier}");
            let chapter = match with_retry(&self.retry, &context, |_| {
                self.fetcher.fetch(&identifier)
            })
            .await
            {
                Ok(chapter) => chapter,
                Err(e) if e.is_not_found() && !chain.is_empty() => {
                    debug!("Discovery stopped at missing {identifier}");
                    break;
                }
                Err(e) => return Err(e),
            };

            if let Some(cache) = &self.cache {
                cache.set_as(
                    CacheNamespace::Content,
                    FETCH_OPERATION,
                    &[identifier.as_str()],
                    &chapter,
                )?;
            }

            current = chapter.next_url;
            chain.push(identifier);
        }

        info!("Discovered {} chapters from {start}", chain.len());
        Ok(chain)
    }
}

impl ChainDiscovery for FetcherDiscovery {
    fn discover<'a>(
        &'a self,
        start: &'a str,
        max_items: usize,
    ) -> BoxFuture<'a, PipelineResult<Vec<String>>> {
        Box::pin(self.walk(start, max_items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::error::PipelineError;
    use crate::pipeline::FetchedChapter;
    use std::collections::HashMap;

    struct MapFetcher {
        chapters: HashMap<String, FetchedChapter>,
    }

    impl MapFetcher {
        fn new(links: &[(&str, Option<&str>)]) -> Self {
            let chapters = links
                .iter()
                .map(|(url, next)| {
                    (
                        url.to_string(),
                        FetchedChapter {
                            url: url.to_string(),
                            title: format!("Chapter {url}"),
                            content: format!("text of {url}"),
                            next_url: next.map(str::to_string),
                        },
                    )
                })
                .collect();
            Self { chapters }
        }
    }

    impl Fetcher for MapFetcher {
        fn fetch<'a>(
            &'a self,
            identifier: &'a str,
        ) -> BoxFuture<'a, PipelineResult<FetchedChapter>> {
            let result = self
                .chapters
                .get(identifier)
                .cloned()
                .ok_or_else(|| PipelineError::not_found(identifier));
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn test_follows_links_until_end() {
        let fetcher = Arc::new(MapFetcher::new(&[
            ("u1", Some("u2")),
            ("u2", Some("u3")),
            ("u3", None),
        ]));
        let discovery = FetcherDiscovery::new(fetcher);

        let chain = discovery.discover("u1", 10).await.expect("discovery");
        assert_eq!(chain, vec!["u1", "u2", "u3"]);

        let capped = discovery.discover("u1", 2).await.expect("discovery");
        assert_eq!(capped, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_stops_on_cycle_and_missing_link() {
        let cyclic = FetcherDiscovery::new(Arc::new(MapFetcher::new(&[
            ("a", Some("b")),
            ("b", Some("a")),
        ])));
        assert_eq!(cyclic.discover("a", 10).await.expect("discovery"), vec!["a", "b"]);

        let dangling = FetcherDiscovery::new(Arc::new(MapFetcher::new(&[("a", Some("gone"))])));
        assert_eq!(dangling.discover("a", 10).await.expect("discovery"), vec!["a"]);

        let missing_start = FetcherDiscovery::new(Arc::new(MapFetcher::new(&[])));
        assert!(missing_start.discover("a", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_populates_content_cache() {
        let cache = Arc::new(CacheManager::new(&CacheConfig::default()).expect("valid config"));
        let discovery = FetcherDiscovery::new(Arc::new(MapFetcher::new(&[("u1", None)])))
            .with_cache(Arc::clone(&cache));

        discovery.discover("u1", 10).await.expect("discovery");
        let cached: Option<FetchedChapter> = cache
            .get_as(CacheNamespace::Content, FETCH_OPERATION, &["u1"])
            .expect("lookup");
        assert_eq!(cached.map(|c| c.title), Some("Chapter u1".to_string()));
    }
}

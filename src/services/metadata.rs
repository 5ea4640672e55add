//! Metadata resolution
//!
//! Turns a classifier guess into a canonical title/year. One lookup per
//! file against a [`MetadataSource`]; anything that goes wrong (network,
//! auth, timeout, no results) falls back to the locally derived guess so the
//! file still gets linked.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::filename_parser::{Classification, MediaKind};
use super::text_utils::normalize_title;

/// A lookup request: title, kind and optional year hint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupQuery {
    pub title: String,
    pub kind: MediaKind,
    pub year: Option<u32>,
}

impl LookupQuery {
    pub fn from_classification(classification: &Classification) -> Self {
        Self {
            title: classification.title().to_string(),
            kind: classification.kind(),
            year: classification.year(),
        }
    }
}

/// One result returned by a metadata provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCandidate {
    pub title: String,
    pub year: Option<u32>,
}

impl MetadataCandidate {
    pub fn new(title: impl Into<String>, year: Option<u32>) -> Self {
        Self {
            title: title.into(),
            year,
        }
    }
}

/// Where a resolved name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataOrigin {
    Provider,
    Fallback,
}

/// Canonical naming for a file. The title is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMetadata {
    pub title: String,
    pub year: Option<u32>,
    pub origin: MetadataOrigin,
}

impl ResolvedMetadata {
    /// Local naming straight from the classifier
    pub fn fallback(classification: &Classification) -> Self {
        Self {
            title: classification.title().to_string(),
            year: classification.year(),
            origin: MetadataOrigin::Fallback,
        }
    }
}

/// External metadata provider
///
/// Returns candidates in the provider's relevance order; an empty list means
/// nothing matched.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &LookupQuery) -> Result<Vec<MetadataCandidate>>;
}

/// Resolves classifier guesses against a metadata source
pub struct MetadataResolver {
    source: Arc<dyn MetadataSource>,
    timeout: Duration,
    /// Best match per query for the current sweep; failed lookups are not kept.
    memo: HashMap<LookupQuery, Option<MetadataCandidate>>,
}

impl MetadataResolver {
    pub fn new(source: Arc<dyn MetadataSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            memo: HashMap::new(),
        }
    }

    /// Forget lookups from the previous sweep
    pub fn begin_pass(&mut self) {
        self.memo.clear();
    }

    /// Resolve canonical naming, falling back to the local guess
    pub async fn resolve(&mut self, classification: &Classification) -> ResolvedMetadata {
        let query = LookupQuery::from_classification(classification);

        let cached = self.memo.get(&query).cloned();
        let best = match cached {
            Some(best) => best,
            None => match self.lookup(&query).await {
                Some(best) => {
                    self.memo.insert(query.clone(), best.clone());
                    best
                }
                None => None,
            },
        };

        match best {
            Some(candidate) => {
                debug!(
                    query = %query.title,
                    title = %candidate.title,
                    year = ?candidate.year,
                    "Resolved metadata"
                );
                ResolvedMetadata {
                    title: candidate.title,
                    year: candidate.year.or(query.year),
                    origin: MetadataOrigin::Provider,
                }
            }
            None => ResolvedMetadata::fallback(classification),
        }
    }

    /// Run one bounded lookup. `None` means the lookup failed (not memoized),
    /// `Some(None)` means the provider had nothing usable.
    async fn lookup(&self, query: &LookupQuery) -> Option<Option<MetadataCandidate>> {
        let result = tokio::time::timeout(self.timeout, self.source.search(query)).await;

        match result {
            Ok(Ok(candidates)) => {
                let best = select_best(query, &candidates);
                if best.is_none() {
                    warn!(
                        source = self.source.name(),
                        kind = query.kind.as_str(),
                        title = %query.title,
                        year = ?query.year,
                        "No metadata results, using local naming"
                    );
                }
                Some(best)
            }
            Ok(Err(e)) => {
                warn!(
                    source = self.source.name(),
                    title = %query.title,
                    error = %e,
                    "Metadata lookup failed, using local naming"
                );
                None
            }
            Err(_) => {
                warn!(
                    source = self.source.name(),
                    title = %query.title,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Metadata lookup timed out, using local naming"
                );
                None
            }
        }
    }
}

/// Pick the best candidate for a query.
///
/// Candidates whose title equals the query are preferred; otherwise the
/// candidates sharing the first result's title form the pool. Within the
/// pool an exact year wins, then the closest year, then provider order.
pub fn select_best(query: &LookupQuery, candidates: &[MetadataCandidate]) -> Option<MetadataCandidate> {
    let usable: Vec<&MetadataCandidate> = candidates
        .iter()
        .filter(|c| !c.title.trim().is_empty())
        .collect();
    let first = usable.first()?;

    let wanted = normalize_title(&query.title);
    let mut pool: Vec<&MetadataCandidate> = usable
        .iter()
        .copied()
        .filter(|c| normalize_title(&c.title) == wanted)
        .collect();
    if pool.is_empty() {
        let first_title = normalize_title(&first.title);
        pool = usable
            .iter()
            .copied()
            .filter(|c| normalize_title(&c.title) == first_title)
            .collect();
    }

    let chosen = match query.year {
        // min_by_key keeps the earliest of equal keys, so provider order breaks ties
        Some(hint) => pool
            .iter()
            .copied()
            .min_by_key(|c| c.year.map_or(u32::MAX, |y| y.abs_diff(hint)))?,
        None => *pool.first()?,
    };

    let mut chosen = chosen.clone();
    chosen.title = chosen.title.trim().to_string();
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::bail;

    use super::*;

    fn query(title: &str, year: Option<u32>) -> LookupQuery {
        LookupQuery {
            title: title.to_string(),
            kind: MediaKind::Movie,
            year,
        }
    }

    struct FixedSource {
        results: Result<Vec<MetadataCandidate>, String>,
        calls: Mutex<usize>,
    }

    impl FixedSource {
        fn ok(results: Vec<MetadataCandidate>) -> Self {
            Self {
                results: Ok(results),
                calls: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                results: Err("connection refused".to_string()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl MetadataSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(&self, _query: &LookupQuery) -> Result<Vec<MetadataCandidate>> {
            *self.calls.lock().unwrap() += 1;
            match &self.results {
                Ok(results) => Ok(results.clone()),
                Err(e) => bail!("{}", e),
            }
        }
    }

    struct SlowSource;

    #[async_trait]
    impl MetadataSource for SlowSource {
        fn name(&self) -> &str {
            "slow"
        }

        async fn search(&self, _query: &LookupQuery) -> Result<Vec<MetadataCandidate>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![MetadataCandidate::new("Too Late", Some(2000))])
        }
    }

    #[test]
    fn test_select_best_first_result_without_year() {
        let candidates = vec![
            MetadataCandidate::new("Alien", Some(1979)),
            MetadataCandidate::new("Aliens", Some(1986)),
        ];
        let best = select_best(&query("alien", None), &candidates).unwrap();
        assert_eq!(best, MetadataCandidate::new("Alien", Some(1979)));
    }

    #[test]
    fn test_select_best_prefers_exact_title() {
        let candidates = vec![
            MetadataCandidate::new("The Thing from Another World", Some(1951)),
            MetadataCandidate::new("The Thing", Some(1982)),
        ];
        let best = select_best(&query("The Thing", None), &candidates).unwrap();
        assert_eq!(best.title, "The Thing");
    }

    #[test]
    fn test_select_best_closest_year_among_shared_titles() {
        let candidates = vec![
            MetadataCandidate::new("Dune", Some(2021)),
            MetadataCandidate::new("Dune", Some(1984)),
            MetadataCandidate::new("Dune", None),
        ];
        let best = select_best(&query("Dune", Some(1985)), &candidates).unwrap();
        assert_eq!(best.year, Some(1984));

        let best = select_best(&query("Dune", Some(2021)), &candidates).unwrap();
        assert_eq!(best.year, Some(2021));
    }

    #[test]
    fn test_select_best_ignores_blank_titles() {
        let candidates = vec![MetadataCandidate::new("  ", Some(2000))];
        assert!(select_best(&query("Anything", None), &candidates).is_none());
        assert!(select_best(&query("Anything", None), &[]).is_none());
    }

    #[tokio::test]
    async fn test_resolve_uses_provider_title() {
        let source = Arc::new(FixedSource::ok(vec![MetadataCandidate::new("The Matrix", Some(1999))]));
        let mut resolver = MetadataResolver::new(source, Duration::from_secs(5));

        let classification = Classification::Movie {
            title: "the matrix".to_string(),
            year: Some(1999),
        };
        let resolved = resolver.resolve(&classification).await;
        assert_eq!(resolved.title, "The Matrix");
        assert_eq!(resolved.year, Some(1999));
        assert_eq!(resolved.origin, MetadataOrigin::Provider);
    }

    #[tokio::test]
    async fn test_resolve_keeps_local_year_when_provider_has_none() {
        let source = Arc::new(FixedSource::ok(vec![MetadataCandidate::new("Show Name", None)]));
        let mut resolver = MetadataResolver::new(source, Duration::from_secs(5));

        let classification = Classification::Episode {
            title: "Show Name".to_string(),
            season: 1,
            episode: 2,
            year: Some(2010),
        };
        assert_eq!(resolver.resolve(&classification).await.year, Some(2010));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_error() {
        let source = Arc::new(FixedSource::failing());
        let mut resolver = MetadataResolver::new(source.clone(), Duration::from_secs(5));

        let classification = Classification::Movie {
            title: "Obscure Title".to_string(),
            year: Some(2020),
        };
        let resolved = resolver.resolve(&classification).await;
        assert_eq!(resolved, ResolvedMetadata::fallback(&classification));
        assert_eq!(resolved.title, "Obscure Title");
        assert_eq!(resolved.year, Some(2020));

        // failures are not memoized
        resolver.resolve(&classification).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_empty_results() {
        let source = Arc::new(FixedSource::ok(vec![]));
        let mut resolver = MetadataResolver::new(source, Duration::from_secs(5));

        let classification = Classification::Movie {
            title: "Obscure Title".to_string(),
            year: None,
        };
        let resolved = resolver.resolve(&classification).await;
        assert_eq!(resolved.origin, MetadataOrigin::Fallback);
        assert_eq!(resolved.year, None);
    }

    #[tokio::test]
    async fn test_resolve_memoizes_within_a_pass() {
        let source = Arc::new(FixedSource::ok(vec![MetadataCandidate::new("Show", Some(2010))]));
        let mut resolver = MetadataResolver::new(source.clone(), Duration::from_secs(5));

        for episode in 1..=3 {
            let classification = Classification::Episode {
                title: "Show".to_string(),
                season: 1,
                episode,
                year: None,
            };
            resolver.resolve(&classification).await;
        }
        assert_eq!(source.calls(), 1);

        resolver.begin_pass();
        resolver
            .resolve(&Classification::Episode {
                title: "Show".to_string(),
                season: 1,
                episode: 4,
                year: None,
            })
            .await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_resolve_times_out_to_fallback() {
        let mut resolver = MetadataResolver::new(Arc::new(SlowSource), Duration::from_millis(50));

        let classification = Classification::Movie {
            title: "Slow Movie".to_string(),
            year: None,
        };
        let resolved = resolver.resolve(&classification).await;
        assert_eq!(resolved.title, "Slow Movie");
        assert_eq!(resolved.origin, MetadataOrigin::Fallback);
    }
}

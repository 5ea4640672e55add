//! TMDB (The Movie Database) API client
//!
//! Base URL: https://api.themoviedb.org/3
//!
//! Only the search endpoints are used: `search/movie` for films and
//! `search/tv` for episodes. Requests go through a rate-limited client so a
//! sweep over a freshly filled drive stays under TMDB's ~40 req/10s.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::filename_parser::MediaKind;
use super::metadata::{LookupQuery, MetadataCandidate, MetadataSource};
use super::rate_limiter::RateLimitedClient;
use super::text_utils::year_from_date;

pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";

/// TMDB API client with rate limiting
pub struct TmdbClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: String,
}

/// Paged search response from TMDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbSearchResult<T> {
    #[serde(default)]
    pub page: i32,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: i32,
    #[serde(default)]
    pub total_results: i32,
}

/// Movie entry from a TMDB search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbMovie {
    pub id: i32,
    #[serde(default)]
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<String>,
    pub popularity: Option<f64>,
}

impl TmdbMovie {
    pub fn year(&self) -> Option<u32> {
        year_from_date(self.release_date.as_deref())
    }
}

/// TV show entry from a TMDB search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbShow {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    pub original_name: Option<String>,
    pub first_air_date: Option<String>,
    pub popularity: Option<f64>,
}

impl TmdbShow {
    pub fn year(&self) -> Option<u32> {
        year_from_date(self.first_air_date.as_deref())
    }
}

impl TmdbClient {
    /// Create a new TMDB client whose requests give up after `timeout`
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Arc::new(RateLimitedClient::for_tmdb(timeout)?),
            base_url: TMDB_BASE_URL.to_string(),
            api_key,
        })
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Search for movies by title, optionally narrowed by release year
    pub async fn search_movies(&self, query: &str, year: Option<u32>) -> Result<Vec<TmdbMovie>> {
        let url = format!("{}/search/movie", self.base_url);
        let mut params = self.base_params(query);
        if let Some(y) = year {
            params.push(("year", y.to_string()));
        }

        let response = self.client.get_with_query(&url, &params).await?;
        let results: TmdbSearchResult<TmdbMovie> = check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse TMDB movie search results")?;

        debug!(query = %query, count = results.results.len(), "TMDB movie search returned results");
        Ok(results.results)
    }

    /// Search for TV shows by name, optionally narrowed by first air year
    pub async fn search_shows(&self, query: &str, year: Option<u32>) -> Result<Vec<TmdbShow>> {
        let url = format!("{}/search/tv", self.base_url);
        let mut params = self.base_params(query);
        if let Some(y) = year {
            params.push(("first_air_date_year", y.to_string()));
        }

        let response = self.client.get_with_query(&url, &params).await?;
        let results: TmdbSearchResult<TmdbShow> = check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse TMDB TV search results")?;

        debug!(query = %query, count = results.results.len(), "TMDB TV search returned results");
        Ok(results.results)
    }

    fn base_params(&self, query: &str) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", self.api_key.clone()),
            ("query", query.to_string()),
            ("include_adult", "false".to_string()),
            ("language", "en-US".to_string()),
            ("page", "1".to_string()),
        ]
    }
}

async fn check_status(response: Response) -> Result<Response> {
    match response.status() {
        StatusCode::UNAUTHORIZED => anyhow::bail!("TMDB API key is invalid"),
        StatusCode::TOO_MANY_REQUESTS => {
            warn!("TMDB rate limit hit");
            anyhow::bail!("Rate limited (429)")
        }
        status if !status.is_success() => {
            anyhow::bail!("TMDB search failed with status: {}", status)
        }
        _ => Ok(response),
    }
}

#[async_trait]
impl MetadataSource for TmdbClient {
    fn name(&self) -> &str {
        "tmdb"
    }

    async fn search(&self, query: &LookupQuery) -> Result<Vec<MetadataCandidate>> {
        if !self.has_api_key() {
            anyhow::bail!("TMDB API key not configured");
        }

        let candidates = match query.kind {
            MediaKind::Movie => self
                .search_movies(&query.title, query.year)
                .await?
                .into_iter()
                .map(|m| {
                    let year = m.year();
                    MetadataCandidate::new(m.title, year)
                })
                .collect(),
            MediaKind::Episode => self
                .search_shows(&query.title, query.year)
                .await?
                .into_iter()
                .map(|s| {
                    let year = s.year();
                    MetadataCandidate::new(s.name, year)
                })
                .collect(),
        };

        Ok(candidates)
    }
}

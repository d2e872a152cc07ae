//! API client for the TMDB v3 REST catalogue.
//!
//! This module provides the `CatalogClient` struct for paged listings,
//! title search, and batch lookups by id.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{Movie, MoviePage, DEFAULT_LANGUAGE};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL for TMDB v3 endpoints
pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Base URL for poster images at a list-friendly width
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum concurrent requests when resolving a batch of movie ids.
/// Keeps a large watchlist from tripping the catalogue's rate limiter.
const MAX_CONCURRENT_REQUESTS: usize = 10;

/// API client for the movie catalogue.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    base_url: String,
    api_key: Option<Arc<String>>,
    language: String,
}

impl CatalogClient {
    /// Create a new catalogue client against `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            language: DEFAULT_LANGUAGE.to_string(),
        })
    }

    /// Create a new client with the given key, sharing the connection pool.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            api_key: Some(Arc::new(api_key.into())),
            language: self.language.clone(),
        }
    }

    /// Set the language catalogue text is returned in (e.g. "fr-FR")
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// TMDB accepts either a v3 key as a query parameter or a v4 read
    /// access token (a JWT) as a bearer header.
    fn is_bearer_token(key: &str) -> bool {
        key.starts_with("eyJ") && key.matches('.').count() == 2
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, ApiError> {
        let key = self.api_key.as_deref().ok_or(ApiError::MissingApiKey)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .get(&url)
            .query(&[("language", self.language.as_str())])
            .query(params);
        request = if Self::is_bearer_token(key) {
            request.bearer_auth(key)
        } else {
            request.query(&[("api_key", key.as_str())])
        };

        debug!(path = path, "Sending catalogue request");
        let response = request.send().await?;
        let response = Self::check_response(response).await?;

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
    }

    // ===== Catalogue Methods =====

    /// Fetch one page of currently popular movies (pages start at 1)
    pub async fn popular_movies(&self, page: u32) -> Result<MoviePage, ApiError> {
        self.get("/movie/popular", &[("page", page.max(1).to_string())]).await
    }

    /// Search movies by title. A blank query returns an empty page without
    /// contacting the catalogue.
    pub async fn search_movies(&self, query: &str, page: u32) -> Result<MoviePage, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(MoviePage {
                page: 1,
                ..MoviePage::default()
            });
        }

        self.get(
            "/search/movie",
            &[
                ("query", query.to_string()),
                ("page", page.max(1).to_string()),
                ("include_adult", "false".to_string()),
            ],
        )
        .await
    }

    /// Fetch a single movie by id
    pub async fn movie(&self, movie_id: i64) -> Result<Movie, ApiError> {
        self.get(&format!("/movie/{}", movie_id), &[]).await
    }

    /// Fetch several movies by id, keeping the order of `ids`.
    ///
    /// Ids the catalogue no longer knows are skipped; any other failure
    /// aborts the batch.
    pub async fn movies_by_ids(&self, ids: &[i64]) -> Result<Vec<Movie>, ApiError> {
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        let results: Vec<(i64, Result<Movie, ApiError>)> = stream::iter(unique)
            .map(|id| async move { (id, self.movie(id).await) })
            .buffered(MAX_CONCURRENT_REQUESTS)
            .collect()
            .await;

        let mut movies = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(movie) => movies.push(movie),
                Err(ApiError::NotFound(_)) => {
                    warn!(movie_id = id, "Movie missing from catalogue, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(movies)
    }
}

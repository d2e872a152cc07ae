//! Catalogue movie types.
//!
//! Field names follow the TMDB v3 JSON schema, so these types deserialize
//! straight from catalogue responses.

use serde::{Deserialize, Serialize};

use crate::utils::{format_date, truncate_string};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub vote_average: f64,
}

impl Movie {
    /// Year component of the release date, if the catalogue has one.
    pub fn release_year(&self) -> Option<i32> {
        self.release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    }

    pub fn formatted_release_date(&self) -> String {
        match self.release_date.as_deref() {
            Some(date) if !date.is_empty() => format_date(date),
            _ => "TBD".to_string(),
        }
    }

    pub fn poster_url(&self, image_base_url: &str) -> Option<String> {
        self.poster_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}{}", image_base_url.trim_end_matches('/'), p))
    }

    pub fn rating_display(&self) -> String {
        format!("{:.1}", self.vote_average)
    }

    pub fn short_overview(&self, max_len: usize) -> String {
        truncate_string(&self.overview, max_len)
    }
}

/// One page of a paged catalogue listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MoviePage {
    pub page: u32,
    #[serde(default)]
    pub results: Vec<Movie>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

impl MoviePage {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

//! REST client module for the TMDB movie catalogue.
//!
//! This module provides the `CatalogClient` for paged popular listings,
//! search by title, and batch lookups by movie id. Responses are consumed
//! in TMDB's own JSON schema; nothing fetched here is persisted.

pub mod client;
pub mod error;

pub use client::{CatalogClient, DEFAULT_BASE_URL, DEFAULT_IMAGE_BASE_URL};
pub use error::ApiError;

//! movienight core library.
//!
//! Movie-watching groups backed by a local row cache, a remote document
//! store mirrored into that cache, and the TMDB catalogue. Screens consume
//! the `Repository` through view-models that publish immutable state.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod repository;
pub mod sync;
pub mod usecases;
pub mod utils;
pub mod validation;
pub mod viewmodel;

pub use error::{AppError, ErrorKind};
pub use repository::{RepoResult, Repository};

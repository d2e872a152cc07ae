//! Data models for movienight entities.
//!
//! This module contains the domain values shared by every layer:
//!
//! - `Group`: a named set of members with shared watched / to-watch lists
//! - `User`, `SelectedMovie`: account data and per-group movie selections
//! - `Movie`, `MoviePage`: catalogue entries as returned by TMDB
//! - `MovieStatus`, `MovieAction`, `StatusKey`: per-user watch state

pub mod group;
pub mod movie;
pub mod status;
pub mod user;

pub use group::Group;
pub use movie::{Movie, MoviePage};
pub use status::{MovieAction, MovieStatus, StatusKey};
pub use user::{SelectedMovie, User, DEFAULT_LANGUAGE};

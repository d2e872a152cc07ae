//! Local cache store for offline display.
//!
//! This module provides the `CacheStore`, an owned row store holding the
//! last-known groups, users, group memberships and movie-status rows.
//! Deleting a group cascades to its member and status rows. Every write
//! bumps a change counter that live queries watch, and file-backed stores
//! persist the tables as JSON after each write.

pub mod cached;
pub mod error;
pub mod rows;
pub mod store;

pub use cached::CachedData;
pub use error::CacheError;
pub use rows::{GroupRow, MirroredGroup, StatusRow, UserRow};
pub use store::CacheStore;

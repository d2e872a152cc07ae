//! One-way mirroring of remote documents into the local cache.
//!
//! This module provides:
//! - `GroupMirror`: follows the remote groups a user belongs to and keeps
//!   the cache's group, member and user rows in step with them
//! - `UserLookup`: resolves member ids into users while mirroring
//! - `MirrorHandle`: the cancellable handle a mirror task hands back
//!
//! The ids of groups a mirror wrote are kept in the cache itself, so a
//! group deleted remotely while no mirror ran is still removed on the next
//! run.
//!
//! Remote changes always win over cached rows; there is no conflict
//! resolution beyond last-write-wins.

pub mod mirror;

pub use mirror::{GroupMirror, GroupSnapshot, MirrorHandle, RemoteUserLookup, UserLookup};

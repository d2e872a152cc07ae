//! Signed-in user session.
//!
//! This module provides:
//! - `Session`: the signed-in user persisted in the cache directory
//!
//! Sign-in itself belongs to an external provider; the session only
//! remembers who is signed in.

pub mod session;

pub use session::{Session, SessionData};

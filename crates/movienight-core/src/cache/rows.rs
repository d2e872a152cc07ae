//! Row shapes stored by the cache.
//!
//! Group membership lives in its own table, so `GroupRow` carries no
//! member list; `MirroredGroup` bundles a group row with its resolved
//! members the way the remote mirror produces it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Group, MovieStatus, SelectedMovie, StatusKey, User};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub watched_movie_ids: Vec<i64>,
    pub to_watch_movie_ids: Vec<i64>,
    pub updated_at: DateTime<Utc>,
}

impl GroupRow {
    /// Split a domain group into its row and its member ids.
    pub fn from_group(group: &Group) -> (Self, Vec<String>) {
        let row = Self {
            id: group.id.clone(),
            owner_id: group.owner_id.clone(),
            name: group.name.clone(),
            watched_movie_ids: group.watched_movie_ids.clone(),
            to_watch_movie_ids: group.to_watch_movie_ids.clone(),
            updated_at: group.updated_at,
        };
        (row, group.members.clone())
    }

    pub fn into_group(self, members: Vec<String>) -> Group {
        Group {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            members,
            watched_movie_ids: self.watched_movie_ids,
            to_watch_movie_ids: self.to_watch_movie_ids,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub language: String,
    pub watched: Vec<SelectedMovie>,
    pub to_watch: Vec<SelectedMovie>,
}

impl UserRow {
    pub fn is_placeholder(&self) -> bool {
        self.email.is_empty()
    }

    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            language: self.language,
            watched: self.watched,
            to_watch: self.to_watch,
        }
    }
}

impl From<User> for UserRow {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            language: user.language,
            watched: user.watched,
            to_watch: user.to_watch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRow {
    pub group_id: String,
    pub user_id: String,
    pub movie_id: i64,
    pub status: MovieStatus,
}

impl StatusRow {
    pub fn new(key: StatusKey, status: MovieStatus) -> Self {
        Self {
            group_id: key.group_id,
            user_id: key.user_id,
            movie_id: key.movie_id,
            status,
        }
    }

    pub fn key(&self) -> StatusKey {
        StatusKey::new(self.group_id.clone(), self.user_id.clone(), self.movie_id)
    }
}

/// A group translated from a remote document, with its members resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MirroredGroup {
    pub group: GroupRow,
    pub members: Vec<UserRow>,
}

impl MirroredGroup {
    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }
}

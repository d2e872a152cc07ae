//! Document shapes stored in the remote collections.
//!
//! These are the remote wire shapes (camelCase keys, optional fields that
//! older clients may not have written) together with their conversions to
//! the domain `Group` and `User`.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::models::{Group, SelectedMovie, User, DEFAULT_LANGUAGE};

use super::{Document, RemoteError, RemoteResult};

/// Array field of a group document listing member ids
pub const MEMBERS_FIELD: &str = "members";

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn to_document<T: Serialize>(value: &T) -> RemoteResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(RemoteError::Malformed {
            id: String::new(),
            reason: format!("expected an object, got {}", other),
        }),
    }
}

fn from_document<T: DeserializeOwned>(id: &str, data: &Document) -> RemoteResult<T> {
    serde_json::from_value(Value::Object(data.clone())).map_err(|e| RemoteError::Malformed {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDocument {
    #[serde(default)]
    pub owner_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub watched: Vec<i64>,
    #[serde(default)]
    pub to_watch: Vec<i64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GroupDocument {
    pub fn from_group(group: &Group) -> Self {
        Self {
            owner_id: Some(group.owner_id.clone()),
            name: group.name.clone(),
            members: group.members.clone(),
            watched: group.watched_movie_ids.clone(),
            to_watch: group.to_watch_movie_ids.clone(),
            updated_at: Some(group.updated_at),
        }
    }

    pub fn parse(id: &str, data: &Document) -> RemoteResult<Self> {
        from_document(id, data)
    }

    pub fn to_document(&self) -> RemoteResult<Document> {
        to_document(self)
    }

    /// Convert into a domain group.
    ///
    /// A document without an owner is rejected. A document whose owner is
    /// missing from the member list is repaired by putting the owner first.
    pub fn into_group(self, id: &str) -> RemoteResult<Group> {
        let owner_id = match self.owner_id {
            Some(owner) if !owner.trim().is_empty() => owner,
            _ => {
                return Err(RemoteError::Malformed {
                    id: id.to_string(),
                    reason: "group has no owner".to_string(),
                })
            }
        };

        let mut group = Group {
            id: id.to_string(),
            owner_id,
            name: self.name,
            members: self.members,
            watched_movie_ids: self.watched,
            to_watch_movie_ids: self.to_watch,
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        };
        if group.normalize_owner() {
            warn!(group_id = id, owner = %group.owner_id, "Group owner missing from members, normalized");
        }
        Ok(group)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    pub email: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub watched: Vec<SelectedMovie>,
    #[serde(default)]
    pub to_watch: Vec<SelectedMovie>,
}

impl UserDocument {
    pub fn from_user(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            language: user.language.clone(),
            watched: user.watched.clone(),
            to_watch: user.to_watch.clone(),
        }
    }

    pub fn parse(id: &str, data: &Document) -> RemoteResult<Self> {
        from_document(id, data)
    }

    pub fn to_document(&self) -> RemoteResult<Document> {
        to_document(self)
    }

    pub fn into_user(self, id: &str) -> User {
        User {
            id: id.to_string(),
            email: self.email,
            language: self.language,
            watched: self.watched,
            to_watch: self.to_watch,
        }
    }
}

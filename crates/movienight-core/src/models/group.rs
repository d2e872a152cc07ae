use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A movie-watching group.
///
/// The owner is always one of the members; `Group::new` enforces this and
/// `normalize_owner` repairs values read from elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub watched_movie_ids: Vec<i64>,
    #[serde(default)]
    pub to_watch_movie_ids: Vec<i64>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        Self {
            id: id.into(),
            members: vec![owner_id.clone()],
            owner_id,
            name: name.into(),
            watched_movie_ids: Vec::new(),
            to_watch_movie_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    /// Insert the owner at the front of the member list if it is missing.
    /// Returns true when the member list was changed.
    pub fn normalize_owner(&mut self) -> bool {
        if self.has_member(&self.owner_id) {
            return false;
        }
        self.members.insert(0, self.owner_id.clone());
        true
    }

    /// Add a member, ignoring duplicates. Returns true if the member was new.
    pub fn add_member(&mut self, user_id: &str) -> bool {
        if self.has_member(user_id) {
            return false;
        }
        self.members.push(user_id.to_string());
        true
    }

    pub fn remove_member(&mut self, user_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != user_id);
        before != self.members.len()
    }

    /// Every movie referenced by the group, watched first, without duplicates.
    pub fn movie_ids(&self) -> Vec<i64> {
        let mut ids = Vec::with_capacity(self.watched_movie_ids.len() + self.to_watch_movie_ids.len());
        for id in self.watched_movie_ids.iter().chain(self.to_watch_movie_ids.iter()) {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    pub fn display_member_count(&self) -> String {
        match self.members.len() {
            1 => "1 member".to_string(),
            n => format!("{} members", n),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Language used when an account has not picked one
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// A movie a user picked inside one of their groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedMovie {
    pub movie_id: i64,
    pub group_id: String,
    pub selected_at: DateTime<Utc>,
}

impl SelectedMovie {
    pub fn new(movie_id: i64, group_id: impl Into<String>) -> Self {
        Self {
            movie_id,
            group_id: group_id.into(),
            selected_at: Utc::now(),
        }
    }

    pub fn matches(&self, group_id: &str, movie_id: i64) -> bool {
        self.movie_id == movie_id && self.group_id == group_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub language: String,
    #[serde(default)]
    pub watched: Vec<SelectedMovie>,
    #[serde(default)]
    pub to_watch: Vec<SelectedMovie>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            watched: Vec::new(),
            to_watch: Vec::new(),
        }
    }

    /// Stand-in used when a member id cannot be resolved.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self::new(id, "")
    }

    pub fn is_placeholder(&self) -> bool {
        self.email.is_empty()
    }

    pub fn has_watched(&self, group_id: &str, movie_id: i64) -> bool {
        self.watched.iter().any(|s| s.matches(group_id, movie_id))
    }

    pub fn wants_to_watch(&self, group_id: &str, movie_id: i64) -> bool {
        self.to_watch.iter().any(|s| s.matches(group_id, movie_id))
    }

    /// Drop any selection of `movie_id` made in `group_id`.
    pub fn clear_selection(&mut self, group_id: &str, movie_id: i64) {
        self.watched.retain(|s| !s.matches(group_id, movie_id));
        self.to_watch.retain(|s| !s.matches(group_id, movie_id));
    }

    pub fn select_watched(&mut self, group_id: &str, movie_id: i64) {
        self.clear_selection(group_id, movie_id);
        self.watched.push(SelectedMovie::new(movie_id, group_id));
    }

    pub fn select_to_watch(&mut self, group_id: &str, movie_id: i64) {
        self.clear_selection(group_id, movie_id);
        self.to_watch.push(SelectedMovie::new(movie_id, group_id));
    }

    /// Selections belonging to one group, as (watched, to_watch) movie ids.
    pub fn selections_in(&self, group_id: &str) -> (Vec<i64>, Vec<i64>) {
        let pick = |list: &[SelectedMovie]| {
            list.iter()
                .filter(|s| s.group_id == group_id)
                .map(|s| s.movie_id)
                .collect::<Vec<_>>()
        };
        (pick(&self.watched), pick(&self.to_watch))
    }
}

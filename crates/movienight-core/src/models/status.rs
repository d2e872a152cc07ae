use serde::{Deserialize, Serialize};

/// Watch state of one movie, seen from one user inside one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovieStatus {
    NotInGroup,
    ToWatchByUser,
    ToWatchByOther,
    WatchedByUser,
    WatchedByOther,
}

impl MovieStatus {
    pub fn is_watched(&self) -> bool {
        matches!(self, MovieStatus::WatchedByUser | MovieStatus::WatchedByOther)
    }

    pub fn is_to_watch(&self) -> bool {
        matches!(self, MovieStatus::ToWatchByUser | MovieStatus::ToWatchByOther)
    }

    /// True when the state was set by the user it belongs to.
    pub fn is_own(&self) -> bool {
        matches!(self, MovieStatus::ToWatchByUser | MovieStatus::WatchedByUser)
    }
}

impl std::fmt::Display for MovieStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovieStatus::NotInGroup => write!(f, "Not in group"),
            MovieStatus::ToWatchByUser => write!(f, "To watch"),
            MovieStatus::ToWatchByOther => write!(f, "To watch (others)"),
            MovieStatus::WatchedByUser => write!(f, "Watched"),
            MovieStatus::WatchedByOther => write!(f, "Watched (others)"),
        }
    }
}

/// What a user asks for when toggling a movie inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovieAction {
    MarkWatched,
    MarkToWatch,
    Remove,
}

impl MovieAction {
    /// Status the acting user ends up with, or None when the entry goes away.
    pub fn resulting_status(&self) -> Option<MovieStatus> {
        match self {
            MovieAction::MarkWatched => Some(MovieStatus::WatchedByUser),
            MovieAction::MarkToWatch => Some(MovieStatus::ToWatchByUser),
            MovieAction::Remove => None,
        }
    }
}

/// Composite key of a status row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatusKey {
    pub group_id: String,
    pub user_id: String,
    pub movie_id: i64,
}

impl StatusKey {
    pub fn new(group_id: impl Into<String>, user_id: impl Into<String>, movie_id: i64) -> Self {
        Self {
            group_id: group_id.into(),
            user_id: user_id.into(),
            movie_id,
        }
    }
}

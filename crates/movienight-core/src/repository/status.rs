use futures::future::join_all;
use tracing::{info, warn};

use crate::cache::{CacheError, StatusRow};
use crate::error::AppError;
use crate::models::{Group, MovieAction, MovieStatus, StatusKey, User};
use crate::validation::validate_user_id;

use super::{RepoResult, Repository};

/// Status of a movie for a user with no row of their own: taken from the
/// group's shared lists, watched first.
pub(crate) fn derive_status(group: &Group, movie_id: i64) -> MovieStatus {
    if group.watched_movie_ids.contains(&movie_id) {
        MovieStatus::WatchedByOther
    } else if group.to_watch_movie_ids.contains(&movie_id) {
        MovieStatus::ToWatchByOther
    } else {
        MovieStatus::NotInGroup
    }
}

/// Append ids from `more` that are not already present, keeping order.
fn extend_unique(ids: &mut Vec<i64>, more: Vec<i64>) {
    for id in more {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}

impl Repository {
    /// Apply `action` for `user_id` to a movie inside a group.
    ///
    /// The user's selections and the group's shared lists are written
    /// remotely; the resulting status row is then recorded in the cache.
    /// Returns the status the user now sees.
    pub async fn set_movie_status(
        &self,
        group_id: &str,
        user_id: &str,
        movie_id: i64,
        action: MovieAction,
    ) -> RepoResult<MovieStatus> {
        validate_user_id(user_id)?;
        let mut group = self.fetch_remote_group(group_id).await?;
        if !group.has_member(user_id) {
            return Err(AppError::group(format!("{} is not a member of {}", user_id, group.name)));
        }

        let mut user = self.fetch_remote_user(user_id).await?;
        match action {
            MovieAction::MarkWatched => user.select_watched(group_id, movie_id),
            MovieAction::MarkToWatch => user.select_to_watch(group_id, movie_id),
            MovieAction::Remove => user.clear_selection(group_id, movie_id),
        }
        self.write_user(&user).await?;

        self.recompute_group_lists(&mut group, &user).await;
        group.touch();
        self.update_group_fields(&group, &["watched", "toWatch"]).await?;

        let key = StatusKey::new(group_id, user_id, movie_id);
        let status = match action.resulting_status() {
            Some(status) => {
                self.record_status(StatusRow::new(key, status));
                status
            }
            None => {
                if let Err(e) = self.cache.delete_status(&key) {
                    warn!(error = %e, group_id = group_id, movie_id = movie_id, "Failed to clear cached status");
                }
                derive_status(&group, movie_id)
            }
        };

        info!(group_id = group_id, user_id = user_id, movie_id = movie_id, status = %status, "Movie status changed");
        Ok(status)
    }

    /// Current status of a movie for a user inside a group, from the cache:
    /// the status row if there is one, else the user's own cached
    /// selections, else the group's shared lists. Rows contradicted by a
    /// newer mirrored user document are dropped by the cache.
    pub fn movie_status(&self, group_id: &str, user_id: &str, movie_id: i64) -> RepoResult<MovieStatus> {
        let key = StatusKey::new(group_id, user_id, movie_id);
        if let Some(status) = self.cache.get_status(&key)? {
            return Ok(status);
        }
        if let Some(user) = self.cache.get_user(user_id)? {
            let user = user.into_user();
            if user.has_watched(group_id, movie_id) {
                return Ok(MovieStatus::WatchedByUser);
            }
            if user.wants_to_watch(group_id, movie_id) {
                return Ok(MovieStatus::ToWatchByUser);
            }
        }
        Ok(self
            .cache
            .get_group(group_id)?
            .map(|group| derive_status(&group, movie_id))
            .unwrap_or(MovieStatus::NotInGroup))
    }

    /// Drop the cached status row. Returns whether a row existed.
    pub fn clear_movie_status(&self, group_id: &str, user_id: &str, movie_id: i64) -> RepoResult<bool> {
        Ok(self.cache.delete_status(&StatusKey::new(group_id, user_id, movie_id))?)
    }

    pub fn group_movie_statuses(&self, group_id: &str) -> RepoResult<Vec<StatusRow>> {
        Ok(self.cache.statuses_for_group(group_id)?)
    }

    /// Rebuild the group's lists as the union of every member's selections.
    /// `acting` is used as-is; other members are read remotely and skipped
    /// when they cannot be.
    async fn recompute_group_lists(&self, group: &mut Group, acting: &User) {
        let others = group.members.iter().filter(|id| **id != acting.id);
        let fetched = join_all(others.map(|id| self.fetch_remote_user(id))).await;

        let mut watched = Vec::new();
        let mut to_watch = Vec::new();
        let (w, t) = acting.selections_in(&group.id);
        extend_unique(&mut watched, w);
        extend_unique(&mut to_watch, t);

        for result in fetched {
            match result {
                Ok(member) => {
                    let (w, t) = member.selections_in(&group.id);
                    extend_unique(&mut watched, w);
                    extend_unique(&mut to_watch, t);
                }
                Err(e) => warn!(error = %e, group_id = %group.id, "Skipping member selections"),
            }
        }

        group.watched_movie_ids = watched;
        group.to_watch_movie_ids = to_watch;
    }

    fn record_status(&self, row: StatusRow) {
        match self.cache.upsert_status(row) {
            Ok(()) => {}
            Err(CacheError::ForeignKey(reason)) => {
                // Group not mirrored yet; the derived status covers the gap
                warn!(reason = %reason, "Status not cached");
            }
            Err(e) => warn!(error = %e, "Failed to cache status"),
        }
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::{Group, Movie, MovieAction, MovieStatus};
use crate::repository::{RepoResult, Repository};
use crate::usecases;

use super::{TaskScope, UiState};

/// A movie of the group together with the viewer's status for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieEntry {
    pub movie: Movie,
    pub status: MovieStatus,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupDetailState {
    /// None until the group is cached, and again once it is deleted
    pub group: Option<Group>,
    pub movies: UiState<Vec<MovieEntry>>,
    pub action: UiState<MovieStatus>,
}

impl GroupDetailState {
    pub fn watched(&self) -> Vec<&MovieEntry> {
        self.entries().filter(|e| e.status.is_watched()).collect()
    }

    pub fn to_watch(&self) -> Vec<&MovieEntry> {
        self.entries().filter(|e| e.status.is_to_watch()).collect()
    }

    fn entries(&self) -> impl Iterator<Item = &MovieEntry> {
        self.movies.data().into_iter().flatten()
    }
}

/// One group's movies as seen by one member.
pub struct GroupDetailViewModel {
    repo: Arc<Repository>,
    group_id: String,
    user_id: String,
    state: Arc<watch::Sender<GroupDetailState>>,
    started: AtomicBool,
    scope: TaskScope,
}

impl GroupDetailViewModel {
    pub fn new(repo: Arc<Repository>, group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(GroupDetailState::default());
        Self {
            repo,
            group_id: group_id.into(),
            user_id: user_id.into(),
            state: Arc::new(state),
            started: AtomicBool::new(false),
            scope: TaskScope::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GroupDetailState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> GroupDetailState {
        self.state.borrow().clone()
    }

    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.send_modify(|s| s.movies = UiState::Loading);

        let repo = Arc::clone(&self.repo);
        let state = Arc::clone(&self.state);
        let group_id = self.group_id.clone();
        let user_id = self.user_id.clone();
        self.scope.spawn(async move {
            let _mirror = match repo.sync_groups_for_user(&user_id).await {
                Ok(mut handle) => {
                    if let Some(Err(e)) = handle.changed().await {
                        warn!(error = %e, group_id = %group_id, "Group sync failed, showing cached group");
                        state.send_modify(|s| s.action = UiState::Error(e));
                    }
                    Some(handle)
                }
                Err(e) => {
                    warn!(error = %e, group_id = %group_id, "Group sync unavailable, showing cached group");
                    None
                }
            };

            // Movies are immutable; fetch each one once per screen
            let mut known: HashMap<i64, Movie> = HashMap::new();
            let mut groups = repo.observe_group(&group_id);

            while let Some(result) = groups.next().await {
                let group = match result {
                    Ok(Some(group)) => group,
                    Ok(None) => {
                        state.send_modify(|s| {
                            s.group = None;
                            s.movies = UiState::Success(Vec::new());
                        });
                        continue;
                    }
                    Err(e) => {
                        state.send_modify(|s| s.movies = UiState::Error(e));
                        continue;
                    }
                };

                let movies = Self::load_entries(&repo, &group, &user_id, &mut known).await;
                state.send_modify(|s| {
                    s.group = Some(group);
                    s.movies = UiState::from_result(movies);
                });
            }
            debug!(group_id = %group_id, "Group detail closed");
        });
    }

    async fn load_entries(
        repo: &Repository,
        group: &Group,
        user_id: &str,
        known: &mut HashMap<i64, Movie>,
    ) -> RepoResult<Vec<MovieEntry>> {
        let ids = group.movie_ids();
        let missing: Vec<i64> = ids.iter().copied().filter(|id| !known.contains_key(id)).collect();
        if !missing.is_empty() {
            for movie in repo.get_movies_by_ids(&missing).await? {
                known.insert(movie.id, movie);
            }
        }

        ids.iter()
            .filter_map(|id| known.get(id))
            .map(|movie| -> RepoResult<MovieEntry> {
                Ok(MovieEntry {
                    status: repo.movie_status(&group.id, user_id, movie.id)?,
                    movie: movie.clone(),
                })
            })
            .collect()
    }

    pub fn mark_watched(&self, movie_id: i64) {
        self.change_status(movie_id, MovieAction::MarkWatched);
    }

    pub fn mark_to_watch(&self, movie_id: i64) {
        self.change_status(movie_id, MovieAction::MarkToWatch);
    }

    pub fn remove(&self, movie_id: i64) {
        self.change_status(movie_id, MovieAction::Remove);
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| {
            s.action.clear_error();
            s.movies.clear_error();
        });
    }

    fn change_status(&self, movie_id: i64, action: MovieAction) {
        self.state.send_modify(|s| s.action = UiState::Loading);
        let repo = Arc::clone(&self.repo);
        let state = Arc::clone(&self.state);
        let group_id = self.group_id.clone();
        let user_id = self.user_id.clone();
        self.scope.spawn(async move {
            let outcome = usecases::set_movie_status(&repo, &group_id, &user_id, movie_id, action).await;
            state.send_modify(|s| s.action = outcome);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::repository::tests::{fixture, fixture_with_catalog};
    use crate::viewmodel::tests::wait_state;
    use mockito::Matcher;

    fn movie_json(id: i64, title: &str) -> String {
        format!(
            r#"{{"id":{},"title":"{}","overview":"","poster_path":null,"release_date":"1999-03-31","adult":false,"vote_average":8.2}}"#,
            id, title
        )
    }

    fn status_of(state: &GroupDetailState, movie_id: i64) -> Option<MovieStatus> {
        state
            .movies
            .data()?
            .iter()
            .find(|e| e.movie.id == movie_id)
            .map(|e| e.status)
    }

    #[tokio::test]
    async fn test_marking_updates_entries() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/movie/603")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(movie_json(603, "The Matrix"))
            .create_async()
            .await;

        let f = fixture_with_catalog(&server.url());
        f.repo.create_user("user-1", "one@example.com").await.expect("user failed");
        let group = f.repo.create_group("Movie Nights", "user-1").await.expect("create failed");

        let vm = GroupDetailViewModel::new(Arc::clone(&f.repo), group.id.clone(), "user-1");
        let mut rx = vm.subscribe();
        vm.start();
        let state = wait_state(&mut rx, |s| s.group.is_some() && s.movies.data().is_some()).await;
        assert!(state.movies.data().map(|m| m.is_empty()).unwrap_or(false));

        vm.mark_to_watch(603);
        let state = wait_state(&mut rx, |s| status_of(s, 603) == Some(MovieStatus::ToWatchByUser)).await;
        assert_eq!(state.to_watch()[0].movie.title, "The Matrix");

        vm.mark_watched(603);
        let state = wait_state(&mut rx, |s| status_of(s, 603) == Some(MovieStatus::WatchedByUser)).await;
        assert_eq!(state.watched().len(), 1);
        assert!(state.to_watch().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_group_shows_nothing() {
        let f = fixture();
        let vm = GroupDetailViewModel::new(Arc::clone(&f.repo), "nope", "user-1");
        let mut rx = vm.subscribe();
        vm.start();

        let state = wait_state(&mut rx, |s| s.movies.data().is_some()).await;
        assert!(state.group.is_none());
    }

    #[tokio::test]
    async fn test_failed_status_change_is_reported() {
        let f = fixture();
        let group = f.repo.create_group("Movie Nights", "user-1").await.expect("create failed");
        let vm = GroupDetailViewModel::new(Arc::clone(&f.repo), group.id, "user-2");
        let mut rx = vm.subscribe();

        vm.mark_watched(603);
        let state = wait_state(&mut rx, |s| s.action.error().is_some()).await;
        assert_eq!(state.action.error().map(|e| e.kind), Some(ErrorKind::Group));
    }
}

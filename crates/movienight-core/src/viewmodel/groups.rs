use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::Group;
use crate::repository::Repository;
use crate::usecases;

use super::{TaskScope, UiState};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupsState {
    pub groups: UiState<Vec<Group>>,
    pub selected_group_id: Option<String>,
    /// Outcome of the last intent
    pub action: UiState<()>,
}

impl GroupsState {
    /// Loaded successfully and the user belongs to no group
    pub fn show_empty_state(&self) -> bool {
        matches!(self.groups, UiState::Success(ref groups) if groups.is_empty())
    }

    pub fn selected_group(&self) -> Option<&Group> {
        let id = self.selected_group_id.as_deref()?;
        self.groups.data()?.iter().find(|g| g.id == id)
    }
}

/// Group list screen for one signed-in user.
pub struct GroupsViewModel {
    repo: Arc<Repository>,
    user_id: String,
    state: Arc<watch::Sender<GroupsState>>,
    started: AtomicBool,
    scope: TaskScope,
}

impl GroupsViewModel {
    pub fn new(repo: Arc<Repository>, user_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(GroupsState::default());
        Self {
            repo,
            user_id: user_id.into(),
            state: Arc::new(state),
            started: AtomicBool::new(false),
            scope: TaskScope::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GroupsState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> GroupsState {
        self.state.borrow().clone()
    }

    /// Start mirroring and following the user's groups. Calling it again
    /// does nothing.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.send_modify(|s| s.groups = UiState::Loading);

        let repo = Arc::clone(&self.repo);
        let state = Arc::clone(&self.state);
        let user_id = self.user_id.clone();
        self.scope.spawn(async move {
            // Wait for the first remote snapshot so an empty list means empty
            let _mirror = match repo.sync_groups_for_user(&user_id).await {
                Ok(mut handle) => {
                    if let Some(Err(e)) = handle.changed().await {
                        warn!(error = %e, user_id = %user_id, "Group sync failed, showing cached groups");
                        state.send_modify(|s| s.action = UiState::Error(e));
                    }
                    Some(handle)
                }
                Err(e) => {
                    warn!(error = %e, user_id = %user_id, "Group sync unavailable, showing cached groups");
                    state.send_modify(|s| s.action = UiState::Error(e));
                    None
                }
            };

            let mut groups = repo.get_my_groups(&user_id);
            while let Some(result) = groups.next().await {
                state.send_modify(|s| {
                    s.groups = UiState::from_result(result);
                    let gone = match (&s.selected_group_id, s.groups.data()) {
                        (Some(id), Some(groups)) => !groups.iter().any(|g| &g.id == id),
                        _ => false,
                    };
                    if gone {
                        s.selected_group_id = None;
                    }
                });
            }
            debug!(user_id = %user_id, "Group list closed");
        });
    }

    pub fn select_group(&self, group_id: Option<String>) {
        self.state.send_modify(|s| s.selected_group_id = group_id);
    }

    pub fn create_group(&self, name: &str) {
        let name = name.to_string();
        let owner = self.user_id.clone();
        self.run_action(move |repo| async move {
            usecases::create_group(&repo, &name, &owner).await.map(|_| ())
        });
    }

    pub fn add_member(&self, group_id: &str, user_id: &str) {
        let group_id = group_id.to_string();
        let user_id = user_id.to_string();
        self.run_action(move |repo| async move {
            usecases::add_member(&repo, &group_id, &user_id).await.map(|_| ())
        });
    }

    pub fn delete_group(&self, group_id: &str) {
        let group_id = group_id.to_string();
        let requester = self.user_id.clone();
        self.run_action(move |repo| async move {
            usecases::delete_group(&repo, &group_id, &requester).await
        });
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| {
            s.action.clear_error();
            s.groups.clear_error();
        });
    }

    fn run_action<F, Fut>(&self, action: F)
    where
        F: FnOnce(Arc<Repository>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = UiState<()>> + Send + 'static,
    {
        self.state.send_modify(|s| s.action = UiState::Loading);
        let repo = Arc::clone(&self.repo);
        let state = Arc::clone(&self.state);
        self.scope.spawn(async move {
            let outcome = action(repo).await;
            state.send_modify(|s| s.action = outcome);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::repository::tests::{fixture, fixture_with_cache, unwritable_cache};
    use crate::viewmodel::tests::wait_state;

    #[tokio::test]
    async fn test_empty_remote_shows_empty_state() {
        let f = fixture();
        let vm = GroupsViewModel::new(Arc::clone(&f.repo), "user-1");
        let mut rx = vm.subscribe();
        vm.start();

        let state = wait_state(&mut rx, |s| !s.groups.is_loading() && s.groups != UiState::Idle).await;
        assert!(state.show_empty_state());
        assert!(state.groups.error().is_none());
    }

    #[tokio::test]
    async fn test_created_group_appears() {
        let f = fixture();
        let vm = GroupsViewModel::new(Arc::clone(&f.repo), "user-1");
        let mut rx = vm.subscribe();
        vm.start();
        vm.start();
        wait_state(&mut rx, |s| s.show_empty_state()).await;

        vm.create_group("Movie Nights");
        let state = wait_state(&mut rx, |s| s.groups.data().map(|g| g.len()) == Some(1)).await;
        let group = &state.groups.data().expect("no groups")[0];
        assert_eq!(group.name, "Movie Nights");

        vm.select_group(Some(group.id.clone()));
        assert_eq!(vm.state().selected_group().map(|g| g.name.as_str()), Some("Movie Nights"));
    }

    #[tokio::test]
    async fn test_failed_intent_sets_error_and_clears() {
        let f = fixture();
        let vm = GroupsViewModel::new(Arc::clone(&f.repo), "user-1");
        let mut rx = vm.subscribe();

        vm.create_group("  ");
        let state = wait_state(&mut rx, |s| s.action.error().is_some()).await;
        assert_eq!(state.action.error().map(|e| e.kind), Some(ErrorKind::Validation));

        vm.clear_error();
        assert_eq!(vm.state().action, UiState::Idle);
    }

    #[tokio::test]
    async fn test_offline_start_reports_error_but_lists_cache() {
        let f = fixture();
        f.store.set_available(false);
        let vm = GroupsViewModel::new(Arc::clone(&f.repo), "user-1");
        let mut rx = vm.subscribe();
        vm.start();

        let state = wait_state(&mut rx, |s| s.groups.data().is_some()).await;
        assert!(state.show_empty_state());
        assert_eq!(state.action.error().map(|e| e.kind), Some(ErrorKind::Network));
    }

    #[tokio::test]
    async fn test_failed_sync_write_reports_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let f = fixture_with_cache(unwritable_cache(&dir));
        f.repo.create_group("Movie Nights", "user-1").await.expect("create failed");
        let vm = GroupsViewModel::new(Arc::clone(&f.repo), "user-1");
        let mut rx = vm.subscribe();
        vm.start();

        let state = wait_state(&mut rx, |s| s.action.error().is_some() && s.groups.data().is_some()).await;
        assert_eq!(state.action.error().map(|e| e.kind), Some(ErrorKind::Storage));
        assert!(!state.groups.is_loading());
    }
}

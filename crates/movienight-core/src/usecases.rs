//! Screen-level operations.
//!
//! Each use-case wraps one or two repository calls and turns the outcome
//! into a `UiState`. Failures the repository could only describe
//! generically are tagged with the kind of the operation that failed, so
//! a screen can tell a group failure from a movie failure.

use tracing::debug;

use crate::error::{AppError, ErrorKind};
use crate::models::{Group, MovieAction, MoviePage, MovieStatus, User};
use crate::repository::{RepoResult, Repository};
use crate::validation::{validate_group_name, validate_password, validate_user_id};
use crate::viewmodel::UiState;

/// Re-tag a generic failure with the operation's kind
fn classify<T>(result: RepoResult<T>, kind: ErrorKind) -> RepoResult<T> {
    result.map_err(|e| match e.kind {
        ErrorKind::Generic => AppError::new(kind, e.message),
        _ => e,
    })
}

fn finish<T>(operation: &str, result: RepoResult<T>, kind: ErrorKind) -> UiState<T> {
    let result = classify(result, kind);
    if let Err(ref e) = result {
        debug!(operation = operation, error = %e, "Use-case failed");
    }
    UiState::from_result(result)
}

pub async fn create_group(repo: &Repository, name: &str, owner_id: &str) -> UiState<Group> {
    let result = match validate_group_name(name) {
        Ok(()) => repo.create_group(name, owner_id).await,
        Err(e) => Err(e),
    };
    finish("create_group", result, ErrorKind::Group)
}

pub async fn add_member(repo: &Repository, group_id: &str, user_id: &str) -> UiState<Group> {
    let result = match validate_user_id(user_id) {
        Ok(()) => repo.add_member(group_id, user_id).await,
        Err(e) => Err(e),
    };
    finish("add_member", result, ErrorKind::Group)
}

pub async fn remove_member(repo: &Repository, group_id: &str, user_id: &str) -> UiState<Group> {
    finish("remove_member", repo.delete_member(group_id, user_id).await, ErrorKind::Group)
}

/// Delete a group. Only its owner may do so.
pub async fn delete_group(repo: &Repository, group_id: &str, requester_id: &str) -> UiState<()> {
    let result = async {
        let group = repo.get_group(group_id).await?;
        if !group.is_owner(requester_id) {
            return Err(AppError::group("Only the group owner can delete the group"));
        }
        repo.delete_group(group_id).await
    }
    .await;
    finish("delete_group", result, ErrorKind::Group)
}

pub async fn set_movie_status(
    repo: &Repository,
    group_id: &str,
    user_id: &str,
    movie_id: i64,
    action: MovieAction,
) -> UiState<MovieStatus> {
    finish(
        "set_movie_status",
        repo.set_movie_status(group_id, user_id, movie_id, action).await,
        ErrorKind::Movie,
    )
}

pub async fn search_movies(repo: &Repository, query: &str, page: u32) -> UiState<MoviePage> {
    finish(
        "search_movies",
        repo.search_tmdb_movie_by_name(query, page).await,
        ErrorKind::Movie,
    )
}

pub async fn get_popular_movies(repo: &Repository, page: u32) -> UiState<MoviePage> {
    finish("get_popular_movies", repo.get_popular_movies(page).await, ErrorKind::Movie)
}

/// Register an account. The password is checked for strength only; it is
/// never stored.
pub async fn register_user(repo: &Repository, user_id: &str, email: &str, password: &str) -> UiState<User> {
    let result = match validate_password(password) {
        Ok(()) => repo.create_user(user_id, email).await,
        Err(e) => Err(e),
    };
    finish("register_user", result, ErrorKind::Login)
}

/// Sign in as `user_id`, registering the account only when none exists.
/// A lookup failure is reported as-is and never triggers registration.
pub async fn sign_in(repo: &Repository, user_id: &str, email: &str) -> UiState<User> {
    let result: RepoResult<User> = async {
        validate_user_id(user_id)?;
        match repo.find_user(user_id).await? {
            Some(user) => Ok(user),
            None => repo.create_user(user_id, email).await,
        }
    }
    .await;
    finish("sign_in", result, ErrorKind::Login)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::fixture;

    fn error_kind<T: std::fmt::Debug>(state: UiState<T>) -> ErrorKind {
        match state {
            UiState::Error(e) => e.kind,
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_group_success() {
        let f = fixture();
        match create_group(&f.repo, "Movie Nights", "user-1").await {
            UiState::Success(group) => assert_eq!(group.name, "Movie Nights"),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_group_blank_name_is_validation_error() {
        let f = fixture();
        assert_eq!(error_kind(create_group(&f.repo, "", "user-1").await), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_only_owner_deletes_group() {
        let f = fixture();
        let group = f.repo.create_group("Movie Nights", "user-1").await.expect("create failed");

        assert_eq!(error_kind(delete_group(&f.repo, &group.id, "user-2").await), ErrorKind::Group);
        assert_eq!(delete_group(&f.repo, &group.id, "user-1").await, UiState::Success(()));
    }

    #[tokio::test]
    async fn test_set_status_unknown_user_is_movie_error() {
        let f = fixture();
        let group = f.repo.create_group("Movie Nights", "user-1").await.expect("create failed");

        // user-1 owns the group but never registered a user document
        let state = set_movie_status(&f.repo, &group.id, "user-1", 603, MovieAction::MarkWatched).await;
        assert_eq!(error_kind(state), ErrorKind::Movie);
    }

    #[tokio::test]
    async fn test_register_user_checks_password_and_email() {
        let f = fixture();
        assert_eq!(
            error_kind(register_user(&f.repo, "user-1", "one@example.com", "123").await),
            ErrorKind::Validation
        );
        assert_eq!(
            error_kind(register_user(&f.repo, "user-1", "one@", "secret1").await),
            ErrorKind::Validation
        );
        assert!(matches!(
            register_user(&f.repo, "user-1", "one@example.com", "secret1").await,
            UiState::Success(_)
        ));
        assert_eq!(
            error_kind(register_user(&f.repo, "user-1", "one@example.com", "secret1").await),
            ErrorKind::Login
        );
    }

    #[tokio::test]
    async fn test_sign_in_registers_once() {
        let f = fixture();
        let first = match sign_in(&f.repo, "user-1", "one@example.com").await {
            UiState::Success(user) => user,
            other => panic!("unexpected state {:?}", other),
        };
        let again = match sign_in(&f.repo, "user-1", "other@example.com").await {
            UiState::Success(user) => user,
            other => panic!("unexpected state {:?}", other),
        };
        assert_eq!(again.email, first.email);
    }

    #[tokio::test]
    async fn test_sign_in_offline_does_not_register() {
        let f = fixture();
        f.store.set_available(false);
        assert_eq!(
            error_kind(sign_in(&f.repo, "user-1", "one@example.com").await),
            ErrorKind::Network
        );

        f.store.set_available(true);
        assert!(f.repo.find_user("user-1").await.expect("lookup failed").is_none());
    }
}

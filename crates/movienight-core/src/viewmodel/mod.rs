//! Screen view-models.
//!
//! Each view-model follows repository streams inside its own `TaskScope`,
//! projects them into an immutable state published on a `watch` channel,
//! and exposes intent methods that run use-cases in the same scope.
//! Dropping a view-model cancels everything it started, including its
//! remote subscriptions.

pub mod group_detail;
pub mod groups;
pub mod movies;
pub mod scope;
pub mod state;

pub use group_detail::{GroupDetailState, GroupDetailViewModel, MovieEntry};
pub use groups::{GroupsState, GroupsViewModel};
pub use movies::{MovieSearchState, MovieSearchViewModel};
pub use scope::TaskScope;
pub use state::UiState;

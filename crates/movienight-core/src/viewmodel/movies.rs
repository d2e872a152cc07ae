use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::AppError;
use crate::models::{Movie, MoviePage};
use crate::repository::Repository;
use crate::usecases;

use super::{TaskScope, UiState};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MovieSearchState {
    /// Empty while showing popular movies
    pub query: String,
    pub movies: UiState<Vec<Movie>>,
    /// Last page loaded, 0 before the first
    pub page: u32,
    pub has_more: bool,
    pub loading_more: bool,
    /// Failure while loading a further page; the loaded list is kept
    pub page_error: Option<AppError>,
}

/// Popular movies and search-by-name, with pages accumulated in memory.
pub struct MovieSearchViewModel {
    repo: Arc<Repository>,
    state: Arc<watch::Sender<MovieSearchState>>,
    /// Bumped by every new listing so late pages of an old one are dropped
    generation: Arc<AtomicU64>,
    scope: TaskScope,
}

impl MovieSearchViewModel {
    pub fn new(repo: Arc<Repository>) -> Self {
        let (state, _) = watch::channel(MovieSearchState::default());
        Self {
            repo,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            scope: TaskScope::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MovieSearchState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> MovieSearchState {
        self.state.borrow().clone()
    }

    pub fn load_popular(&self) {
        self.search("");
    }

    /// Start a new listing for `query`; a blank query lists popular movies
    pub fn search(&self, query: &str) {
        let query = query.trim().to_string();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(MovieSearchState {
            query: query.clone(),
            movies: UiState::Loading,
            ..MovieSearchState::default()
        });
        self.fetch_page(generation, query, 1);
    }

    /// Append the next page of the current listing, if there is one
    pub fn load_next_page(&self) {
        let (query, next) = {
            let current = self.state.borrow();
            if current.loading_more || current.movies.data().is_none() || !current.has_more {
                return;
            }
            (current.query.clone(), current.page + 1)
        };
        self.state.send_modify(|s| {
            s.loading_more = true;
            s.page_error = None;
        });
        self.fetch_page(self.generation.load(Ordering::SeqCst), query, next);
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| {
            s.movies.clear_error();
            s.page_error = None;
        });
    }

    fn fetch_page(&self, generation: u64, query: String, page: u32) {
        let repo = Arc::clone(&self.repo);
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);
        self.scope.spawn(async move {
            let outcome = if query.is_empty() {
                usecases::get_popular_movies(&repo, page).await
            } else {
                usecases::search_movies(&repo, &query, page).await
            };

            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            state.send_modify(|s| apply_page(s, page, outcome));
        });
    }
}

fn apply_page(state: &mut MovieSearchState, page: u32, outcome: UiState<MoviePage>) {
    state.loading_more = false;
    match outcome {
        UiState::Success(result) => {
            state.page = page;
            state.has_more = result.has_next();
            match state.movies {
                UiState::Success(ref mut movies) if page > 1 => {
                    for movie in result.results {
                        if !movies.iter().any(|m| m.id == movie.id) {
                            movies.push(movie);
                        }
                    }
                }
                _ => state.movies = UiState::Success(result.results),
            }
        }
        UiState::Error(e) if page > 1 => state.page_error = Some(e),
        other => state.movies = other.map(|p| p.results),
    }
}

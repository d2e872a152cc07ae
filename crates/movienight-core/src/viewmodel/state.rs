use crate::error::AppError;
use crate::repository::RepoResult;

/// Load state of one piece of screen data.
///
/// `Idle -> Loading -> Success | Error`; `clear_error` moves `Error` back
/// to `Idle`.
#[derive(Debug, Clone, PartialEq)]
pub enum UiState<T> {
    Idle,
    Loading,
    Success(T),
    Error(AppError),
}

impl<T> Default for UiState<T> {
    fn default() -> Self {
        UiState::Idle
    }
}

impl<T> UiState<T> {
    pub fn from_result(result: RepoResult<T>) -> Self {
        match result {
            Ok(data) => UiState::Success(data),
            Err(e) => UiState::Error(e),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, UiState::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            UiState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            UiState::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn clear_error(&mut self) {
        if matches!(self, UiState::Error(_)) {
            *self = UiState::Idle;
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> UiState<U> {
        match self {
            UiState::Idle => UiState::Idle,
            UiState::Loading => UiState::Loading,
            UiState::Success(data) => UiState::Success(f(data)),
            UiState::Error(e) => UiState::Error(e),
        }
    }
}

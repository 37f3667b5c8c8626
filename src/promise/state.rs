use crate::error::{Error, Result};

/// Lifecycle of a promise.
///
/// Transitions are one-way and happen at most once:
///
/// - Pending -> Fulfilled
/// - Pending -> Rejected
///
/// Once a promise is Fulfilled or Rejected its state never changes again.
#[derive(Debug, Clone)]
pub enum State<T> {
    /// No outcome yet
    Pending,

    /// The computation produced a value
    Fulfilled(T),

    /// The computation failed
    Rejected(Error),
}

impl<T> State<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    /// Check if the state is final (i.e. won't change anymore)
    pub fn is_final(&self) -> bool {
        !self.is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, State::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, State::Rejected(_))
    }
}

impl<T: Clone> State<T> {
    /// Copy of the outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<T>> {
        match self {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(err) => Some(Err(err.clone())),
        }
    }
}

impl<T> From<Result<T>> for State<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => State::Fulfilled(value),
            Err(err) => State::Rejected(err),
        }
    }
}

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Shared, type-erased cause of a failed computation.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors observed through promises, executors and synchronization primitives.
///
/// Cloning is cheap: a rejected promise hands the same error to every
/// subscriber and to every repeated `wait`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("computation failed: {0}")]
    Computation(Cause),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an arbitrary error raised by a supplier or callback.
    pub fn computation<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Computation(Arc::new(err))
    }

    /// Computation failure carrying only a message.
    pub fn msg<S: Into<String>>(msg: S) -> Self {
        Error::Computation(Arc::new(Message(msg.into())))
    }

    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        Error::IllegalState(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// The original error behind a computation failure, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Error::Computation(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }

    /// Recover the concrete type of a computation failure.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause().and_then(|cause| cause.downcast_ref::<E>())
    }

    /// Message of the original failure, without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Error::Computation(cause) => cause.to_string(),
            Error::IllegalState(msg)
            | Error::Panicked(msg)
            | Error::Executor(msg)
            | Error::Config(msg) => msg.clone(),
            Error::Timeout(_) => self.to_string(),
        }
    }
}

/// Plain-text computation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(pub String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("invalid age {0}")]
    struct InvalidAge(i32);

    #[test]
    fn test_computation_keeps_original_error() {
        let err = Error::computation(InvalidAge(-1));
        assert_eq!(err.message(), "invalid age -1");
        assert_eq!(err.downcast_ref::<InvalidAge>().map(|e| e.0), Some(-1));
        assert!(err.downcast_ref::<Message>().is_none());
    }

    #[test]
    fn test_clone_shares_cause() {
        let err = Error::msg("boom");
        let copy = err.clone();
        match (&err, &copy) {
            (Error::Computation(a), Error::Computation(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected computation errors"),
        }
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout(Duration::from_millis(50));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "timed out after 50ms");
        assert!(err.cause().is_none());
    }
}

//! A bounded, fixed-delay retry policy for fallible asynchronous operations.
//!
//! ```rust
//! use std::num::NonZeroU32;
//! use std::time::Duration;
//! use warren::retry::{RetryError, RetryPolicy};
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(NonZeroU32::new(3).unwrap(), Duration::from_millis(10));
//!
//! // Only "busy" failures are worth another attempt.
//! let outcome: Result<(), RetryError<&str>> = policy
//!     .execute_if(|| async { Err("busy") }, |e| *e == "busy")
//!     .await;
//! assert!(matches!(outcome, Err(RetryError::Exhausted { attempts: 3, .. })));
//! # }
//! ```
use std::fmt::Display;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use tracing::warn;

/// Errors that know whether the operation that produced them is worth retrying.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times an operation is attempted and how long we wait between attempts.
///
/// The policy holds no state across calls: the same instance can drive any number of
/// concurrent operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    delay: Duration,
}

/// The reason why an operation driven by a [`RetryPolicy`] failed.
#[derive(thiserror::Error, Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("Failed after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        /// The error returned by the last attempt.
        #[source]
        last_error: E,
    },
    /// An attempt failed with an error that is not worth retrying.
    #[error("Failed with a non-retryable error")]
    Fatal(#[source] E),
}

impl<E> RetryError<E> {
    /// The error returned by the last attempt, whatever the outcome.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Fatal(e) => e,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: NonZeroU32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Try exactly once, never wait.
    pub fn no_retry() -> Self {
        Self::new(NonZeroU32::MIN, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> NonZeroU32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds, it fails with an error that is not [`Retryable`]
    /// or we run out of attempts.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.execute_if(operation, E::is_retryable).await
    }

    /// Same as [`RetryPolicy::execute`], using `is_retryable` to classify failures.
    ///
    /// We wait for [`RetryPolicy::delay`] between two attempts, but never after the last one.
    pub async fn execute_if<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.get();
        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(RetryError::Fatal(e)),
                Err(e) => e,
            };
            warn!(attempt, max_attempts, "Attempt {attempt} failed: {error}");
            if attempt == max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: max_attempts,
                    last_error: error,
                });
            }
            tokio::time::sleep(self.delay).await;
            attempt += 1;
        }
    }
}

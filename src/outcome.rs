//! Definition of the result type of every stream operation.

use crate::{Error, ErrorKind};

/// Outcome of an operation that can make partial progress before failing.
///
/// Unlike [`Result`], the value is always present. When an error is present
/// the value describes how much of the operation completed before the error,
/// for example the number of bytes that were written. When there is no error
/// the operation was fully satisfied.
#[must_use = "progress must be inspected even when there is an error"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    value: T,
    error: Option<Error>,
}

impl<T> Outcome<T> {
    /// Outcome of a fully satisfied operation.
    #[inline]
    pub fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    /// Outcome of an operation that failed after some progress.
    ///
    /// # Arguments
    ///
    /// * `value` - Progress made before the error.
    /// * `error` - Reason operation stopped.
    #[inline]
    pub fn with_error(value: T, error: impl Into<Error>) -> Self {
        Self {
            value,
            error: Some(error.into()),
        }
    }

    /// Outcome with an optional error.
    #[inline]
    pub fn new(value: T, error: Option<Error>) -> Self {
        Self { value, error }
    }

    /// Progress of the operation.
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Error that stopped the operation, if any.
    #[inline]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Kind of error that stopped the operation, if any.
    #[inline]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(Error::kind)
    }

    /// true if operation was fully satisfied.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// true if operation stopped because of an error.
    #[inline]
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// Split outcome into progress and error.
    #[inline]
    pub fn into_parts(self) -> (T, Option<Error>) {
        (self.value, self.error)
    }

    /// Drop any partial progress and convert into a [`Result`].
    #[inline]
    pub fn into_result(self) -> Result<T, Error> {
        match self.error {
            None => Ok(self.value),
            Some(error) => Err(error),
        }
    }

    /// Convert into a [`Result`] that keeps partial progress on error.
    #[inline]
    pub fn into_partial_result(self) -> Result<T, (T, Error)> {
        match self.error {
            None => Ok(self.value),
            Some(error) => Err((self.value, error)),
        }
    }

    /// Transform progress, keeping the error as is.
    #[inline]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            error: self.error,
        }
    }
}

impl Outcome<usize> {
    /// Continue with another operation if this one was fully satisfied.
    ///
    /// Byte counts of both operations are added together. The second operation
    /// is not attempted when the first one failed.
    pub fn and_then(self, f: impl FnOnce() -> Outcome<usize>) -> Outcome<usize> {
        if self.is_err() {
            return self;
        }

        f().map(|value| value + self.value)
    }
}

impl<T: Default> Outcome<T> {
    /// Outcome of an operation that failed before making any progress.
    #[inline]
    pub fn from_error(error: impl Into<Error>) -> Self {
        Self::with_error(T::default(), error)
    }
}

impl<T> From<Result<T, Error>> for Outcome<T>
where
    T: Default,
{
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(error) => Self::from_error(error),
        }
    }
}

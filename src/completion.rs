//! Completion handles for already-resolved asynchronous outcomes.
//!
//! A [`Completion`] carries exactly one of a value, a failure cause, or a
//! cancellation. It is always resolved by the time a consumer sees it, so
//! retrieval never blocks. Handles can be recycled through a per-worker
//! [`CompletionPool`] to avoid allocating on the fast synchronous-completion
//! path; plain allocation is always correct too — pooling is an
//! optimization, not semantics.
//!
//! The pool is deliberately `!Send` and `!Sync`: a handle taken from the
//! pool on one worker cannot be returned on another, and the compiler
//! enforces it instead of a runtime check.

use std::error::Error;
use std::marker::PhantomData;
use std::time::Duration;

use thiserror::Error as ThisError;
use tracing::warn;

/// Failure cause carried by a failed completion.
pub type Cause = Box<dyn Error + Send + Sync>;

/// Errors surfaced when producing or consuming a [`Completion`].
#[derive(ThisError, Debug)]
pub enum CompletionError {
    /// The handle already holds an outcome; the first outcome is untouched.
    #[error("cannot rebind a resolved completion")]
    AlreadyResolved,

    /// The handle was resolved as cancelled.
    #[error("completion was cancelled")]
    Cancelled,

    /// The producing operation failed.
    #[error("completion failed: {0}")]
    Failed(#[source] Cause),

    /// Bounded retrieval found no value present. See
    /// [`Completion::get_bounded`] for the semantics of this variant.
    #[error("completion value not present within the bounded wait")]
    TimedOut,

    /// The handle was consumed (or never resolved) before retrieval.
    #[error("completion holds no outcome")]
    Vacant,
}

#[derive(Debug, Default)]
enum Outcome<T> {
    /// A pooled shell awaiting its single `resolve_*` call, or a handle
    /// whose outcome was already taken.
    #[default]
    Vacant,
    Value(T),
    Failure(Cause),
    Cancelled,
}

/// An already-resolved outcome: a value, a failure, or a cancellation.
///
/// Construct one with [`Completion::value`], [`Completion::failure`] or
/// [`Completion::cancelled`], or take a vacant shell from a
/// [`CompletionPool`] and resolve it exactly once. A second resolution
/// attempt fails with [`CompletionError::AlreadyResolved`] and leaves the
/// first outcome intact.
#[derive(Debug, Default)]
pub struct Completion<T> {
    outcome: Outcome<T>,
}

impl<T> Completion<T> {
    /// A resolved handle carrying `value`.
    pub fn value(value: T) -> Self {
        Self { outcome: Outcome::Value(value) }
    }

    /// A resolved handle carrying a failure cause.
    pub fn failure<E: Into<Cause>>(cause: E) -> Self {
        Self { outcome: Outcome::Failure(cause.into()) }
    }

    /// A resolved, cancelled handle.
    pub fn cancelled() -> Self {
        Self { outcome: Outcome::Cancelled }
    }

    /// A vacant shell. Only useful as pool inventory.
    fn vacant() -> Self {
        Self { outcome: Outcome::Vacant }
    }

    /// Resolves a vacant shell with a value.
    pub fn resolve(&mut self, value: T) -> Result<(), CompletionError> {
        self.bind(Outcome::Value(value))
    }

    /// Resolves a vacant shell with a failure cause.
    pub fn resolve_failure<E: Into<Cause>>(&mut self, cause: E) -> Result<(), CompletionError> {
        self.bind(Outcome::Failure(cause.into()))
    }

    /// Resolves a vacant shell as cancelled.
    pub fn resolve_cancelled(&mut self) -> Result<(), CompletionError> {
        self.bind(Outcome::Cancelled)
    }

    fn bind(&mut self, outcome: Outcome<T>) -> Result<(), CompletionError> {
        if !matches!(self.outcome, Outcome::Vacant) {
            warn!("attempt to rebind a resolved completion");
            return Err(CompletionError::AlreadyResolved);
        }

        self.outcome = outcome;
        Ok(())
    }

    /// True if the handle was resolved as cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Outcome::Cancelled)
    }

    /// Peeks at the value without consuming the outcome.
    pub fn result(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Retrieves the outcome. Never blocks: the handle is resolved by
    /// construction. Cancellation takes priority over failure, failure over
    /// value. The outcome is moved out, leaving the handle vacant and ready
    /// for recycling.
    pub fn get(&mut self) -> Result<T, CompletionError> {
        match std::mem::take(&mut self.outcome) {
            Outcome::Cancelled => Err(CompletionError::Cancelled),
            Outcome::Failure(cause) => Err(CompletionError::Failed(cause)),
            Outcome::Value(value) => Ok(value),
            Outcome::Vacant => Err(CompletionError::Vacant),
        }
    }

    /// Bounded retrieval.
    ///
    /// Historical quirk, preserved deliberately: the timeout check tests
    /// whether a *value is present*, not whether time elapsed. A vacant
    /// handle yields [`CompletionError::TimedOut`] no matter how generous
    /// `_timeout` is, exactly as the original connector behaved. Do not
    /// "fix" this without revisiting every caller.
    pub fn get_bounded(&mut self, _timeout: Duration) -> Result<T, CompletionError> {
        match std::mem::take(&mut self.outcome) {
            Outcome::Cancelled => Err(CompletionError::Cancelled),
            Outcome::Failure(cause) => Err(CompletionError::Failed(cause)),
            Outcome::Value(value) => Ok(value),
            Outcome::Vacant => Err(CompletionError::TimedOut),
        }
    }

    fn reset(&mut self) -> Outcome<T> {
        std::mem::take(&mut self.outcome)
    }
}

/// A value that can be returned to its own pool when the completion that
/// carried it is recycled.
pub trait Poolable {
    fn recycle(self);
}

/// Per-worker free-list of completion shells.
///
/// The raw-pointer marker makes the pool `!Send`/`!Sync`, so handles cannot
/// be taken on one thread and released on another; the same-thread contract
/// is a compile-time property.
#[derive(Debug)]
pub struct CompletionPool<T> {
    free: Vec<Completion<T>>,
    _not_send: PhantomData<*mut ()>,
}

impl<T> Default for CompletionPool<T> {
    fn default() -> Self {
        Self { free: Vec::new(), _not_send: PhantomData }
    }
}

impl<T> CompletionPool<T> {
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of shells currently available for reuse.
    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    /// Takes a vacant shell, reusing a recycled one when available.
    pub fn take(&mut self) -> Completion<T> {
        self.free.pop().unwrap_or_else(Completion::vacant)
    }

    /// Takes a shell already resolved with `value`.
    pub fn take_value(&mut self, value: T) -> Completion<T> {
        let mut shell = self.take();
        shell.outcome = Outcome::Value(value);
        shell
    }

    /// Takes a shell already resolved with a failure.
    pub fn take_failure<E: Into<Cause>>(&mut self, cause: E) -> Completion<T> {
        let mut shell = self.take();
        shell.outcome = Outcome::Failure(cause.into());
        shell
    }

    /// Takes a shell already resolved as cancelled.
    pub fn take_cancelled(&mut self) -> Completion<T> {
        let mut shell = self.take();
        shell.outcome = Outcome::Cancelled;
        shell
    }

    /// Clears the handle's outcome and returns the shell to the free list.
    /// A released handle must never be observed by its former consumer.
    pub fn release(&mut self, mut completion: Completion<T>) {
        drop(completion.reset());
        self.free.push(completion);
    }
}

impl<T: Poolable> CompletionPool<T> {
    /// Like [`CompletionPool::release`], but first recycles a still-present
    /// value back to its own pool.
    pub fn release_cascade(&mut self, mut completion: Completion<T>) {
        if let Outcome::Value(value) = completion.reset() {
            value.recycle();
        }
        self.free.push(completion);
    }
}

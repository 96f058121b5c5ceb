//! Context-local ambient subject.
//!
//! Each thread has its own slot. Synchronous code swaps the slot with a
//! [`SubjectGuard`], which puts the previous subject back when dropped, also
//! while unwinding. Async code wraps its future in [`Scoped`], which installs
//! the subject only for the duration of each poll, so a task moving between
//! worker threads keeps its identity and never leaks it to the thread.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::Subject;

thread_local! {
    static CURRENT_SUBJECT: RefCell<Option<Subject>> = const { RefCell::new(None) };
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// The subject bound to the current thread, anonymous if none.
pub fn current() -> Subject {
    CURRENT_SUBJECT.with(|c| c.borrow().clone().unwrap_or_default())
}

/// Replace the current thread's subject, returning the previous binding.
pub fn bind(subject: Subject) -> Option<Subject> {
    CURRENT_SUBJECT.with(|c| c.borrow_mut().replace(subject))
}

/// Clear the current thread's subject, returning the previous binding.
pub fn unbind() -> Option<Subject> {
    CURRENT_SUBJECT.with(|c| c.borrow_mut().take())
}

/// Whether a [`SubjectGuard`] is active on the current thread.
///
/// Bindings made while a guard is active are overwritten when it drops.
pub fn in_scope() -> bool {
    GUARD_DEPTH.with(|d| d.get() > 0)
}

fn restore(previous: Option<Subject>) {
    CURRENT_SUBJECT.with(|c| *c.borrow_mut() = previous);
}

/// Binds a subject to the current thread until dropped.
///
/// Guards must be dropped on the thread that created them, so the type is
/// neither `Send` nor `Sync`.
#[must_use = "the subject is unbound as soon as the guard is dropped"]
pub struct SubjectGuard {
    previous: Option<Subject>,
    _not_send: PhantomData<*const ()>,
}

impl SubjectGuard {
    /// Make `subject` ambient for the lifetime of the guard.
    pub fn enter(subject: Subject) -> Self {
        GUARD_DEPTH.with(|d| d.set(d.get() + 1));
        Self {
            previous: bind(subject),
            _not_send: PhantomData,
        }
    }
}

impl Drop for SubjectGuard {
    fn drop(&mut self) {
        restore(self.previous.take());
        GUARD_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Run `f` with `subject` ambient.
pub fn with_subject<R>(subject: Subject, f: impl FnOnce() -> R) -> R {
    let _guard = SubjectGuard::enter(subject);
    f()
}

/// A future that runs with a fixed ambient subject.
pub struct Scoped<F> {
    subject: Subject,
    inner: Pin<Box<F>>,
}

impl<F: Future> Scoped<F> {
    /// Wrap `future` so every poll sees `subject`.
    pub fn new(subject: Subject, future: F) -> Self {
        Self {
            subject,
            inner: Box::pin(future),
        }
    }
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _guard = SubjectGuard::enter(self.subject.clone());
        self.inner.as_mut().poll(cx)
    }
}

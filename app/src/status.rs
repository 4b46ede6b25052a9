//! Status reporting sink.
//!
//! A small capability interface rather than an ad hoc function value
//! (Design Note: "callbacks as polymorphism"), so call sites can pass a
//! closure, a channel-backed sink, or a no-op for tests.

use std::fmt;

/// User-visible progress/error kind reported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Downloading,
    Moving,
    Copying,
    Extracting,
    Complete,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusKind::Info => "info",
            StatusKind::Downloading => "downloading",
            StatusKind::Moving => "moving",
            StatusKind::Copying => "copying",
            StatusKind::Extracting => "extracting",
            StatusKind::Complete => "complete",
            StatusKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// Sink for user-visible progress and error messages.
pub trait StatusSink {
    fn report(&self, kind: StatusKind, message: &str);
}

/// Adapts any `FnMut(StatusKind, &str)` closure into a `StatusSink`.
pub struct ClosureSink<F>(std::cell::RefCell<F>)
where
    F: FnMut(StatusKind, &str);

impl<F> ClosureSink<F>
where
    F: FnMut(StatusKind, &str),
{
    pub fn new(f: F) -> Self {
        ClosureSink(std::cell::RefCell::new(f))
    }
}

impl<F> StatusSink for ClosureSink<F>
where
    F: FnMut(StatusKind, &str),
{
    fn report(&self, kind: StatusKind, message: &str) {
        (self.0.borrow_mut())(kind, message);
    }
}

/// Discards every report; useful in tests that only assert on return values.
pub struct NullSink;

impl StatusSink for NullSink {
    fn report(&self, _kind: StatusKind, _message: &str) {}
}

//! Subscription Registry
//!
//! Maps topic patterns to ordered handler lists and fans events out to
//! every handler whose pattern matches.

use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::topic::TopicPattern;

type HandlerFn = dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync;

/// A subscriber callback.
///
/// Handlers are compared by identity: clones of one `Handler` are the same
/// handler, two `Handler::new` calls on equal closures are not. Keep a
/// clone around to unsubscribe later.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Invoke the handler
    pub fn call(&self, data: &Value) -> anyhow::Result<()> {
        (self.inner)(data)
    }

    /// True if both values refer to the same registered callback
    pub fn same(&self, other: &Handler) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner) as *const (),
            Arc::as_ptr(&other.inner) as *const (),
        )
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("ptr", &(Arc::as_ptr(&self.inner) as *const ()))
            .finish()
    }
}

/// Handlers registered under one pattern string
struct PatternEntry {
    pattern: TopicPattern,
    handlers: Vec<Handler>,
}

/// Thread-safe pattern → handlers registry.
///
/// Patterns keep their registration order; that order decides the order
/// wildcard handlers run in.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<Vec<PatternEntry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `pattern`.
    ///
    /// Registering the same handler twice makes it fire twice.
    pub fn subscribe(&self, pattern: &str, handler: Handler) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        match entries.iter_mut().find(|e| e.pattern.as_str() == pattern) {
            Some(entry) => entry.handlers.push(handler),
            None => entries.push(PatternEntry {
                pattern: TopicPattern::new(pattern),
                handlers: vec![handler],
            }),
        }

        tracing::debug!(topic = %pattern, "Subscribed to topic");
    }

    /// Remove the first registration of `handler` under `pattern`.
    ///
    /// Drops the pattern once its last handler is gone. Returns false (and
    /// does nothing) if the handler was not registered there.
    pub fn unsubscribe(&self, pattern: &str, handler: &Handler) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let Some(pos) = entries.iter().position(|e| e.pattern.as_str() == pattern) else {
            return false;
        };

        let entry = &mut entries[pos];
        let removed = match entry.handlers.iter().position(|h| h.same(handler)) {
            Some(idx) => {
                entry.handlers.remove(idx);
                true
            }
            None => false,
        };

        if entry.handlers.is_empty() {
            entries.remove(pos);
        }

        tracing::debug!(topic = %pattern, removed, "Unsubscribed from topic");
        removed
    }

    /// Handlers an event on `topic` would reach, in invocation order:
    /// exact-topic handlers first, then wildcard patterns in registration
    /// order.
    pub fn matching(&self, topic: &str) -> Vec<Handler> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let mut matched: Vec<Handler> = entries
            .iter()
            .find(|e| e.pattern.as_str() == topic)
            .map(|e| e.handlers.clone())
            .unwrap_or_default();

        for entry in entries.iter() {
            if entry.pattern.has_wildcard() && entry.pattern.matches(topic) {
                matched.extend(entry.handlers.iter().cloned());
            }
        }

        matched
    }

    /// Deliver `data` to every handler matching `topic`.
    ///
    /// Handlers run outside the registry lock, so they may subscribe or
    /// unsubscribe. A handler that errors or panics is logged and skipped.
    /// Returns the number of handlers invoked.
    pub fn emit(&self, topic: &str, data: &Value) -> usize {
        let handlers = self.matching(topic);

        for handler in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.call(data))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(topic = %topic, error = %e, "Error in topic handler");
                }
                Err(panic) => {
                    tracing::error!(
                        topic = %topic,
                        panic = %panic_message(panic.as_ref()),
                        "Topic handler panicked"
                    );
                }
            }
        }

        if !handlers.is_empty() {
            tracing::trace!(topic = %topic, handlers = handlers.len(), "Emitted event");
        }

        handlers.len()
    }

    /// Number of distinct patterns with at least one handler
    pub fn pattern_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of registrations under `pattern`
    pub fn handler_count(&self, pattern: &str) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.pattern.as_str() == pattern)
            .map(|e| e.handlers.len())
            .unwrap_or(0)
    }

    /// Remove every subscription
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

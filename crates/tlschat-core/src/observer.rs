//! Single-slot event observers.
//!
//! Each engine exposes one [`Observer`] per event kind. Registering a callback
//! replaces the previous one; there is no fan-out. Every emission runs the
//! callback on its own blocking task so a slow or panicking callback never
//! stalls the protocol loop that emitted the event. As a consequence, two
//! emissions may reach the callback in either order.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{trace, warn};

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A replaceable callback slot for events carrying a `T`.
pub struct Observer<T> {
    slot: RwLock<Option<Callback<T>>>,
}

impl<T> Default for Observer<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl<T> Observer<T> {
    /// Removes the registered callback, if any.
    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_registered(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T: Send + 'static> Observer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback`, replacing any previous registration.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Hands `value` to the registered callback on a fresh blocking task.
    ///
    /// Returns `false` when nothing is registered and the event was dropped.
    /// Must be called from within a Tokio runtime.
    pub fn emit(&self, value: T) -> bool {
        let callback = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match callback {
            Some(callback) => {
                let task = tokio::task::spawn_blocking(move || callback(value));
                tokio::spawn(async move {
                    if let Err(e) = task.await {
                        warn!(error = %e, "observer callback failed");
                    }
                });
                true
            }
            None => {
                trace!("event dropped, no observer registered");
                false
            }
        }
    }
}

//! Lazy handles to action results.

use crate::loop_manager::LoopManager;
use crate::nodes::ActionBase;
use quiver_core::{Error, Result};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// A handle to the result of a booked action.
///
/// The event loop runs the first time the value is requested, together with
/// every other action booked on the same graph at that point. Keeping the
/// handle keeps the action booked; dropping the last handle before the loop
/// runs removes the action from the graph.
pub struct ResultPtr<T> {
    value: Arc<OnceLock<T>>,
    action: Arc<dyn ActionBase>,
    manager: Arc<LoopManager>,
}

impl<T: Send + Sync + 'static> ResultPtr<T> {
    pub(crate) fn new(
        value: Arc<OnceLock<T>>,
        action: Arc<dyn ActionBase>,
        manager: Arc<LoopManager>,
    ) -> Self {
        Self {
            value,
            action,
            manager,
        }
    }

    /// Returns the result, running the event loop if the action has not run yet.
    ///
    /// A failed run leaves the result permanently unavailable.
    pub fn get(&self) -> Result<&T> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        if !self.action.has_run() {
            self.manager.run()?;
        }
        self.value.get().ok_or_else(|| {
            Error::result_unavailable(format!(
                "action {} did not produce a result",
                self.action.name()
            ))
        })
    }

    /// Whether the result is available without running the event loop.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn action_name(&self) -> &str {
        self.action.name()
    }

    /// Calls `f` with the partial result of the last slot every `every_n`
    /// entries that slot processes during the next event loop.
    pub fn on_partial_result(
        &self,
        every_n: u64,
        f: impl Fn(&T) + Send + Sync + 'static,
    ) -> Result<()> {
        let last_slot = self.manager.n_slots().saturating_sub(1);
        self.register_partial(every_n, move |slot, value| {
            if slot == last_slot {
                f(value);
            }
        })
    }

    /// Calls `f` with the slot and its partial result every `every_n` entries
    /// processed by each slot during the next event loop.
    pub fn on_partial_result_slot(
        &self,
        every_n: u64,
        f: impl Fn(usize, &T) + Send + Sync + 'static,
    ) -> Result<()> {
        self.register_partial(every_n, f)
    }

    fn register_partial(
        &self,
        every_n: u64,
        f: impl Fn(usize, &T) + Send + Sync + 'static,
    ) -> Result<()> {
        if !self.action.supports_partial_update() {
            return Err(Error::unsupported(format!(
                "action {} does not provide partial results",
                self.action.name()
            )));
        }
        if self.action.has_run() {
            return Err(Error::already_run(self.action.name()));
        }
        let action: Weak<dyn ActionBase> = Arc::downgrade(&self.action);
        self.manager.register_callback(every_n, move |slot| {
            let action = match action.upgrade() {
                Some(action) => action,
                None => return Ok(()),
            };
            let partial = action.partial_update(slot)?;
            let value = downcast_partial::<T>(action.name(), partial)?;
            f(slot, &value);
            Ok(())
        });
        Ok(())
    }
}

fn downcast_partial<T: 'static>(action: &str, partial: Box<dyn Any + Send>) -> Result<Box<T>> {
    partial.downcast::<T>().map_err(|_| {
        Error::type_mismatch(
            action,
            std::any::type_name::<T>(),
            "a different partial result type",
        )
    })
}

impl<T> Clone for ResultPtr<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            action: Arc::clone(&self.action),
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultPtr")
            .field("action", &self.action.name())
            .field("value", &self.value.get())
            .finish()
    }
}

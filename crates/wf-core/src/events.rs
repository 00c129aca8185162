//! Application hook events
//!
//! A minimal registry of async handlers keyed by [`Hook`]. The hosting
//! application emits `BeforeStart` before it accepts traffic and
//! `BeforeStop` during shutdown.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;

/// Error returned by a hook handler
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Box<dyn Fn() -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    BeforeStart,
    BeforeStop,
}

/// Ordered handler lists per hook
#[derive(Default)]
pub struct Events {
    handlers: HashMap<Hook, Vec<Handler>>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; handlers run in registration order.
    pub fn on<F, Fut>(&mut self, hook: Hook, handler: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.handlers
            .entry(hook)
            .or_default()
            .push(Box::new(move || handler().boxed()));
        self
    }

    pub fn handler_count(&self, hook: Hook) -> usize {
        self.handlers.get(&hook).map_or(0, Vec::len)
    }

    /// Run the handlers for `hook` one after another, stopping at the first
    /// error.
    pub async fn emit(&self, hook: Hook) -> Result<(), HookError> {
        let Some(handlers) = self.handlers.get(&hook) else {
            return Ok(());
        };
        log::debug!("Emitting {:?} to {} handler(s)", hook, handlers.len());
        for handler in handlers {
            handler().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;

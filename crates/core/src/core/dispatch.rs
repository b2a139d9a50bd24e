//! Event name → handler routing.
//!
//! Handlers are typed: each registration names the payload type it expects,
//! and the registry converts the frame's raw JSON payload before calling it.
//! A payload that does not convert is reported as a dispatch error and the
//! handler never runs, so the context is left untouched.

use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::DispatchError;
use crate::protocol::Frame;

type Handler<C> = Box<dyn FnMut(&mut C, Value) -> Result<(), serde_json::Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// A handler already existed for the name and was overwritten.
    Replaced,
    Rejected,
}

pub struct Registry<C> {
    handlers: HashMap<String, Handler<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<P, F>(&mut self, event: &str, mut handler: F) -> Registration
    where
        P: DeserializeOwned + 'static,
        F: FnMut(&mut C, P) + 'static,
    {
        if event.trim().is_empty() {
            error!(event, "refusing to register handler for a blank event name");
            return Registration::Rejected;
        }

        let erased: Handler<C> = Box::new(move |ctx, payload| {
            let payload = serde_json::from_value::<P>(payload)?;
            handler(ctx, payload);
            Ok(())
        });

        if self.handlers.insert(event.to_string(), erased).is_some() {
            warn!(event, "overwriting existing handler");
            Registration::Replaced
        } else {
            Registration::Added
        }
    }

    pub fn contains(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route one frame to its handler. The handler runs to completion before
    /// this returns.
    pub fn dispatch(&mut self, ctx: &mut C, frame: Frame) -> Result<(), DispatchError> {
        let Frame { event, payload } = frame;
        let Some(handler) = self.handlers.get_mut(&event) else {
            return Err(DispatchError::UnknownEvent(event));
        };

        debug!(event = %event, "dispatching frame");
        handler(ctx, payload).map_err(|source| DispatchError::Payload { event, source })
    }
}

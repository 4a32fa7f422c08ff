//! Hooks fired around (de)serialization.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::CallContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolEvent {
    BeforeDeserialize,
    AfterDeserialize,
    BeforeSerialize,
    AfterSerialize,
}

pub type Listener = Arc<dyn Fn(ProtocolEvent, &CallContext) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventManager {
    listeners: HashMap<ProtocolEvent, Vec<Listener>>,
}

impl EventManager {
    pub fn add(&mut self, event: ProtocolEvent, listener: Listener) {
        self.listeners.entry(event).or_default().push(listener);
    }

    /// Calls every listener for `event`, in registration order.
    pub fn fire(&self, event: ProtocolEvent, ctx: &CallContext) {
        for listener in self.listeners.get(&event).into_iter().flatten() {
            listener(event, ctx);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.values().all(Vec::is_empty)
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.listeners.iter().map(|(e, l)| (*e, l.len())).collect();
        f.debug_struct("EventManager").field("listeners", &counts).finish()
    }
}

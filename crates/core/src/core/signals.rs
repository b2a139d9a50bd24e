//! Local publish/subscribe fan-out to presentation elements.
//!
//! Nothing here touches the network. Node-scoped signals reach listeners that
//! filter on the same node id (and catch-all listeners); `ExpandAll` and
//! `CollapseAll` reach everybody.

use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSignal {
    NodeSelected(String),
    NodeUnselected(String),
    LogEntry { node_id: String, line: String },
    ExpandAll,
    CollapseAll,
}

impl UiSignal {
    /// The node a signal is about, `None` for broadcasts.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            UiSignal::NodeSelected(id) | UiSignal::NodeUnselected(id) => Some(id),
            UiSignal::LogEntry { node_id, .. } => Some(node_id),
            UiSignal::ExpandAll | UiSignal::CollapseAll => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalFilter {
    All,
    Node(String),
}

impl SignalFilter {
    pub fn accepts(&self, signal: &UiSignal) -> bool {
        match (self, signal.node_id()) {
            (SignalFilter::All, _) | (_, None) => true,
            (SignalFilter::Node(want), Some(id)) => want == id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&UiSignal)>;

#[derive(Default)]
pub struct SignalBus {
    next_id: u64,
    listeners: Vec<(ListenerId, SignalFilter, Listener)>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, filter: SignalFilter, listener: F) -> ListenerId
    where
        F: FnMut(&UiSignal) + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, filter, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Deliver `signal` to every matching listener in subscription order.
    /// Returns how many listeners saw it.
    pub fn publish(&mut self, signal: &UiSignal) -> usize {
        let mut delivered = 0;
        for (_, filter, listener) in self.listeners.iter_mut() {
            if filter.accepts(signal) {
                listener(signal);
                delivered += 1;
            }
        }
        trace!(?signal, delivered, "signal published");
        delivered
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

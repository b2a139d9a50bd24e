//! Reconciliation of inbound events onto the store and the view.
//!
//! Every entry point runs to completion before returning: the store is
//! updated, the surface has received its batched mutations and the resulting
//! signals have been published. Two consecutive calls are independent
//! transactions.

use hashbrown::HashSet;
use tracing::{debug, warn};

use crate::protocol::{LogLine, NodeSpec, NodeState, NodeStatus};
use crate::signals::{SignalBus, UiSignal};
use crate::store::GraphStore;
use crate::view::{ElementId, GraphView, RenderSurface};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// Ids that got a new store record.
    pub inserted: Vec<String>,
    pub vertices_added: usize,
    pub edges_added: usize,
    /// Dependency targets materialized before being announced.
    pub placeholders: Vec<String>,
    /// Placeholders that this batch announced for real.
    pub promoted: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub applied: usize,
    /// Ids the store does not know; their updates were dropped.
    pub skipped: Vec<String>,
}

pub struct SyncEngine<S> {
    store: GraphStore,
    view: GraphView<S>,
    bus: SignalBus,
}

impl<S: RenderSurface> SyncEngine<S> {
    pub fn new(surface: S) -> Self {
        Self {
            store: GraphStore::new(),
            view: GraphView::new(surface),
            bus: SignalBus::new(),
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn view(&self) -> &GraphView<S> {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut GraphView<S> {
        &mut self.view
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SignalBus {
        &mut self.bus
    }

    pub fn apply_add(&mut self, nodes: &[NodeSpec]) -> AddOutcome {
        let mut outcome = AddOutcome::default();

        for spec in nodes {
            if self.store.insert_if_absent(spec) {
                outcome.inserted.push(spec.id.clone());
            }
        }

        // Stage vertices for the batch itself first, so a dependency on a
        // node announced later in the same batch is not a placeholder.
        let mut staged: HashSet<String> = HashSet::new();
        let mut vertices: Vec<String> = Vec::new();
        for spec in nodes {
            if self.view.has_node(&spec.id) {
                if self.view.is_placeholder(&spec.id) && !outcome.promoted.contains(&spec.id) {
                    outcome.promoted.push(spec.id.clone());
                }
            } else if staged.insert(spec.id.clone()) {
                vertices.push(spec.id.clone());
            }
        }

        let mut staged_edges: HashSet<(String, String)> = HashSet::new();
        let mut edges: Vec<(String, String)> = Vec::new();
        for spec in nodes {
            for target in &spec.depends {
                if !self.view.has_node(target) && staged.insert(target.clone()) {
                    vertices.push(target.clone());
                    outcome.placeholders.push(target.clone());
                }
                let pair = (spec.id.clone(), target.clone());
                if !self.view.has_edge(&pair.0, &pair.1) && staged_edges.insert(pair.clone()) {
                    edges.push(pair);
                }
            }
        }

        outcome.vertices_added = vertices.len();
        outcome.edges_added = edges.len();

        // An announced node may already carry a state, and new edges need
        // the colour of their node.
        let states: Vec<NodeStatus> = nodes
            .iter()
            .filter_map(|spec| {
                self.store
                    .state(&spec.id)
                    .map(|state| NodeStatus::new(spec.id.as_str(), state))
            })
            .collect();

        let store = &mut self.store;
        let (promoted, placeholders) = (&outcome.promoted, &outcome.placeholders);
        self.view.batch(|view| {
            for id in promoted {
                view.promote_placeholder(id);
            }
            if !vertices.is_empty() || !edges.is_empty() {
                view.add_elements(vertices, edges);
                for id in placeholders {
                    view.mark_placeholder(id);
                    view.set_state_class(&[ElementId::node(id.as_str())], NodeState::Unknown);
                }
                view.layout();
            }
            recolour(view, store, &states);
        });

        debug!(
            inserted = outcome.inserted.len(),
            vertices = outcome.vertices_added,
            edges = outcome.edges_added,
            placeholders = outcome.placeholders.len(),
            promoted = outcome.promoted.len(),
            "add applied"
        );

        outcome
    }

    pub fn apply_update(&mut self, updates: &[NodeStatus]) -> UpdateOutcome {
        if updates.is_empty() {
            return UpdateOutcome::default();
        }
        let store = &mut self.store;
        self.view.batch(|view| recolour(view, store, updates))
    }

    /// Hand a log line to whoever listens for its node. Returns the number
    /// of listeners reached.
    pub fn apply_log(&mut self, entry: LogLine) -> usize {
        self.bus.publish(&UiSignal::LogEntry {
            node_id: entry.node_id,
            line: entry.line,
        })
    }

    /// Exclusive selection; signals are published in order.
    pub fn select(&mut self, id: &str) -> Vec<UiSignal> {
        let signals = self.view.select_by_id(id);
        for signal in &signals {
            self.bus.publish(signal);
        }
        signals
    }

    pub fn on_view_select(&mut self, id: &str) {
        let signal = self.view.on_select(id);
        self.bus.publish(&signal);
    }

    pub fn on_view_unselect(&mut self, id: &str) {
        let signal = self.view.on_unselect(id);
        self.bus.publish(&signal);
    }

    pub fn broadcast(&mut self, signal: UiSignal) -> usize {
        self.bus.publish(&signal)
    }
}

/// Record each state and recolour the node's neighbourhood. Unknown ids are
/// skipped.
fn recolour<S: RenderSurface>(
    view: &mut GraphView<S>,
    store: &mut GraphStore,
    updates: &[NodeStatus],
) -> UpdateOutcome {
    let mut outcome = UpdateOutcome::default();
    for update in updates {
        match store.set_state(&update.id, update.state) {
            Ok(_) => {
                let hood = view.neighbourhood(&update.id);
                view.set_state_class(&hood, update.state);
                outcome.applied += 1;
            }
            Err(e) => {
                warn!(node = %update.id, error = %e, "skipping update for unknown node");
                outcome.skipped.push(update.id.clone());
            }
        }
    }
    outcome
}

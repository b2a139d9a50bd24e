//! Graph view adapter.
//!
//! [`RenderSurface`] is the seam to whatever actually draws the diagram: it
//! only has to support batched insertion by id, id lookup, CSS-like classes,
//! a layout pass and node selection. [`GraphView`] is the only code that talks
//! to a surface; it knows about state classes, neighbourhoods, placeholders
//! and exclusive selection.
//!
//! [`MemorySurface`] keeps everything in memory. The terminal dashboard draws
//! from it and the tests assert against it.

use std::collections::BTreeSet;

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::layout::{self, GraphPos};
use crate::protocol::NodeState;
use crate::signals::UiSignal;

/// Class carried by vertices materialized for a dependency target that the
/// server has not announced yet.
pub const PLACEHOLDER_CLASS: &str = "placeholder";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementId {
    Node(String),
    Edge { source: String, target: String },
}

impl ElementId {
    pub fn node(id: impl Into<String>) -> Self {
        ElementId::Node(id.into())
    }

    pub fn edge(source: impl Into<String>, target: impl Into<String>) -> Self {
        ElementId::Edge {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementBatch {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

impl ElementBatch {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }
}

pub trait RenderSurface {
    /// Brackets a group of mutations so the surface can defer redraws.
    fn begin_batch(&mut self) {}
    fn end_batch(&mut self) {}

    /// Insert vertices, then edges. Elements already present are ignored.
    fn add_elements(&mut self, batch: ElementBatch);
    fn contains(&self, id: &ElementId) -> bool;
    /// Edges with `node` as source or target.
    fn connected_edges(&self, node: &str) -> Vec<ElementId>;

    fn add_class(&mut self, id: &ElementId, class: &str);
    fn remove_class(&mut self, id: &ElementId, class: &str);
    fn has_class(&self, id: &ElementId, class: &str) -> bool;

    fn layout(&mut self);

    fn selected(&self) -> Vec<String>;
    /// Returns `false` when the node is missing or already selected.
    fn select(&mut self, node: &str) -> bool;
    /// Returns `false` when the node is missing or not selected.
    fn unselect(&mut self, node: &str) -> bool;
}

// ═══════════════════════════════════════════════════════════════════════════
// Adapter
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct GraphView<S> {
    surface: S,
}

impl<S: RenderSurface> GraphView<S> {
    pub fn new(surface: S) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.surface.contains(&ElementId::node(id))
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.surface.contains(&ElementId::edge(source, target))
    }

    pub fn is_placeholder(&self, id: &str) -> bool {
        self.surface.has_class(&ElementId::node(id), PLACEHOLDER_CLASS)
    }

    /// Run `f` inside one surface batch.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.surface.begin_batch();
        let out = f(self);
        self.surface.end_batch();
        out
    }

    /// Insert vertices and edges in one batch. Returns how many elements were
    /// handed to the surface.
    pub fn add_elements(&mut self, nodes: Vec<String>, edges: Vec<(String, String)>) -> usize {
        let batch = ElementBatch { nodes, edges };
        if batch.is_empty() {
            return 0;
        }
        let added = batch.len();
        debug!(
            nodes = batch.nodes.len(),
            edges = batch.edges.len(),
            "adding elements"
        );
        self.batch(|view| view.surface.add_elements(batch));
        added
    }

    pub fn mark_placeholder(&mut self, id: &str) {
        self.surface.add_class(&ElementId::node(id), PLACEHOLDER_CLASS);
    }

    /// Clears the placeholder mark; returns whether `id` was a placeholder.
    pub fn promote_placeholder(&mut self, id: &str) -> bool {
        let element = ElementId::node(id);
        if !self.surface.has_class(&element, PLACEHOLDER_CLASS) {
            return false;
        }
        self.surface.remove_class(&element, PLACEHOLDER_CLASS);
        true
    }

    /// The node itself plus every edge incident to it.
    pub fn neighbourhood(&self, id: &str) -> Vec<ElementId> {
        let mut elements = self.surface.connected_edges(id);
        elements.push(ElementId::node(id));
        elements
    }

    /// Leave exactly one state class on each element.
    pub fn set_state_class(&mut self, elements: &[ElementId], state: NodeState) {
        for element in elements {
            for other in NodeState::ALL {
                if other != state {
                    self.surface.remove_class(element, other.class_name());
                }
            }
            self.surface.add_class(element, state.class_name());
        }
    }

    pub fn state_of(&self, element: &ElementId) -> Option<NodeState> {
        NodeState::ALL
            .into_iter()
            .find(|s| self.surface.has_class(element, s.class_name()))
    }

    pub fn layout(&mut self) {
        self.surface.layout();
    }

    /// Select `id` and nothing else. Returns the resulting signals, every
    /// unselection first, then the selection.
    pub fn select_by_id(&mut self, id: &str) -> Vec<UiSignal> {
        if !self.has_node(id) {
            warn!(node = id, "select requested for a node that is not in the view");
            return Vec::new();
        }

        self.batch(|view| {
            let mut signals = Vec::new();
            let previous = view.surface.selected();
            for other in previous.iter().filter(|p| p.as_str() != id) {
                if view.surface.unselect(other) {
                    signals.push(UiSignal::NodeUnselected(other.clone()));
                }
            }
            if view.surface.select(id) {
                signals.push(UiSignal::NodeSelected(id.to_string()));
            }
            signals
        })
    }

    /// A selection made inside the renderer itself.
    pub fn on_select(&self, id: &str) -> UiSignal {
        UiSignal::NodeSelected(id.to_string())
    }

    pub fn on_unselect(&self, id: &str) -> UiSignal {
        UiSignal::NodeUnselected(id.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// In-memory surface
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct Vertex {
    pub classes: BTreeSet<String>,
    pub selected: bool,
    pub pos: GraphPos,
}

#[derive(Debug, Clone, Default)]
pub struct EdgeElement {
    pub classes: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MemorySurface {
    vertices: HashMap<String, Vertex>,
    edges: HashMap<(String, String), EdgeElement>,
    batch_depth: u32,
    batches: u64,
    layout_passes: u64,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Vertex ids sorted.
    pub fn vertex_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.vertices.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Edge `(source, target)` pairs sorted.
    pub fn edge_ids(&self) -> Vec<(String, String)> {
        let mut ids: Vec<(String, String)> = self.edges.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn classes(&self, id: &ElementId) -> Vec<String> {
        self.class_set(id)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn position(&self, id: &str) -> Option<GraphPos> {
        self.vertices.get(id).map(|v| v.pos)
    }

    /// Completed top-level batches.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn layout_passes(&self) -> u64 {
        self.layout_passes
    }

    fn class_set(&self, id: &ElementId) -> Option<&BTreeSet<String>> {
        match id {
            ElementId::Node(n) => self.vertices.get(n).map(|v| &v.classes),
            ElementId::Edge { source, target } => self
                .edges
                .get(&(source.clone(), target.clone()))
                .map(|e| &e.classes),
        }
    }

    fn class_set_mut(&mut self, id: &ElementId) -> Option<&mut BTreeSet<String>> {
        match id {
            ElementId::Node(n) => self.vertices.get_mut(n).map(|v| &mut v.classes),
            ElementId::Edge { source, target } => self
                .edges
                .get_mut(&(source.clone(), target.clone()))
                .map(|e| &mut e.classes),
        }
    }
}

impl RenderSurface for MemorySurface {
    fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    fn end_batch(&mut self) {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth == 0 {
            self.batches += 1;
        }
    }

    fn add_elements(&mut self, batch: ElementBatch) {
        for id in batch.nodes {
            self.vertices.entry(id).or_default();
        }
        for (source, target) in batch.edges {
            if !self.vertices.contains_key(&source) || !self.vertices.contains_key(&target) {
                warn!(%source, %target, "edge endpoint missing from surface, skipping edge");
                continue;
            }
            self.edges.entry((source, target)).or_default();
        }
    }

    fn contains(&self, id: &ElementId) -> bool {
        self.class_set(id).is_some()
    }

    fn connected_edges(&self, node: &str) -> Vec<ElementId> {
        let mut edges: Vec<ElementId> = self
            .edges
            .keys()
            .filter(|(s, t)| s == node || t == node)
            .map(|(s, t)| ElementId::edge(s.as_str(), t.as_str()))
            .collect();
        edges.sort_unstable();
        edges
    }

    fn add_class(&mut self, id: &ElementId, class: &str) {
        if let Some(classes) = self.class_set_mut(id) {
            classes.insert(class.to_string());
        }
    }

    fn remove_class(&mut self, id: &ElementId, class: &str) {
        if let Some(classes) = self.class_set_mut(id) {
            classes.remove(class);
        }
    }

    fn has_class(&self, id: &ElementId, class: &str) -> bool {
        self.class_set(id).is_some_and(|c| c.contains(class))
    }

    fn layout(&mut self) {
        let ids = self.vertex_ids();
        let edges = self.edge_ids();
        let positions = layout::breadthfirst(&ids, &edges);
        for (id, pos) in positions {
            if let Some(v) = self.vertices.get_mut(&id) {
                v.pos = pos;
            }
        }
        self.layout_passes += 1;
    }

    fn selected(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .vertices
            .iter()
            .filter(|(_, v)| v.selected)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    fn select(&mut self, node: &str) -> bool {
        match self.vertices.get_mut(node) {
            Some(v) if !v.selected => {
                v.selected = true;
                true
            }
            _ => false,
        }
    }

    fn unselect(&mut self, node: &str) -> bool {
        match self.vertices.get_mut(node) {
            Some(v) if v.selected => {
                v.selected = false;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_with(nodes: &[&str], edges: &[(&str, &str)]) -> GraphView<MemorySurface> {
        let mut view = GraphView::new(MemorySurface::new());
        view.add_elements(
            nodes.iter().map(|n| n.to_string()).collect(),
            edges
                .iter()
                .map(|(s, t)| (s.to_string(), t.to_string()))
                .collect(),
        );
        view
    }

    #[test]
    fn add_elements_is_one_batch_and_ignores_duplicates() {
        let mut view = view_with(&["db", "api"], &[("api", "db")]);
        assert_eq!(view.surface().batches(), 1);

        view.add_elements(vec!["db".into()], vec![("api".into(), "db".into())]);
        assert_eq!(view.surface().vertex_count(), 2);
        assert_eq!(view.surface().edge_count(), 1);
        assert_eq!(view.surface().batches(), 2);

        assert_eq!(view.add_elements(Vec::new(), Vec::new()), 0);
        assert_eq!(view.surface().batches(), 2);
    }

    #[test]
    fn edges_need_both_endpoints() {
        let view = view_with(&["api"], &[("api", "db")]);
        assert!(!view.has_edge("api", "db"));
    }

    #[test]
    fn state_class_is_exclusive_over_neighbourhood() {
        let mut view = view_with(&["db", "api", "web"], &[("api", "db"), ("web", "api")]);

        let hood = view.neighbourhood("api");
        assert_eq!(hood.len(), 3);
        view.set_state_class(&hood, NodeState::Stopped);
        view.set_state_class(&hood, NodeState::Running);

        for element in &hood {
            let classes = view.surface().classes(element);
            assert_eq!(classes, vec!["running".to_string()], "{element:?}");
        }
        assert_eq!(view.state_of(&ElementId::node("db")), None);
    }

    #[test]
    fn placeholder_promotion() {
        let mut view = view_with(&["db"], &[]);
        view.mark_placeholder("db");
        assert!(view.is_placeholder("db"));
        assert!(view.promote_placeholder("db"));
        assert!(!view.is_placeholder("db"));
        assert!(!view.promote_placeholder("db"));
    }

    #[test]
    fn selection_is_exclusive_and_ordered() {
        let mut view = view_with(&["a", "b"], &[]);

        assert_eq!(
            view.select_by_id("b"),
            vec![UiSignal::NodeSelected("b".into())]
        );
        assert_eq!(
            view.select_by_id("a"),
            vec![
                UiSignal::NodeUnselected("b".into()),
                UiSignal::NodeSelected("a".into())
            ]
        );
        assert_eq!(view.surface().selected(), vec!["a".to_string()]);

        // Reselecting is quiet.
        assert!(view.select_by_id("a").is_empty());
        // Unknown ids change nothing.
        assert!(view.select_by_id("ghost").is_empty());
        assert_eq!(view.surface().selected(), vec!["a".to_string()]);
    }

    #[test]
    fn layout_positions_every_vertex() {
        let mut view = view_with(&["db", "api"], &[("api", "db")]);
        view.layout();
        assert_eq!(view.surface().layout_passes(), 1);
        let api = view.surface().position("api").unwrap();
        let db = view.surface().position("db").unwrap();
        assert!(api.y01 < db.y01);
    }
}

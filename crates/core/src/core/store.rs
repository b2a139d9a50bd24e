//! In-memory node records: what the client currently believes about the graph.

use hashbrown::HashMap;

use crate::error::StoreError;
use crate::protocol::{NodeSpec, NodeState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: String,
    pub depends: Vec<String>,
    pub state: NodeState,
}

#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: HashMap<String, NodeRecord>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record for `spec` unless its id is already known. Existing
    /// records are never touched; returns whether a record was created.
    pub fn insert_if_absent(&mut self, spec: &NodeSpec) -> bool {
        if self.nodes.contains_key(&spec.id) {
            return false;
        }
        self.nodes.insert(
            spec.id.clone(),
            NodeRecord {
                id: spec.id.clone(),
                depends: spec.depends.clone(),
                state: spec.state.unwrap_or_default(),
            },
        );
        true
    }

    /// Returns the previous state.
    pub fn set_state(&mut self, id: &str, state: NodeState) -> Result<NodeState, StoreError> {
        let record = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownNode(id.to_string()))?;
        Ok(std::mem::replace(&mut record.state, state))
    }

    pub fn get(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn state(&self, id: &str) -> Option<NodeState> {
        self.nodes.get(id).map(|n| n.state)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Records sorted by id.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        let mut records: Vec<&NodeRecord> = self.nodes.values().collect();
        records.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        records.into_iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.iter().map(|n| n.id.clone()).collect()
    }
}

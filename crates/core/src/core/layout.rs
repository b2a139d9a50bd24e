//! Deterministic breadth-first layering for directed graphs.
//!
//! Roots are the vertices nothing points at; every other vertex sits one
//! level below the first vertex that reaches it. Ids are visited in sorted
//! order so the same element set always yields the same picture.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use hashbrown::HashMap;

/// Position in normalized viewport space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GraphPos {
    pub x01: f32,
    pub y01: f32,
}

pub const PADDING: f32 = 0.05;

pub fn breadthfirst_levels(ids: &[String], edges: &[(String, String)]) -> Vec<Vec<String>> {
    let known: BTreeSet<&str> = ids.iter().map(String::as_str).collect();

    let mut out: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut has_incoming: BTreeSet<&str> = BTreeSet::new();
    for (source, target) in edges {
        let (s, t) = (source.as_str(), target.as_str());
        if !known.contains(s) || !known.contains(t) || s == t {
            continue;
        }
        out.entry(s).or_default().push(t);
        has_incoming.insert(t);
    }
    for targets in out.values_mut() {
        targets.sort_unstable();
        targets.dedup();
    }

    let mut level_of: BTreeMap<&str, usize> = BTreeMap::new();
    let mut queue: VecDeque<&str> = known
        .iter()
        .copied()
        .filter(|id| !has_incoming.contains(id))
        .collect();
    for &id in &queue {
        level_of.insert(id, 0);
    }

    loop {
        while let Some(id) = queue.pop_front() {
            let level = level_of[id];
            for &next in out.get(id).map(Vec::as_slice).unwrap_or_default() {
                if !level_of.contains_key(next) {
                    level_of.insert(next, level + 1);
                    queue.push_back(next);
                }
            }
        }
        // Pure cycles have no root; seed them from the lowest unplaced id.
        match known.iter().find(|id| !level_of.contains_key(*id)) {
            Some(&seed) => {
                level_of.insert(seed, 0);
                queue.push_back(seed);
            }
            None => break,
        }
    }

    let depth = level_of.values().copied().max().map_or(0, |d| d + 1);
    let mut levels: Vec<Vec<String>> = vec![Vec::new(); depth];
    for (id, level) in level_of {
        levels[level].push(id.to_string());
    }
    levels
}

pub fn breadthfirst(ids: &[String], edges: &[(String, String)]) -> HashMap<String, GraphPos> {
    let levels = breadthfirst_levels(ids, edges);
    let span = 1.0 - 2.0 * PADDING;
    let rows = levels.len().max(1) as f32;

    let mut positions = HashMap::with_capacity(ids.len());
    for (row, level) in levels.iter().enumerate() {
        let cols = level.len().max(1) as f32;
        let y01 = PADDING + span * (row as f32 + 0.5) / rows;
        for (col, id) in level.iter().enumerate() {
            let x01 = PADDING + span * (col as f32 + 0.5) / cols;
            positions.insert(
                id.clone(),
                GraphPos {
                    x01: x01.clamp(0.0, 1.0),
                    y01: y01.clamp(0.0, 1.0),
                },
            );
        }
    }
    positions
}

//! Plain-text rendering of the dashboard.

use std::fmt::Write as _;

use digraph::controller::Controller;
use digraph::view::{ElementId, MemorySurface, RenderSurface};

/// One full screen: status line, one line per vertex in layout order, then
/// the log tail of every expanded panel.
pub fn frame(controller: &Controller<MemorySurface>) -> String {
    let mut out = String::new();
    let view = controller.view();
    let surface = view.surface();

    let _ = writeln!(
        out,
        "── {} ── {} nodes ──",
        controller.channel().status().label(),
        controller.store().len()
    );

    let selected = surface.selected();
    let edges = surface.edge_ids();
    let mut ids = surface.vertex_ids();
    ids.sort_by(|a, b| {
        let pa = surface.position(a).unwrap_or_default();
        let pb = surface.position(b).unwrap_or_default();
        pa.y01
            .total_cmp(&pb.y01)
            .then(pa.x01.total_cmp(&pb.x01))
            .then_with(|| a.cmp(b))
    });

    for id in &ids {
        let marker = if selected.contains(id) { '*' } else { ' ' };
        let state = view
            .state_of(&ElementId::node(id.as_str()))
            .map_or("?", |s| s.class_name());
        let mut line = format!("{marker} {id:<16} {state:<8}");

        let depends: Vec<&str> = edges
            .iter()
            .filter(|(source, _)| source == id)
            .map(|(_, target)| target.as_str())
            .collect();
        if !depends.is_empty() {
            let _ = write!(line, " -> {}", depends.join(", "));
        }
        if view.is_placeholder(id) {
            line.push_str(" (not announced)");
        }
        let _ = writeln!(out, "{}", line.trim_end());
    }

    for id in controller.expanded_panels() {
        let Some(panel) = controller.panel(&id) else {
            continue;
        };
        let _ = writeln!(out, "── {id} log ──");
        if panel.dropped_lines() > 0 {
            let _ = writeln!(out, "  … {} earlier lines dropped", panel.dropped_lines());
        }
        for line in panel.log_lines() {
            let _ = writeln!(out, "  {line}");
        }
    }

    out
}

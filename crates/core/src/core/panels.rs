//! Per-node detail panels.
//!
//! Each announced node gets one [`NodePanel`]: whether its detail view is
//! expanded, whether it is highlighted as the selected node, and a bounded
//! buffer of the log lines received while expanded. Panels listen on the
//! signal bus filtered on their own node id.
//!
//! Expanding a panel subscribes to the node's log stream on the server;
//! collapsing unsubscribes and clears the buffer, so log volume for nodes
//! nobody is looking at is suppressed at the source.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::channel::ChannelHandle;
use crate::protocol::Command;
use crate::signals::{SignalBus, SignalFilter, UiSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelChange {
    Expanded,
    Collapsed,
}

#[derive(Debug, Clone)]
pub struct NodePanel {
    node_id: String,
    expanded: bool,
    active: bool,
    log: VecDeque<String>,
    capacity: usize,
    dropped_lines: u64,
}

impl NodePanel {
    pub fn new(node_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            node_id: node_id.into(),
            expanded: false,
            active: false,
            log: VecDeque::new(),
            capacity: capacity.max(1),
            dropped_lines: 0,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn log_lines(&self) -> impl Iterator<Item = &str> {
        self.log.iter().map(String::as_str)
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Lines evicted because the buffer was full.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped_lines
    }

    pub fn expand(&mut self) -> Option<PanelChange> {
        if self.expanded {
            return None;
        }
        self.expanded = true;
        Some(PanelChange::Expanded)
    }

    pub fn collapse(&mut self) -> Option<PanelChange> {
        if !self.expanded {
            return None;
        }
        self.expanded = false;
        self.log.clear();
        self.dropped_lines = 0;
        Some(PanelChange::Collapsed)
    }

    /// Lines for a collapsed panel are ignored; it is not subscribed.
    pub fn push_log(&mut self, line: &str) {
        if !self.expanded {
            return;
        }
        if self.log.len() == self.capacity {
            self.log.pop_front();
            self.dropped_lines += 1;
        }
        self.log.push_back(line.to_string());
    }

    pub fn handle(&mut self, signal: &UiSignal) -> Option<PanelChange> {
        match signal {
            UiSignal::NodeSelected(id) if *id == self.node_id => {
                self.active = true;
                None
            }
            UiSignal::NodeUnselected(id) if *id == self.node_id => {
                self.active = false;
                None
            }
            UiSignal::LogEntry { node_id, line } if *node_id == self.node_id => {
                self.push_log(line);
                None
            }
            UiSignal::ExpandAll => self.expand(),
            UiSignal::CollapseAll => self.collapse(),
            _ => None,
        }
    }
}

/// All panels of a session plus the outbound side they drive.
pub struct PanelBoard {
    panels: HashMap<String, Rc<RefCell<NodePanel>>>,
    channel: ChannelHandle,
    capacity: usize,
}

impl PanelBoard {
    pub fn new(channel: ChannelHandle, capacity: usize) -> Self {
        Self {
            panels: HashMap::new(),
            channel,
            capacity,
        }
    }

    /// Create the panel for `node_id` and hook it to the bus. No-op when it
    /// already exists.
    pub fn attach(&mut self, bus: &mut SignalBus, node_id: &str) -> bool {
        if self.panels.contains_key(node_id) {
            return false;
        }

        let panel = Rc::new(RefCell::new(NodePanel::new(node_id, self.capacity)));
        let listener_panel = Rc::clone(&panel);
        let channel = self.channel.clone();
        let id = node_id.to_string();
        bus.subscribe(SignalFilter::Node(id.clone()), move |signal| {
            let change = listener_panel.borrow_mut().handle(signal);
            if let Some(change) = change {
                send_for_change(&channel, &id, change);
            }
        });

        self.panels.insert(node_id.to_string(), panel);
        debug!(node = node_id, "panel attached");
        true
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.panels.contains_key(node_id)
    }

    pub fn expand(&self, node_id: &str) -> Option<PanelChange> {
        self.change(node_id, NodePanel::expand)
    }

    pub fn collapse(&self, node_id: &str) -> Option<PanelChange> {
        self.change(node_id, NodePanel::collapse)
    }

    fn change(
        &self,
        node_id: &str,
        f: fn(&mut NodePanel) -> Option<PanelChange>,
    ) -> Option<PanelChange> {
        let Some(panel) = self.panels.get(node_id) else {
            warn!(node = node_id, "no panel for node");
            return None;
        };
        let change = f(&mut panel.borrow_mut());
        if let Some(change) = change {
            send_for_change(&self.channel, node_id, change);
        }
        change
    }

    /// Snapshot of one panel.
    pub fn get(&self, node_id: &str) -> Option<NodePanel> {
        self.panels.get(node_id).map(|p| p.borrow().clone())
    }

    /// Ids of expanded panels, sorted.
    pub fn expanded(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .panels
            .iter()
            .filter(|(_, p)| p.borrow().is_expanded())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Re-send `subscribeNode` for every expanded panel, e.g. after the
    /// connection was re-established. Returns how many were sent.
    pub fn resubscribe(&self) -> usize {
        let ids = self.expanded();
        for id in &ids {
            self.channel.send_command(&Command::SubscribeNode(id.clone()));
        }
        ids.len()
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}

fn send_for_change(channel: &ChannelHandle, node_id: &str, change: PanelChange) {
    let command = match change {
        PanelChange::Expanded => Command::SubscribeNode(node_id.to_string()),
        PanelChange::Collapsed => Command::UnsubscribeNode(node_id.to_string()),
    };
    channel.send_command(&command);
}

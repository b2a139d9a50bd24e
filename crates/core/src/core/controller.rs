//! Session controller.
//!
//! Owns the dispatch registry, the reconciliation engine and the node panels,
//! and turns channel events and user gestures into state changes and
//! outbound commands. Lives on one task; nothing here is `Send`.

use tracing::{debug, error, info, warn};

use crate::channel::{ChannelEvent, ChannelHandle};
use crate::config::ClientConfig;
use crate::dispatch::Registry;
use crate::error::DispatchError;
use crate::panels::{NodePanel, PanelBoard, PanelChange};
use crate::protocol::{
    Command, Frame, LogLine, NodeSpec, NodeStatus, EVENT_ADD, EVENT_LOG, EVENT_UPDATE,
};
use crate::signals::{SignalBus, UiSignal};
use crate::store::GraphStore;
use crate::sync::SyncEngine;
use crate::view::{GraphView, RenderSurface};

/// State the inbound handlers operate on.
pub struct Session<S> {
    engine: SyncEngine<S>,
    panels: PanelBoard,
}

impl<S: RenderSurface> Session<S> {
    fn on_add(&mut self, nodes: Vec<NodeSpec>) {
        let outcome = self.engine.apply_add(&nodes);
        for id in &outcome.inserted {
            self.panels.attach(self.engine.bus_mut(), id);
        }
        if !outcome.inserted.is_empty() {
            info!(count = outcome.inserted.len(), "nodes announced");
        }
    }

    fn on_update(&mut self, statuses: Vec<NodeStatus>) {
        let outcome = self.engine.apply_update(&statuses);
        debug!(
            applied = outcome.applied,
            skipped = outcome.skipped.len(),
            "update applied"
        );
    }

    fn on_log(&mut self, entry: LogLine) {
        self.engine.apply_log(entry);
    }
}

pub struct Controller<S> {
    registry: Registry<Session<S>>,
    session: Session<S>,
    channel: ChannelHandle,
    render_requested: bool,
}

impl<S: RenderSurface + 'static> Controller<S> {
    pub fn new(surface: S, channel: ChannelHandle, config: &ClientConfig) -> Self {
        let mut registry: Registry<Session<S>> = Registry::new();
        registry.register(EVENT_ADD, |s: &mut Session<S>, nodes: Vec<NodeSpec>| {
            s.on_add(nodes)
        });
        registry.register(EVENT_UPDATE, |s: &mut Session<S>, statuses: Vec<NodeStatus>| {
            s.on_update(statuses)
        });
        registry.register(EVENT_LOG, |s: &mut Session<S>, entry: LogLine| s.on_log(entry));

        Self {
            registry,
            session: Session {
                engine: SyncEngine::new(surface),
                panels: PanelBoard::new(channel.clone(), config.log_buffer_lines),
            },
            channel,
            render_requested: false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────

    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Frame(frame) => self.dispatch(frame),
            ChannelEvent::Opened { reconnected } => {
                info!(reconnected, "connection open");
                if reconnected {
                    let replayed = self.session.panels.resubscribe();
                    if replayed > 0 {
                        info!(replayed, "resubscribed expanded panels");
                    }
                }
            }
            ChannelEvent::Closed { reason, gave_up } => {
                warn!(%reason, gave_up, "connection closed");
            }
            ChannelEvent::Error(e) => error!(error = %e, "connection error"),
        }
        self.render_requested = true;
    }

    /// Decode and dispatch one raw text frame.
    pub fn handle_text(&mut self, text: &str) {
        match Frame::decode(text) {
            Ok(frame) => self.dispatch(frame),
            Err(e) => error!(error = %e, "dropping frame"),
        }
        self.render_requested = true;
    }

    fn dispatch(&mut self, frame: Frame) {
        match self.registry.dispatch(&mut self.session, frame) {
            Ok(()) => {}
            Err(e @ DispatchError::UnknownEvent(_)) => warn!(error = %e, "dropping frame"),
            Err(e) => error!(error = %e, "dropping frame"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    pub fn start_node(&self, id: &str) {
        self.channel.send_command(&Command::StartNode(id.to_string()));
    }

    pub fn stop_node(&self, id: &str) {
        self.channel.send_command(&Command::StopNode(id.to_string()));
    }

    /// Subscription follows the node's panel: a known node has its panel
    /// expanded, which sends the command. Ids without a panel go out as is.
    pub fn subscribe_node(&mut self, id: &str) {
        if self.session.panels.contains(id) {
            self.expand_panel(id);
        } else {
            self.channel.send_command(&Command::SubscribeNode(id.to_string()));
        }
    }

    pub fn unsubscribe_node(&mut self, id: &str) {
        if self.session.panels.contains(id) {
            self.collapse_panel(id);
        } else {
            self.channel.send_command(&Command::UnsubscribeNode(id.to_string()));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Gestures
    // ─────────────────────────────────────────────────────────────────────

    pub fn expand_panel(&mut self, id: &str) -> Option<PanelChange> {
        self.render_requested = true;
        self.session.panels.expand(id)
    }

    pub fn collapse_panel(&mut self, id: &str) -> Option<PanelChange> {
        self.render_requested = true;
        self.session.panels.collapse(id)
    }

    pub fn expand_all(&mut self) {
        self.session.engine.broadcast(UiSignal::ExpandAll);
        self.render_requested = true;
    }

    pub fn collapse_all(&mut self) {
        self.session.engine.broadcast(UiSignal::CollapseAll);
        self.render_requested = true;
    }

    /// Make `id` the only selected node.
    pub fn node_clicked(&mut self, id: &str) -> Vec<UiSignal> {
        self.render_requested = true;
        self.session.engine.select(id)
    }

    /// Selection changes reported by the renderer itself.
    pub fn on_view_select(&mut self, id: &str) {
        self.session.engine.on_view_select(id);
        self.render_requested = true;
    }

    pub fn on_view_unselect(&mut self, id: &str) {
        self.session.engine.on_view_unselect(id);
        self.render_requested = true;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// Whether a redraw is due; clears the flag.
    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.render_requested)
    }

    pub fn signals(&mut self) -> &mut SignalBus {
        self.session.engine.bus_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    pub fn store(&self) -> &GraphStore {
        self.session.engine.store()
    }

    pub fn view(&self) -> &GraphView<S> {
        self.session.engine.view()
    }

    pub fn panel(&self, id: &str) -> Option<NodePanel> {
        self.session.panels.get(id)
    }

    pub fn expanded_panels(&self) -> Vec<String> {
        self.session.panels.expanded()
    }

    pub fn registry(&self) -> &Registry<Session<S>> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ConnectionStatus, DetachedChannel};
    use crate::protocol::NodeState;
    use crate::signals::SignalFilter;
    use crate::view::{ElementId, MemorySurface};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn controller() -> (Controller<MemorySurface>, DetachedChannel) {
        let (handle, far) = ChannelHandle::detached();
        far.set_status(ConnectionStatus::Open);
        let controller = Controller::new(MemorySurface::new(), handle, &ClientConfig::default());
        (controller, far)
    }

    fn frame(event: &str, payload: serde_json::Value) -> ChannelEvent {
        ChannelEvent::Frame(Frame::new(event, payload))
    }

    fn add_db_api(c: &mut Controller<MemorySurface>) {
        c.handle_channel_event(frame(
            "add",
            json!([{"id": "db", "depends": []}, {"id": "api", "depends": ["db"]}]),
        ));
    }

    #[test]
    fn handlers_are_registered_for_every_inbound_event() {
        let (c, _far) = controller();
        assert_eq!(c.registry().len(), 3);
        for event in [EVENT_ADD, EVENT_UPDATE, EVENT_LOG] {
            assert!(c.registry().contains(event));
        }
    }

    #[test]
    fn add_then_update_colours_api_neighbourhood() {
        let (mut c, _far) = controller();
        add_db_api(&mut c);
        c.handle_text(r#"["update",[{"id":"api","state":"running"}]]"#);

        let surface = c.view().surface();
        assert_eq!(surface.classes(&ElementId::node("api")), vec!["running"]);
        assert_eq!(
            surface.classes(&ElementId::edge("api", "db")),
            vec!["running"]
        );
        assert_eq!(surface.classes(&ElementId::node("db")), vec!["unknown"]);
        assert_eq!(c.store().state("api"), Some(NodeState::Running));
    }

    #[test]
    fn announced_nodes_get_panels() {
        let (mut c, _far) = controller();
        c.handle_channel_event(frame("add", json!([{"id": "api", "depends": ["db"]}])));
        assert!(c.panel("api").is_some());
        // Placeholders are not announced nodes.
        assert!(c.panel("db").is_none());

        c.handle_channel_event(frame("add", json!([{"id": "db"}])));
        assert!(c.panel("db").is_some());
    }

    #[test]
    fn unknown_events_and_bad_frames_change_nothing() {
        let (mut c, _far) = controller();
        add_db_api(&mut c);
        let before = c.store().ids();

        c.handle_channel_event(frame("restart", json!({"id": "api"})));
        c.handle_text("not json");
        c.handle_text(r#"{"event":"add"}"#);
        c.handle_text("[]");
        c.handle_text(r#"[42, {}]"#);
        c.handle_text(r#"["add", {"id": "x"}]"#);

        assert_eq!(c.store().ids(), before);
        assert_eq!(c.view().surface().vertex_count(), 2);

        // Still processing afterwards.
        c.handle_text(r#"["add",[{"id":"web","depends":["api"]}]]"#);
        assert!(c.store().contains("web"));
    }

    #[test]
    fn commands_are_serialized_as_name_and_id() {
        let (mut c, mut far) = controller();
        c.start_node("api");
        c.stop_node("api");
        c.subscribe_node("db");
        c.unsubscribe_node("db");
        assert_eq!(
            far.drain(),
            vec![
                r#"["startNode","api"]"#,
                r#"["stopNode","api"]"#,
                r#"["subscribeNode","db"]"#,
                r#"["unsubscribeNode","db"]"#,
            ]
        );
    }

    #[test]
    fn commands_while_disconnected_are_dropped() {
        let (c, mut far) = controller();
        far.set_status(ConnectionStatus::Closed);
        assert!(!c.is_connected());
        c.start_node("api");
        assert!(far.drain().is_empty());
    }

    #[test]
    fn log_before_expansion_is_not_buffered() {
        let (mut c, mut far) = controller();
        add_db_api(&mut c);

        c.handle_channel_event(frame("log", json!({"nodeId": "api", "line": "early"})));
        assert_eq!(c.panel("api").unwrap().log_len(), 0);

        assert_eq!(c.expand_panel("api"), Some(PanelChange::Expanded));
        assert_eq!(
            far.drain_commands(),
            vec![Command::SubscribeNode("api".into())]
        );

        c.handle_channel_event(frame("log", json!({"nodeId": "api", "line": "started"})));
        c.handle_channel_event(frame("log", json!({"nodeId": "db", "line": "other"})));
        let panel = c.panel("api").unwrap();
        assert_eq!(panel.log_lines().collect::<Vec<_>>(), vec!["started"]);

        assert_eq!(c.collapse_panel("api"), Some(PanelChange::Collapsed));
        assert_eq!(c.panel("api").unwrap().log_len(), 0);
        assert_eq!(
            far.drain_commands(),
            vec![Command::UnsubscribeNode("api".into())]
        );
        assert_eq!(c.collapse_panel("api"), None);
        assert!(far.drain().is_empty());
    }

    #[test]
    fn subscribe_command_expands_the_panel() {
        let (mut c, mut far) = controller();
        add_db_api(&mut c);

        c.subscribe_node("api");
        assert_eq!(
            far.drain_commands(),
            vec![Command::SubscribeNode("api".into())]
        );
        c.handle_channel_event(frame("log", json!({"nodeId": "api", "line": "hello"})));
        let panel = c.panel("api").unwrap();
        assert!(panel.is_expanded());
        assert_eq!(panel.log_lines().collect::<Vec<_>>(), vec!["hello"]);

        // Already subscribed, nothing more to send.
        c.subscribe_node("api");
        assert!(far.drain().is_empty());

        c.handle_channel_event(ChannelEvent::Opened { reconnected: true });
        assert_eq!(
            far.drain_commands(),
            vec![Command::SubscribeNode("api".into())]
        );

        c.unsubscribe_node("api");
        assert_eq!(
            far.drain_commands(),
            vec![Command::UnsubscribeNode("api".into())]
        );
        assert!(!c.panel("api").unwrap().is_expanded());
        assert_eq!(c.panel("api").unwrap().log_len(), 0);
    }

    #[test]
    fn renderer_selection_reaches_panels_and_listeners() {
        let (mut c, _far) = controller();
        c.handle_channel_event(frame("add", json!([{"id": "a"}, {"id": "b"}])));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        c.signals().subscribe(SignalFilter::Node("a".into()), move |s| {
            sink.borrow_mut().push(s.clone())
        });

        c.on_view_select("a");
        assert!(c.panel("a").unwrap().is_active());
        assert!(!c.panel("b").unwrap().is_active());
        assert_eq!(*seen.borrow(), vec![UiSignal::NodeSelected("a".into())]);
        assert!(c.take_render_request());

        c.on_view_unselect("a");
        assert!(!c.panel("a").unwrap().is_active());
        assert_eq!(
            *seen.borrow(),
            vec![
                UiSignal::NodeSelected("a".into()),
                UiSignal::NodeUnselected("a".into())
            ]
        );
    }

    #[test]
    fn expand_all_and_collapse_all_reach_every_panel() {
        let (mut c, mut far) = controller();
        add_db_api(&mut c);

        c.expand_all();
        assert_eq!(c.expanded_panels(), vec!["api".to_string(), "db".to_string()]);
        let mut sent = far.drain_commands();
        sent.sort_by(|a, b| a.node_id().cmp(b.node_id()));
        assert_eq!(
            sent,
            vec![
                Command::SubscribeNode("api".into()),
                Command::SubscribeNode("db".into())
            ]
        );

        c.collapse_all();
        assert!(c.expanded_panels().is_empty());
        assert_eq!(far.drain_commands().len(), 2);
    }

    #[test]
    fn clicking_moves_selection_and_highlight() {
        let (mut c, _far) = controller();
        add_db_api(&mut c);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        c.signals()
            .subscribe(SignalFilter::All, move |s| sink.borrow_mut().push(s.clone()));

        c.node_clicked("db");
        let signals = c.node_clicked("api");
        assert_eq!(
            signals,
            vec![
                UiSignal::NodeUnselected("db".into()),
                UiSignal::NodeSelected("api".into())
            ]
        );
        assert_eq!(seen.borrow().len(), 3);
        assert_eq!(c.view().surface().selected(), vec!["api".to_string()]);
        assert!(c.panel("api").unwrap().is_active());
        assert!(!c.panel("db").unwrap().is_active());

        assert!(c.node_clicked("ghost").is_empty());
        assert_eq!(c.view().surface().selected(), vec!["api".to_string()]);
    }

    #[test]
    fn reconnect_replays_subscriptions() {
        let (mut c, mut far) = controller();
        add_db_api(&mut c);
        c.expand_panel("db");
        far.drain();

        c.handle_channel_event(ChannelEvent::Opened { reconnected: false });
        assert!(far.drain().is_empty());

        c.handle_channel_event(ChannelEvent::Closed {
            reason: "reset".into(),
            gave_up: false,
        });
        c.handle_channel_event(ChannelEvent::Opened { reconnected: true });
        assert_eq!(
            far.drain_commands(),
            vec![Command::SubscribeNode("db".into())]
        );
    }

    #[test]
    fn every_event_requests_one_render() {
        let (mut c, _far) = controller();
        assert!(!c.take_render_request());

        add_db_api(&mut c);
        assert!(c.take_render_request());
        assert!(!c.take_render_request());

        c.handle_channel_event(ChannelEvent::Error("boom".into()));
        assert!(c.take_render_request());
    }
}

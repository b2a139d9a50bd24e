//! # digraph
//!
//! Client-side sync engine for a live dependency-graph dashboard.
//!
//! A process manager pushes `[eventName, payload]` frames over a WebSocket;
//! this crate keeps a local graph of nodes and dependency edges in step with
//! them, colours every node and its incident edges by lifecycle state, and
//! sends `startNode` / `stopNode` / `subscribeNode` / `unsubscribeNode`
//! commands back.
//!
//! ## Quick Start
//!
//! ```
//! use digraph::prelude::*;
//!
//! let (handle, _far) = ChannelHandle::detached();
//! let mut controller = Controller::new(MemorySurface::new(), handle, &ClientConfig::default());
//!
//! controller.handle_text(r#"["add",[{"id":"db"},{"id":"api","depends":["db"]}]]"#);
//! controller.handle_text(r#"["update",[{"id":"api","state":"running"}]]"#);
//!
//! assert_eq!(controller.store().state("api"), Some(NodeState::Running));
//! assert!(controller.view().has_edge("api", "db"));
//! ```
//!
//! ## Feature Flags
//!
//! - `net` (default): WebSocket transport via `tokio-tungstenite`
//!
//! ## Modules
//!
//! - [`channel`]: Connection lifecycle, send path, reconnect
//! - [`dispatch`]: Event name to handler routing
//! - [`store`] / [`sync`]: Node records and reconciliation onto the view
//! - [`view`] / [`layout`]: Render surface abstraction and breadth-first layout
//! - [`controller`]: Commands, panels and selection

#[path = "core/error.rs"]
pub mod error;

#[path = "core/protocol.rs"]
pub mod protocol;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/channel.rs"]
pub mod channel;

#[path = "core/dispatch.rs"]
pub mod dispatch;

#[path = "core/store.rs"]
pub mod store;

#[path = "core/signals.rs"]
pub mod signals;

#[path = "core/layout.rs"]
pub mod layout;

#[path = "core/view.rs"]
pub mod view;

#[path = "core/sync.rs"]
pub mod sync;

#[path = "core/panels.rs"]
pub mod panels;

#[path = "core/controller.rs"]
pub mod controller;

/// Prelude module for convenient imports.
///
/// ```
/// use digraph::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "net")]
    pub use crate::channel::Channel;
    pub use crate::channel::{ChannelEvent, ChannelHandle, ConnectionStatus};
    pub use crate::config::{ClientConfig, ReconnectPolicy};
    pub use crate::controller::Controller;
    pub use crate::panels::{NodePanel, PanelChange};
    pub use crate::protocol::{Command, Frame, LogLine, NodeSpec, NodeState, NodeStatus};
    pub use crate::signals::{SignalBus, SignalFilter, UiSignal};
    pub use crate::store::GraphStore;
    pub use crate::view::{ElementId, GraphView, MemorySurface, RenderSurface};
}

use crate::error::BridgeError;
use crate::messages::{encode_message, MessageSpec};
use crate::registry::Subscription;
use crate::setpoint::SetpointEncoder;
use mav_link::{LinkError, MavHeader, WireMessage};
use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// A unit of bridge functionality that listens to message kinds.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handlers to register. Called once, when the plugin is loaded.
    fn subscriptions(self: Arc<Self>) -> Vec<Subscription>;
}

/// A loaded plugin, kept both as a trait object and as `Any` for typed lookup.
#[derive(Clone)]
pub struct LoadedPlugin {
    pub plugin: Arc<dyn Plugin>,
    any: Arc<dyn Any + Send + Sync>,
}

impl LoadedPlugin {
    pub fn new<P: Plugin + 'static>(plugin: P) -> Self {
        let plugin = Arc::new(plugin);
        Self {
            plugin: Arc::clone(&plugin) as Arc<dyn Plugin>,
            any: plugin,
        }
    }

    pub fn name(&self) -> &'static str {
        self.plugin.name()
    }

    pub fn downcast<P: Plugin + 'static>(&self) -> Option<Arc<P>> {
        Arc::clone(&self.any).downcast::<P>().ok()
    }
}

/// Vehicle-side view shared by all plugins: our ids, the target's ids and the outbound queue.
#[derive(Debug)]
pub struct Uas {
    pub system_id: u8,
    pub component_id: u8,
    pub target_system: u8,
    pub target_component: u8,
    sequence: AtomicU8,
    outbound: mpsc::UnboundedSender<WireMessage>,
}

impl Uas {
    pub fn new(
        system_id: u8,
        component_id: u8,
        target_system: u8,
        target_component: u8,
    ) -> (Self, mpsc::UnboundedReceiver<WireMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let uas = Self {
            system_id,
            component_id,
            target_system,
            target_component,
            sequence: AtomicU8::new(0),
            outbound,
        };
        (uas, rx)
    }

    pub fn setpoint_encoder(&self) -> SetpointEncoder {
        SetpointEncoder::new(self.target_system, self.target_component)
    }

    /// Encode `msg` and queue it for the link.
    pub fn send_message<M: MessageSpec>(&self, msg: &M) -> Result<(), BridgeError> {
        self.send_raw(encode_message(msg))
    }

    /// Stamp our header on `msg` and queue it. Does not wait for the link.
    pub fn send_raw(&self, msg: WireMessage) -> Result<(), BridgeError> {
        let header = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        trace!(kind = %msg.kind, seq = header.sequence, "queue outbound");
        self.outbound
            .send(msg.with_header(header))
            .map_err(|_| BridgeError::Link(LinkError::Closed))
    }
}

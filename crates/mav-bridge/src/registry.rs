//! Kind-keyed handler registry.
//!
//! Handlers come in two modes:
//!
//! - **Typed**: built with [`make_handler`]. The kind is taken from the message type's
//!   [`MessageSpec::KIND`], frames with bad framing are filtered out, and the payload is
//!   decoded before the callback runs. A decode failure skips only that handler.
//! - **Raw**: built with [`make_raw_handler`]. The callback gets the undecoded message and
//!   the framing verdict and decides for itself.
//!
//! Registration takes `&mut self` and happens while plugins load; dispatch takes `&self`,
//! so a loaded registry can be shared behind an `Arc` without locking.

use crate::error::DecodeError;
use crate::messages::{decode_message, MessageSpec};
use crate::metrics::BridgeMetrics;
use mav_link::{Framing, KindId, ReceivedFrame, WireMessage};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, trace};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandlerMode {
    Typed,
    Raw,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    Framing(Framing),
    Decode(DecodeError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Framing(framing) => write!(f, "framing error: {framing}"),
            SkipReason::Decode(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug)]
pub enum HandlerError {
    Skipped(SkipReason),
    Failed(anyhow::Error),
}

type Callback = Box<dyn Fn(&ReceivedFrame) -> Result<(), HandlerError> + Send + Sync>;

pub struct Handler {
    name: String,
    mode: HandlerMode,
    callback: Callback,
}

impl Handler {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> HandlerMode {
        self.mode
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A handler together with the kind it listens to.
#[derive(Debug)]
pub struct Subscription {
    pub kind: KindId,
    pub handler: Handler,
}

/// Typed subscription; the kind is deduced from `M`.
pub fn make_handler<M, F>(name: impl Into<String>, f: F) -> Subscription
where
    M: MessageSpec,
    F: Fn(&WireMessage, M) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let callback = move |frame: &ReceivedFrame| {
        if !frame.framing.is_ok() {
            return Err(HandlerError::Skipped(SkipReason::Framing(frame.framing)));
        }
        let data = decode_message::<M>(&frame.message)
            .map_err(|e| HandlerError::Skipped(SkipReason::Decode(e)))?;
        f(&frame.message, data).map_err(HandlerError::Failed)
    };
    Subscription {
        kind: M::KIND,
        handler: Handler {
            name: name.into(),
            mode: HandlerMode::Typed,
            callback: Box::new(callback),
        },
    }
}

/// Raw subscription; sees every frame of `kind`, framing errors included.
pub fn make_raw_handler<F>(kind: KindId, name: impl Into<String>, f: F) -> Subscription
where
    F: Fn(&WireMessage, Framing) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let callback = move |frame: &ReceivedFrame| {
        f(&frame.message, frame.framing).map_err(HandlerError::Failed)
    };
    Subscription {
        kind,
        handler: Handler {
            name: name.into(),
            mode: HandlerMode::Raw,
            callback: Box::new(callback),
        },
    }
}

/// Outcome of one [`HandlerRegistry::dispatch`] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DispatchReport {
    /// Handlers registered for the kind
    pub handlers: usize,
    pub delivered: usize,
    pub skipped: usize,
    /// Returned an error or panicked
    pub failed: usize,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<KindId, Vec<Handler>>,
    metrics: Option<BridgeMetrics>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: BridgeMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Append `handler` to the sequence for `kind`.
    pub fn register(&mut self, kind: KindId, handler: Handler) {
        trace!(%kind, handler = %handler.name, "register handler");
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn subscribe(&mut self, sub: Subscription) {
        self.register(sub.kind, sub.handler);
    }

    pub fn subscribe_all(&mut self, subs: impl IntoIterator<Item = Subscription>) {
        for sub in subs {
            self.subscribe(sub);
        }
    }

    pub fn handler_names(&self, kind: KindId) -> Vec<&str> {
        self.handlers
            .get(&kind)
            .map(|hs| hs.iter().map(Handler::name).collect())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> impl Iterator<Item = KindId> + '_ {
        self.handlers.keys().copied()
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route `frame` to every handler registered for its kind, in registration order.
    ///
    /// Never fails: skips, handler errors and panics are logged and counted per handler
    /// and do not stop delivery to the remaining handlers.
    pub fn dispatch(&self, frame: &ReceivedFrame) -> DispatchReport {
        let kind = frame.kind();
        if let Some(m) = &self.metrics {
            m.rx_messages.inc();
        }
        let Some(handlers) = self.handlers.get(&kind) else {
            trace!(%kind, "no handlers");
            if let Some(m) = &self.metrics {
                m.unhandled_messages.inc();
            }
            return DispatchReport::default();
        };

        let mut report = DispatchReport {
            handlers: handlers.len(),
            ..Default::default()
        };
        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| (handler.callback)(frame)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(HandlerError::Skipped(reason))) => {
                    debug!(%kind, handler = %handler.name, %reason, "handler skipped");
                    report.skipped += 1;
                    if let Some(m) = &self.metrics {
                        m.handler_skips.inc();
                    }
                }
                Ok(Err(HandlerError::Failed(e))) => {
                    error!(%kind, handler = %handler.name, error = %e, "handler failed");
                    report.failed += 1;
                    if let Some(m) = &self.metrics {
                        m.handler_failures.inc();
                    }
                }
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(%kind, handler = %handler.name, panic = %msg, "handler panicked");
                    report.failed += 1;
                    if let Some(m) = &self.metrics {
                        m.handler_failures.inc();
                    }
                }
            }
        }
        report
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(k, hs)| (k, hs.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{encode_message, MagCalProgress};
    use crate::metrics::MetricsHub;
    use bytes::{Buf, BufMut};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Same kind as `MagCalProgress`, different (shorter) layout.
    #[derive(Debug)]
    struct LegacyProgress {
        compass_id: u8,
    }

    impl MessageSpec for LegacyProgress {
        const KIND: KindId = MagCalProgress::KIND;
        const NAME: &'static str = "LEGACY_PROGRESS";
        const BASE_LEN: usize = 5;
        const MAX_LEN: usize = 5;

        fn read_fields<B: Buf>(buf: &mut B) -> Self {
            let compass_id = buf.get_u8();
            buf.advance(4);
            Self { compass_id }
        }

        fn write_fields<B: BufMut>(&self, buf: &mut B) {
            buf.put_u8(self.compass_id);
            buf.put_bytes(0, 4);
        }
    }

    fn progress_frame(framing: Framing) -> ReceivedFrame {
        let msg = encode_message(&MagCalProgress {
            compass_id: 1,
            cal_mask: 0b011,
            completion_pct: 40,
            ..Default::default()
        });
        ReceivedFrame::new(msg, framing)
    }

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_dispatch_without_handlers_is_noop() {
        let registry = HandlerRegistry::new();
        let report = registry.dispatch(&progress_frame(Framing::Ok));
        assert_eq!(report, DispatchReport::default());
    }

    #[test]
    fn test_kind_is_deduced_from_message_type() {
        let sub = make_handler::<MagCalProgress, _>("progress", |_, _| Ok(()));
        assert_eq!(sub.kind, KindId::new(191));
        assert_eq!(sub.handler.mode(), HandlerMode::Typed);
    }

    #[test]
    fn test_decode_failure_skips_only_that_handler() {
        let seen = recorder();
        let mut registry = HandlerRegistry::new();
        let a = Arc::clone(&seen);
        registry.subscribe(make_handler::<MagCalProgress, _>("a", move |_, p| {
            a.lock().push(format!("a:{}", p.completion_pct));
            Ok(())
        }));
        let b = Arc::clone(&seen);
        registry.subscribe(make_handler::<LegacyProgress, _>("b", move |_, p| {
            b.lock().push(format!("b:{}", p.compass_id));
            Ok(())
        }));

        let report = registry.dispatch(&progress_frame(Framing::Ok));
        assert_eq!(report.handlers, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(*seen.lock(), vec!["a:40".to_string()]);
    }

    #[test]
    fn test_framing_error_reaches_raw_handler_only() {
        let seen = recorder();
        let mut registry = HandlerRegistry::new();
        let typed = Arc::clone(&seen);
        registry.subscribe(make_handler::<MagCalProgress, _>("typed", move |_, _| {
            typed.lock().push("typed".into());
            Ok(())
        }));
        let raw = Arc::clone(&seen);
        registry.subscribe(make_raw_handler(
            MagCalProgress::KIND,
            "raw",
            move |msg, framing| {
                raw.lock().push(format!("raw:{framing}:{}", msg.len()));
                Ok(())
            },
        ));

        let report = registry.dispatch(&progress_frame(Framing::BadCrc));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(*seen.lock(), vec!["raw:bad_crc:27".to_string()]);

        registry.dispatch(&progress_frame(Framing::Ok));
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_failing_and_panicking_handlers_do_not_block_siblings() {
        let seen = recorder();
        let mut registry = HandlerRegistry::new();
        registry.subscribe(make_handler::<MagCalProgress, _>("err", |_, _| {
            anyhow::bail!("boom")
        }));
        registry.subscribe(make_handler::<MagCalProgress, _>("panic", |_, p| {
            if p.compass_id == 1 {
                panic!("handler bug");
            }
            Ok(())
        }));
        let last = Arc::clone(&seen);
        registry.subscribe(make_handler::<MagCalProgress, _>("last", move |_, _| {
            last.lock().push("last".into());
            Ok(())
        }));

        let report = registry.dispatch(&progress_frame(Framing::Ok));
        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 1);

        // Next message still goes through
        registry.dispatch(&progress_frame(Framing::Ok));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let seen = recorder();
        let mut registry = HandlerRegistry::new();
        for name in ["first", "second", "third"] {
            let s = Arc::clone(&seen);
            registry.subscribe(make_raw_handler(MagCalProgress::KIND, name, move |_, _| {
                s.lock().push(name.to_string());
                Ok(())
            }));
        }
        registry.dispatch(&progress_frame(Framing::Ok));
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
        assert_eq!(
            registry.handler_names(MagCalProgress::KIND),
            vec!["first", "second", "third"]
        );
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec![KindId::new(191)]);
    }

    #[test]
    fn test_outcomes_are_counted() {
        let hub = MetricsHub::new().unwrap();
        let mut registry = HandlerRegistry::new().with_metrics(hub.bridge.clone());
        registry.subscribe(make_handler::<LegacyProgress, _>("legacy", |_, _| Ok(())));

        registry.dispatch(&progress_frame(Framing::Ok));
        let unknown = WireMessage::new(KindId::new(0), &[0u8; 9]).unwrap();
        registry.dispatch(&ReceivedFrame::new(unknown, Framing::Ok));

        assert_eq!(hub.bridge.rx_messages.get(), 2);
        assert_eq!(hub.bridge.handler_skips.get(), 1);
        assert_eq!(hub.bridge.unhandled_messages.get(), 1);
        assert_eq!(hub.bridge.handler_failures.get(), 0);
    }
}

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::metrics::MetricsHub;
use crate::plugin::{LoadedPlugin, Plugin, Uas};
use crate::plugins::{self, SetpointAttitudePlugin, SetpointPositionPlugin};
use crate::registry::{DispatchReport, HandlerRegistry};
use crate::tf_listener::{TransformBuffer, TransformListener};
use mav_link::{Link, LinkError, ReceivedFrame, WireMessage};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Loaded plugins, their handlers and the outbound queue, driven by [`Bridge::poll_once`].
pub struct Bridge {
    config: BridgeConfig,
    uas: Arc<Uas>,
    outbound: mpsc::UnboundedReceiver<WireMessage>,
    registry: Arc<HandlerRegistry>,
    plugins: Vec<LoadedPlugin>,
    metrics: MetricsHub,
    started: Instant,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let metrics = MetricsHub::new().map_err(BridgeError::Metrics)?;
        let (uas, outbound) = Uas::new(
            config.system_id,
            config.component_id,
            config.target_system,
            config.target_component,
        );
        let uas = Arc::new(uas);

        let plugins = plugins::load_enabled(&uas, &config);
        let mut registry = HandlerRegistry::new().with_metrics(metrics.bridge.clone());
        for loaded in &plugins {
            let subs = Arc::clone(&loaded.plugin).subscriptions();
            info!(plugin = loaded.name(), handlers = subs.len(), "plugin loaded");
            registry.subscribe_all(subs);
        }
        metrics.bridge.plugins_loaded.set(plugins.len() as i64);

        Ok(Self {
            config,
            uas,
            outbound,
            registry: Arc::new(registry),
            plugins,
            metrics,
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn uas(&self) -> &Arc<Uas> {
        &self.uas
    }

    /// Shared, read-only after construction.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsHub {
        &self.metrics
    }

    pub fn plugins(&self) -> &[LoadedPlugin] {
        &self.plugins
    }

    pub fn plugin<P: Plugin + 'static>(&self) -> Option<Arc<P>> {
        self.plugins.iter().find_map(LoadedPlugin::downcast::<P>)
    }

    /// Milliseconds since the bridge was created, wrapping like a vehicle boot clock.
    pub fn time_boot_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    pub fn handle_frame(&self, frame: &ReceivedFrame) -> DispatchReport {
        self.registry.dispatch(frame)
    }

    /// Send everything plugins queued. A message whose send fails is dropped.
    pub fn flush_outbound<L: Link>(&mut self, link: &mut L) -> Result<usize, BridgeError> {
        let mut sent = 0;
        while let Ok(msg) = self.outbound.try_recv() {
            link.send(&msg)?;
            self.metrics.bridge.tx_messages.inc();
            sent += 1;
        }
        Ok(sent)
    }

    /// Receive at most one frame, dispatch it, then flush outbound traffic.
    ///
    /// Returns `Ok(None)` when the link timed out or handed back a malformed frame.
    /// Only errors that end the link (`Closed`, `Io`, ...) are returned.
    pub fn poll_once<L: Link>(
        &mut self,
        link: &mut L,
        timeout_ms: Option<u64>,
    ) -> Result<Option<DispatchReport>, BridgeError> {
        let report = match link.recv(timeout_ms) {
            Ok(frame) => Some(self.handle_frame(&frame)),
            Err(LinkError::Timeout) => None,
            Err(LinkError::InvalidFrame(reason)) => {
                warn!(reason, "malformed frame skipped");
                self.metrics.bridge.link_errors.inc();
                None
            }
            Err(e) => return Err(e.into()),
        };
        self.flush_outbound(link)?;
        Ok(report)
    }

    /// Start one transform listener per loaded setpoint plugin, each on the frame pair
    /// and rate from that plugin's `tf` config. Needs a tokio runtime.
    pub fn spawn_tf_listeners(&self, buffer: Arc<TransformBuffer>) -> Vec<TransformListener> {
        let mut listeners = Vec::new();
        let started = self.started;
        if let Some(position) = self.plugin::<SetpointPositionPlugin>() {
            let tf = &self.config.setpoint_position.tf;
            listeners.push(TransformListener::spawn(
                Arc::clone(&buffer),
                tf.frame_id.clone(),
                tf.child_frame_id.clone(),
                tf.rate_hz,
                move |transform| {
                    let time_boot_ms = started.elapsed().as_millis() as u32;
                    if let Err(e) = position.handle_transform(transform, time_boot_ms) {
                        warn!(error = %e, "position setpoint from tf failed");
                    }
                },
            ));
        }
        if let Some(attitude) = self.plugin::<SetpointAttitudePlugin>() {
            let tf = &self.config.setpoint_attitude.tf;
            listeners.push(TransformListener::spawn(
                buffer,
                tf.frame_id.clone(),
                tf.child_frame_id.clone(),
                tf.rate_hz,
                move |transform| {
                    let time_boot_ms = started.elapsed().as_millis() as u32;
                    if let Err(e) = attitude.handle_transform(transform, time_boot_ms) {
                        warn!(error = %e, "attitude setpoint from tf failed");
                    }
                },
            ));
        }
        listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{
        decode_message, encode_message, MagCalProgress, MessageSpec, SetAttitudeTarget,
        SetPositionTargetLocalNed,
    };
    use crate::plugins::MagCalStatusPlugin;
    use mav_link::{Framing, KindId, LinkInfo, MockLink};
    use nalgebra::{Isometry3, Translation3, UnitQuaternion};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Plays back a fixed list of `recv` outcomes, then times out.
    struct ScriptedLink {
        script: VecDeque<mav_link::Result<ReceivedFrame>>,
        sent: Vec<WireMessage>,
    }

    impl Link for ScriptedLink {
        fn open(_endpoint: &str) -> mav_link::Result<Self> {
            Ok(Self {
                script: VecDeque::new(),
                sent: Vec::new(),
            })
        }

        fn list() -> mav_link::Result<Vec<LinkInfo>> {
            Ok(Vec::new())
        }

        fn recv(&mut self, _timeout_ms: Option<u64>) -> mav_link::Result<ReceivedFrame> {
            self.script.pop_front().unwrap_or(Err(LinkError::Timeout))
        }

        fn send(&mut self, msg: &WireMessage) -> mav_link::Result<()> {
            self.sent.push(msg.clone());
            Ok(())
        }
    }

    fn translation(x: f64, y: f64, z: f64) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity())
    }

    fn progress(compass_id: u8, completion_pct: u8) -> WireMessage {
        encode_message(&MagCalProgress {
            compass_id,
            cal_mask: 0b011,
            completion_pct,
            ..Default::default()
        })
    }

    #[test]
    fn test_new_loads_all_builtins_by_default() {
        let bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let names: Vec<_> = bridge.plugins().iter().map(LoadedPlugin::name).collect();
        assert_eq!(
            names,
            vec!["mag_calibration_status", "setpoint_position", "setpoint_attitude"]
        );
        assert_eq!(bridge.registry().len(), 2);
        assert_eq!(bridge.metrics().bridge.plugins_loaded.get(), 3);
    }

    #[test]
    fn test_poll_once_dispatches_into_plugins() {
        let mut bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let mut link = MockLink::open("mock0").unwrap();
        let handle = link.handle();
        handle.inject(progress(0, 50), Framing::Ok);
        handle.inject(progress(1, 100), Framing::BadCrc);
        handle.inject(progress(1, 100), Framing::Ok);

        let mut reports = Vec::new();
        while let Some(report) = bridge.poll_once(&mut link, Some(0)).unwrap() {
            reports.push(report);
        }
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[1].skipped, 1);

        let mag = bridge.plugin::<MagCalStatusPlugin>().unwrap();
        assert_eq!(mag.status_topic().latest(), Some(75));
        assert_eq!(bridge.metrics().bridge.rx_messages.get(), 3);
        assert_eq!(bridge.metrics().bridge.handler_skips.get(), 1);
    }

    #[test]
    fn test_unknown_kind_is_counted_not_fatal() {
        let mut bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let mut link = MockLink::open("mock0").unwrap();
        let heartbeat = WireMessage::new(KindId::new(0), &[0u8; 9]).unwrap();
        link.handle().inject(heartbeat, Framing::Ok);

        let report = bridge.poll_once(&mut link, Some(0)).unwrap();
        assert_eq!(report, Some(DispatchReport::default()));
        assert_eq!(bridge.metrics().bridge.unhandled_messages.get(), 1);
    }

    #[test]
    fn test_outbound_is_flushed_to_link() {
        let mut bridge = Bridge::new(BridgeConfig {
            target_system: 9,
            ..Default::default()
        })
        .unwrap();
        let mut link = MockLink::open("mock0").unwrap();
        let handle = link.handle();

        let position = bridge.plugin::<SetpointPositionPlugin>().unwrap();
        position.handle_transform(&translation(1.0, 2.0, 3.0), 0).unwrap();

        assert_eq!(bridge.poll_once(&mut link, Some(0)).unwrap(), None);
        let sent = handle.take_sent();
        assert_eq!(sent.len(), 1);
        let sp = decode_message::<SetPositionTargetLocalNed>(&sent[0]).unwrap();
        assert_eq!((sp.target_system, sp.x, sp.z), (9, 1.0, 3.0));
        assert_eq!(sent[0].header.component_id, 240);
        assert_eq!(bridge.metrics().bridge.tx_messages.get(), 1);
    }

    #[test]
    fn test_closed_link_is_an_error() {
        let mut bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let mut link = MockLink::open("mock0").unwrap();
        link.handle().close();
        let err = bridge.poll_once(&mut link, Some(0)).unwrap_err();
        assert!(matches!(err, BridgeError::Link(LinkError::Closed)));
    }

    #[test]
    fn test_malformed_frame_is_skipped_and_counted() {
        let mut bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let mut link = ScriptedLink::open("scripted").unwrap();
        link.script.extend([
            Err(LinkError::InvalidFrame("truncated header")),
            Ok(ReceivedFrame::new(progress(0, 50), Framing::Ok)),
            Err(LinkError::Closed),
        ]);
        let position = bridge.plugin::<SetpointPositionPlugin>().unwrap();
        position.handle_transform(&translation(1.0, 0.0, 0.0), 0).unwrap();

        assert_eq!(bridge.poll_once(&mut link, Some(0)).unwrap(), None);
        assert_eq!(bridge.metrics().bridge.link_errors.get(), 1);
        // Outbound traffic still goes out on a skipped frame
        assert_eq!(link.sent.len(), 1);

        let report = bridge.poll_once(&mut link, Some(0)).unwrap().unwrap();
        assert_eq!(report.delivered, 1);
        let mag = bridge.plugin::<MagCalStatusPlugin>().unwrap();
        assert_eq!(mag.status_topic().latest(), Some(25));

        let err = bridge.poll_once(&mut link, Some(0)).unwrap_err();
        assert!(matches!(err, BridgeError::Link(LinkError::Closed)));
        assert_eq!(bridge.metrics().bridge.link_errors.get(), 1);
    }

    #[test]
    fn test_denied_plugin_cannot_be_looked_up() {
        let bridge = Bridge::new(BridgeConfig {
            plugin_denylist: vec!["*".into()],
            plugin_allowlist: vec!["setpoint_position".into()],
            ..Default::default()
        })
        .unwrap();
        assert!(bridge.plugin::<MagCalStatusPlugin>().is_none());
        assert!(bridge.plugin::<SetpointPositionPlugin>().is_some());
        assert!(bridge.registry().is_empty());
    }

    #[tokio::test]
    async fn test_tf_listeners_follow_their_own_frames() {
        let mut bridge = Bridge::new(BridgeConfig::default()).unwrap();
        let buffer = Arc::new(TransformBuffer::new());
        buffer.set_transform("map", "target_position", translation(5.0, 0.0, -2.0));
        let tilt = Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5),
        );
        buffer.set_transform("map", "target_attitude", tilt);
        let listeners = bridge.spawn_tf_listeners(Arc::clone(&buffer));
        assert_eq!(listeners.len(), 2);

        let mut link = MockLink::open("mock0").unwrap();
        let handle = link.handle();
        let mut sent = Vec::new();
        for _ in 0..200 {
            bridge.flush_outbound(&mut link).unwrap();
            sent.extend(handle.take_sent());
            let kinds: Vec<_> = sent.iter().map(|m| m.kind).collect();
            if kinds.contains(&SetPositionTargetLocalNed::KIND)
                && kinds.contains(&SetAttitudeTarget::KIND)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for listener in listeners {
            listener.shutdown().await;
        }

        let local = sent
            .iter()
            .find_map(|m| decode_message::<SetPositionTargetLocalNed>(m).ok())
            .unwrap();
        assert_eq!(local.x, 5.0);
        let att = sent
            .iter()
            .find_map(|m| decode_message::<SetAttitudeTarget>(m).ok())
            .unwrap();
        let yaw = crate::frame_conversion::wire_to_quaternion(&att.q).euler_angles().2;
        assert!((yaw - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_no_listener_without_setpoint_plugins() {
        let bridge = Bridge::new(BridgeConfig {
            plugin_denylist: vec!["setpoint_*".into()],
            ..Default::default()
        })
        .unwrap();
        assert!(bridge
            .spawn_tf_listeners(Arc::new(TransformBuffer::new()))
            .is_empty());
    }
}

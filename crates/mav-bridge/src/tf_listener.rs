//! Latest-transform buffer and a periodic listener task.

use nalgebra::Isometry3;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// How long one lookup waits for a transform to show up.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

const FALLBACK_PERIOD: Duration = Duration::from_millis(100);

/// Latest transform per `(frame_id, child_frame_id)` pair.
pub struct TransformBuffer {
    transforms: RwLock<HashMap<(String, String), Isometry3<f64>>>,
    version: watch::Sender<u64>,
}

impl Default for TransformBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformBuffer {
    pub fn new() -> Self {
        let (version, _rx) = watch::channel(0);
        Self {
            transforms: RwLock::new(HashMap::new()),
            version,
        }
    }

    pub fn set_transform(&self, frame_id: &str, child_frame_id: &str, tf: Isometry3<f64>) {
        self.transforms
            .write()
            .insert((frame_id.to_string(), child_frame_id.to_string()), tf);
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub fn lookup(&self, frame_id: &str, child_frame_id: &str) -> Option<Isometry3<f64>> {
        self.transforms
            .read()
            .get(&(frame_id.to_string(), child_frame_id.to_string()))
            .copied()
    }

    /// Look up a transform, waiting at most `timeout` for it to be set.
    pub async fn wait_for(
        &self,
        frame_id: &str,
        child_frame_id: &str,
        timeout: Duration,
    ) -> Option<Isometry3<f64>> {
        let deadline = Instant::now() + timeout;
        let mut rx = self.version.subscribe();
        loop {
            if let Some(tf) = self.lookup(frame_id, child_frame_id) {
                return Some(tf);
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                _ => return None,
            }
        }
    }
}

/// Background task that looks a transform up at a fixed rate and hands it to a callback.
///
/// Dropping the listener cancels the task; [`TransformListener::shutdown`] also waits
/// for it to finish.
pub struct TransformListener {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TransformListener {
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(
        buffer: Arc<TransformBuffer>,
        frame_id: impl Into<String>,
        child_frame_id: impl Into<String>,
        rate_hz: f64,
        callback: F,
    ) -> Self
    where
        F: Fn(&Isometry3<f64>) + Send + Sync + 'static,
    {
        let frame_id = frame_id.into();
        let child_frame_id = child_frame_id.into();
        let period = if rate_hz.is_finite() && rate_hz > 0.0 {
            Duration::try_from_secs_f64(1.0 / rate_hz).unwrap_or(FALLBACK_PERIOD)
        } else {
            FALLBACK_PERIOD
        };
        let (stop, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            debug!(frame = %frame_id, child = %child_frame_id, ?period, "tf listener started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                let found = tokio::select! {
                    _ = &mut stop_rx => break,
                    tf = buffer.wait_for(&frame_id, &child_frame_id, LOOKUP_TIMEOUT) => tf,
                };
                match found {
                    Some(tf) => callback(&tf),
                    None => trace!(frame = %frame_id, child = %child_frame_id, "no transform"),
                }
            }
            debug!(frame = %frame_id, child = %child_frame_id, "tf listener stopped");
        });

        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TransformListener {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

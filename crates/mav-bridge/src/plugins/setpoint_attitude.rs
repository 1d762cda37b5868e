//! Attitude and thrust setpoints.

use crate::error::BridgeError;
use crate::plugin::{Plugin, Uas};
use crate::registry::Subscription;
use crate::setpoint::{attitude_mask, AttitudeTarget};
use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

pub const NAME: &str = "setpoint_attitude";

pub struct SetpointAttitudePlugin {
    uas: Arc<Uas>,
    /// Normalized thrust used with orientations from the transform listener
    thrust: Mutex<f32>,
}

impl SetpointAttitudePlugin {
    pub fn new(uas: Arc<Uas>) -> Self {
        Self {
            uas,
            thrust: Mutex::new(0.0),
        }
    }

    /// Store thrust for later attitude targets. Values outside `0.0..=1.0` are dropped.
    pub fn set_thrust(&self, thrust: f32) -> bool {
        if !(0.0..=1.0).contains(&thrust) {
            warn!(thrust, "thrust out of range, ignored");
            return false;
        }
        *self.thrust.lock() = thrust;
        true
    }

    pub fn thrust(&self) -> f32 {
        *self.thrust.lock()
    }

    /// Send an orientation target; body rates are ignored by the vehicle.
    pub fn send_attitude(
        &self,
        orientation: UnitQuaternion<f32>,
        thrust: f32,
        time_boot_ms: u32,
    ) -> Result<(), BridgeError> {
        self.send(AttitudeTarget {
            time_boot_ms,
            type_mask: attitude_mask::IGNORE_BODY_RATES,
            orientation,
            body_rate: Vector3::zeros(),
            thrust,
        })
    }

    /// Send body rates (roll, pitch, yaw); the orientation is ignored by the vehicle.
    pub fn send_body_rates(
        &self,
        body_rate: Vector3<f32>,
        thrust: f32,
        time_boot_ms: u32,
    ) -> Result<(), BridgeError> {
        self.send(AttitudeTarget {
            time_boot_ms,
            type_mask: attitude_mask::ATTITUDE_IGNORE,
            orientation: UnitQuaternion::identity(),
            body_rate,
            thrust,
        })
    }

    pub fn handle_transform(
        &self,
        tf: &Isometry3<f64>,
        time_boot_ms: u32,
    ) -> Result<(), BridgeError> {
        let orientation: UnitQuaternion<f32> = tf.rotation.cast();
        self.send_attitude(orientation, self.thrust(), time_boot_ms)
    }

    fn send(&self, target: AttitudeTarget) -> Result<(), BridgeError> {
        let sp = self.uas.setpoint_encoder().encode_attitude_target(&target);
        self.uas.send_message(&sp)
    }
}

impl Plugin for SetpointAttitudePlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn subscriptions(self: Arc<Self>) -> Vec<Subscription> {
        Vec::new()
    }
}

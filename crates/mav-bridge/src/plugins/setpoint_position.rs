//! Position setpoints in local NED and global frames.

use crate::error::BridgeError;
use crate::messages::mav_frame;
use crate::plugin::{Plugin, Uas};
use crate::registry::Subscription;
use crate::setpoint::{position_mask, GlobalPositionTarget, LocalPositionTarget};
use nalgebra::{Isometry3, Vector3};
use std::sync::Arc;
use tracing::debug;

pub const NAME: &str = "setpoint_position";

/// Sends position targets; listens to nothing.
pub struct SetpointPositionPlugin {
    uas: Arc<Uas>,
}

impl SetpointPositionPlugin {
    pub fn new(uas: Arc<Uas>) -> Self {
        Self { uas }
    }

    pub fn send_local_target(&self, target: &LocalPositionTarget) -> Result<(), BridgeError> {
        let sp = self.uas.setpoint_encoder().encode_local_position_target(target);
        self.uas.send_message(&sp)
    }

    pub fn send_global_target(&self, target: &GlobalPositionTarget) -> Result<(), BridgeError> {
        let sp = self.uas.setpoint_encoder().encode_global_position_target(target);
        self.uas.send_message(&sp)
    }

    /// Send the translation and heading of `tf` as a local NED position target.
    pub fn handle_transform(
        &self,
        tf: &Isometry3<f64>,
        time_boot_ms: u32,
    ) -> Result<(), BridgeError> {
        let (_, _, yaw) = tf.rotation.euler_angles();
        let position: Vector3<f32> = tf.translation.vector.cast();
        debug!(x = position.x, y = position.y, z = position.z, yaw, "position from tf");
        self.send_local_target(&LocalPositionTarget {
            time_boot_ms,
            coordinate_frame: mav_frame::LOCAL_NED,
            type_mask: position_mask::IGNORE_VELOCITY
                | position_mask::IGNORE_ACCELERATION
                | position_mask::YAW_RATE_IGNORE,
            position,
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            yaw: yaw as f32,
            yaw_rate: 0.0,
        })
    }
}

impl Plugin for SetpointPositionPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn subscriptions(self: Arc<Self>) -> Vec<Subscription> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{decode_message, SetPositionTargetGlobalInt, SetPositionTargetLocalNed};
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn test_transform_becomes_local_target() {
        let (uas, mut rx) = Uas::new(1, 240, 1, 1);
        let plugin = SetpointPositionPlugin::new(Arc::new(uas));
        let tf = Isometry3::from_parts(
            Translation3::new(3.0, -1.5, -10.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5),
        );
        plugin.handle_transform(&tf, 900).unwrap();

        let sp = decode_message::<SetPositionTargetLocalNed>(&rx.try_recv().unwrap()).unwrap();
        assert_eq!((sp.x, sp.y, sp.z), (3.0, -1.5, -10.0));
        assert!((sp.yaw - 0.5).abs() < 1e-6);
        assert_eq!(sp.type_mask, 0b1001_1111_1000);
        assert_eq!(sp.coordinate_frame, mav_frame::LOCAL_NED);
        assert_eq!(sp.time_boot_ms, 900);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_global_target_goes_to_configured_vehicle() {
        let (uas, mut rx) = Uas::new(1, 240, 2, 1);
        let plugin = SetpointPositionPlugin::new(Arc::new(uas));
        plugin
            .send_global_target(&GlobalPositionTarget {
                time_boot_ms: 0,
                coordinate_frame: mav_frame::GLOBAL_RELATIVE_ALT_INT,
                type_mask: position_mask::IGNORE_VELOCITY,
                lat_int: 473_977_418,
                lon_int: 85_455_939,
                alt: 20.0,
                velocity: Vector3::zeros(),
                acceleration: Vector3::zeros(),
                yaw: 0.0,
                yaw_rate: 0.0,
            })
            .unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.header.component_id, 240);
        let sp = decode_message::<SetPositionTargetGlobalInt>(&msg).unwrap();
        assert_eq!((sp.target_system, sp.lat_int), (2, 473_977_418));
    }

    #[test]
    fn test_has_no_subscriptions() {
        let (uas, _rx) = Uas::new(1, 1, 1, 1);
        let plugin = Arc::new(SetpointPositionPlugin::new(Arc::new(uas)));
        assert!(plugin.subscriptions().is_empty());
    }
}

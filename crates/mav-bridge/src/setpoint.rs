//! Setpoint and attitude target encoding.
//!
//! Every encoder starts from a zeroed message, copies the caller's values into the
//! flattened wire fields and stamps the target ids. Units are already protocol units
//! (m, m/s, m/s^2, rad, rad/s); nothing is converted here. Sending is up to the caller.

use crate::frame_conversion::quaternion_to_wire;
use crate::messages::{
    encode_message, SetAttitudeTarget, SetPositionTargetGlobalInt, SetPositionTargetLocalNed,
};
use mav_link::WireMessage;
use nalgebra::{UnitQuaternion, Vector3};

/// `POSITION_TARGET_TYPEMASK` bits; a set bit tells the vehicle to ignore that field.
pub mod position_mask {
    pub const X_IGNORE: u16 = 1;
    pub const Y_IGNORE: u16 = 2;
    pub const Z_IGNORE: u16 = 4;
    pub const VX_IGNORE: u16 = 8;
    pub const VY_IGNORE: u16 = 16;
    pub const VZ_IGNORE: u16 = 32;
    pub const AX_IGNORE: u16 = 64;
    pub const AY_IGNORE: u16 = 128;
    pub const AZ_IGNORE: u16 = 256;
    /// Acceleration fields carry force instead
    pub const FORCE_SET: u16 = 512;
    pub const YAW_IGNORE: u16 = 1024;
    pub const YAW_RATE_IGNORE: u16 = 2048;

    pub const IGNORE_POSITION: u16 = X_IGNORE | Y_IGNORE | Z_IGNORE;
    pub const IGNORE_VELOCITY: u16 = VX_IGNORE | VY_IGNORE | VZ_IGNORE;
    pub const IGNORE_ACCELERATION: u16 = AX_IGNORE | AY_IGNORE | AZ_IGNORE;
}

/// `ATTITUDE_TARGET_TYPEMASK` bits.
pub mod attitude_mask {
    pub const BODY_ROLL_RATE_IGNORE: u8 = 1;
    pub const BODY_PITCH_RATE_IGNORE: u8 = 2;
    pub const BODY_YAW_RATE_IGNORE: u8 = 4;
    pub const THRUST_BODY_SET: u8 = 32;
    pub const THROTTLE_IGNORE: u8 = 64;
    pub const ATTITUDE_IGNORE: u8 = 128;

    pub const IGNORE_BODY_RATES: u8 =
        BODY_ROLL_RATE_IGNORE | BODY_PITCH_RATE_IGNORE | BODY_YAW_RATE_IGNORE;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalPositionTarget {
    pub time_boot_ms: u32,
    pub coordinate_frame: u8,
    pub type_mask: u16,
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    pub acceleration: Vector3<f32>,
    pub yaw: f32,
    pub yaw_rate: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlobalPositionTarget {
    pub time_boot_ms: u32,
    pub coordinate_frame: u8,
    pub type_mask: u16,
    /// Latitude, degrees * 1e7
    pub lat_int: i32,
    /// Longitude, degrees * 1e7
    pub lon_int: i32,
    pub alt: f32,
    pub velocity: Vector3<f32>,
    pub acceleration: Vector3<f32>,
    pub yaw: f32,
    pub yaw_rate: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttitudeTarget {
    pub time_boot_ms: u32,
    pub type_mask: u8,
    pub orientation: UnitQuaternion<f32>,
    /// Roll, pitch, yaw rate in that order
    pub body_rate: Vector3<f32>,
    pub thrust: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SetpointCommand {
    Local(LocalPositionTarget),
    Global(GlobalPositionTarget),
    Attitude(AttitudeTarget),
}

impl SetpointCommand {
    pub fn encode(&self, encoder: &SetpointEncoder) -> WireMessage {
        match self {
            SetpointCommand::Local(t) => {
                encode_message(&encoder.encode_local_position_target(t))
            }
            SetpointCommand::Global(t) => {
                encode_message(&encoder.encode_global_position_target(t))
            }
            SetpointCommand::Attitude(t) => encode_message(&encoder.encode_attitude_target(t)),
        }
    }
}

/// Stateless setpoint encoder bound to one target system/component.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SetpointEncoder {
    pub target_system: u8,
    pub target_component: u8,
}

impl SetpointEncoder {
    pub fn new(target_system: u8, target_component: u8) -> Self {
        Self {
            target_system,
            target_component,
        }
    }

    pub fn encode_local_position_target(
        &self,
        t: &LocalPositionTarget,
    ) -> SetPositionTargetLocalNed {
        SetPositionTargetLocalNed {
            time_boot_ms: t.time_boot_ms,
            target_system: self.target_system,
            target_component: self.target_component,
            coordinate_frame: t.coordinate_frame,
            type_mask: t.type_mask,
            x: t.position.x,
            y: t.position.y,
            z: t.position.z,
            vx: t.velocity.x,
            vy: t.velocity.y,
            vz: t.velocity.z,
            afx: t.acceleration.x,
            afy: t.acceleration.y,
            afz: t.acceleration.z,
            yaw: t.yaw,
            yaw_rate: t.yaw_rate,
        }
    }

    pub fn encode_global_position_target(
        &self,
        t: &GlobalPositionTarget,
    ) -> SetPositionTargetGlobalInt {
        SetPositionTargetGlobalInt {
            time_boot_ms: t.time_boot_ms,
            target_system: self.target_system,
            target_component: self.target_component,
            coordinate_frame: t.coordinate_frame,
            type_mask: t.type_mask,
            lat_int: t.lat_int,
            lon_int: t.lon_int,
            alt: t.alt,
            vx: t.velocity.x,
            vy: t.velocity.y,
            vz: t.velocity.z,
            afx: t.acceleration.x,
            afy: t.acceleration.y,
            afz: t.acceleration.z,
            yaw: t.yaw,
            yaw_rate: t.yaw_rate,
        }
    }

    pub fn encode_attitude_target(&self, t: &AttitudeTarget) -> SetAttitudeTarget {
        SetAttitudeTarget {
            time_boot_ms: t.time_boot_ms,
            target_system: self.target_system,
            target_component: self.target_component,
            type_mask: t.type_mask,
            q: quaternion_to_wire(&t.orientation),
            body_roll_rate: t.body_rate.x,
            body_pitch_rate: t.body_rate.y,
            body_yaw_rate: t.body_rate.z,
            thrust: t.thrust,
            // thrust_body stays zeroed
            ..Default::default()
        }
    }
}

//! Typed message catalogue and the payload codec.
//!
//! Only the kinds the bridge itself produces or consumes are defined here. Payloads are
//! little-endian with fields in wire order: base fields sorted by size, extension fields
//! appended in declaration order. Senders may trim any trailing run of zero bytes, base
//! fields included, so missing bytes read as zero.

use crate::error::DecodeError;
use bytes::{Buf, BufMut};
use mav_link::{KindId, WireMessage, MAX_PAYLOAD_LEN};
use serde::Serialize;

/// A message shape with a fixed kind id and payload layout.
pub trait MessageSpec: Sized + Send + 'static {
    const KIND: KindId;
    const NAME: &'static str;
    /// Payload length without extension fields.
    const BASE_LEN: usize;
    /// Payload length including extension fields.
    const MAX_LEN: usize;

    /// Read fields in wire order; `buf` always holds `MAX_LEN` bytes.
    fn read_fields<B: Buf>(buf: &mut B) -> Self;

    fn write_fields<B: BufMut>(&self, buf: &mut B);
}

/// Interpret `msg` as `M`, failing cleanly on a kind or length mismatch.
pub fn decode_message<M: MessageSpec>(msg: &WireMessage) -> Result<M, DecodeError> {
    if msg.kind != M::KIND {
        return Err(DecodeError::KindMismatch {
            expected: M::KIND,
            actual: msg.kind,
        });
    }
    let len = msg.payload.len();
    if len > M::MAX_LEN {
        return Err(DecodeError::LengthMismatch {
            name: M::NAME,
            max: M::MAX_LEN,
            actual: len,
        });
    }
    let mut padded = [0u8; MAX_PAYLOAD_LEN];
    padded[..len].copy_from_slice(&msg.payload);
    let mut buf = &padded[..M::MAX_LEN];
    Ok(M::read_fields(&mut buf))
}

/// Serialize `m` into a full-length payload with a default header.
pub fn encode_message<M: MessageSpec>(m: &M) -> WireMessage {
    let mut payload = Vec::with_capacity(M::MAX_LEN);
    m.write_fields(&mut payload);
    WireMessage {
        header: Default::default(),
        kind: M::KIND,
        payload,
    }
}

/// Coordinate frame ids used by setpoint messages.
pub mod mav_frame {
    pub const GLOBAL: u8 = 0;
    pub const LOCAL_NED: u8 = 1;
    pub const GLOBAL_RELATIVE_ALT: u8 = 3;
    pub const GLOBAL_INT: u8 = 5;
    pub const GLOBAL_RELATIVE_ALT_INT: u8 = 6;
    pub const LOCAL_OFFSET_NED: u8 = 7;
    pub const BODY_NED: u8 = 8;
    pub const BODY_OFFSET_NED: u8 = 9;
    pub const GLOBAL_TERRAIN_ALT_INT: u8 = 11;
    pub const BODY_FRD: u8 = 12;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SetAttitudeTarget {
    pub time_boot_ms: u32,
    pub target_system: u8,
    pub target_component: u8,
    pub type_mask: u8,
    /// w, x, y, z
    pub q: [f32; 4],
    pub body_roll_rate: f32,
    pub body_pitch_rate: f32,
    pub body_yaw_rate: f32,
    pub thrust: f32,
    pub thrust_body: [f32; 3],
}

impl MessageSpec for SetAttitudeTarget {
    const KIND: KindId = KindId::new(82);
    const NAME: &'static str = "SET_ATTITUDE_TARGET";
    const BASE_LEN: usize = 39;
    const MAX_LEN: usize = 51;

    fn read_fields<B: Buf>(buf: &mut B) -> Self {
        let time_boot_ms = buf.get_u32_le();
        let mut q = [0f32; 4];
        for v in q.iter_mut() {
            *v = buf.get_f32_le();
        }
        let body_roll_rate = buf.get_f32_le();
        let body_pitch_rate = buf.get_f32_le();
        let body_yaw_rate = buf.get_f32_le();
        let thrust = buf.get_f32_le();
        let target_system = buf.get_u8();
        let target_component = buf.get_u8();
        let type_mask = buf.get_u8();
        let mut thrust_body = [0f32; 3];
        for v in thrust_body.iter_mut() {
            *v = buf.get_f32_le();
        }
        Self {
            time_boot_ms,
            target_system,
            target_component,
            type_mask,
            q,
            body_roll_rate,
            body_pitch_rate,
            body_yaw_rate,
            thrust,
            thrust_body,
        }
    }

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.time_boot_ms);
        for v in self.q {
            buf.put_f32_le(v);
        }
        buf.put_f32_le(self.body_roll_rate);
        buf.put_f32_le(self.body_pitch_rate);
        buf.put_f32_le(self.body_yaw_rate);
        buf.put_f32_le(self.thrust);
        buf.put_u8(self.target_system);
        buf.put_u8(self.target_component);
        buf.put_u8(self.type_mask);
        for v in self.thrust_body {
            buf.put_f32_le(v);
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SetPositionTargetLocalNed {
    pub time_boot_ms: u32,
    pub target_system: u8,
    pub target_component: u8,
    pub coordinate_frame: u8,
    pub type_mask: u16,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub afx: f32,
    pub afy: f32,
    pub afz: f32,
    pub yaw: f32,
    pub yaw_rate: f32,
}

impl MessageSpec for SetPositionTargetLocalNed {
    const KIND: KindId = KindId::new(84);
    const NAME: &'static str = "SET_POSITION_TARGET_LOCAL_NED";
    const BASE_LEN: usize = 53;
    const MAX_LEN: usize = 53;

    fn read_fields<B: Buf>(buf: &mut B) -> Self {
        Self {
            time_boot_ms: buf.get_u32_le(),
            x: buf.get_f32_le(),
            y: buf.get_f32_le(),
            z: buf.get_f32_le(),
            vx: buf.get_f32_le(),
            vy: buf.get_f32_le(),
            vz: buf.get_f32_le(),
            afx: buf.get_f32_le(),
            afy: buf.get_f32_le(),
            afz: buf.get_f32_le(),
            yaw: buf.get_f32_le(),
            yaw_rate: buf.get_f32_le(),
            type_mask: buf.get_u16_le(),
            target_system: buf.get_u8(),
            target_component: buf.get_u8(),
            coordinate_frame: buf.get_u8(),
        }
    }

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.time_boot_ms);
        for v in [
            self.x,
            self.y,
            self.z,
            self.vx,
            self.vy,
            self.vz,
            self.afx,
            self.afy,
            self.afz,
            self.yaw,
            self.yaw_rate,
        ] {
            buf.put_f32_le(v);
        }
        buf.put_u16_le(self.type_mask);
        buf.put_u8(self.target_system);
        buf.put_u8(self.target_component);
        buf.put_u8(self.coordinate_frame);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SetPositionTargetGlobalInt {
    pub time_boot_ms: u32,
    pub target_system: u8,
    pub target_component: u8,
    pub coordinate_frame: u8,
    pub type_mask: u16,
    /// Latitude, degrees * 1e7
    pub lat_int: i32,
    /// Longitude, degrees * 1e7
    pub lon_int: i32,
    pub alt: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub afx: f32,
    pub afy: f32,
    pub afz: f32,
    pub yaw: f32,
    pub yaw_rate: f32,
}

impl MessageSpec for SetPositionTargetGlobalInt {
    const KIND: KindId = KindId::new(86);
    const NAME: &'static str = "SET_POSITION_TARGET_GLOBAL_INT";
    const BASE_LEN: usize = 53;
    const MAX_LEN: usize = 53;

    fn read_fields<B: Buf>(buf: &mut B) -> Self {
        Self {
            time_boot_ms: buf.get_u32_le(),
            lat_int: buf.get_i32_le(),
            lon_int: buf.get_i32_le(),
            alt: buf.get_f32_le(),
            vx: buf.get_f32_le(),
            vy: buf.get_f32_le(),
            vz: buf.get_f32_le(),
            afx: buf.get_f32_le(),
            afy: buf.get_f32_le(),
            afz: buf.get_f32_le(),
            yaw: buf.get_f32_le(),
            yaw_rate: buf.get_f32_le(),
            type_mask: buf.get_u16_le(),
            target_system: buf.get_u8(),
            target_component: buf.get_u8(),
            coordinate_frame: buf.get_u8(),
        }
    }

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.time_boot_ms);
        buf.put_i32_le(self.lat_int);
        buf.put_i32_le(self.lon_int);
        for v in [
            self.alt,
            self.vx,
            self.vy,
            self.vz,
            self.afx,
            self.afy,
            self.afz,
            self.yaw,
            self.yaw_rate,
        ] {
            buf.put_f32_le(v);
        }
        buf.put_u16_le(self.type_mask);
        buf.put_u8(self.target_system);
        buf.put_u8(self.target_component);
        buf.put_u8(self.coordinate_frame);
    }
}

/// Compass calibration state as reported by the autopilot.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MagCalStatus {
    NotStarted = 0,
    WaitingToStart = 1,
    RunningStepOne = 2,
    RunningStepTwo = 3,
    Success = 4,
    Failed = 5,
    BadOrientation = 6,
    BadRadius = 7,
}

impl TryFrom<u8> for MagCalStatus {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::NotStarted,
            1 => Self::WaitingToStart,
            2 => Self::RunningStepOne,
            3 => Self::RunningStepTwo,
            4 => Self::Success,
            5 => Self::Failed,
            6 => Self::BadOrientation,
            7 => Self::BadRadius,
            other => return Err(other),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MagCalProgress {
    pub compass_id: u8,
    /// Bitmask of compasses being calibrated
    pub cal_mask: u8,
    pub cal_status: u8,
    pub attempt: u8,
    pub completion_pct: u8,
    pub completion_mask: [u8; 10],
    pub direction_x: f32,
    pub direction_y: f32,
    pub direction_z: f32,
}

impl MessageSpec for MagCalProgress {
    const KIND: KindId = KindId::new(191);
    const NAME: &'static str = "MAG_CAL_PROGRESS";
    const BASE_LEN: usize = 27;
    const MAX_LEN: usize = 27;

    fn read_fields<B: Buf>(buf: &mut B) -> Self {
        let direction_x = buf.get_f32_le();
        let direction_y = buf.get_f32_le();
        let direction_z = buf.get_f32_le();
        let compass_id = buf.get_u8();
        let cal_mask = buf.get_u8();
        let cal_status = buf.get_u8();
        let attempt = buf.get_u8();
        let completion_pct = buf.get_u8();
        let mut completion_mask = [0u8; 10];
        buf.copy_to_slice(&mut completion_mask);
        Self {
            compass_id,
            cal_mask,
            cal_status,
            attempt,
            completion_pct,
            completion_mask,
            direction_x,
            direction_y,
            direction_z,
        }
    }

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_f32_le(self.direction_x);
        buf.put_f32_le(self.direction_y);
        buf.put_f32_le(self.direction_z);
        buf.put_u8(self.compass_id);
        buf.put_u8(self.cal_mask);
        buf.put_u8(self.cal_status);
        buf.put_u8(self.attempt);
        buf.put_u8(self.completion_pct);
        buf.put_slice(&self.completion_mask);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MagCalReport {
    pub compass_id: u8,
    pub cal_mask: u8,
    pub cal_status: u8,
    pub autosaved: u8,
    pub fitness: f32,
    pub ofs_x: f32,
    pub ofs_y: f32,
    pub ofs_z: f32,
    pub diag_x: f32,
    pub diag_y: f32,
    pub diag_z: f32,
    pub offdiag_x: f32,
    pub offdiag_y: f32,
    pub offdiag_z: f32,
    pub orientation_confidence: f32,
    pub old_orientation: u8,
    pub new_orientation: u8,
    pub scale_factor: f32,
}

impl MessageSpec for MagCalReport {
    const KIND: KindId = KindId::new(192);
    const NAME: &'static str = "MAG_CAL_REPORT";
    const BASE_LEN: usize = 44;
    const MAX_LEN: usize = 54;

    fn read_fields<B: Buf>(buf: &mut B) -> Self {
        Self {
            fitness: buf.get_f32_le(),
            ofs_x: buf.get_f32_le(),
            ofs_y: buf.get_f32_le(),
            ofs_z: buf.get_f32_le(),
            diag_x: buf.get_f32_le(),
            diag_y: buf.get_f32_le(),
            diag_z: buf.get_f32_le(),
            offdiag_x: buf.get_f32_le(),
            offdiag_y: buf.get_f32_le(),
            offdiag_z: buf.get_f32_le(),
            compass_id: buf.get_u8(),
            cal_mask: buf.get_u8(),
            cal_status: buf.get_u8(),
            autosaved: buf.get_u8(),
            orientation_confidence: buf.get_f32_le(),
            old_orientation: buf.get_u8(),
            new_orientation: buf.get_u8(),
            scale_factor: buf.get_f32_le(),
        }
    }

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        for v in [
            self.fitness,
            self.ofs_x,
            self.ofs_y,
            self.ofs_z,
            self.diag_x,
            self.diag_y,
            self.diag_z,
            self.offdiag_x,
            self.offdiag_y,
            self.offdiag_z,
        ] {
            buf.put_f32_le(v);
        }
        buf.put_u8(self.compass_id);
        buf.put_u8(self.cal_mask);
        buf.put_u8(self.cal_status);
        buf.put_u8(self.autosaved);
        buf.put_f32_le(self.orientation_confidence);
        buf.put_u8(self.old_orientation);
        buf.put_u8(self.new_orientation);
        buf.put_f32_le(self.scale_factor);
    }
}

/// Name of a known kind, for logs and the CLI.
pub fn kind_name(kind: KindId) -> Option<&'static str> {
    [
        (SetAttitudeTarget::KIND, SetAttitudeTarget::NAME),
        (SetPositionTargetLocalNed::KIND, SetPositionTargetLocalNed::NAME),
        (SetPositionTargetGlobalInt::KIND, SetPositionTargetGlobalInt::NAME),
        (MagCalProgress::KIND, MagCalProgress::NAME),
        (MagCalReport::KIND, MagCalReport::NAME),
    ]
    .into_iter()
    .find_map(|(k, name)| (k == kind).then_some(name))
}

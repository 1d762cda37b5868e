//! mav-bridge: typed message dispatch, setpoint encoding and plugins for a vehicle bridge
//!
//! Frames arrive from a [`mav_link::Link`], are routed by kind through a
//! [`HandlerRegistry`] to the handlers that plugins registered, and anything plugins
//! send goes back out through the same link.

mod error;
pub use error::{BridgeError, DecodeError};

pub mod messages;
pub use messages::{decode_message, encode_message, kind_name, MessageSpec};

pub mod frame_conversion;

pub mod setpoint;
pub use setpoint::{
    AttitudeTarget, GlobalPositionTarget, LocalPositionTarget, SetpointCommand, SetpointEncoder,
};

mod topics;
pub use topics::LatchedTopic;

mod metrics;
pub use metrics::{BridgeMetrics, MetricsHub};

mod registry;
pub use registry::{
    make_handler, make_raw_handler, DispatchReport, Handler, HandlerError, HandlerMode,
    HandlerRegistry, SkipReason, Subscription,
};

mod plugin;
pub use plugin::{LoadedPlugin, Plugin, Uas};

pub mod plugins;

mod config;
pub use config::{
    glob_match, load_config_file, parse_config, BridgeConfig, MagCalibrationConfig,
    SetpointAttitudeConfig, SetpointPositionConfig, TfConfig,
};

mod tf_listener;
pub use tf_listener::{TransformBuffer, TransformListener, LOOKUP_TIMEOUT};

mod bridge;
pub use bridge::Bridge;

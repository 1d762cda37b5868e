//! Built-in plugins and the table used to load them by name.

pub mod mag_calibration_status;
pub mod setpoint_attitude;
pub mod setpoint_position;

pub use mag_calibration_status::{CalibrationState, MagCalStatusPlugin, MagnetometerReport};
pub use setpoint_attitude::SetpointAttitudePlugin;
pub use setpoint_position::SetpointPositionPlugin;

use crate::config::BridgeConfig;
use crate::plugin::{LoadedPlugin, Uas};
use std::sync::Arc;

#[derive(Clone, Copy)]
pub struct PluginFactory {
    pub name: &'static str,
    pub build: fn(&Arc<Uas>, &BridgeConfig) -> LoadedPlugin,
}

const BUILTINS: &[PluginFactory] = &[
    PluginFactory {
        name: mag_calibration_status::NAME,
        build: |_, cfg| LoadedPlugin::new(MagCalStatusPlugin::new(&cfg.mag_calibration.namespace)),
    },
    PluginFactory {
        name: setpoint_position::NAME,
        build: |uas, _| LoadedPlugin::new(SetpointPositionPlugin::new(Arc::clone(uas))),
    },
    PluginFactory {
        name: setpoint_attitude::NAME,
        build: |uas, _| LoadedPlugin::new(SetpointAttitudePlugin::new(Arc::clone(uas))),
    },
];

pub fn builtin_plugins() -> &'static [PluginFactory] {
    BUILTINS
}

/// Build every built-in plugin the config enables, in table order.
pub fn load_enabled(uas: &Arc<Uas>, config: &BridgeConfig) -> Vec<LoadedPlugin> {
    BUILTINS
        .iter()
        .filter(|f| config.is_plugin_enabled(f.name))
        .map(|f| (f.build)(uas, config))
        .collect()
}

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub system_id: u8,
    pub component_id: u8,
    pub target_system: u8,
    pub target_component: u8,
    /// Patterns that re-enable plugins matched by the denylist
    pub plugin_allowlist: Vec<String>,
    pub plugin_denylist: Vec<String>,
    pub mag_calibration: MagCalibrationConfig,
    pub setpoint_position: SetpointPositionConfig,
    pub setpoint_attitude: SetpointAttitudeConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            system_id: 1,
            component_id: 240,
            target_system: 1,
            target_component: 1,
            plugin_allowlist: Vec::new(),
            plugin_denylist: Vec::new(),
            mag_calibration: MagCalibrationConfig::default(),
            setpoint_position: SetpointPositionConfig::default(),
            setpoint_attitude: SetpointAttitudeConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// A plugin loads unless the denylist matches it and no allowlist entry does.
    pub fn is_plugin_enabled(&self, name: &str) -> bool {
        let matches = |patterns: &[String]| patterns.iter().any(|p| glob_match(p, name));
        !matches(&self.plugin_denylist) || matches(&self.plugin_allowlist)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagCalibrationConfig {
    pub namespace: String,
}

impl Default for MagCalibrationConfig {
    fn default() -> Self {
        Self {
            namespace: "~mag_calibration".to_string(),
        }
    }
}

/// Transform a setpoint plugin listens to. `child_frame_id` has no default once a
/// `tf` block is written out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TfConfig {
    #[serde(default = "default_frame_id")]
    pub frame_id: String,
    pub child_frame_id: String,
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
}

impl TfConfig {
    fn with_child(child_frame_id: &str) -> Self {
        Self {
            frame_id: default_frame_id(),
            child_frame_id: child_frame_id.to_string(),
            rate_hz: default_rate_hz(),
        }
    }
}

fn default_frame_id() -> String {
    "map".to_string()
}

fn default_rate_hz() -> f64 {
    50.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetpointPositionConfig {
    pub tf: TfConfig,
}

impl Default for SetpointPositionConfig {
    fn default() -> Self {
        Self {
            tf: TfConfig::with_child("target_position"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetpointAttitudeConfig {
    pub tf: TfConfig,
}

impl Default for SetpointAttitudeConfig {
    fn default() -> Self {
        Self {
            tf: TfConfig::with_child("target_attitude"),
        }
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<BridgeConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("loading config: {}", path.display()))
}

pub fn parse_config(raw: &str) -> anyhow::Result<BridgeConfig> {
    let val: Value = serde_yaml::from_str(raw).context("parsing yaml")?;
    // An empty document means all defaults
    if val.is_null() {
        return Ok(BridgeConfig::default());
    }
    let cfg: BridgeConfig = serde_yaml::from_value(val).context("decoding bridge config")?;
    for (plugin, tf) in [
        ("setpoint_position", &cfg.setpoint_position.tf),
        ("setpoint_attitude", &cfg.setpoint_attitude.tf),
    ] {
        if !(tf.rate_hz.is_finite() && tf.rate_hz > 0.0) {
            anyhow::bail!("{plugin}.tf.rate_hz must be positive, got {}", tf.rate_hz);
        }
    }
    Ok(cfg)
}

/// Shell-style match where `*` stands for any run of characters.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p = pattern.as_bytes();
    let n = name.as_bytes();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ni < n.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ni));
            pi += 1;
        } else if pi < p.len() && p[pi] == n[ni] {
            pi += 1;
            ni += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == b'*')
}

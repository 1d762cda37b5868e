use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::{error, info};

use mav_bridge::messages::{
    MagCalProgress, MagCalReport, SetAttitudeTarget, SetPositionTargetGlobalInt,
    SetPositionTargetLocalNed,
};
use mav_bridge::plugins::{builtin_plugins, MagCalStatusPlugin};
use mav_bridge::{
    decode_message, kind_name, load_config_file, AttitudeTarget, Bridge, BridgeConfig,
    DispatchReport, GlobalPositionTarget, LocalPositionTarget, MessageSpec, SetpointCommand,
    SetpointEncoder,
};
use mav_link::{Framing, KindId, Link, MockLink, WireMessage};
use nalgebra::{UnitQuaternion, Vector3};

#[derive(Parser, Debug)]
#[command(
    name = "mavbridge",
    version,
    about = "MAVLink-style bridge: plugins, setpoint encoding and log replay",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List built-in plugins and whether the config enables them
    Plugins {
        /// Bridge config YAML
        #[arg(long)]
        config: Option<String>,
    },
    /// Encode a setpoint and print its kind and payload
    Encode {
        #[command(subcommand)]
        target: EncodeTarget,
    },
    /// Decode a payload of a known kind
    Decode {
        /// Message kind (decimal or 0x hex)
        #[arg(long, value_parser = parse_int)]
        kind: u32,
        /// Payload bytes as hex, compact or space-separated
        #[arg(long, num_args = 1.., required = true)]
        data: Vec<String>,
        /// Output JSON instead of debug text
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Feed a frame log through the bridge and print the latched topics
    Replay {
        /// Log file, one `kind hex.. [bad_crc|bad_signature]` frame per line
        #[arg(long)]
        from: String,
        #[arg(long)]
        config: Option<String>,
        /// Also print metrics in text exposition format
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    #[arg(long, default_value_t = 1)]
    target_system: u8,
    #[arg(long, default_value_t = 1)]
    target_component: u8,
    #[arg(long, default_value_t = 0)]
    time_boot_ms: u32,
    /// Output JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum EncodeTarget {
    /// SET_POSITION_TARGET_LOCAL_NED
    Local {
        #[command(flatten)]
        target: TargetArgs,
        /// x,y,z in meters
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0,0")]
        position: Vec<f32>,
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0,0")]
        velocity: Vec<f32>,
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0,0")]
        acceleration: Vec<f32>,
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        yaw: f32,
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        yaw_rate: f32,
        /// Coordinate frame (MAV_FRAME)
        #[arg(long, default_value_t = 1)]
        frame: u8,
        /// Ignore mask (decimal, 0x or 0b)
        #[arg(long, value_parser = parse_int, default_value = "0")]
        mask: u32,
    },
    /// SET_POSITION_TARGET_GLOBAL_INT
    Global {
        #[command(flatten)]
        target: TargetArgs,
        /// Latitude, degrees * 1e7
        #[arg(long, allow_hyphen_values = true)]
        lat_int: i32,
        /// Longitude, degrees * 1e7
        #[arg(long, allow_hyphen_values = true)]
        lon_int: i32,
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        alt: f32,
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0,0")]
        velocity: Vec<f32>,
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0,0")]
        acceleration: Vec<f32>,
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        yaw: f32,
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        yaw_rate: f32,
        #[arg(long, default_value_t = 6)]
        frame: u8,
        #[arg(long, value_parser = parse_int, default_value = "0")]
        mask: u32,
    },
    /// SET_ATTITUDE_TARGET
    Attitude {
        #[command(flatten)]
        target: TargetArgs,
        /// Roll,pitch,yaw in radians
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0,0")]
        rpy: Vec<f32>,
        /// Body roll,pitch,yaw rates in rad/s
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "0,0,0")]
        body_rate: Vec<f32>,
        #[arg(long, default_value_t = 0.0)]
        thrust: f32,
        #[arg(long, value_parser = parse_int, default_value = "0")]
        mask: u32,
    },
}

#[derive(Serialize)]
struct EncodedFrame {
    kind: KindId,
    name: &'static str,
    len: usize,
    data: String,
}

impl EncodedFrame {
    fn new(msg: &WireMessage) -> Self {
        Self {
            kind: msg.kind,
            name: kind_name(msg.kind).unwrap_or("UNKNOWN"),
            len: msg.len(),
            data: hex_string(&msg.payload),
        }
    }
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Plugins { config } => list_plugins(config.as_deref()),
        Commands::Encode { target } => encode(target),
        Commands::Decode { kind, data, json } => decode(kind, &data, json),
        Commands::Replay {
            from,
            config,
            metrics,
        } => replay(&from, config.as_deref(), metrics),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(path: Option<&str>) -> Result<BridgeConfig> {
    match path {
        Some(p) => load_config_file(p),
        None => Ok(BridgeConfig::default()),
    }
}

fn list_plugins(config: Option<&str>) -> Result<()> {
    let cfg = load_config(config)?;
    for f in builtin_plugins() {
        let state = if cfg.is_plugin_enabled(f.name) {
            "enabled"
        } else {
            "disabled"
        };
        println!("{}\t{state}", f.name);
    }
    Ok(())
}

fn encode(target: EncodeTarget) -> Result<()> {
    let (args, cmd) = match target {
        EncodeTarget::Local {
            target,
            position,
            velocity,
            acceleration,
            yaw,
            yaw_rate,
            frame,
            mask,
        } => {
            let cmd = SetpointCommand::Local(LocalPositionTarget {
                time_boot_ms: target.time_boot_ms,
                coordinate_frame: frame,
                type_mask: u16::try_from(mask).context("mask does not fit in 16 bits")?,
                position: vec3(&position, "position")?,
                velocity: vec3(&velocity, "velocity")?,
                acceleration: vec3(&acceleration, "acceleration")?,
                yaw,
                yaw_rate,
            });
            (target, cmd)
        }
        EncodeTarget::Global {
            target,
            lat_int,
            lon_int,
            alt,
            velocity,
            acceleration,
            yaw,
            yaw_rate,
            frame,
            mask,
        } => {
            let cmd = SetpointCommand::Global(GlobalPositionTarget {
                time_boot_ms: target.time_boot_ms,
                coordinate_frame: frame,
                type_mask: u16::try_from(mask).context("mask does not fit in 16 bits")?,
                lat_int,
                lon_int,
                alt,
                velocity: vec3(&velocity, "velocity")?,
                acceleration: vec3(&acceleration, "acceleration")?,
                yaw,
                yaw_rate,
            });
            (target, cmd)
        }
        EncodeTarget::Attitude {
            target,
            rpy,
            body_rate,
            thrust,
            mask,
        } => {
            let rpy = vec3(&rpy, "rpy")?;
            let cmd = SetpointCommand::Attitude(AttitudeTarget {
                time_boot_ms: target.time_boot_ms,
                type_mask: u8::try_from(mask).context("mask does not fit in 8 bits")?,
                orientation: UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z),
                body_rate: vec3(&body_rate, "body_rate")?,
                thrust,
            });
            (target, cmd)
        }
    };

    let encoder = SetpointEncoder::new(args.target_system, args.target_component);
    let msg = cmd.encode(&encoder);
    let out = EncodedFrame::new(&msg);
    if args.json {
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("kind={} name={} len={}", out.kind.raw(), out.name, out.len);
        println!("{}", out.data);
    }
    Ok(())
}

fn decode(kind: u32, data: &[String], json: bool) -> Result<()> {
    let bytes = parse_hex_tokens(data)?;
    let kind = KindId::new(kind);
    let msg = WireMessage::new(kind, &bytes)
        .ok_or_else(|| anyhow::anyhow!("payload too long: {} bytes", bytes.len()))?;
    match kind.raw() {
        82 => print_decoded::<SetAttitudeTarget>(&msg, json),
        84 => print_decoded::<SetPositionTargetLocalNed>(&msg, json),
        86 => print_decoded::<SetPositionTargetGlobalInt>(&msg, json),
        191 => print_decoded::<MagCalProgress>(&msg, json),
        192 => print_decoded::<MagCalReport>(&msg, json),
        _ => Err(anyhow::anyhow!("no decoder for kind {kind}")),
    }
}

fn print_decoded<M>(msg: &WireMessage, json: bool) -> Result<()>
where
    M: MessageSpec + Serialize + std::fmt::Debug,
{
    let m = decode_message::<M>(msg)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&m)?);
    } else {
        println!("{}: {m:?}", M::NAME);
    }
    Ok(())
}

fn replay(from: &str, config: Option<&str>, metrics: bool) -> Result<()> {
    let cfg = load_config(config)?;
    let mut bridge = Bridge::new(cfg)?;
    let mut link = MockLink::open("replay")?;
    let handle = link.handle();

    let file = File::open(from).with_context(|| format!("opening log: {from}"))?;
    let mut frames = 0usize;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        match parse_log_line(&line) {
            Ok(Some((msg, framing))) => {
                handle.inject(msg, framing);
                frames += 1;
            }
            Ok(None) => continue,
            Err(e) => {
                error!(line = idx + 1, "bad record: {e}");
                continue;
            }
        }
    }
    info!(frames, from, "replaying");

    let mut totals = DispatchReport::default();
    while handle.pending() > 0 {
        // A skipped frame yields None but the queue keeps draining
        if let Some(r) = bridge.poll_once(&mut link, Some(0))? {
            totals.handlers += r.handlers;
            totals.delivered += r.delivered;
            totals.skipped += r.skipped;
            totals.failed += r.failed;
        }
    }
    println!(
        "replay: frames={frames} delivered={} skipped={} failed={}",
        totals.delivered, totals.skipped, totals.failed
    );

    if let Some(mag) = bridge.plugin::<MagCalStatusPlugin>() {
        let status = mag.status_topic();
        match status.latest() {
            Some(v) => println!("{}: {v}", status.name()),
            None => println!("{}: <none>", status.name()),
        }
        let report = mag.report_topic();
        match report.latest() {
            Some(r) => println!("{}: {}", report.name(), serde_json::to_string(&r)?),
            None => println!("{}: <none>", report.name()),
        }
    }
    if metrics {
        print!("{}", bridge.metrics().encode_text());
    }
    Ok(())
}

/// Parse one log line. Blank lines and `#` comments yield `None`.
fn parse_log_line(line: &str) -> Result<Option<(WireMessage, Framing)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    let framing = match tokens.last().copied() {
        Some("bad_crc") => Framing::BadCrc,
        Some("bad_signature") => Framing::BadSignature,
        _ => Framing::Ok,
    };
    if !framing.is_ok() {
        tokens.pop();
    }
    let (kind, data) = tokens
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("missing kind"))?;
    let kind = KindId::new(parse_int(kind)?);
    let owned: Vec<String> = data.iter().map(|s| s.to_string()).collect();
    let bytes = parse_hex_tokens(&owned)?;
    let msg = WireMessage::new(kind, &bytes)
        .ok_or_else(|| anyhow::anyhow!("payload too long: {} bytes", bytes.len()))?;
    Ok(Some((msg, framing)))
}

fn vec3(v: &[f32], what: &str) -> Result<Vector3<f32>> {
    match v {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(anyhow::anyhow!("{what}: expected 3 values, got {}", v.len())),
    }
}

fn parse_int(s: &str) -> Result<u32> {
    let t = s.trim();
    let parsed = if let Some(h) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u32::from_str_radix(h, 16)
    } else if let Some(b) = t.strip_prefix("0b") {
        u32::from_str_radix(&b.replace('_', ""), 2)
    } else {
        t.parse::<u32>()
    };
    parsed.map_err(|e| anyhow::anyhow!("invalid integer '{t}': {e}"))
}

/// Accepts `"01 02 03"`, `"010203"` or a mix of both across tokens.
fn parse_hex_tokens(items: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for item in items {
        for tok in item.split_whitespace() {
            let t = tok.strip_prefix("0x").unwrap_or(tok);
            if t.len() % 2 != 0 {
                return Err(anyhow::anyhow!("odd hex length in '{tok}'"));
            }
            for i in (0..t.len()).step_by(2) {
                let pair = t
                    .get(i..i + 2)
                    .ok_or_else(|| anyhow::anyhow!("invalid hex '{tok}'"))?;
                let b = u8::from_str_radix(pair, 16)
                    .map_err(|e| anyhow::anyhow!("invalid hex '{tok}': {e}"))?;
                out.push(b);
            }
        }
    }
    Ok(out)
}

fn hex_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{b:02X}");
    }
    s
}

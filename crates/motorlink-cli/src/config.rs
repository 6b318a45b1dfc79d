//! Bridge configuration – reads/writes `~/.motorlink/config.toml`.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use motorlink_hal::{DriveConfig, SimDevice};
use motorlink_middleware::BridgeConfig;
use motorlink_types::MotorlinkError;
use serde::{Deserialize, Serialize};

/// Persisted bridge configuration.  Every field has a default so a partial
/// file, or none at all, is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Local interface to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    #[serde(default = "default_udp_port")]
    pub udp_port: u16,

    /// Command silence after which the motors are forced to stop.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Watchdog period; one fifth of `timeout_ms` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchdog_tick_ms: Option<u64>,

    #[serde(default = "default_recv_poll_ms")]
    pub recv_poll_ms: u64,

    /// Percent power for FORWARD and BACKWARD.
    #[serde(default = "default_speed_forward")]
    pub speed_forward: u8,

    /// Percent power for in-place turns.
    #[serde(default = "default_speed_turn")]
    pub speed_turn: u8,

    #[serde(default)]
    pub invert_forward: bool,

    #[serde(default)]
    pub invert_turns: bool,

    /// Wait between braking and releasing the motors on shutdown.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Attach a gyro to the drive base.  Absent sensors report unavailable.
    #[serde(default)]
    pub gyro: bool,

    #[serde(default)]
    pub front_touch: bool,

    #[serde(default)]
    pub side_touch: bool,

    /// Directory for the per-session log file.  No file is written when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_udp_port() -> u16 {
    5000
}
fn default_timeout_ms() -> u64 {
    500
}
fn default_recv_poll_ms() -> u64 {
    100
}
fn default_speed_forward() -> u8 {
    40
}
fn default_speed_turn() -> u8 {
    30
}
fn default_settle_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            udp_port: default_udp_port(),
            timeout_ms: default_timeout_ms(),
            watchdog_tick_ms: None,
            recv_poll_ms: default_recv_poll_ms(),
            speed_forward: default_speed_forward(),
            speed_turn: default_speed_turn(),
            invert_forward: false,
            invert_turns: false,
            settle_ms: default_settle_ms(),
            gyro: false,
            front_touch: false,
            side_touch: false,
            log_dir: None,
        }
    }
}

impl Config {
    pub fn bridge(&self) -> BridgeConfig {
        BridgeConfig {
            bind_addr: SocketAddr::new(self.bind_addr, self.udp_port),
            timeout: Duration::from_millis(self.timeout_ms),
            watchdog_tick: self.watchdog_tick_ms.map(Duration::from_millis),
            recv_poll: Duration::from_millis(self.recv_poll_ms),
        }
    }

    pub fn drive(&self) -> DriveConfig {
        DriveConfig {
            speed_forward: self.speed_forward,
            speed_turn: self.speed_turn,
            invert_forward: self.invert_forward,
            invert_turns: self.invert_turns,
            settle: Duration::from_millis(self.settle_ms),
        }
    }

    /// Simulated drive base with only the configured sensors attached.
    pub fn sim_device(&self) -> SimDevice {
        let mut device = SimDevice::new().with_config(self.drive());
        if self.gyro {
            device = device.with_gyro();
        }
        if self.front_touch {
            device = device.with_front_touch();
        }
        if self.side_touch {
            device = device.with_side_touch();
        }
        device
    }
}

/// Return the path to `~/.motorlink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".motorlink").join("config.toml")
}

/// Load `path` (defaults when it does not exist) and apply `MOTORLINK_*`
/// environment overrides.
pub fn load(path: &Path) -> Result<Config, MotorlinkError> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the file alone.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, MotorlinkError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        MotorlinkError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| MotorlinkError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `MOTORLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MOTORLINK_PORT` | `udp_port` |
/// | `MOTORLINK_TIMEOUT_MS` | `timeout_ms` |
/// | `MOTORLINK_BIND_ADDR` | `bind_addr` |
/// | `MOTORLINK_SPEED_FORWARD` | `speed_forward` |
/// | `MOTORLINK_SPEED_TURN` | `speed_turn` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(port) = parse_var(&lookup, "MOTORLINK_PORT") {
        cfg.udp_port = port;
    }
    if let Some(ms) = parse_var(&lookup, "MOTORLINK_TIMEOUT_MS") {
        cfg.timeout_ms = ms;
    }
    if let Some(addr) = parse_var(&lookup, "MOTORLINK_BIND_ADDR") {
        cfg.bind_addr = addr;
    }
    if let Some(speed) = parse_var(&lookup, "MOTORLINK_SPEED_FORWARD") {
        cfg.speed_forward = speed;
    }
    if let Some(speed) = parse_var(&lookup, "MOTORLINK_SPEED_TURN") {
        cfg.speed_turn = speed;
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key)?.trim().parse().ok()
}

/// Save the config, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), MotorlinkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| MotorlinkError::Config(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| MotorlinkError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        MotorlinkError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.udp_port, 5000);
        assert_eq!(loaded.timeout_ms, 500);
    }

    #[test]
    fn optional_fields_are_omitted_when_unset() {
        let raw = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(!raw.contains("log_dir"));
        assert!(!raw.contains("watchdog_tick_ms"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "udp_port = 6000\ninvert_turns = true\n").unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.udp_port, 6000);
        assert!(cfg.invert_turns);
        assert_eq!(cfg.speed_forward, 40);
        assert_eq!(cfg.settle_ms, 500);
    }

    #[test]
    fn missing_file_yields_none() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn unparsable_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "udp_port = \"lots\"").unwrap();
        assert!(matches!(load_from(&path), Err(MotorlinkError::Config(_))));
    }

    #[test]
    fn config_path_points_to_motorlink_dir() {
        let p = config_path_for_home("/home/pilot");
        assert_eq!(p, PathBuf::from("/home/pilot/.motorlink/config.toml"));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut cfg = Config {
            udp_port: 6000,
            ..Config::default()
        };
        apply_overrides(
            &mut cfg,
            env(&[
                ("MOTORLINK_PORT", "7000"),
                ("MOTORLINK_TIMEOUT_MS", "250"),
                ("MOTORLINK_BIND_ADDR", "127.0.0.1"),
                ("MOTORLINK_SPEED_FORWARD", "55"),
                ("MOTORLINK_SPEED_TURN", "20"),
            ]),
        );
        assert_eq!(cfg.udp_port, 7000);
        assert_eq!(cfg.timeout_ms, 250);
        assert_eq!(cfg.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(cfg.speed_forward, 55);
        assert_eq!(cfg.speed_turn, 20);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            env(&[("MOTORLINK_PORT", "not-a-port"), ("MOTORLINK_SPEED_TURN", "300")]),
        );
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn sensors_are_absent_by_default() {
        use motorlink_hal::ActuatorPort;
        use motorlink_types::SensorSnapshot;

        let cfg = Config::default();
        assert!(!cfg.gyro && !cfg.front_touch && !cfg.side_touch);

        let (mut base, _probe) = cfg.sim_device().build().unwrap();
        assert_eq!(base.read_sensors(), SensorSnapshot::unavailable());
    }

    #[test]
    fn configured_touch_sensors_report_released() {
        use motorlink_hal::ActuatorPort;
        use motorlink_types::ContactState;

        let cfg = Config {
            front_touch: true,
            ..Config::default()
        };
        let (mut base, _probe) = cfg.sim_device().build().unwrap();
        let snapshot = base.read_sensors();
        assert_eq!(snapshot.front_contact, ContactState::Released);
        assert_eq!(snapshot.side_contact, ContactState::Unavailable);
    }

    #[test]
    fn converts_to_runtime_configs() {
        let cfg = Config {
            udp_port: 5100,
            watchdog_tick_ms: Some(50),
            invert_forward: true,
            ..Config::default()
        };
        let bridge = cfg.bridge();
        assert_eq!(bridge.bind_addr, "0.0.0.0:5100".parse().unwrap());
        assert_eq!(bridge.timeout, Duration::from_millis(500));
        assert_eq!(bridge.watchdog_tick, Some(Duration::from_millis(50)));

        let drive = cfg.drive();
        assert!(drive.invert_forward);
        assert_eq!(drive.settle, Duration::from_millis(500));
        assert!(drive.validate().is_ok());
    }
}

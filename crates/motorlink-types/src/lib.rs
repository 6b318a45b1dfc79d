use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of discrete motion commands the bridge accepts.
///
/// The discriminant is the wire value sent by the decision host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ActionCode {
    /// Brake both drive outputs.
    Stop = 0,
    /// Both outputs forward at the forward speed.
    Forward = 1,
    /// Spin in place to the left at the turn speed.
    TurnLeft = 2,
    /// Spin in place to the right at the turn speed.
    TurnRight = 3,
    /// Both outputs reversed at the forward speed.
    Backward = 4,
}

impl ActionCode {
    /// Every action, in wire order.
    pub const ALL: [ActionCode; 5] = [
        ActionCode::Stop,
        ActionCode::Forward,
        ActionCode::TurnLeft,
        ActionCode::TurnRight,
        ActionCode::Backward,
    ];

    /// The numeric wire value.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Stable upper-case name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            ActionCode::Stop => "STOP",
            ActionCode::Forward => "FORWARD",
            ActionCode::TurnLeft => "TURN_LEFT",
            ActionCode::TurnRight => "TURN_RIGHT",
            ActionCode::Backward => "BACKWARD",
        }
    }

    /// Look an action up by its name, case-insensitively.  Accepts the short
    /// forms `left` and `right` as well.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "stop" => Some(ActionCode::Stop),
            "forward" => Some(ActionCode::Forward),
            "turn_left" | "left" => Some(ActionCode::TurnLeft),
            "turn_right" | "right" => Some(ActionCode::TurnRight),
            "backward" => Some(ActionCode::Backward),
            _ => None,
        }
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i64> for ActionCode {
    type Error = MotorlinkError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ActionCode::Stop),
            1 => Ok(ActionCode::Forward),
            2 => Ok(ActionCode::TurnLeft),
            3 => Ok(ActionCode::TurnRight),
            4 => Ok(ActionCode::Backward),
            other => Err(MotorlinkError::UnknownActionCode(other)),
        }
    }
}

/// Reading of a binary touch sensor that may not be attached at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactState {
    Pressed,
    Released,
    /// The sensor is absent or its read failed. Never reported as released.
    #[default]
    Unavailable,
}

impl ContactState {
    /// Integer form used in the sensor reply: `1`, `0` or `-1`.
    pub fn wire_value(self) -> i8 {
        match self {
            ContactState::Pressed => 1,
            ContactState::Released => 0,
            ContactState::Unavailable => -1,
        }
    }

    pub fn from_wire(value: i8) -> Option<Self> {
        match value {
            1 => Some(ContactState::Pressed),
            0 => Some(ContactState::Released),
            -1 => Some(ContactState::Unavailable),
            _ => None,
        }
    }
}

impl From<bool> for ContactState {
    fn from(pressed: bool) -> Self {
        if pressed {
            ContactState::Pressed
        } else {
            ContactState::Released
        }
    }
}

/// Device sensor state returned to the peer after every applied command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Gyro heading in degrees. Unbounded; drift is expected.
    pub angular_position: f64,
    /// Gyro rate in degrees per second.
    pub angular_rate: f64,
    pub front_contact: ContactState,
    pub side_contact: ContactState,
}

impl SensorSnapshot {
    /// Snapshot of a device with no sensors attached.
    pub fn unavailable() -> Self {
        Self {
            angular_position: 0.0,
            angular_rate: 0.0,
            front_contact: ContactState::Unavailable,
            side_contact: ContactState::Unavailable,
        }
    }
}

/// A validly decoded command, tagged with where and when it came from.
///
/// Lives only for a single receive/dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMessage {
    pub action: ActionCode,
    pub peer: SocketAddr,
    pub received_at: Instant,
}

/// Observation record published by the bridge engine for every cycle
/// outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: BridgeEventKind,
}

impl BridgeEvent {
    pub fn now(kind: BridgeEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEventKind {
    /// A peer command was executed on the device.
    CommandApplied { action: ActionCode, peer: SocketAddr },
    /// A datagram failed to decode and was dropped.
    CommandRejected { peer: SocketAddr, reason: String },
    /// The device refused an action.  `consecutive` counts faults since the
    /// last successful execute.
    ActuatorFault {
        action: ActionCode,
        consecutive: u32,
        details: String,
    },
    /// The watchdog forced a stop after `silence_ms` without a valid command.
    WatchdogStop { silence_ms: u64 },
    /// A sensor reply datagram left the socket.
    ReplySent { peer: SocketAddr, payload: String },
    /// The device has been stopped and released.
    ShutdownComplete,
}

/// Error type shared across the bridge workspace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MotorlinkError {
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Unknown action code: {0}")]
    UnknownActionCode(i64),

    #[error("Actuator Fault on {component}: {details}")]
    ActuatorFault { component: String, details: String },

    #[error("Actuator connection failed: {0}")]
    ActuatorConnect(String),

    #[error("Failed to bind UDP socket on {addr}: {details}")]
    TransportBind { addr: String, details: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MotorlinkError {
    /// Shorthand for building an [`MotorlinkError::ActuatorFault`].
    pub fn actuator(component: impl Into<String>, details: impl Into<String>) -> Self {
        MotorlinkError::ActuatorFault {
            component: component.into(),
            details: details.into(),
        }
    }

    /// `true` for errors that abort startup rather than a single cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MotorlinkError::ActuatorConnect(_)
                | MotorlinkError::TransportBind { .. }
                | MotorlinkError::Config(_)
        )
    }
}

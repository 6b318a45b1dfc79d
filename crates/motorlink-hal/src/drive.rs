//! [`DriveBase`] – the concrete [`ActuatorPort`] for a two-motor
//! differential base.
//!
//! # Action mapping
//!
//! | Action | Left output | Right output |
//! |---|---|---|
//! | `STOP` | brake | brake |
//! | `FORWARD` | `+forward` | `+forward` |
//! | `BACKWARD` | `-forward` | `-forward` |
//! | `TURN_LEFT` | `-turn` | `+turn` |
//! | `TURN_RIGHT` | `+turn` | `-turn` |
//!
//! `invert_forward` flips the sign of the forward/backward rows and
//! `invert_turns` swaps the two turn rows, for bases whose motors are wired
//! the other way round.

use std::time::Duration;

use motorlink_types::{ActionCode, MotorlinkError, SensorSnapshot};
use tracing::{debug, info, warn};

use crate::motor::Motor;
use crate::port::ActuatorPort;
use crate::sensor::{SensorCapabilities, SensorSuite};

const COMPONENT: &str = "drive_base";

/// Speed and calibration settings for a [`DriveBase`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriveConfig {
    /// Percent power for `FORWARD` and `BACKWARD`.
    pub speed_forward: u8,
    /// Percent power for `TURN_LEFT` and `TURN_RIGHT`.
    pub speed_turn: u8,
    pub invert_forward: bool,
    pub invert_turns: bool,
    /// Wait between the final brake and releasing the motors.
    pub settle: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            speed_forward: 40,
            speed_turn: 30,
            invert_forward: false,
            invert_turns: false,
            settle: Duration::from_millis(500),
        }
    }
}

impl DriveConfig {
    /// # Errors
    ///
    /// Returns [`MotorlinkError::Config`] if either speed exceeds 100 %.
    pub fn validate(&self) -> Result<(), MotorlinkError> {
        if self.speed_forward > 100 {
            return Err(MotorlinkError::Config(format!(
                "speed_forward must be at most 100, got {}",
                self.speed_forward
            )));
        }
        if self.speed_turn > 100 {
            return Err(MotorlinkError::Config(format!(
                "speed_turn must be at most 100, got {}",
                self.speed_turn
            )));
        }
        Ok(())
    }
}

/// What the two drive outputs should do for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelCommand {
    Brake,
    Run { left: i8, right: i8 },
}

/// Map `action` to per-wheel outputs.
pub fn wheel_command(action: ActionCode, config: &DriveConfig) -> WheelCommand {
    let forward = signed(config.speed_forward, config.invert_forward);
    let turn = signed(config.speed_turn, config.invert_turns);
    match action {
        ActionCode::Stop => WheelCommand::Brake,
        ActionCode::Forward => WheelCommand::Run {
            left: forward,
            right: forward,
        },
        ActionCode::Backward => WheelCommand::Run {
            left: -forward,
            right: -forward,
        },
        ActionCode::TurnLeft => WheelCommand::Run {
            left: -turn,
            right: turn,
        },
        ActionCode::TurnRight => WheelCommand::Run {
            left: turn,
            right: -turn,
        },
    }
}

fn signed(speed: u8, invert: bool) -> i8 {
    // `min` keeps the cast lossless even for an unvalidated config.
    let magnitude = speed.min(100) as i8;
    if invert { -magnitude } else { magnitude }
}

/// Differential drive base: two motors plus an optional sensor suite.
pub struct DriveBase {
    left: Box<dyn Motor>,
    right: Box<dyn Motor>,
    sensors: SensorSuite,
    config: DriveConfig,
    released: bool,
}

impl DriveBase {
    /// Assemble a base from already-connected drivers.
    ///
    /// # Errors
    ///
    /// Returns [`MotorlinkError::Config`] when `config` fails validation, or
    /// [`MotorlinkError::ActuatorConnect`] when the motors cannot be braked
    /// into a known initial state.
    pub fn connect(
        mut left: Box<dyn Motor>,
        mut right: Box<dyn Motor>,
        sensors: SensorSuite,
        config: DriveConfig,
    ) -> Result<Self, MotorlinkError> {
        config.validate()?;
        left.brake()
            .and_then(|()| right.brake())
            .map_err(|e| MotorlinkError::ActuatorConnect(e.to_string()))?;

        let caps = sensors.capabilities();
        info!(
            left = left.id(),
            right = right.id(),
            gyro = caps.gyro,
            front_contact = caps.front_contact,
            side_contact = caps.side_contact,
            "drive base connected"
        );

        Ok(Self {
            left,
            right,
            sensors,
            config,
            released: false,
        })
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn capabilities(&self) -> SensorCapabilities {
        self.sensors.capabilities()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn brake_both(&mut self) -> Result<(), MotorlinkError> {
        let left = self.left.brake();
        let right = self.right.brake();
        left.and(right)
    }
}

impl ActuatorPort for DriveBase {
    fn execute(&mut self, action: ActionCode) -> Result<(), MotorlinkError> {
        if self.released {
            return Err(MotorlinkError::actuator(COMPONENT, "connection released"));
        }

        match wheel_command(action, &self.config) {
            WheelCommand::Brake => self.brake_both(),
            WheelCommand::Run { left, right } => {
                debug!(%action, left, right, "driving motors");
                let applied = self
                    .left
                    .run(left)
                    .and_then(|()| self.right.run(right));
                if let Err(e) = applied {
                    // Never leave one wheel running on its own.
                    if let Err(brake_err) = self.brake_both() {
                        warn!(error = %brake_err, "brake after partial drive command failed");
                    }
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    fn read_sensors(&mut self) -> SensorSnapshot {
        if self.released {
            return SensorSnapshot::unavailable();
        }
        self.sensors.read()
    }

    fn shutdown(&mut self) -> Result<(), MotorlinkError> {
        if self.released {
            return Ok(());
        }
        let braked = self.brake_both();
        if let Err(e) = &braked {
            warn!(error = %e, "final brake failed; releasing motors anyway");
        }
        std::thread::sleep(self.config.settle);
        self.left.release();
        self.right.release();
        self.released = true;
        info!("drive base released");
        braked
    }
}

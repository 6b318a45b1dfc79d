//! Simulated device for running the bridge without a brick attached.
//!
//! [`SimDevice`] builds a [`DriveBase`] from stub drivers that record every
//! command, plus a [`SimProbe`] that shares their state so tests (and the
//! `motorlink run` sim mode) can inspect motor outputs, inject faults and set
//! sensor readings.
//!
//! # Example
//!
//! ```rust
//! use motorlink_hal::sim::SimDevice;
//! use motorlink_hal::ActuatorPort;
//! use motorlink_types::ActionCode;
//!
//! let (mut base, probe) = SimDevice::new().with_gyro().build().unwrap();
//! base.execute(ActionCode::Forward).unwrap();
//! assert_eq!(probe.left().speed, 40);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use motorlink_types::MotorlinkError;

use crate::drive::{DriveBase, DriveConfig};
use crate::motor::Motor;
use crate::sensor::{Gyro, SensorSuite, TouchSensor};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Stub motor
// ────────────────────────────────────────────────────────────────────────────

/// Last known output of a [`SimMotor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimMotorState {
    pub speed: i8,
    pub braked: bool,
    pub brake_count: u32,
    pub run_count: u32,
    pub released: bool,
    /// When set, `run` and `brake` fail with an actuator fault.
    pub faulted: bool,
}

pub struct SimMotor {
    id: String,
    state: Arc<Mutex<SimMotorState>>,
}

impl SimMotor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Arc::default(),
        }
    }

    fn check(&self, state: &SimMotorState) -> Result<(), MotorlinkError> {
        if state.faulted {
            Err(MotorlinkError::actuator(&self.id, "simulated fault"))
        } else {
            Ok(())
        }
    }
}

impl Motor for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, speed_pct: i8) -> Result<(), MotorlinkError> {
        let mut state = lock(&self.state);
        self.check(&state)?;
        state.speed = speed_pct;
        state.braked = false;
        state.run_count += 1;
        Ok(())
    }

    fn brake(&mut self) -> Result<(), MotorlinkError> {
        let mut state = lock(&self.state);
        self.check(&state)?;
        state.speed = 0;
        state.braked = true;
        state.brake_count += 1;
        Ok(())
    }

    fn release(&mut self) {
        lock(&self.state).released = true;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub sensors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SimGyroState {
    angle: f64,
    rate: f64,
    faulted: bool,
}

pub struct SimGyro {
    state: Arc<Mutex<SimGyroState>>,
}

impl Gyro for SimGyro {
    fn id(&self) -> &str {
        "sim_gyro"
    }

    fn angle(&mut self) -> Result<f64, MotorlinkError> {
        let state = lock(&self.state);
        if state.faulted {
            return Err(MotorlinkError::actuator("sim_gyro", "simulated read failure"));
        }
        Ok(state.angle)
    }

    fn rate(&mut self) -> Result<f64, MotorlinkError> {
        let state = lock(&self.state);
        if state.faulted {
            return Err(MotorlinkError::actuator("sim_gyro", "simulated read failure"));
        }
        Ok(state.rate)
    }
}

pub struct SimTouch {
    id: &'static str,
    pressed: Arc<Mutex<bool>>,
}

impl TouchSensor for SimTouch {
    fn id(&self) -> &str {
        self.id
    }

    fn is_pressed(&mut self) -> Result<bool, MotorlinkError> {
        Ok(*lock(&self.pressed))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Probe handle
// ────────────────────────────────────────────────────────────────────────────

/// Shared view into a simulated device's drivers.
#[derive(Clone)]
pub struct SimProbe {
    left: Arc<Mutex<SimMotorState>>,
    right: Arc<Mutex<SimMotorState>>,
    gyro: Arc<Mutex<SimGyroState>>,
    front: Arc<Mutex<bool>>,
    side: Arc<Mutex<bool>>,
}

impl SimProbe {
    pub fn left(&self) -> SimMotorState {
        lock(&self.left).clone()
    }

    pub fn right(&self) -> SimMotorState {
        lock(&self.right).clone()
    }

    /// `true` when both motors are braked.
    pub fn is_stopped(&self) -> bool {
        self.left().braked && self.right().braked
    }

    /// Make both motors fail (or recover) on their next command.
    pub fn set_fault(&self, faulted: bool) {
        lock(&self.left).faulted = faulted;
        lock(&self.right).faulted = faulted;
    }

    pub fn set_heading(&self, angle: f64, rate: f64) {
        let mut gyro = lock(&self.gyro);
        gyro.angle = angle;
        gyro.rate = rate;
    }

    pub fn set_gyro_fault(&self, faulted: bool) {
        lock(&self.gyro).faulted = faulted;
    }

    pub fn press_front(&self, pressed: bool) {
        *lock(&self.front) = pressed;
    }

    pub fn press_side(&self, pressed: bool) {
        *lock(&self.side) = pressed;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimDevice builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a simulated [`DriveBase`].
///
/// Without any `with_*` sensor calls the device has no sensors and every
/// reply reports them as unavailable.
pub struct SimDevice {
    config: DriveConfig,
    gyro: bool,
    front: bool,
    side: bool,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self {
            // Simulated motors settle instantly.
            config: DriveConfig {
                settle: Duration::ZERO,
                ..DriveConfig::default()
            },
            gyro: false,
            front: false,
            side: false,
        }
    }
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: DriveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_gyro(mut self) -> Self {
        self.gyro = true;
        self
    }

    pub fn with_front_touch(mut self) -> Self {
        self.front = true;
        self
    }

    pub fn with_side_touch(mut self) -> Self {
        self.side = true;
        self
    }

    /// Consume the builder and connect the simulated base.
    ///
    /// # Errors
    ///
    /// Propagates [`DriveBase::connect`] errors (invalid speed settings).
    pub fn build(self) -> Result<(DriveBase, SimProbe), MotorlinkError> {
        let left = SimMotor::new("sim_left");
        let right = SimMotor::new("sim_right");
        let probe = SimProbe {
            left: left.state.clone(),
            right: right.state.clone(),
            gyro: Arc::default(),
            front: Arc::default(),
            side: Arc::default(),
        };

        let gyro: Option<Box<dyn Gyro>> = self.gyro.then(|| {
            Box::new(SimGyro {
                state: probe.gyro.clone(),
            }) as Box<dyn Gyro>
        });
        let front: Option<Box<dyn TouchSensor>> = self.front.then(|| {
            Box::new(SimTouch {
                id: "sim_touch_front",
                pressed: probe.front.clone(),
            }) as Box<dyn TouchSensor>
        });
        let side: Option<Box<dyn TouchSensor>> = self.side.then(|| {
            Box::new(SimTouch {
                id: "sim_touch_side",
                pressed: probe.side.clone(),
            }) as Box<dyn TouchSensor>
        });

        let base = DriveBase::connect(
            Box::new(left),
            Box::new(right),
            SensorSuite::probe(gyro, front, side),
            self.config,
        )?;
        Ok((base, probe))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

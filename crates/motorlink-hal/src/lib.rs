//! `motorlink-hal` – Device boundary
//!
//! Everything the bridge knows about the physical robot lives behind
//! [`ActuatorPort`].  The engine never sees motors or sensors directly.
//!
//! # Modules
//!
//! - [`port`] – [`ActuatorPort`][port::ActuatorPort]: execute one of the five
//!   motion primitives, read a sensor snapshot, shut down idempotently.
//! - [`motor`] – [`Motor`][motor::Motor]: a single speed-controlled drive
//!   output.
//! - [`sensor`] – [`Gyro`][sensor::Gyro], [`TouchSensor`][sensor::TouchSensor]
//!   and the [`SensorSuite`][sensor::SensorSuite] that probes them once at
//!   startup and degrades failed reads field by field.
//! - [`drive`] – [`DriveBase`][drive::DriveBase]: the differential-drive
//!   [`ActuatorPort`] built from two motors and a sensor suite.
//! - [`sim`] – [`SimDevice`][sim::SimDevice]: stub drivers for headless runs
//!   and tests.

pub mod drive;
pub mod motor;
pub mod port;
pub mod sensor;
pub mod sim;

pub use drive::{DriveBase, DriveConfig, WheelCommand, wheel_command};
pub use motor::Motor;
pub use port::ActuatorPort;
pub use sensor::{Gyro, SensorCapabilities, SensorSuite, TouchSensor};
pub use sim::{SimDevice, SimProbe};

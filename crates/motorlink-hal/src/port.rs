//! The `ActuatorPort` boundary between the bridge engine and the physical
//! device.
//!
//! The engine only ever talks to this trait, so a USB brick driver, a
//! Bluetooth driver and the [`sim`][crate::sim] device are interchangeable.

use motorlink_types::{ActionCode, MotorlinkError, SensorSnapshot};

/// A motorized device that executes discrete actions and reports sensors.
///
/// Callers serialize access themselves: the engine holds one exclusive
/// token around every call, so implementations may assume they are never
/// entered concurrently.
pub trait ActuatorPort: Send {
    /// Apply exactly one motion primitive.
    ///
    /// # Errors
    ///
    /// Returns [`MotorlinkError::ActuatorFault`] when the device rejects the
    /// command or the connection has already been released.
    fn execute(&mut self, action: ActionCode) -> Result<(), MotorlinkError>;

    /// Best-effort read of every configured sensor.
    ///
    /// Never fails as a whole: a sensor that cannot be read degrades its own
    /// field to [`ContactState::Unavailable`][motorlink_types::ContactState]
    /// or a zero reading.
    fn read_sensors(&mut self) -> SensorSnapshot;

    /// Stop the device, wait for it to settle and release the connection.
    ///
    /// Idempotent: calls after the first return `Ok(())` without touching
    /// the device.
    fn shutdown(&mut self) -> Result<(), MotorlinkError>;
}

impl<P: ActuatorPort + ?Sized> ActuatorPort for Box<P> {
    fn execute(&mut self, action: ActionCode) -> Result<(), MotorlinkError> {
        (**self).execute(action)
    }

    fn read_sensors(&mut self) -> SensorSnapshot {
        (**self).read_sensors()
    }

    fn shutdown(&mut self) -> Result<(), MotorlinkError> {
        (**self).shutdown()
    }
}

//! Generic `Motor` trait for the two drive outputs of a differential base.
//!
//! Drivers implement this trait and are handed to a
//! [`DriveBase`][crate::drive::DriveBase].  The base never talks to a brick
//! protocol directly.

use motorlink_types::MotorlinkError;

/// A speed-controlled drive motor.
pub trait Motor: Send {
    /// Stable identifier for this motor, e.g. `"left_motor"` or `"port_a"`.
    fn id(&self) -> &str;

    /// Run continuously at `speed_pct` percent of full power.  The sign is the
    /// direction; the magnitude is at most 100.
    ///
    /// # Errors
    ///
    /// Returns [`MotorlinkError::ActuatorFault`] if the command cannot be
    /// applied.
    fn run(&mut self, speed_pct: i8) -> Result<(), MotorlinkError>;

    /// Halt with active braking.
    ///
    /// # Errors
    ///
    /// Returns [`MotorlinkError::ActuatorFault`] if the command cannot be
    /// applied.
    fn brake(&mut self) -> Result<(), MotorlinkError>;

    /// Release the underlying connection.  Default is a no-op for drivers
    /// that share a connection owned elsewhere.
    fn release(&mut self) {}
}

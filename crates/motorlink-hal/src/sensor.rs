//! Sensor driver traits and the [`SensorSuite`] that assembles a
//! [`SensorSnapshot`] from whatever sensors are actually attached.
//!
//! Availability is decided once, when the suite is probed at startup.  A
//! sensor that did not answer the probe is stored as absent and reports
//! [`ContactState::Unavailable`] (or a zero reading) for the rest of the
//! session.  A sensor that was present but fails a later read degrades only
//! its own field for that read.

use motorlink_types::{ContactState, MotorlinkError, SensorSnapshot};
use tracing::{debug, info};

/// Heading gyro.
pub trait Gyro: Send {
    fn id(&self) -> &str;

    /// Accumulated heading in degrees.
    fn angle(&mut self) -> Result<f64, MotorlinkError>;

    /// Angular rate in degrees per second.
    fn rate(&mut self) -> Result<f64, MotorlinkError>;
}

/// Binary touch sensor.
pub trait TouchSensor: Send {
    fn id(&self) -> &str;

    fn is_pressed(&mut self) -> Result<bool, MotorlinkError>;
}

/// Which sensors answered the startup probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorCapabilities {
    pub gyro: bool,
    pub front_contact: bool,
    pub side_contact: bool,
}

/// The set of sensors present on the device.
#[derive(Default)]
pub struct SensorSuite {
    gyro: Option<Box<dyn Gyro>>,
    front: Option<Box<dyn TouchSensor>>,
    side: Option<Box<dyn TouchSensor>>,
}

impl SensorSuite {
    /// A suite with no sensors at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Probe each candidate once and keep only those that respond.
    pub fn probe(
        gyro: Option<Box<dyn Gyro>>,
        front: Option<Box<dyn TouchSensor>>,
        side: Option<Box<dyn TouchSensor>>,
    ) -> Self {
        let gyro = gyro.and_then(|mut g| match g.angle() {
            Ok(_) => Some(g),
            Err(e) => {
                info!(sensor = g.id(), error = %e, "gyro did not answer probe; reporting unavailable");
                None
            }
        });
        let front = front.and_then(|t| probe_touch(t, "front"));
        let side = side.and_then(|t| probe_touch(t, "side"));
        Self { gyro, front, side }
    }

    pub fn capabilities(&self) -> SensorCapabilities {
        SensorCapabilities {
            gyro: self.gyro.is_some(),
            front_contact: self.front.is_some(),
            side_contact: self.side.is_some(),
        }
    }

    /// Read every present sensor, degrading field by field.
    pub fn read(&mut self) -> SensorSnapshot {
        let mut snapshot = SensorSnapshot::unavailable();

        if let Some(gyro) = self.gyro.as_mut() {
            snapshot.angular_position = gyro.angle().unwrap_or_else(|e| {
                debug!(sensor = gyro.id(), error = %e, "gyro angle read failed");
                0.0
            });
            snapshot.angular_rate = gyro.rate().unwrap_or_else(|e| {
                debug!(sensor = gyro.id(), error = %e, "gyro rate read failed");
                0.0
            });
        }
        if let Some(touch) = self.front.as_mut() {
            snapshot.front_contact = read_contact(touch.as_mut());
        }
        if let Some(touch) = self.side.as_mut() {
            snapshot.side_contact = read_contact(touch.as_mut());
        }

        snapshot
    }
}

fn probe_touch(mut touch: Box<dyn TouchSensor>, position: &str) -> Option<Box<dyn TouchSensor>> {
    match touch.is_pressed() {
        Ok(_) => Some(touch),
        Err(e) => {
            info!(sensor = touch.id(), position, error = %e, "touch sensor did not answer probe; reporting unavailable");
            None
        }
    }
}

fn read_contact(touch: &mut dyn TouchSensor) -> ContactState {
    match touch.is_pressed() {
        Ok(pressed) => ContactState::from(pressed),
        Err(e) => {
            debug!(sensor = touch.id(), error = %e, "touch read failed");
            ContactState::Unavailable
        }
    }
}

//! Text wire format for command and sensor datagrams.
//!
//! | Direction | Payload | Example |
//! |---|---|---|
//! | peer → bridge | decimal action code | `"1"` |
//! | bridge → peer | `angle,rate,front,side` | `"12.50,-3.20,0,1"` |
//!
//! Angles and rates carry two decimal places.  Contacts are `1` (pressed),
//! `0` (released) or `-1` (unavailable).

use motorlink_types::{ActionCode, ContactState, MotorlinkError, SensorSnapshot};

/// Receive buffer size for one command datagram.
pub const MAX_DATAGRAM: usize = 1024;

/// Decode a command datagram into an [`ActionCode`].
///
/// Surrounding whitespace is tolerated so `echo 1 | nc -u` works.
///
/// # Errors
///
/// [`MotorlinkError::MalformedCommand`] when the payload is not UTF-8 or not
/// an integer; [`MotorlinkError::UnknownActionCode`] when the integer is
/// outside `0..=4`.
pub fn decode_command(payload: &[u8]) -> Result<ActionCode, MotorlinkError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| MotorlinkError::MalformedCommand(format!("payload is not UTF-8: {e}")))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(MotorlinkError::MalformedCommand("empty payload".to_string()));
    }
    let value: i64 = text
        .parse()
        .map_err(|e| MotorlinkError::MalformedCommand(format!("{text:?} is not an integer: {e}")))?;
    ActionCode::try_from(value)
}

/// Textual form a peer sends for `action`.
pub fn encode_command(action: ActionCode) -> String {
    action.code().to_string()
}

/// Encode the sensor reply record.
pub fn encode_sensors(snapshot: &SensorSnapshot) -> String {
    format!(
        "{:.2},{:.2},{},{}",
        snapshot.angular_position,
        snapshot.angular_rate,
        snapshot.front_contact.wire_value(),
        snapshot.side_contact.wire_value(),
    )
}

/// Parse a sensor reply record, as a peer would.
///
/// # Errors
///
/// [`MotorlinkError::MalformedCommand`] when the record does not have exactly
/// four well-formed fields.
pub fn decode_sensors(record: &str) -> Result<SensorSnapshot, MotorlinkError> {
    let fields: Vec<&str> = record.trim().split(',').collect();
    let [angle, rate, front, side] = fields.as_slice() else {
        return Err(MotorlinkError::MalformedCommand(format!(
            "sensor record needs 4 fields, got {}",
            fields.len()
        )));
    };
    Ok(SensorSnapshot {
        angular_position: parse_float(angle, "angular_position")?,
        angular_rate: parse_float(rate, "angular_rate")?,
        front_contact: parse_contact(front, "front_contact")?,
        side_contact: parse_contact(side, "side_contact")?,
    })
}

fn parse_float(field: &str, name: &str) -> Result<f64, MotorlinkError> {
    field
        .trim()
        .parse()
        .map_err(|_| MotorlinkError::MalformedCommand(format!("{name}: {field:?} is not a number")))
}

fn parse_contact(field: &str, name: &str) -> Result<ContactState, MotorlinkError> {
    field
        .trim()
        .parse::<i8>()
        .ok()
        .and_then(ContactState::from_wire)
        .ok_or_else(|| MotorlinkError::MalformedCommand(format!("{name}: {field:?} is not 1, 0 or -1")))
}

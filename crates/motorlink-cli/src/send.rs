//! `motorlink send` – one-shot peer for poking a running bridge.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use motorlink_middleware::codec;
use motorlink_types::{ActionCode, MotorlinkError, SensorSnapshot};
use tokio::net::UdpSocket;
use tracing::debug;

/// How long to wait for the sensor reply.
pub const REPLY_WAIT: Duration = Duration::from_secs(1);

/// Accept either a numeric code (`"1"`) or a name (`"forward"`, `"left"`).
pub fn parse_action(input: &str) -> Result<ActionCode, MotorlinkError> {
    match input.trim().parse::<i64>() {
        Ok(code) => ActionCode::try_from(code),
        Err(_) => ActionCode::from_name(input)
            .ok_or_else(|| MotorlinkError::MalformedCommand(format!("unknown action {input:?}"))),
    }
}

/// Send `action` to `target` and wait up to `wait` for the sensor reply.
///
/// `Ok(None)` means the bridge stayed silent, which is how it answers
/// commands it could not execute.
pub async fn send_command(
    target: SocketAddr,
    action: ActionCode,
    wait: Duration,
) -> Result<Option<SensorSnapshot>, MotorlinkError> {
    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local)
        .await
        .map_err(|e| MotorlinkError::Transport(format!("cannot bind peer socket: {e}")))?;

    socket
        .send_to(codec::encode_command(action).as_bytes(), target)
        .await
        .map_err(|e| MotorlinkError::Transport(format!("send to {target} failed: {e}")))?;
    debug!(%target, %action, "command sent");

    let mut buf = [0u8; codec::MAX_DATAGRAM];
    loop {
        let (len, from) = match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
            Err(_) => return Ok(None),
            Ok(received) => {
                received.map_err(|e| MotorlinkError::Transport(format!("receive failed: {e}")))?
            }
        };
        if from != target {
            debug!(%from, "ignoring datagram from unexpected sender");
            continue;
        }
        let record = String::from_utf8_lossy(&buf[..len]);
        return codec::decode_sensors(&record).map(Some);
    }
}

//! # motorlink-middleware
//!
//! The UDP side of the bridge.
//!
//! - [`codec`] – text wire format for commands and sensor replies.
//! - [`dispatch`] – [`BridgeCore`], decode/execute/reply plus the forced
//!   stop, independent of any socket.
//! - [`engine`] – [`BridgeEngine`], the tokio runtime that binds the socket
//!   and drives the receive and watchdog loops.
//! - [`bus`] – [`EventBus`] broadcasting [`BridgeEvent`]s to observers.
//!
//! [`BridgeEvent`]: motorlink_types::BridgeEvent

pub mod bus;
pub mod codec;
pub mod dispatch;
pub mod engine;

pub use bus::{EventBus, EventReceiver};
pub use codec::{MAX_DATAGRAM, decode_command, decode_sensors, encode_command, encode_sensors};
pub use dispatch::{BridgeCore, Reply};
pub use engine::{BridgeConfig, BridgeEngine, ShutdownSignal, ShutdownTrigger, shutdown_channel};

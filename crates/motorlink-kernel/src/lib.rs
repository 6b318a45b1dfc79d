//! `motorlink-kernel` – Safety state
//!
//! The part of the bridge that enforces rules rather than moving data.
//!
//! # Modules
//!
//! - [`state`] – [`BridgeState`][state::BridgeState]: last applied action and
//!   last valid-command time, shared between the receive loop and the
//!   watchdog through [`SharedState`][state::SharedState].
//! - [`watchdog`] – [`SilenceWatchdog`][watchdog::SilenceWatchdog]: decides
//!   when command silence requires a forced stop.

pub mod state;
pub mod watchdog;

pub use state::{BridgeState, SharedState};
pub use watchdog::{SilenceWatchdog, WatchdogVerdict};

//! [`BridgeCore`] – the transport-free half of the bridge.
//!
//! Holds the device behind the actuator token, the shared [`BridgeState`],
//! and the [`EventBus`].  Both lines of control go through it:
//!
//! * the receive loop calls [`BridgeCore::handle_datagram`] for every
//!   datagram and sends whatever [`Reply`] comes back;
//! * the watchdog loop calls [`BridgeCore::enforce_silence`] once per tick.
//!
//! Locks are always taken actuator first, state second, and state is never
//! held across a device call that blocks.
//!
//! [`BridgeState`]: motorlink_kernel::BridgeState

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use motorlink_hal::ActuatorPort;
use motorlink_kernel::{BridgeState, SharedState, SilenceWatchdog, WatchdogVerdict};
use motorlink_types::{ActionCode, BridgeEvent, BridgeEventKind, CommandMessage, MotorlinkError};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::codec;

/// A sensor reply addressed to the peer whose command produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub peer: SocketAddr,
    pub payload: String,
}

type ActuatorToken = Arc<Mutex<Box<dyn ActuatorPort>>>;

/// Dispatch and fail-safe logic shared by the receive loop and the
/// watchdog.  Clones share the same device, state and bus.
#[derive(Clone)]
pub struct BridgeCore {
    actuator: ActuatorToken,
    state: SharedState,
    bus: EventBus,
    consecutive_faults: Arc<AtomicU32>,
    /// Set once [`BridgeCore::shutdown`] has released the device.  Only
    /// written while the actuator token is held.
    released: Arc<AtomicBool>,
}

impl BridgeCore {
    pub fn new(actuator: Box<dyn ActuatorPort>, bus: EventBus, started_at: Instant) -> Self {
        Self {
            actuator: Arc::new(Mutex::new(actuator)),
            state: SharedState::new(started_at),
            bus,
            consecutive_faults: Arc::default(),
            released: Arc::default(),
        }
    }

    /// Copy of the current shared state.
    pub fn state(&self) -> BridgeState {
        self.state.snapshot()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Faults since the last successful execute.
    pub fn consecutive_faults(&self) -> u32 {
        self.consecutive_faults.load(Ordering::SeqCst)
    }

    /// One receive cycle minus the socket: decode, record, dispatch.
    ///
    /// Returns the reply to send, or `None` when the datagram was rejected
    /// or the device faulted.
    pub fn handle_datagram(&self, payload: &[u8], peer: SocketAddr, now: Instant) -> Option<Reply> {
        let action = match codec::decode_command(payload) {
            Ok(action) => action,
            Err(e) => {
                warn!(%peer, error = %e, "dropping invalid datagram");
                self.bus.publish(BridgeEvent::now(BridgeEventKind::CommandRejected {
                    peer,
                    reason: e.to_string(),
                }));
                return None;
            }
        };

        self.handle_command(CommandMessage {
            action,
            peer,
            received_at: now,
        })
    }

    /// Accept a validly decoded command: reset the silence clock, then
    /// dispatch and build the reply.
    pub fn handle_command(&self, command: CommandMessage) -> Option<Reply> {
        self.state.lock().record_command(command.received_at);
        info!(action = %command.action, code = command.action.code(), peer = %command.peer, "command received");
        self.dispatch(command.action, Some(command.peer))
    }

    /// Execute `action` under the actuator token.
    ///
    /// On success `last_action` is updated and, when `peer` is known, the
    /// sensors are read and a reply is returned.  The watchdog path passes
    /// `None` and never gets a reply.
    pub fn dispatch(&self, action: ActionCode, peer: Option<SocketAddr>) -> Option<Reply> {
        let mut port = lock(&self.actuator);
        self.apply(&mut **port, action).ok()?;

        let peer = peer?;
        self.bus.publish(BridgeEvent::now(BridgeEventKind::CommandApplied { action, peer }));
        let snapshot = port.read_sensors();
        Some(Reply {
            peer,
            payload: codec::encode_sensors(&snapshot),
        })
    }

    /// One watchdog tick.  Returns `true` when a forced STOP was applied.
    pub fn enforce_silence(&self, watchdog: &SilenceWatchdog, now: Instant) -> bool {
        if !matches!(
            watchdog.check(&self.state(), now),
            WatchdogVerdict::StopRequired { .. }
        ) {
            return false;
        }

        // Re-check under the token: a command accepted in between wins.
        let mut port = lock(&self.actuator);
        let WatchdogVerdict::StopRequired { silence } = watchdog.check(&self.state(), now) else {
            debug!("command arrived before forced stop; standing down");
            return false;
        };

        warn!(
            silence_ms = silence.as_millis() as u64,
            timeout_ms = watchdog.timeout().as_millis() as u64,
            "command source silent; forcing STOP"
        );
        match self.apply(&mut **port, ActionCode::Stop) {
            Ok(()) => {
                self.bus.publish(BridgeEvent::now(BridgeEventKind::WatchdogStop {
                    silence_ms: silence.as_millis() as u64,
                }));
                true
            }
            // `last_action` is untouched, so the next tick retries.
            Err(_) => false,
        }
    }

    /// Final STOP, then release the device.  Leaves `last_action` at STOP.
    /// Calls after the first return `Ok(())` without touching the device.
    ///
    /// # Errors
    ///
    /// Propagates the error from [`ActuatorPort::shutdown`].
    pub fn shutdown(&self) -> Result<(), MotorlinkError> {
        let mut port = lock(&self.actuator);
        if self.released.load(Ordering::SeqCst) {
            debug!("bridge already shut down");
            return Ok(());
        }
        info!("sending final STOP");
        if self.apply(&mut **port, ActionCode::Stop).is_err() {
            // Shutdown brakes again below.
            self.state.lock().mark_stopped();
        }
        let released = port.shutdown();
        self.released.store(true, Ordering::SeqCst);
        match &released {
            Ok(()) => info!("bridge closed"),
            Err(e) => error!(error = %e, "device shutdown failed"),
        }
        self.bus.publish(BridgeEvent::now(BridgeEventKind::ShutdownComplete));
        released
    }

    /// Execute with the token already held and keep the bookkeeping in one
    /// place for every caller.
    fn apply(&self, port: &mut dyn ActuatorPort, action: ActionCode) -> Result<(), MotorlinkError> {
        match port.execute(action) {
            Ok(()) => {
                self.consecutive_faults.store(0, Ordering::SeqCst);
                self.state.lock().set_last_action(action);
                info!(%action, "action applied");
                Ok(())
            }
            Err(e) => {
                let consecutive = self.consecutive_faults.fetch_add(1, Ordering::SeqCst) + 1;
                error!(%action, consecutive, error = %e, "actuator rejected action; no reply");
                self.bus.publish(BridgeEvent::now(BridgeEventKind::ActuatorFault {
                    action,
                    consecutive,
                    details: e.to_string(),
                }));
                Err(e)
            }
        }
    }
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use motorlink_hal::{SimDevice, SimProbe};
    use motorlink_types::{ContactState, SensorSnapshot};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn bridge_with(device: SimDevice) -> (BridgeCore, SimProbe, Instant) {
        let (base, probe) = device.build().unwrap();
        let t0 = Instant::now();
        (BridgeCore::new(Box::new(base), EventBus::default(), t0), probe, t0)
    }

    fn bridge() -> (BridgeCore, SimProbe, Instant) {
        bridge_with(SimDevice::new())
    }

    #[test]
    fn every_valid_action_is_applied_and_answered() {
        let (bridge, _probe, t0) = bridge();
        for (i, action) in ActionCode::ALL.into_iter().enumerate() {
            let now = t0 + Duration::from_millis(10 * i as u64);
            let reply = bridge
                .handle_datagram(codec::encode_command(action).as_bytes(), peer(), now)
                .expect("healthy actuator must reply");
            assert_eq!(reply.peer, peer());
            assert_eq!(bridge.state().last_action(), action);
            assert_eq!(bridge.state().last_command_time(), now);
        }
    }

    #[test]
    fn forward_replies_with_unavailable_sensors() {
        let (bridge, probe, t0) = bridge();
        let reply = bridge.handle_datagram(b"1", peer(), t0).unwrap();
        assert_eq!(reply.payload, "0.00,0.00,-1,-1");
        assert_eq!(probe.left().speed, 40);
        assert_eq!(probe.right().speed, 40);
    }

    #[test]
    fn reply_carries_live_sensor_values() {
        let (bridge, probe, t0) = bridge_with(SimDevice::new().with_gyro().with_front_touch());
        probe.set_heading(12.5, -3.2);
        probe.press_front(true);
        let reply = bridge.handle_datagram(b"2", peer(), t0).unwrap();
        let snap = codec::decode_sensors(&reply.payload).unwrap();
        assert_eq!(snap.front_contact, ContactState::Pressed);
        assert_eq!(snap.side_contact, ContactState::Unavailable);
        assert_eq!(reply.payload, "12.50,-3.20,1,-1");
    }

    #[test]
    fn invalid_datagrams_leave_state_untouched() {
        let (bridge, probe, t0) = bridge();
        bridge.handle_datagram(b"3", peer(), t0).unwrap();
        let before = bridge.state();
        let runs_before = probe.left().run_count;

        let later = t0 + Duration::from_secs(1);
        let payloads: [&[u8]; 5] = [b"7", b"abc", b"", b"-2", b"4.5"];
        for payload in payloads {
            assert!(bridge.handle_datagram(payload, peer(), later).is_none());
        }
        assert_eq!(bridge.state(), before);
        assert_eq!(probe.left().run_count, runs_before);
    }

    #[test]
    fn rejected_datagrams_are_published() {
        let (bridge, _probe, t0) = bridge();
        let mut rx = bridge.bus().subscribe();
        bridge.handle_datagram(b"7", peer(), t0);
        let events = rx.drain();
        assert!(matches!(
            &events[..],
            [BridgeEvent { kind: BridgeEventKind::CommandRejected { .. }, .. }]
        ));
    }

    #[test]
    fn actuator_fault_keeps_last_action_and_sends_nothing() {
        let (bridge, probe, t0) = bridge();
        bridge.handle_datagram(b"1", peer(), t0).unwrap();

        probe.set_fault(true);
        let later = t0 + Duration::from_millis(100);
        assert!(bridge.handle_datagram(b"2", peer(), later).is_none());
        assert_eq!(bridge.state().last_action(), ActionCode::Forward);
        // The command was still valid, so the silence clock moved.
        assert_eq!(bridge.state().last_command_time(), later);
        assert_eq!(bridge.consecutive_faults(), 1);

        assert!(bridge.handle_datagram(b"4", peer(), later).is_none());
        assert_eq!(bridge.consecutive_faults(), 2);

        probe.set_fault(false);
        assert!(bridge.handle_datagram(b"4", peer(), later).is_some());
        assert_eq!(bridge.state().last_action(), ActionCode::Backward);
        assert_eq!(bridge.consecutive_faults(), 0);
    }

    #[test]
    fn watchdog_stop_fires_once_per_episode() {
        let (bridge, probe, t0) = bridge();
        let wd = SilenceWatchdog::new(TIMEOUT);
        bridge.handle_datagram(b"1", peer(), t0).unwrap();
        let brakes_before = probe.left().brake_count;

        let mut forced = 0;
        for i in 1..=30 {
            if bridge.enforce_silence(&wd, t0 + wd.tick() * i) {
                forced += 1;
            }
        }
        assert_eq!(forced, 1);
        assert_eq!(probe.left().brake_count, brakes_before + 1);
        assert_eq!(bridge.state().last_action(), ActionCode::Stop);
        // The forced stop did not touch the silence clock.
        assert_eq!(bridge.state().last_command_time(), t0);

        // New episode after a fresh non-STOP command.
        let resumed = t0 + Duration::from_secs(5);
        bridge.handle_datagram(b"3", peer(), resumed).unwrap();
        assert!(!bridge.enforce_silence(&wd, resumed + TIMEOUT));
        assert!(bridge.enforce_silence(&wd, resumed + TIMEOUT * 2));
        assert!(probe.is_stopped());
    }

    #[test]
    fn watchdog_idle_while_stopped() {
        let (bridge, probe, t0) = bridge();
        let wd = SilenceWatchdog::new(TIMEOUT);
        let brakes = probe.left().brake_count;
        assert!(!bridge.enforce_silence(&wd, t0 + Duration::from_secs(60)));
        assert_eq!(probe.left().brake_count, brakes);
    }

    #[test]
    fn failed_forced_stop_is_retried_next_tick() {
        let (bridge, probe, t0) = bridge();
        let wd = SilenceWatchdog::new(TIMEOUT);
        bridge.handle_datagram(b"1", peer(), t0).unwrap();

        probe.set_fault(true);
        let late = t0 + Duration::from_secs(1);
        assert!(!bridge.enforce_silence(&wd, late));
        assert_eq!(bridge.state().last_action(), ActionCode::Forward);

        probe.set_fault(false);
        assert!(bridge.enforce_silence(&wd, late + wd.tick()));
        assert_eq!(bridge.state().last_action(), ActionCode::Stop);
    }

    #[test]
    fn watchdog_publishes_stop_event() {
        let (bridge, _probe, t0) = bridge();
        let wd = SilenceWatchdog::new(TIMEOUT);
        bridge.handle_datagram(b"1", peer(), t0).unwrap();
        let mut rx = bridge.bus().subscribe();

        assert!(bridge.enforce_silence(&wd, t0 + Duration::from_millis(700)));
        let events = rx.drain();
        assert!(events.iter().any(|e| e.kind == BridgeEventKind::WatchdogStop { silence_ms: 700 }));
        assert!(!events.iter().any(|e| matches!(e.kind, BridgeEventKind::ReplySent { .. })));
    }

    #[test]
    fn shutdown_stops_and_releases() {
        let (bridge, probe, t0) = bridge();
        bridge.handle_datagram(b"4", peer(), t0).unwrap();

        bridge.shutdown().unwrap();
        assert_eq!(bridge.state().last_action(), ActionCode::Stop);
        assert!(probe.is_stopped());
        assert!(probe.left().released);

        // Released devices refuse further commands.
        assert!(bridge.handle_datagram(b"1", peer(), t0).is_none());
        bridge.shutdown().unwrap();
    }

    #[test]
    fn second_shutdown_leaves_device_and_bus_alone() {
        let (bridge, probe, t0) = bridge();
        bridge.handle_datagram(b"1", peer(), t0).unwrap();
        bridge.shutdown().unwrap();
        let brakes = probe.left().brake_count;

        let mut rx = bridge.bus().subscribe();
        bridge.shutdown().unwrap();
        assert!(rx.drain().is_empty());
        assert_eq!(bridge.consecutive_faults(), 0);
        assert_eq!(probe.left().brake_count, brakes);
    }

    /// Device that records whether two calls were ever inside it at once.
    struct OverlapPort {
        busy: Arc<AtomicBool>,
        overlaps: Arc<AtomicU32>,
        stops: Arc<AtomicU32>,
    }

    impl OverlapPort {
        fn enter(&self) {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_micros(500));
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    impl ActuatorPort for OverlapPort {
        fn execute(&mut self, action: ActionCode) -> Result<(), MotorlinkError> {
            self.enter();
            if action == ActionCode::Stop {
                self.stops.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn read_sensors(&mut self) -> SensorSnapshot {
            self.enter();
            SensorSnapshot::unavailable()
        }

        fn shutdown(&mut self) -> Result<(), MotorlinkError> {
            self.enter();
            Ok(())
        }
    }

    #[test]
    fn peer_commands_and_forced_stops_never_overlap_on_device() {
        let overlaps = Arc::new(AtomicU32::new(0));
        let stops = Arc::new(AtomicU32::new(0));
        let port = OverlapPort {
            busy: Arc::default(),
            overlaps: overlaps.clone(),
            stops: stops.clone(),
        };
        let bridge = BridgeCore::new(Box::new(port), EventBus::default(), Instant::now());
        // Every check sees the peer as silent, so each FORWARD invites a stop.
        let wd = SilenceWatchdog::new(Duration::from_millis(1));
        let peer_done = Arc::new(AtomicBool::new(false));

        let receiver = {
            let bridge = bridge.clone();
            let peer_done = peer_done.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    assert!(bridge.handle_datagram(b"1", peer(), Instant::now()).is_some());
                }
                peer_done.store(true, Ordering::SeqCst);
            })
        };
        let watchdog = {
            let bridge = bridge.clone();
            std::thread::spawn(move || {
                let mut forced = 0;
                let deadline = Instant::now() + Duration::from_secs(5);
                while Instant::now() < deadline {
                    let late = Instant::now() + Duration::from_secs(10);
                    if bridge.enforce_silence(&wd, late) {
                        forced += 1;
                    }
                    if peer_done.load(Ordering::SeqCst) && forced > 0 {
                        break;
                    }
                }
                forced
            })
        };

        receiver.join().unwrap();
        let forced = watchdog.join().unwrap();
        assert!(forced > 0, "watchdog never got a turn");
        assert_eq!(stops.load(Ordering::SeqCst), forced);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn forced_stop_stands_down_for_command_accepted_under_token() {
        let (bridge, probe, t0) = bridge();
        let wd = SilenceWatchdog::new(TIMEOUT);
        bridge.handle_datagram(b"1", peer(), t0).unwrap();
        let late = t0 + Duration::from_secs(2);
        let brakes = probe.left().brake_count;

        // Hold the token so the watchdog passes its first check and waits.
        let token = lock(&bridge.actuator);
        let watchdog = {
            let bridge = bridge.clone();
            std::thread::spawn(move || bridge.enforce_silence(&wd, late))
        };
        std::thread::sleep(Duration::from_millis(100));
        // A command is accepted while the watchdog is blocked.
        bridge.state.lock().record_command(late);
        drop(token);

        assert!(!watchdog.join().unwrap());
        assert_eq!(bridge.state().last_action(), ActionCode::Forward);
        assert_eq!(probe.left().brake_count, brakes);
        assert!(!probe.is_stopped());
    }
}

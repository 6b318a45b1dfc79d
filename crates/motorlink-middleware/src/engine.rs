//! [`BridgeEngine`] – UDP command/response runtime.
//!
//! The engine binds one socket, then runs two tasks until the shutdown
//! signal fires:
//!
//! 1. **Receive loop** – waits up to `recv_poll` for a datagram, hands it to
//!    [`BridgeCore::handle_datagram`], and sends any reply back to the exact
//!    sender address from the same socket.
//! 2. **Watchdog loop** – ticks every [`SilenceWatchdog::tick`] and calls
//!    [`BridgeCore::enforce_silence`].
//!
//! After both loops have exited the engine issues the final STOP and
//! releases the device.  Datagrams are never retried.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use motorlink_hal::ActuatorPort;
use motorlink_kernel::{BridgeState, SilenceWatchdog};
use motorlink_types::{BridgeEvent, BridgeEventKind, MotorlinkError};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::codec::MAX_DATAGRAM;
use crate::dispatch::{BridgeCore, Reply};

/// Network and timing settings for a [`BridgeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub bind_addr: SocketAddr,
    /// Silence threshold after which the watchdog forces STOP.
    pub timeout: Duration,
    /// Watchdog period; `None` selects one fifth of `timeout`.
    pub watchdog_tick: Option<Duration>,
    /// Upper bound on one receive wait.
    pub recv_poll: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            timeout: Duration::from_millis(500),
            watchdog_tick: None,
            recv_poll: Duration::from_millis(100),
        }
    }
}

impl BridgeConfig {
    pub fn watchdog(&self) -> SilenceWatchdog {
        let watchdog = SilenceWatchdog::new(self.timeout);
        match self.watchdog_tick {
            Some(tick) => watchdog.with_tick(tick),
            None => watchdog,
        }
    }
}

/// Sending half of the one-way shutdown signal.
#[derive(Clone)]
pub struct ShutdownTrigger(Arc<watch::Sender<bool>>);

impl ShutdownTrigger {
    /// Request shutdown.  Calling it more than once is harmless.
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving half of the shutdown signal.
#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once shutdown is requested or every trigger has been dropped.
    pub async fn triggered(&mut self) {
        // An error means all triggers are gone, which also ends the run.
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}

/// Create a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(Arc::new(tx)), ShutdownSignal(rx))
}

/// The bridge: one bound UDP socket plus the shared dispatch core.
pub struct BridgeEngine {
    socket: UdpSocket,
    local_addr: SocketAddr,
    core: BridgeCore,
    watchdog: SilenceWatchdog,
    recv_poll: Duration,
}

impl BridgeEngine {
    /// Bind the socket and take ownership of an already-connected device.
    ///
    /// # Errors
    ///
    /// Returns [`MotorlinkError::TransportBind`] when the socket cannot be
    /// bound.  The device is stopped and released before returning so no
    /// half-initialized bridge is left behind.
    pub async fn bind(
        config: BridgeConfig,
        actuator: impl ActuatorPort + 'static,
        bus: EventBus,
    ) -> Result<Self, MotorlinkError> {
        let actuator: Box<dyn ActuatorPort> = Box::new(actuator);

        let socket = match UdpSocket::bind(config.bind_addr).await {
            Ok(socket) => socket,
            Err(e) => {
                // Shutdown sleeps through the settle interval.
                let mut actuator = actuator;
                match tokio::task::spawn_blocking(move || actuator.shutdown()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(release_err)) => {
                        warn!(error = %release_err, "failed to release device after bind failure");
                    }
                    Err(join_err) => {
                        warn!(error = %join_err, "device release task failed after bind failure");
                    }
                }
                return Err(MotorlinkError::TransportBind {
                    addr: config.bind_addr.to_string(),
                    details: e.to_string(),
                });
            }
        };
        let local_addr = socket.local_addr().map_err(|e| MotorlinkError::TransportBind {
            addr: config.bind_addr.to_string(),
            details: e.to_string(),
        })?;

        let watchdog = config.watchdog();
        info!(
            %local_addr,
            timeout_ms = watchdog.timeout().as_millis() as u64,
            tick_ms = watchdog.tick().as_millis() as u64,
            "listening for commands"
        );

        Ok(Self {
            socket,
            local_addr,
            core: BridgeCore::new(actuator, bus, Instant::now()),
            watchdog,
            recv_poll: config.recv_poll,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the shared core for inspecting state from outside the run.
    pub fn core(&self) -> BridgeCore {
        self.core.clone()
    }

    pub fn state(&self) -> BridgeState {
        self.core.state()
    }

    /// Run until `shutdown` fires, then stop and release the device.
    ///
    /// # Errors
    ///
    /// Returns the device's shutdown error, if any.  Per-cycle faults never
    /// end the run.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<(), MotorlinkError> {
        let watchdog_task = tokio::spawn(watch_silence(
            self.core.clone(),
            self.watchdog,
            shutdown.clone(),
        ));

        self.receive_loop(shutdown).await;

        if let Err(e) = watchdog_task.await {
            error!(error = %e, "watchdog task ended abnormally");
        }

        info!("shutting down bridge");
        let core = self.core.clone();
        tokio::task::spawn_blocking(move || core.shutdown())
            .await
            .map_err(|e| MotorlinkError::actuator("bridge", format!("shutdown task failed: {e}")))?
    }

    async fn receive_loop(&self, mut shutdown: ShutdownSignal) {
        let mut buf = [0u8; MAX_DATAGRAM];

        while !shutdown.is_triggered() {
            let received = tokio::select! {
                () = shutdown.triggered() => break,
                received = tokio::time::timeout(self.recv_poll, self.socket.recv_from(&mut buf)) => received,
            };

            let (len, peer) = match received {
                // Idle: nothing arrived within the poll window.
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "datagram receive failed");
                    continue;
                }
                Ok(Ok(datagram)) => datagram,
            };

            if let Some(reply) = self.core.handle_datagram(&buf[..len], peer, Instant::now()) {
                self.send_reply(reply).await;
            }
        }
        debug!("receive loop stopped");
    }

    async fn send_reply(&self, reply: Reply) {
        match self.socket.send_to(reply.payload.as_bytes(), reply.peer).await {
            Ok(_) => {
                debug!(peer = %reply.peer, payload = %reply.payload, "sensor reply sent");
                self.core.bus().publish(BridgeEvent::now(BridgeEventKind::ReplySent {
                    peer: reply.peer,
                    payload: reply.payload,
                }));
            }
            Err(e) => warn!(peer = %reply.peer, error = %e, "failed to send sensor reply"),
        }
    }
}

async fn watch_silence(core: BridgeCore, watchdog: SilenceWatchdog, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(watchdog.tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !shutdown.is_triggered() {
        tokio::select! {
            () = shutdown.triggered() => break,
            _ = ticker.tick() => {
                core.enforce_silence(&watchdog, Instant::now());
            }
        }
    }
    debug!("watchdog stopped");
}

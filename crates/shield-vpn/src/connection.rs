//! Connection State
//!
//! Three-state connection model driven by a single toggle:
//!
//! ```text
//!                toggle                    connect Ok
//!  Disconnected ────────▶ Connecting ──────────────────▶ Connected
//!       ▲                     │                              │
//!       │     connect Err     │                              │
//!       ├─────────────────────┘                              │
//!       │                        toggle                      │
//!       └────────────────────────────────────────────────────┘
//! ```
//!
//! Toggling while `Connecting` is ignored. The connect step itself is
//! delegated to a [`Connector`]; the default [`SimulatedConnector`] waits a
//! fixed delay and always succeeds.

use crate::server::Server;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Delay of the simulated connect step
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connect attempt in flight
    Connecting { since: Instant },
    /// Session active
    Connected { connected_at: Instant },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }

    /// Session start, only set while connected
    pub fn connected_at(&self) -> Option<Instant> {
        match self {
            ConnectionState::Connected { connected_at } => Some(*connected_at),
            _ => None,
        }
    }

    /// Session length at `now`, zero when not connected
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.connected_at()
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default()
    }

    /// Short status label
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting { .. } => "Connecting",
            ConnectionState::Connected { .. } => "Connected",
        }
    }
}

/// Effect of feeding an event into the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Disconnected -> Connecting; the caller must start a connect attempt
    BeginConnect,
    /// Connecting -> Connected
    Connected { at: Instant },
    /// Connected -> Disconnected; session data must be dropped
    Disconnected,
    /// Connecting -> Disconnected after a failed attempt
    ConnectFailed(ConnectError),
    /// Event had no effect
    Ignored,
}

/// The connection state machine
///
/// Pure state: timers and the connect task are owned by the service that
/// feeds events in.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// User pressed the connect button
    pub fn toggle(&mut self, now: Instant) -> Transition {
        match self.state {
            ConnectionState::Connecting { .. } => {
                debug!("Toggle ignored while connecting");
                Transition::Ignored
            }
            ConnectionState::Connected { .. } => {
                info!("Disconnecting");
                self.state = ConnectionState::Disconnected;
                Transition::Disconnected
            }
            ConnectionState::Disconnected => {
                info!("Connecting");
                self.state = ConnectionState::Connecting { since: now };
                Transition::BeginConnect
            }
        }
    }

    /// A connect attempt finished
    pub fn complete(&mut self, result: Result<(), ConnectError>, now: Instant) -> Transition {
        if !self.state.is_connecting() {
            debug!("Discarding stale connect result");
            return Transition::Ignored;
        }

        match result {
            Ok(()) => {
                info!("Connected");
                self.state = ConnectionState::Connected { connected_at: now };
                Transition::Connected { at: now }
            }
            Err(e) => {
                warn!("Connect attempt failed: {}", e);
                self.state = ConnectionState::Disconnected;
                Transition::ConnectFailed(e)
            }
        }
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Connector::connect`]
pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<(), ConnectError>> + Send>>;

/// Performs the connect step for a server
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, server: Server) -> ConnectFuture;
}

/// Waits a fixed delay, then reports success
#[derive(Debug, Clone, Copy)]
pub struct SimulatedConnector {
    delay: Duration,
}

impl SimulatedConnector {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_DELAY)
    }
}

impl Connector for SimulatedConnector {
    fn connect(&self, server: Server) -> ConnectFuture {
        let delay = self.delay;
        Box::pin(async move {
            debug!("Simulating connect to {} ({:?})", server.id, delay);
            tokio::time::sleep(delay).await;
            Ok(())
        })
    }
}

/// Connect step errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("Connection refused by {0}")]
    Refused(String),

    #[error("Connect attempt aborted")]
    Aborted,

    #[error("Connect attempt failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_helpers() {
        let now = Instant::now();
        let connected = ConnectionState::Connected { connected_at: now };

        assert!(connected.is_connected());
        assert_eq!(connected.connected_at(), Some(now));
        assert_eq!(ConnectionState::Disconnected.connected_at(), None);
        assert_eq!(
            ConnectionState::Connecting { since: now }.connected_at(),
            None
        );
        assert_eq!(ConnectionState::Disconnected.elapsed(now), Duration::ZERO);
    }

    #[test]
    fn test_full_cycle() {
        let mut machine = ConnectionMachine::new();
        let t0 = Instant::now();

        assert_eq!(machine.toggle(t0), Transition::BeginConnect);
        assert!(machine.state().is_connecting());

        let t1 = t0 + DEFAULT_CONNECT_DELAY;
        assert_eq!(machine.complete(Ok(()), t1), Transition::Connected { at: t1 });
        assert_eq!(machine.state().connected_at(), Some(t1));

        assert_eq!(machine.toggle(t1), Transition::Disconnected);
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_toggle_while_connecting_is_noop() {
        let mut machine = ConnectionMachine::new();
        let t0 = Instant::now();
        machine.toggle(t0);
        let before = machine.state();

        assert_eq!(machine.toggle(t0 + Duration::from_millis(500)), Transition::Ignored);
        assert_eq!(machine.state(), before);
        assert_eq!(machine.state().connected_at(), None);
    }

    #[test]
    fn test_failed_connect_returns_to_disconnected() {
        let mut machine = ConnectionMachine::new();
        let t0 = Instant::now();
        machine.toggle(t0);

        let err = ConnectError::Refused("de-1".into());
        assert_eq!(
            machine.complete(Err(err.clone()), t0),
            Transition::ConnectFailed(err)
        );
        assert!(machine.state().is_disconnected());
    }

    #[test]
    fn test_stale_result_ignored() {
        let mut machine = ConnectionMachine::new();

        assert_eq!(machine.complete(Ok(()), Instant::now()), Transition::Ignored);
        assert!(machine.state().is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_connector_delay() {
        let connector = SimulatedConnector::default();
        let server = Server::new("nl-1", "X", "Y", "🏳", 1, 1);
        let start = Instant::now();

        connector.connect(server).await.unwrap();

        assert_eq!(start.elapsed(), DEFAULT_CONNECT_DELAY);
    }
}

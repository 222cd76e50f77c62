//! VPN Service
//!
//! Single task that owns every piece of mutable state: connection state,
//! server catalog, traffic counters and settings. The presentation layer talks
//! to it through a cloneable [`VpnHandle`] and reads [`Snapshot`]s from a
//! `watch` channel.
//!
//! # Usage
//!
//! ```rust,ignore
//! let vpn = VpnService::spawn(&ServiceConfig::default())?;
//!
//! vpn.toggle_connection().await?;          // Disconnected -> Connecting
//! let mut updates = vpn.subscribe();
//! updates.wait_for(|s| s.connection.is_connected()).await?;
//!
//! vpn.ingest_server_data("vpn://example.com/path").await?;
//! vpn.shutdown().await;
//! ```
//!
//! # Timers
//!
//! Two timers exist at most: the in-flight connect attempt and the
//! statistics ticker. Both are fields of the service, so leaving a state
//! drops them and no late callback can touch a finished session.

use crate::config::{ConfigError, ServiceConfig};
use crate::connection::{
    ConnectError, ConnectionMachine, ConnectionState, Connector, SimulatedConnector, Transition,
};
use crate::ingest::{IngestError, IngestPipeline};
use crate::server::{Server, ServerCatalog};
use crate::settings::{SettingChange, Settings, SettingsError, SettingsStore};
use crate::stats::{format_elapsed, StatsSimulator, TrafficCounters};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Command queue depth
const COMMAND_BUFFER: usize = 32;

/// Read-only view of the service state
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub connection: ConnectionState,
    pub traffic: TrafficCounters,
    /// Session length when the snapshot was taken
    pub elapsed: Duration,
    pub servers: Arc<Vec<Server>>,
    pub selected: Server,
    pub settings: Arc<Settings>,
    /// Why the last connect attempt failed, cleared on the next attempt
    pub last_error: Option<ConnectError>,
}

impl Snapshot {
    /// Session length as `HH:MM:SS`
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

/// Result of a toggle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A connect attempt started
    Connecting,
    /// The session was closed
    Disconnected,
    /// A connect attempt is already in flight
    Ignored,
}

/// Result of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    /// The appended server
    pub server: Server,
    /// Whether it became the selection (only while disconnected)
    pub selected: bool,
}

/// Rejected server selection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("Cannot change server while a session is active")]
    SessionActive,

    #[error("Unknown server: {0}")]
    UnknownServer(String),
}

/// Errors returned by [`VpnHandle`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("VPN service stopped")]
    Closed,

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

enum Command {
    Toggle {
        reply: oneshot::Sender<ToggleOutcome>,
    },
    Select {
        id: String,
        reply: oneshot::Sender<Result<Server, SelectError>>,
    },
    Ingest {
        text: String,
        reply: oneshot::Sender<Result<IngestReceipt, IngestError>>,
    },
    SetSetting {
        change: SettingChange,
        reply: oneshot::Sender<Arc<Settings>>,
    },
    Shutdown,
}

/// In-flight connect attempt; aborted when dropped
struct PendingConnect {
    server_id: String,
    handle: JoinHandle<Result<(), ConnectError>>,
}

impl Drop for PendingConnect {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The service task
pub struct VpnService<C: Connector = SimulatedConnector> {
    machine: ConnectionMachine,
    catalog: ServerCatalog,
    settings: SettingsStore,
    stats: StatsSimulator<StdRng>,
    pipeline: IngestPipeline,
    rng: StdRng,
    connector: Arc<C>,
    stats_interval: Duration,
    pending: Option<PendingConnect>,
    ticker: Option<Interval>,
    last_error: Option<ConnectError>,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Snapshot>,
}

impl VpnService<SimulatedConnector> {
    /// Start the service with the simulated connector
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &ServiceConfig) -> Result<VpnHandle, ConfigError> {
        let connector = SimulatedConnector::new(config.connect_delay());
        Self::spawn_with(config, connector)
    }
}

impl<C: Connector> VpnService<C> {
    /// Start the service with a custom connector
    pub fn spawn_with(config: &ServiceConfig, connector: C) -> Result<VpnHandle, ConfigError> {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let catalog = config.catalog()?;
        let settings = SettingsStore::new(config.settings);
        let initial = Snapshot {
            connection: ConnectionState::Disconnected,
            traffic: TrafficCounters::default(),
            elapsed: Duration::ZERO,
            servers: catalog.shared(),
            selected: catalog.selected().clone(),
            settings: settings.snapshot(),
            last_error: None,
        };
        let (snap_tx, snap_rx) = watch::channel(initial);

        let service = Self {
            machine: ConnectionMachine::new(),
            catalog,
            settings,
            stats: StatsSimulator::new(StdRng::from_entropy()),
            pipeline: IngestPipeline::new(),
            rng: StdRng::from_entropy(),
            connector: Arc::new(connector),
            stats_interval: config.stats_interval(),
            pending: None,
            ticker: None,
            last_error: None,
            commands: cmd_rx,
            snapshots: snap_tx,
        };

        tokio::spawn(service.run());

        Ok(VpnHandle {
            commands: cmd_tx,
            snapshots: snap_rx,
        })
    }

    async fn run(mut self) {
        info!(
            "VPN service started ({} servers, default {})",
            self.catalog.len(),
            self.catalog.selected().id
        );

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                result = wait_connect(&mut self.pending) => self.on_connect_finished(result),
                _ = next_tick(&mut self.ticker) => self.on_tick(),
            }
        }

        // Cancel both timers before the state goes away
        self.pending = None;
        self.ticker = None;
        info!("VPN service stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Toggle { reply } => {
                let _ = reply.send(self.toggle());
            }
            Command::Select { id, reply } => {
                let _ = reply.send(self.select(&id));
            }
            Command::Ingest { text, reply } => {
                let _ = reply.send(self.ingest(&text));
            }
            Command::SetSetting { change, reply } => {
                let settings = self.settings.apply(change);
                self.publish();
                let _ = reply.send(settings);
            }
            Command::Shutdown => {}
        }
    }

    fn toggle(&mut self) -> ToggleOutcome {
        let outcome = match self.machine.toggle(Instant::now()) {
            Transition::BeginConnect => {
                self.last_error = None;
                self.start_connect();
                ToggleOutcome::Connecting
            }
            Transition::Disconnected => {
                self.end_session();
                ToggleOutcome::Disconnected
            }
            _ => ToggleOutcome::Ignored,
        };

        self.publish();
        outcome
    }

    fn start_connect(&mut self) {
        let server = self.catalog.selected().clone();
        info!("Connecting to {} ({})", server.id, server);

        let server_id = server.id.clone();
        let handle = tokio::spawn(self.connector.connect(server));
        self.pending = Some(PendingConnect { server_id, handle });
    }

    fn on_connect_finished(&mut self, result: Result<(), ConnectError>) {
        let server_id = self
            .pending
            .take()
            .map(|p| p.server_id.clone())
            .unwrap_or_default();

        match self.machine.complete(result, Instant::now()) {
            Transition::Connected { at } => {
                info!("Session started on {}", server_id);
                self.start_session(at);
            }
            Transition::ConnectFailed(e) => {
                warn!("Connect to {} failed: {}", server_id, e);
                self.last_error = Some(e);
            }
            _ => {}
        }

        self.publish();
    }

    fn start_session(&mut self, at: Instant) {
        self.stats.reset();

        let mut ticker = tokio::time::interval_at(at + self.stats_interval, self.stats_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    fn end_session(&mut self) {
        self.ticker = None;
        self.pending = None;
        self.stats.reset();
        info!("Session closed");
    }

    fn on_tick(&mut self) {
        if !self.machine.state().is_connected() {
            self.ticker = None;
            return;
        }

        let counters = self.stats.tick();
        debug!(
            "Traffic tick: down {:.1} Mbit/s, up {:.1} Mbit/s",
            counters.download_rate, counters.upload_rate
        );
        self.publish();
    }

    fn select(&mut self, id: &str) -> Result<Server, SelectError> {
        if !self.machine.state().is_disconnected() {
            debug!("Server change to {} rejected: session active", id);
            return Err(SelectError::SessionActive);
        }

        let server = self
            .catalog
            .select(id)
            .map_err(|_| SelectError::UnknownServer(id.to_string()))?
            .clone();

        self.publish();
        Ok(server)
    }

    fn ingest(&mut self, text: &str) -> Result<IngestReceipt, IngestError> {
        let id = self.catalog.next_generated_id();
        let server = self.pipeline.ingest(text, id, &mut self.rng)?;
        self.catalog.append(server.clone())?;

        let selected = self.machine.state().is_disconnected();
        if selected {
            self.catalog.select(&server.id)?;
        } else {
            debug!("Added {} without selecting it: session active", server.id);
        }

        self.publish();
        Ok(IngestReceipt { server, selected })
    }

    fn snapshot(&self) -> Snapshot {
        let connection = self.machine.state();
        Snapshot {
            connection,
            traffic: self.stats.counters(),
            elapsed: connection.elapsed(Instant::now()),
            servers: self.catalog.shared(),
            selected: self.catalog.selected().clone(),
            settings: self.settings.snapshot(),
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

async fn wait_connect(pending: &mut Option<PendingConnect>) -> Result<(), ConnectError> {
    match pending {
        Some(p) => match (&mut p.handle).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ConnectError::Aborted),
            Err(e) => Err(ConnectError::Failed(e.to_string())),
        },
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Command interface to a running [`VpnService`]
#[derive(Debug, Clone)]
pub struct VpnHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl VpnHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Press the connect button
    pub async fn toggle_connection(&self) -> Result<ToggleOutcome, ServiceError> {
        self.request(|reply| Command::Toggle { reply }).await
    }

    /// Change the selected server; only allowed while disconnected
    pub async fn select_server(&self, id: &str) -> Result<Server, ServiceError> {
        let id = id.to_string();
        Ok(self.request(|reply| Command::Select { id, reply }).await??)
    }

    /// Add a server from scanned or typed text
    pub async fn ingest_server_data(&self, text: &str) -> Result<IngestReceipt, ServiceError> {
        let text = text.to_string();
        Ok(self.request(|reply| Command::Ingest { text, reply }).await??)
    }

    /// Apply a typed settings change
    pub async fn set_setting(&self, change: SettingChange) -> Result<Arc<Settings>, ServiceError> {
        self.request(|reply| Command::SetSetting { change, reply })
            .await
    }

    /// Apply a string-keyed settings change
    pub async fn set_setting_str(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Arc<Settings>, ServiceError> {
        let change = SettingChange::parse(key, value)?;
        self.set_setting(change).await
    }

    /// Latest published state
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Stop the service; pending timers are cancelled
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Toggle { .. } => write!(f, "Toggle"),
            Command::Select { id, .. } => write!(f, "Select({})", id),
            Command::Ingest { .. } => write!(f, "Ingest"),
            Command::SetSetting { change, .. } => write!(f, "SetSetting({:?})", change),
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}

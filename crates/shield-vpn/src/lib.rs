//! ShieldVPN - Simulated VPN Client Core
//!
//! State behind a cosmetic VPN client: a connect button, a traffic ticker,
//! a server list, local settings and a QR scanner that turns JSON or URL
//! text into new servers. Nothing here touches the network: connecting is a
//! timer and traffic numbers are random.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Presentation layer                      │
//! │   toggle / select / ingest / set          watch<Snapshot> │
//! └───────────┬──────────────────────────────────────▲───────┘
//!             │ VpnHandle (mpsc)                     │
//!             ▼                                      │
//! ┌──────────────────────────────────────────────────┴───────┐
//! │                  VpnService (one task)                    │
//! │                                                           │
//! │  ConnectionMachine ── Connector (2 s simulated connect)   │
//! │  StatsSimulator ───── 1 s ticker while connected          │
//! │  ServerCatalog ◀───── IngestPipeline ◀── ScanSession      │
//! │  SettingsStore                                            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Single owner**: all state is mutated by one task, no locks
//! - **Cancellable timers**: leaving a state drops its timers
//! - **Pluggable connect step**: [`Connector`] can fail, the simulation never does
//! - **Parser chain**: JSON payloads, then `scheme://host` links

mod config;
mod connection;
mod ingest;
mod scanner;
mod server;
mod service;
mod settings;
mod stats;

pub use config::{ConfigError, ServiceConfig};
pub use connection::{
    ConnectError, ConnectFuture, ConnectionMachine, ConnectionState, Connector,
    SimulatedConnector, Transition, DEFAULT_CONNECT_DELAY,
};
pub use ingest::{
    IngestError, IngestPipeline, JsonPayloadParser, ParseOutcome, SchemeUrlParser, ServerDraft,
    ServerParser, CUSTOM_COUNTRY,
};
pub use scanner::{
    CameraFacing, Notice, QrDecoder, ScanConfig, ScanError, ScanMode, ScanOutcome, ScanSession,
    UnavailableDecoder,
};
pub use server::{
    default_servers, CatalogError, LoadTier, PingTier, Server, ServerCatalog, PLACEHOLDER_FLAG,
};
pub use service::{
    IngestReceipt, SelectError, ServiceError, Snapshot, ToggleOutcome, VpnHandle, VpnService,
};
pub use settings::{
    DnsChoice, Protocol, SettingChange, SettingKey, Settings, SettingsError, SettingsStore,
};
pub use stats::{format_elapsed, format_rate, format_traffic, StatsSimulator, TrafficCounters};

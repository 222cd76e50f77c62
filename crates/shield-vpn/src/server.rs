//! Server Catalog
//!
//! Holds the ordered list of selectable VPN servers and the current
//! selection. Servers are display data only: there is no endpoint behind
//! them.
//!
//! # Built-in Servers
//!
//! | Id | Country | City | Ping |
//! |------|---------|------|------|
//! | nl-1 | Netherlands | Amsterdam | 24 ms |
//! | de-1 | Germany | Frankfurt | 31 ms |
//! | fi-1 | Finland | Helsinki | 18 ms |
//! | us-1 | USA | New York | 95 ms |
//! | jp-1 | Japan | Tokyo | 142 ms |
//! | sg-1 | Singapore | Singapore | 168 ms |
//! | gb-1 | United Kingdom | London | 42 ms |
//! | ca-1 | Canada | Toronto | 108 ms |
//! | ch-1 | Switzerland | Zurich | 35 ms |
//! | au-1 | Australia | Sydney | 195 ms |
//!
//! Entries are appended (QR ingestion) but never removed or mutated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Glyph used when a server comes without a flag
pub const PLACEHOLDER_FLAG: &str = "🌐";

/// Prefix for ids generated for ingested servers
const GENERATED_ID_PREFIX: &str = "qr";

/// A selectable VPN endpoint descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Unique identifier
    pub id: String,
    /// Country display name
    pub country: String,
    /// City display name
    pub city: String,
    /// Flag glyph
    pub flag: String,
    /// Simulated latency (ms)
    pub ping: u32,
    /// Simulated load (percent, 0-100)
    pub load: u8,
}

impl Server {
    /// Create a new server entry
    pub fn new(
        id: impl Into<String>,
        country: impl Into<String>,
        city: impl Into<String>,
        flag: impl Into<String>,
        ping: u32,
        load: u8,
    ) -> Self {
        Self {
            id: id.into(),
            country: country.into(),
            city: city.into(),
            flag: flag.into(),
            ping,
            load,
        }
    }

    /// Ping display tier
    pub fn ping_tier(&self) -> PingTier {
        PingTier::from_ms(self.ping)
    }

    /// Load display tier
    pub fn load_tier(&self) -> LoadTier {
        LoadTier::from_percent(self.load)
    }

    /// Check field constraints
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.id.trim().is_empty() {
            return Err(CatalogError::EmptyId);
        }
        if self.load > 100 {
            return Err(CatalogError::InvalidLoad {
                id: self.id.clone(),
                load: self.load,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}, {}", self.flag, self.country, self.city)
    }
}

/// Latency bucket used for colouring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingTier {
    /// Under 50 ms
    Good,
    /// Under 100 ms
    Fair,
    /// 100 ms and above
    Poor,
}

impl PingTier {
    pub fn from_ms(ping: u32) -> Self {
        match ping {
            0..50 => PingTier::Good,
            50..100 => PingTier::Fair,
            _ => PingTier::Poor,
        }
    }
}

/// Load bucket used for the load bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTier {
    /// Under 40 %
    Low,
    /// Under 70 %
    Medium,
    /// 70 % and above
    High,
}

impl LoadTier {
    pub fn from_percent(load: u8) -> Self {
        match load {
            0..40 => LoadTier::Low,
            40..70 => LoadTier::Medium,
            _ => LoadTier::High,
        }
    }
}

/// Ordered server list with a current selection
///
/// The server list sits behind an `Arc` so snapshots can share it; appending
/// clones the list only when a snapshot still holds the old one.
#[derive(Debug, Clone)]
pub struct ServerCatalog {
    servers: Arc<Vec<Server>>,
    selected: usize,
}

impl ServerCatalog {
    /// Create a catalog from a non-empty list of servers
    ///
    /// The first entry becomes the selection.
    pub fn new(servers: Vec<Server>) -> Result<Self, CatalogError> {
        if servers.is_empty() {
            return Err(CatalogError::Empty);
        }

        for (i, server) in servers.iter().enumerate() {
            server.validate()?;
            if servers[..i].iter().any(|s| s.id == server.id) {
                return Err(CatalogError::DuplicateId(server.id.clone()));
            }
        }

        Ok(Self {
            servers: Arc::new(servers),
            selected: 0,
        })
    }

    /// Catalog with the built-in server list
    pub fn builtin() -> Self {
        Self {
            servers: Arc::new(default_servers()),
            selected: 0,
        }
    }

    /// All servers in display order
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    /// Shared handle to the server list (for snapshots)
    pub fn shared(&self) -> Arc<Vec<Server>> {
        Arc::clone(&self.servers)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Find server by id
    pub fn get(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// Currently selected server
    pub fn selected(&self) -> &Server {
        &self.servers[self.selected]
    }

    /// Select a server by id
    ///
    /// Whether selection is allowed at all (no active session) is decided by
    /// the caller.
    pub fn select(&mut self, id: &str) -> Result<&Server, CatalogError> {
        let index = self
            .servers
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| CatalogError::UnknownServer(id.to_string()))?;

        self.selected = index;
        debug!("Selected server {}", id);
        Ok(&self.servers[index])
    }

    /// Append a server at the end of the list
    pub fn append(&mut self, server: Server) -> Result<(), CatalogError> {
        server.validate()?;
        if self.get(&server.id).is_some() {
            return Err(CatalogError::DuplicateId(server.id));
        }

        info!("Added server {} ({})", server.id, server);
        Arc::make_mut(&mut self.servers).push(server);
        Ok(())
    }

    /// Next free id for an ingested server (`qr-1`, `qr-2`, ...)
    pub fn next_generated_id(&self) -> String {
        (1..)
            .map(|n| format!("{}-{}", GENERATED_ID_PREFIX, n))
            .find(|id| self.get(id).is_none())
            .unwrap_or_else(|| GENERATED_ID_PREFIX.to_string())
    }
}

impl Default for ServerCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Built-in server list
pub fn default_servers() -> Vec<Server> {
    vec![
        Server::new("nl-1", "Нидерланды", "Амстердам", "🇳🇱", 24, 35),
        Server::new("de-1", "Германия", "Франкфурт", "🇩🇪", 31, 42),
        Server::new("fi-1", "Финляндия", "Хельсинки", "🇫🇮", 18, 28),
        Server::new("us-1", "США", "Нью-Йорк", "🇺🇸", 95, 61),
        Server::new("jp-1", "Япония", "Токио", "🇯🇵", 142, 38),
        Server::new("sg-1", "Сингапур", "Сингапур", "🇸🇬", 168, 22),
        Server::new("gb-1", "Великобритания", "Лондон", "🇬🇧", 42, 55),
        Server::new("ca-1", "Канада", "Торонто", "🇨🇦", 108, 31),
        Server::new("ch-1", "Швейцария", "Цюрих", "🇨🇭", 35, 19),
        Server::new("au-1", "Австралия", "Сидней", "🇦🇺", 195, 27),
    ]
}

/// Catalog errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Server catalog cannot be empty")]
    Empty,

    #[error("Server id cannot be empty")]
    EmptyId,

    #[error("Duplicate server id: {0}")]
    DuplicateId(String),

    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("Invalid load {load}% for server {id} (0-100)")]
    InvalidLoad { id: String, load: u8 },
}

//! User Settings
//!
//! Local-only preferences. None of them change how a connection behaves.
//! The store never edits a field in place: every change builds a new
//! [`Settings`] value and swaps the shared pointer, so readers holding an
//! older snapshot keep a consistent view.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Tunnel protocol preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "wireguard")]
    WireGuard,
    #[serde(rename = "openvpn-udp")]
    OpenVpnUdp,
    #[serde(rename = "openvpn-tcp")]
    OpenVpnTcp,
    #[serde(rename = "ikev2")]
    Ikev2,
}

impl Protocol {
    /// All protocols in display order
    pub fn all() -> &'static [Protocol] {
        &[
            Protocol::WireGuard,
            Protocol::OpenVpnUdp,
            Protocol::OpenVpnTcp,
            Protocol::Ikev2,
        ]
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::WireGuard => "WireGuard",
            Protocol::OpenVpnUdp => "OpenVPN (UDP)",
            Protocol::OpenVpnTcp => "OpenVPN (TCP)",
            Protocol::Ikev2 => "IKEv2",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Protocol {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wireguard" | "wg" => Ok(Protocol::WireGuard),
            "openvpn-udp" | "openvpn_udp" | "openvpn (udp)" => Ok(Protocol::OpenVpnUdp),
            "openvpn-tcp" | "openvpn_tcp" | "openvpn (tcp)" => Ok(Protocol::OpenVpnTcp),
            "ikev2" => Ok(Protocol::Ikev2),
            _ => Err(SettingsError::InvalidValue {
                key: SettingKey::Protocol,
                value: s.to_string(),
            }),
        }
    }
}

/// DNS resolver preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsChoice {
    #[default]
    Automatic,
    Cloudflare,
    Google,
    AdGuard,
}

impl DnsChoice {
    /// All choices in display order
    pub fn all() -> &'static [DnsChoice] {
        &[
            DnsChoice::Automatic,
            DnsChoice::Cloudflare,
            DnsChoice::Google,
            DnsChoice::AdGuard,
        ]
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            DnsChoice::Automatic => "Automatic",
            DnsChoice::Cloudflare => "Cloudflare (1.1.1.1)",
            DnsChoice::Google => "Google (8.8.8.8)",
            DnsChoice::AdGuard => "AdGuard",
        }
    }

    /// Resolver address, `None` for the system default
    pub fn resolver(&self) -> Option<IpAddr> {
        match self {
            DnsChoice::Automatic => None,
            DnsChoice::Cloudflare => Some(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))),
            DnsChoice::Google => Some(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))),
            DnsChoice::AdGuard => Some(IpAddr::V4(Ipv4Addr::new(94, 140, 14, 14))),
        }
    }
}

impl fmt::Display for DnsChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DnsChoice {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "automatic" | "auto" => Ok(DnsChoice::Automatic),
            "cloudflare" => Ok(DnsChoice::Cloudflare),
            "google" => Ok(DnsChoice::Google),
            "adguard" => Ok(DnsChoice::AdGuard),
            _ => Err(SettingsError::InvalidValue {
                key: SettingKey::Dns,
                value: s.to_string(),
            }),
        }
    }
}

/// Complete settings value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub protocol: Protocol,
    /// Connect on app start
    pub auto_connect: bool,
    /// Block traffic without VPN
    pub kill_switch: bool,
    pub dns: DnsChoice,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protocol: Protocol::WireGuard,
            auto_connect: false,
            kill_switch: true,
            dns: DnsChoice::Automatic,
        }
    }
}

impl Settings {
    /// Copy with one change applied
    pub fn with(self, change: SettingChange) -> Self {
        match change {
            SettingChange::Protocol(protocol) => Self { protocol, ..self },
            SettingChange::AutoConnect(auto_connect) => Self { auto_connect, ..self },
            SettingChange::KillSwitch(kill_switch) => Self { kill_switch, ..self },
            SettingChange::Dns(dns) => Self { dns, ..self },
        }
    }
}

/// Setting names accepted by string-keyed updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Protocol,
    AutoConnect,
    KillSwitch,
    Dns,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Protocol => "protocol",
            SettingKey::AutoConnect => "auto_connect",
            SettingKey::KillSwitch => "kill_switch",
            SettingKey::Dns => "dns",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "protocol" => Ok(SettingKey::Protocol),
            "auto_connect" | "autoconnect" => Ok(SettingKey::AutoConnect),
            "kill_switch" | "killswitch" => Ok(SettingKey::KillSwitch),
            "dns" => Ok(SettingKey::Dns),
            _ => Err(SettingsError::UnknownKey(s.to_string())),
        }
    }
}

/// A single typed settings update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    Protocol(Protocol),
    AutoConnect(bool),
    KillSwitch(bool),
    Dns(DnsChoice),
}

impl SettingChange {
    /// Build a change from a key/value pair
    pub fn parse(key: &str, value: &str) -> Result<Self, SettingsError> {
        let key: SettingKey = key.parse()?;
        let value = value.trim();

        let parse_bool = |v: &str| match v.to_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(true),
            "false" | "off" | "no" | "0" => Ok(false),
            _ => Err(SettingsError::InvalidValue {
                key,
                value: v.to_string(),
            }),
        };

        Ok(match key {
            SettingKey::Protocol => SettingChange::Protocol(value.parse()?),
            SettingKey::AutoConnect => SettingChange::AutoConnect(parse_bool(value)?),
            SettingKey::KillSwitch => SettingChange::KillSwitch(parse_bool(value)?),
            SettingKey::Dns => SettingChange::Dns(value.parse()?),
        })
    }

    pub fn key(&self) -> SettingKey {
        match self {
            SettingChange::Protocol(_) => SettingKey::Protocol,
            SettingChange::AutoConnect(_) => SettingKey::AutoConnect,
            SettingChange::KillSwitch(_) => SettingKey::KillSwitch,
            SettingChange::Dns(_) => SettingKey::Dns,
        }
    }
}

/// In-memory settings holder
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    current: Arc<Settings>,
}

impl SettingsStore {
    pub fn new(initial: Settings) -> Self {
        Self {
            current: Arc::new(initial),
        }
    }

    /// Shared pointer to the current value
    pub fn snapshot(&self) -> Arc<Settings> {
        Arc::clone(&self.current)
    }

    /// Current value
    pub fn get(&self) -> Settings {
        *self.current
    }

    /// Replace the stored value with one that has `change` applied
    pub fn apply(&mut self, change: SettingChange) -> Arc<Settings> {
        let next = self.current.with(change);
        if next != *self.current {
            info!("Setting {} changed", change.key());
            self.current = Arc::new(next);
        }
        self.snapshot()
    }

    /// String-keyed update
    pub fn set(&mut self, key: &str, value: &str) -> Result<Arc<Settings>, SettingsError> {
        let change = SettingChange::parse(key, value)?;
        Ok(self.apply(change))
    }
}

/// Settings errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Unknown setting: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: SettingKey, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.protocol, Protocol::WireGuard);
        assert!(!settings.auto_connect);
        assert!(settings.kill_switch);
        assert_eq!(settings.dns, DnsChoice::Automatic);
    }

    #[test]
    fn test_apply_replaces_value() {
        let mut store = SettingsStore::default();
        let before = store.snapshot();

        let after = store.apply(SettingChange::Protocol(Protocol::Ikev2));

        assert_eq!(before.protocol, Protocol::WireGuard);
        assert_eq!(after.protocol, Protocol::Ikev2);
        assert!(!Arc::ptr_eq(&before, &after));
        // Other fields untouched
        assert_eq!(after.kill_switch, before.kill_switch);
        assert_eq!(after.dns, before.dns);
    }

    #[test]
    fn test_noop_change_keeps_pointer() {
        let mut store = SettingsStore::default();
        let before = store.snapshot();

        let after = store.apply(SettingChange::KillSwitch(true));

        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_string_keyed_set() {
        let mut store = SettingsStore::default();

        store.set("dns", "cloudflare").unwrap();
        store.set("auto-connect", "on").unwrap();
        store.set("kill_switch", "false").unwrap();
        store.set("protocol", "openvpn-tcp").unwrap();

        let s = store.get();
        assert_eq!(s.dns, DnsChoice::Cloudflare);
        assert!(s.auto_connect);
        assert!(!s.kill_switch);
        assert_eq!(s.protocol, Protocol::OpenVpnTcp);
    }

    #[test]
    fn test_invalid_updates() {
        let mut store = SettingsStore::default();

        assert_eq!(
            store.set("theme", "dark"),
            Err(SettingsError::UnknownKey("theme".into()))
        );
        assert!(matches!(
            store.set("dns", "quad9"),
            Err(SettingsError::InvalidValue { key: SettingKey::Dns, .. })
        ));
        assert!(matches!(
            store.set("kill_switch", "maybe"),
            Err(SettingsError::InvalidValue { key: SettingKey::KillSwitch, .. })
        ));
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn test_dns_resolvers() {
        assert_eq!(DnsChoice::Automatic.resolver(), None);
        assert_eq!(
            DnsChoice::Google.resolver(),
            Some(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)))
        );
        assert_eq!(Protocol::OpenVpnUdp.label(), "OpenVPN (UDP)");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert!(json.contains("\"wireguard\""));

        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Settings::default());
    }
}

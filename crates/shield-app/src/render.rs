//! Text rendering of service snapshots.

use shield_vpn::{
    format_rate, format_traffic, ConnectionState, DnsChoice, LoadTier, PingTier, Protocol,
    Server, Settings, Snapshot,
};
use std::fmt::Write;

/// Status line under the connect button
pub fn headline(snap: &Snapshot) -> String {
    match snap.connection {
        ConnectionState::Connected { .. } => format!("Connected to {}", snap.selected.country),
        ConnectionState::Connecting { .. } => "Establishing connection...".to_string(),
        ConnectionState::Disconnected => match &snap.last_error {
            Some(e) => format!("Connection failed: {}", e),
            None => "Press toggle to connect".to_string(),
        },
    }
}

/// Connect button caption
pub fn button_label(state: &ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected { .. } => "PROTECTED",
        ConnectionState::Connecting { .. } => "CONNECTING...",
        ConnectionState::Disconnected => "CONNECT",
    }
}

pub fn status(snap: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {}", button_label(&snap.connection), headline(snap));
    let _ = writeln!(out, "Server: {}", server_line(&snap.selected, true, false));

    if snap.connection.is_connected() {
        let t = &snap.traffic;
        let _ = writeln!(out, "Session: {}", snap.elapsed_display());
        let _ = writeln!(
            out,
            "Download: {} ({})",
            format_rate(t.download_rate),
            format_traffic(t.download_total)
        );
        let _ = writeln!(
            out,
            "Upload:   {} ({})",
            format_rate(t.upload_rate),
            format_traffic(t.upload_total)
        );
    }
    out
}

fn ping_marker(tier: PingTier) -> &'static str {
    match tier {
        PingTier::Good => "+",
        PingTier::Fair => "~",
        PingTier::Poor => "-",
    }
}

fn load_bar(load: u8, tier: LoadTier) -> String {
    let filled = (load as usize).div_ceil(10).min(10);
    let fill = match tier {
        LoadTier::Low => '=',
        LoadTier::Medium => '#',
        LoadTier::High => '!',
    };
    format!(
        "[{}{}] {:>3}%",
        fill.to_string().repeat(filled),
        " ".repeat(10 - filled),
        load
    )
}

fn server_line(server: &Server, selected: bool, locked: bool) -> String {
    let mark = if selected {
        "*"
    } else if locked {
        "x"
    } else {
        " "
    };
    format!(
        "{} {:<6} {} {}, {}  {}  {}{} ms",
        mark,
        server.id,
        server.flag,
        server.country,
        server.city,
        load_bar(server.load, server.load_tier()),
        ping_marker(server.ping_tier()),
        server.ping
    )
}

/// Server list; non-selected rows are marked locked during a session
pub fn servers(snap: &Snapshot) -> String {
    let locked = !snap.connection.is_disconnected();
    let mut out = String::new();
    for server in snap.servers.iter() {
        let selected = server.id == snap.selected.id;
        let _ = writeln!(out, "{}", server_line(server, selected, locked && !selected));
    }
    out
}

fn toggle(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

pub fn settings(settings: &Settings) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Protocol:");
    for p in Protocol::all() {
        let mark = if *p == settings.protocol { "*" } else { " " };
        let _ = writeln!(out, "  {} {}", mark, p);
    }
    let _ = writeln!(out, "Auto-connect: {}", toggle(settings.auto_connect));
    let _ = writeln!(out, "Kill switch:  {}", toggle(settings.kill_switch));
    let _ = writeln!(out, "DNS:");
    for d in DnsChoice::all() {
        let mark = if *d == settings.dns { "*" } else { " " };
        let _ = writeln!(out, "  {} {}", mark, d);
    }
    out
}

pub const HELP: &str = "\
Commands:
  status              connection state and traffic
  servers             server list
  toggle              connect / disconnect
  select <id>         choose a server (only while disconnected)
  add <text>          add a server from JSON or a link
  scan                open the QR scanner
  settings            show settings
  set <key> <value>   protocol | auto_connect | kill_switch | dns
  quit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_bar() {
        assert_eq!(load_bar(35, LoadTier::Low), "[====      ]  35%");
        assert_eq!(load_bar(100, LoadTier::High), "[!!!!!!!!!!] 100%");
        assert_eq!(load_bar(0, LoadTier::Low), "[          ]   0%");
    }

    #[test]
    fn test_settings_render() {
        let text = settings(&Settings::default());
        assert!(text.contains("* WireGuard"));
        assert!(text.contains("Kill switch:  on"));
        assert!(text.contains("* Automatic"));
    }
}

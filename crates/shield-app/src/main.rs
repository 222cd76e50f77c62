//! ShieldVPN: headless client
//!
//! Main entry point. Initializes the global allocator, sets up logging,
//! starts the VPN service and runs a line-based front end on stdin.

mod render;

use anyhow::{Context, Result};
use shield_vpn::{
    ScanConfig, ScanOutcome, ScanSession, ServiceConfig, ServiceError, UnavailableDecoder,
    VpnHandle, VpnService,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Environment variable naming a config file
const CONFIG_ENV: &str = "SHIELD_CONFIG";

fn load_config() -> Result<ServiceConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from);

    match path {
        Some(path) => {
            let config = ServiceConfig::from_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(ServiceConfig::default()),
    }
}

/// Print connection state changes as they happen
fn spawn_state_printer(vpn: &VpnHandle) {
    let mut rx = vpn.subscribe();
    tokio::spawn(async move {
        let mut last = rx.borrow().connection.label();
        while rx.changed().await.is_ok() {
            let snap = rx.borrow_and_update().clone();
            if snap.connection.label() != last {
                last = snap.connection.label();
                println!("* {}", render::headline(&snap));
            }
        }
    });
}

async fn run_scan(vpn: &VpnHandle, lines: &mut Lines<BufReader<Stdin>>) -> Result<()> {
    let mut session = ScanSession::open(UnavailableDecoder, ScanConfig::default());
    if let Some(notice) = session.notice() {
        println!("{}", notice.message());
    }

    loop {
        println!("Paste a link or JSON server data (empty line to cancel):");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            break;
        }

        match session.submit(vpn, &line).await? {
            ScanOutcome::Dismiss(receipt) => {
                println!("Added {} ({})", receipt.server.id, receipt.server);
                if !receipt.selected {
                    println!("Disconnect to switch to the new server");
                }
                break;
            }
            ScanOutcome::Retry(e) => {
                println!("{}", e);
                session.clear_error();
            }
        }
    }

    session.close();
    Ok(())
}

/// Print user-facing errors, propagate the rest
fn report<T>(result: Result<T, ServiceError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ServiceError::Closed) => Err(ServiceError::Closed.into()),
        Err(e) => {
            println!("{}", e);
            Ok(None)
        }
    }
}

async fn run(vpn: VpnHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", render::HELP);
    print!("{}", render::status(&vpn.snapshot()));

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        match cmd {
            "" => {}
            "status" => print!("{}", render::status(&vpn.snapshot())),
            "servers" => print!("{}", render::servers(&vpn.snapshot())),
            "toggle" => {
                let outcome = vpn.toggle_connection().await?;
                info!("Toggle: {:?}", outcome);
            }
            "select" => {
                if let Some(server) = report(vpn.select_server(arg).await)? {
                    println!("Selected {}", server);
                }
            }
            "add" => {
                if let Some(receipt) = report(vpn.ingest_server_data(arg).await)? {
                    println!("Added {} ({})", receipt.server.id, receipt.server);
                }
            }
            "scan" => run_scan(&vpn, &mut lines).await?,
            "settings" => print!("{}", render::settings(&vpn.snapshot().settings)),
            "set" => {
                let (key, value) = arg.split_once(' ').unwrap_or((arg, ""));
                if let Some(settings) = report(vpn.set_setting_str(key, value).await)? {
                    print!("{}", render::settings(&settings));
                }
            }
            "help" => println!("{}", render::HELP),
            "quit" | "exit" => break,
            other => println!("Unknown command: {} (try help)", other),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("ShieldVPN starting...");
    info!("Using mimalloc allocator");

    let config = load_config()?;
    let vpn = VpnService::spawn(&config)?;
    spawn_state_printer(&vpn);

    let result = run(vpn.clone()).await;

    vpn.shutdown().await;
    info!("ShieldVPN shutting down");
    result
}

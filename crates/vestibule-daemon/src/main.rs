//! Vestibule Daemon -- headless check-in backend for appliances.
//!
//! Usage:
//!
//!   vestibule-daemon [OPTIONS]
//!
//! Options:
//!
//!   --config <PATH>    Load config from JSON file
//!   --bind <ADDR>      Listen address (default: 0.0.0.0)
//!   --port <PORT>      Listen port (default: 4750)
//!   --timeout <MS>     Per-read timeout in milliseconds (default: 5000)
//!   --admins <PATH>    JSON array of admin identities
//!   --pubkey <PATH>    JSON file with the anonymous kiosk public key
//!
//! The daemon runs until the process is terminated. Kiosks connect as
//! client id 0 with the configured public key; administrators connect
//! under their directory id.

use std::sync::Arc;

use vestibule_crypto::selfcheck;
use vestibule_directory::MemoryDirectory;
use vestibule_server::handlers::{PingHandler, StatusHandler, ENDPOINT_PING, ENDPOINT_STATUS};
use vestibule_server::{HandlerRegistry, Listener, ServerContext};
use vestibule_types::PublicKeySpec;

mod config;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    // Tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    print_banner();

    // Parse CLI arguments.
    let cli = config::CliArgs::parse_from_env();

    // Load or merge config file if provided.
    let daemon_config = match &cli.config_path {
        Some(path) => match config::DaemonConfig::load(path) {
            Ok(cfg) => cfg.merge_cli(&cli),
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => config::DaemonConfig::from_cli(&cli),
    };

    // Run the daemon.
    if let Err(e) = run_daemon(daemon_config, &cli) {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Daemon main logic
// ---------------------------------------------------------------------------

fn run_daemon(mut cfg: config::DaemonConfig, cli: &config::CliArgs) -> Result<(), String> {
    // -----------------------------------------------------------------------
    // 1. Anonymous kiosk key
    // -----------------------------------------------------------------------

    if let Some(path) = &cli.pubkey_file {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read pubkey file '{}': {e}", path.display()))?;
        let spec: PublicKeySpec = serde_json::from_str(&raw)
            .map_err(|e| format!("failed to parse pubkey file '{}': {e}", path.display()))?;
        cfg.server.applogin_pubk = spec;
    }

    // -----------------------------------------------------------------------
    // 2. Principal directory
    // -----------------------------------------------------------------------

    let directory = match &cfg.admins_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read admins file '{}': {e}", path.display()))?;
            let directory = MemoryDirectory::from_json(&raw)
                .map_err(|e| format!("failed to load admins: {e}"))?;
            tracing::info!(path = %path.display(), "admin directory seeded");
            directory
        }
        None => {
            tracing::warn!("no admins file configured; only anonymous kiosks can connect");
            MemoryDirectory::new()
        }
    };

    // -----------------------------------------------------------------------
    // 3. Handler registry
    // -----------------------------------------------------------------------

    let mut registry = HandlerRegistry::new();
    registry
        .register(ENDPOINT_PING, Box::new(PingHandler))
        .map_err(|e| format!("failed to register ping handler: {e}"))?;
    registry
        .register(ENDPOINT_STATUS, Box::new(StatusHandler::new()))
        .map_err(|e| format!("failed to register status handler: {e}"))?;

    tracing::info!(endpoints = registry.len(), "handler registry built");

    // -----------------------------------------------------------------------
    // 4. Runtime context and crypto self-check
    // -----------------------------------------------------------------------

    let context = ServerContext::new(cfg.server.clone(), Arc::new(directory), registry)
        .map_err(|e| format!("invalid configuration: {e}"))?;

    selfcheck::startup_self_check(context.anon_key())
        .map_err(|e| format!("crypto self-check failed: {e}"))?;
    tracing::info!("crypto self-check passed");

    // -----------------------------------------------------------------------
    // 5. Listen
    // -----------------------------------------------------------------------

    let listener =
        Listener::bind(Arc::new(context)).map_err(|e| format!("failed to bind listener: {e}"))?;

    println!();
    println!("============================================================");
    println!("  Vestibule Daemon running");
    println!("============================================================");
    println!("  Listen:       {}", listener.local_addr());
    println!("  Read timeout: {} ms", cfg.server.connection_timeout_ms);
    println!("============================================================");
    println!();

    listener.run().map_err(|e| format!("listener failed: {e}"))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_banner() {
    println!(
        r#"
 __     __        _   _ _           _
 \ \   / /__  ___| |_(_) |__  _   _| | ___
  \ \ / / _ \/ __| __| | '_ \| | | | |/ _ \
   \ V /  __/\__ \ |_| | |_) | |_| | |  __/
    \_/ \___||___/\__|_|_.__/ \__,_|_|\___|
                                daemon v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}

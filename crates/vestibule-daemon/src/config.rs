//! CLI argument parsing and config file support.
//!
//! The daemon can be configured via CLI flags, a JSON config file, or
//! a combination of both (CLI overrides config file).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use vestibule_types::config::ServerConfig;

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing, no clap dependency)
// ---------------------------------------------------------------------------

/// Parsed command-line arguments.
pub struct CliArgs {
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub admins_file: Option<PathBuf>,
    pub pubkey_file: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

impl CliArgs {
    /// Parses CLI arguments from `std::env::args`.
    pub fn parse_from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut cli = Self {
            bind_addr: None,
            port: None,
            timeout_ms: None,
            admins_file: None,
            pubkey_file: None,
            config_path: None,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--bind" => {
                    i += 1;
                    cli.bind_addr = args.get(i).cloned();
                }
                "--port" => {
                    i += 1;
                    cli.port = args.get(i).and_then(|s| s.parse().ok());
                }
                "--timeout" => {
                    i += 1;
                    cli.timeout_ms = args.get(i).and_then(|s| s.parse().ok());
                }
                "--admins" => {
                    i += 1;
                    cli.admins_file = args.get(i).map(PathBuf::from);
                }
                "--pubkey" => {
                    i += 1;
                    cli.pubkey_file = args.get(i).map(PathBuf::from);
                }
                "--config" => {
                    i += 1;
                    cli.config_path = args.get(i).map(PathBuf::from);
                }
                other => {
                    eprintln!("warning: ignoring unknown argument '{other}'");
                }
            }
            i += 1;
        }

        cli
    }
}

// ---------------------------------------------------------------------------
// Daemon config
// ---------------------------------------------------------------------------

/// Full daemon configuration: the transport config plus the seed file
/// for the in-memory directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Transport-core settings, flattened into the top level of the
    /// JSON file.
    #[serde(flatten)]
    pub server: ServerConfig,

    /// Path to a JSON array of admin identities seeding the in-memory
    /// directory. Absent means no administrators can connect.
    #[serde(default)]
    pub admins_file: Option<PathBuf>,
}

impl DaemonConfig {
    /// Loads a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
        serde_json::from_str(&raw)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display()))
    }

    /// Builds a config purely from CLI flags and defaults.
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self {
            server: ServerConfig::default(),
            admins_file: None,
        }
        .merge_cli(cli)
    }

    /// Applies CLI overrides on top of this config.
    pub fn merge_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(bind_addr) = &cli.bind_addr {
            self.server.bind_addr = bind_addr.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            self.server.connection_timeout_ms = timeout_ms;
        }
        if let Some(admins_file) = &cli.admins_file {
            self.admins_file = Some(admins_file.clone());
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn no_cli() -> CliArgs {
        CliArgs {
            bind_addr: None,
            port: None,
            timeout_ms: None,
            admins_file: None,
            pubkey_file: None,
            config_path: None,
        }
    }

    #[test]
    fn cli_overrides_win() {
        let cli = CliArgs {
            bind_addr: Some("127.0.0.1".into()),
            port: Some(9100),
            timeout_ms: Some(750),
            admins_file: Some(PathBuf::from("/etc/vestibule/admins.json")),
            pubkey_file: None,
            config_path: None,
        };

        let config = DaemonConfig::from_cli(&cli);
        assert_eq!(config.server.bind_addr, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.connection_timeout_ms, 750);
        assert!(config.admins_file.is_some());
    }

    #[test]
    fn defaults_without_cli() {
        let config = DaemonConfig::from_cli(&no_cli());
        assert_eq!(config.server.port, 4750);
        assert!(config.admins_file.is_none());
    }

    #[test]
    fn config_file_shape_parses() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"{
            "bind_addr": "0.0.0.0",
            "port": 4750,
            "connection_timeout": 3000,
            "applogin_pubK": { "modulus": "bW9k", "exponent": "AQAB" },
            "admins_file": "admins.json"
        }"#;
        let config: DaemonConfig = serde_json::from_str(json)?;
        assert_eq!(config.server.connection_timeout_ms, 3000);
        assert_eq!(config.server.applogin_pubk.exponent, "AQAB");
        assert_eq!(config.admins_file, Some(PathBuf::from("admins.json")));
        Ok(())
    }
}

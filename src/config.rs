// src/config.rs

//! Command-line configuration for the server.

use clap::Parser;
use std::path::PathBuf;

use crate::core::CitrineError;

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_DIR: &str = "/tmp/redis-files";
pub const DEFAULT_DBFILENAME: &str = "db.rdb";

/// Raw command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "citrine", version, about = "In-memory key/value server")]
pub struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Run as a replica of the given primary. Accepts either a single
    /// quoted "<host> <port>" argument or two separate arguments.
    #[arg(long, num_args = 1..=2, value_name = "HOST [PORT]")]
    pub replicaof: Option<Vec<String>>,

    /// Directory holding the snapshot file.
    #[arg(long, default_value = DEFAULT_DIR)]
    pub dir: String,

    /// Snapshot file name inside `--dir`.
    #[arg(long, default_value = DEFAULT_DBFILENAME)]
    pub dbfilename: String,
}

/// Validated server configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub dir: String,
    pub dbfilename: String,
    /// `Some((host, port))` when this node runs as a replica.
    pub replica_of: Option<(String, u16)>,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, CitrineError> {
        let replica_of = match cli.replicaof {
            Some(parts) => Some(parse_replicaof(&parts)?),
            None => None,
        };
        Ok(Config {
            port: cli.port,
            dir: cli.dir,
            dbfilename: cli.dbfilename,
            replica_of,
        })
    }

    /// Full path of the optional startup snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.dbfilename)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            dir: DEFAULT_DIR.to_string(),
            dbfilename: DEFAULT_DBFILENAME.to_string(),
            replica_of: None,
        }
    }
}

/// Parses the `--replicaof` value: either `["host", "port"]` or a single
/// `"host port"` string.
fn parse_replicaof(parts: &[String]) -> Result<(String, u16), CitrineError> {
    let (host, port_str) = match parts {
        [host, port] => (host.clone(), port.as_str()),
        [combined] => {
            let mut it = combined.split_whitespace();
            match (it.next(), it.next(), it.next()) {
                (Some(host), Some(port), None) => (host.to_string(), port),
                _ => {
                    return Err(CitrineError::InvalidState(format!(
                        "invalid --replicaof value '{combined}', expected \"<host> <port>\""
                    )));
                }
            }
        }
        _ => {
            return Err(CitrineError::InvalidState(
                "invalid --replicaof value".into(),
            ));
        }
    };
    let port = port_str.parse::<u16>().map_err(|_| {
        CitrineError::InvalidState(format!("invalid --replicaof port '{port_str}'"))
    })?;
    Ok((host, port))
}

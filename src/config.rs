//! Command-line and environment configuration for both binaries.

use crate::protocol::types::{DEFAULT_MAX_HEADER_LEN, DEFAULT_MAX_MANIFEST_LEN, Verb};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_STORAGE_DIR: &str = "Pi-Share";
pub const DEFAULT_SECONDARY_PORT: u16 = 8080;

/// Per-connection resource bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Longest request line, newline included.
    pub max_header_len: usize,
    /// Largest ADD_SERVER file list.
    pub max_manifest_len: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_len: DEFAULT_MAX_HEADER_LEN,
            max_manifest_len: DEFAULT_MAX_MANIFEST_LEN,
        }
    }
}

/// pishare server - serves and shards files over TCP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Port to listen on
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "PISHARE_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Directory holding this node's files
    #[arg(long, env = "PISHARE_STORAGE_DIR", default_value = DEFAULT_STORAGE_DIR)]
    pub storage_dir: PathBuf,

    /// Longest accepted request line in bytes, newline included
    #[arg(long, env = "PISHARE_MAX_HEADER_LEN", default_value_t = DEFAULT_MAX_HEADER_LEN)]
    pub max_header_len: usize,

    /// Largest accepted ADD_SERVER file list in bytes
    #[arg(long, env = "PISHARE_MAX_MANIFEST_LEN", default_value_t = DEFAULT_MAX_MANIFEST_LEN)]
    pub max_manifest_len: u64,

    /// Register with this primary (host:port) as a secondary node before serving
    #[arg(long, env = "PISHARE_JOIN")]
    pub join: Option<String>,

    /// Address announced to the primary when joining (detected if omitted)
    #[arg(long, env = "PISHARE_ADVERTISE", requires = "join")]
    pub advertise: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PISHARE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ServerArgs {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_header_len: self.max_header_len,
            max_manifest_len: self.max_manifest_len,
        }
    }
}

/// pishare client - GET, PUT, DELETE and LIST files on a pishare server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ClientArgs {
    /// Server to contact, as host:port
    pub target: String,

    /// GET, PUT, DELETE, LIST or ADD_SERVER (case-insensitive)
    pub verb: Verb,

    /// Remote file name (GET/PUT/DELETE), or the advertised port (ADD_SERVER)
    pub remote: Option<String>,

    /// Local file path (GET/PUT)
    pub local: Option<PathBuf>,

    /// Directory whose files are announced by ADD_SERVER
    #[arg(long, env = "PISHARE_STORAGE_DIR", default_value = DEFAULT_STORAGE_DIR)]
    pub storage_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PISHARE_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

/// A validated client invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Get { remote: String, local: PathBuf },
    Put { remote: String, local: PathBuf },
    Delete { remote: String },
    List,
    AddServer { port: u16 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("{0} needs a remote file name and a local path")]
    MissingPaths(Verb),
    #[error("DELETE needs a remote file name")]
    MissingRemote,
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("target must be host:port, got {0}")]
    InvalidTarget(String),
}

impl ClientArgs {
    pub fn command(&self) -> Result<ClientCommand, UsageError> {
        match self.target.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(UsageError::InvalidTarget(self.target.clone())),
        }

        match self.verb {
            Verb::Get | Verb::Put => {
                let (Some(remote), Some(local)) = (&self.remote, &self.local) else {
                    return Err(UsageError::MissingPaths(self.verb));
                };
                let (remote, local) = (remote.clone(), local.clone());
                Ok(if self.verb == Verb::Get {
                    ClientCommand::Get { remote, local }
                } else {
                    ClientCommand::Put { remote, local }
                })
            }
            Verb::Delete => match &self.remote {
                Some(remote) => Ok(ClientCommand::Delete {
                    remote: remote.clone(),
                }),
                None => Err(UsageError::MissingRemote),
            },
            Verb::List => Ok(ClientCommand::List),
            Verb::AddServer => {
                let port = match &self.remote {
                    Some(text) => text
                        .parse()
                        .map_err(|_| UsageError::InvalidPort(text.clone()))?,
                    None => DEFAULT_SECONDARY_PORT,
                };
                Ok(ClientCommand::AddServer { port })
            }
        }
    }
}

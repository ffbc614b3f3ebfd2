use crate::protocol::types::REDIRECT_SENTINEL;

use std::fmt;

/// A secondary node that has opted in to hold files.
///
/// Created from an ADD_SERVER announcement and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerNode {
    pub address: String,
    pub port: u16,
}

impl ServerNode {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Parses the `"<ip> <port>"` argument of an ADD_SERVER request line.
    ///
    /// The redirect sentinel address is refused: a node announced under it
    /// would be indistinguishable from "stay here" on the wire.
    pub fn parse_announcement(text: &str) -> Option<Self> {
        let (address, port) = text.split_once(' ')?;
        if address.is_empty() || address == REDIRECT_SENTINEL || port.contains(' ') {
            return None;
        }
        Some(Self::new(address, port.parse().ok()?))
    }

    /// `host:port` form suitable for `TcpStream::connect`.
    pub fn connect_addr(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl fmt::Display for ServerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.port)
    }
}

/// Where a PUT should be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Local,
    Redirect(ServerNode),
}

/// Accepts plain file names only: no separators, no NUL, not `.` or `..`.
pub fn is_valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

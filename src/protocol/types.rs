use crate::storage::types::ServerNode;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const OK_HEADER: &[u8] = b"OK\n";
pub const ERROR_HEADER: &[u8] = b"ERROR\n";

/// Address sent in a redirect pair when the request is served on the current connection.
pub const REDIRECT_SENTINEL: &str = "0.0.0.0";
/// Port paired with [`REDIRECT_SENTINEL`].
pub const REDIRECT_SENTINEL_PORT: &str = "0";

/// Width of every binary length field.
pub const SIZE_FIELD_LEN: usize = std::mem::size_of::<u64>();

/// Longest accepted request line, newline included.
pub const DEFAULT_MAX_HEADER_LEN: usize = 1024;
/// Longest accepted ADD_SERVER file list.
pub const DEFAULT_MAX_MANIFEST_LEN: u64 = 16 * 1024 * 1024;

/// The operation requested on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Put,
    Delete,
    List,
    AddServer,
}

impl Verb {
    pub const ALL: [Verb; 5] = [
        Verb::Get,
        Verb::Put,
        Verb::List,
        Verb::Delete,
        Verb::AddServer,
    ];

    /// The exact bytes that open a request line for this verb.
    ///
    /// `LIST` carries no path, so its newline is part of the prefix.
    pub fn prefix(self) -> &'static [u8] {
        match self {
            Verb::Get => b"GET ",
            Verb::Put => b"PUT ",
            Verb::Delete => b"DELETE ",
            Verb::List => b"LIST\n",
            Verb::AddServer => b"ADD_SERVER ",
        }
    }

    pub fn takes_path(self) -> bool {
        !matches!(self, Verb::List)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::List => "LIST",
            Verb::AddServer => "ADD_SERVER",
        }
    }

    /// Builds the full request line, e.g. `GET a.txt\n`.
    pub fn request_line(self, path: &str) -> Vec<u8> {
        let mut line = self.prefix().to_vec();
        if self.takes_path() {
            line.extend_from_slice(path.as_bytes());
            line.push(b'\n');
        }
        line
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown verb: {0}")]
pub struct UnknownVerb(pub String);

impl FromStr for Verb {
    type Err = UnknownVerb;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Verb::Get),
            "PUT" => Ok(Verb::Put),
            "DELETE" => Ok(Verb::Delete),
            "LIST" => Ok(Verb::List),
            "ADD_SERVER" => Ok(Verb::AddServer),
            _ => Err(UnknownVerb(s.to_string())),
        }
    }
}

/// Per-connection protocol failures.
///
/// None of these are fatal to the server: the connection receives `ERROR\n`
/// plus [`ProtocolError::wire_message`] and is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The request line did not start with a known verb, or its arguments were unusable.
    #[error("invalid verb")]
    InvalidVerb,
    /// GET or DELETE of a name nobody holds, or a name that is not a plain filename.
    #[error("invalid file")]
    InvalidFile,
    /// Declared and transferred byte counts disagree, or the path line was malformed.
    #[error("incorrect data amount")]
    IncorrectDataAmount,
}

impl ProtocolError {
    pub fn wire_message(self) -> &'static str {
        match self {
            ProtocolError::InvalidVerb => "Bad request\n",
            ProtocolError::InvalidFile => "No such file\n",
            ProtocolError::IncorrectDataAmount => "Bad file size\n",
        }
    }
}

/// First thing the server says on every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseHeader {
    Ok,
    Error(String),
}

/// Where a GET or PUT continues after the server answered `OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Served on the current connection (the `0.0.0.0` sentinel).
    Here,
    /// Reconnect to this node and resend the same request.
    Node(ServerNode),
}

impl RedirectTarget {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RedirectTarget::Here => {
                format!("{}\n{}\n", REDIRECT_SENTINEL, REDIRECT_SENTINEL_PORT).into_bytes()
            }
            RedirectTarget::Node(node) => format!("{}\n{}\n", node.address, node.port).into_bytes(),
        }
    }

    /// Interprets the two redirect lines, newlines already stripped.
    ///
    /// The sentinel address is recognised before the port is looked at, so it
    /// can never turn into a connectable node.
    pub fn from_lines(address: &str, port: &str) -> Option<Self> {
        if address == REDIRECT_SENTINEL {
            return Some(RedirectTarget::Here);
        }
        if address.is_empty() {
            return None;
        }
        let port = port.parse().ok()?;
        Some(RedirectTarget::Node(ServerNode::new(address, port)))
    }
}

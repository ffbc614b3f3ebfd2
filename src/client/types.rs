use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered `ERROR`; carries its message verbatim.
    #[error("server error: {}", .0.trim_end())]
    Server(String),

    #[error("too little data: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("too much data: {extra} byte(s) past the declared size")]
    Overrun { extra: u64 },

    #[error("redirected more than once")]
    TooManyRedirects,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Byte accounting for one GET or PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub declared: u64,
    pub transferred: u64,
    /// Bytes that kept arriving after the declared payload.
    pub extra: u64,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.transferred == self.declared && self.extra == 0
    }

    /// Truncation takes precedence over overrun.
    pub fn check(&self) -> Result<(), ClientError> {
        if self.transferred < self.declared {
            return Err(ClientError::Truncated {
                expected: self.declared,
                received: self.transferred,
            });
        }
        if self.extra > 0 {
            return Err(ClientError::Overrun { extra: self.extra });
        }
        Ok(())
    }
}

/// A LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub body: String,
    pub extra: u64,
}

impl Listing {
    pub fn names(&self) -> Vec<&str> {
        self.body.split('\n').filter(|name| !name.is_empty()).collect()
    }
}

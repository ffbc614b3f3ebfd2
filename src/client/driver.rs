use super::types::{ClientError, Listing, TransferReport};
use crate::protocol::codec;
use crate::protocol::types::{RedirectTarget, ResponseHeader, Verb};
use crate::storage::types::ServerNode;

use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Redirect hops a GET or PUT may take before giving up.
pub const MAX_REDIRECTS: usize = 1;

/// How long to wait for stray bytes after a payload has been fully read.
const DRAIN_GRACE: Duration = Duration::from_millis(50);
const DRAIN_CHUNK: usize = 8 * 1024;

/// One request per connection against a fixed entry point.
pub struct Client {
    target: String,
}

impl Client {
    /// `target` is a `host:port` string.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Downloads `remote` into `local`.
    ///
    /// A short or overlong transfer is still returned as `Ok`; see
    /// [`TransferReport::check`].
    pub async fn get(&self, remote: &str, local: &Path) -> Result<TransferReport, ClientError> {
        let mut stream = self.negotiate(Verb::Get, remote).await?;
        let declared = codec::read_size(&mut stream)
            .await
            .ok_or_else(|| ClientError::Malformed("missing size field".to_string()))?;

        let mut file = File::create(local).await?;
        let transferred = tokio::io::copy(&mut (&mut stream).take(declared), &mut file).await?;
        file.flush().await?;

        let extra = if transferred == declared {
            drain_extra(&mut stream).await
        } else {
            0
        };

        info!("GET {} -> {} ({} of {} bytes)", remote, local.display(), transferred, declared);
        Ok(TransferReport {
            declared,
            transferred,
            extra,
        })
    }

    /// Uploads `local` as `remote`, waiting for the server's completion header.
    pub async fn put(&self, remote: &str, local: &Path) -> Result<TransferReport, ClientError> {
        let mut file = File::open(local).await?;
        let declared = file.metadata().await?.len();

        let mut stream = self.negotiate(Verb::Put, remote).await?;
        codec::write_size(&mut stream, declared).await?;
        let transferred = tokio::io::copy(&mut (&mut file).take(declared), &mut stream).await?;
        stream.shutdown().await?;

        expect_ok(&mut stream).await?;
        info!("PUT {} -> {} ({} bytes)", local.display(), remote, transferred);
        Ok(TransferReport {
            declared,
            transferred,
            extra: 0,
        })
    }

    pub async fn delete(&self, remote: &str) -> Result<(), ClientError> {
        let mut stream = self.send(Verb::Delete, remote, &self.target).await?;
        expect_ok(&mut stream).await?;
        info!("DELETE {}", remote);
        Ok(())
    }

    /// Fetches the listing; a body shorter than its declared size is an error.
    pub async fn list(&self) -> Result<Listing, ClientError> {
        let mut stream = self.send(Verb::List, "", &self.target).await?;
        expect_ok(&mut stream).await?;

        let declared = codec::read_size(&mut stream)
            .await
            .ok_or_else(|| ClientError::Malformed("missing size field".to_string()))?;
        let mut body = Vec::new();
        (&mut stream).take(declared).read_to_end(&mut body).await?;
        if (body.len() as u64) < declared {
            return Err(ClientError::Truncated {
                expected: declared,
                received: body.len() as u64,
            });
        }

        let extra = drain_extra(&mut stream).await;
        Ok(Listing {
            body: String::from_utf8_lossy(&body).into_owned(),
            extra,
        })
    }

    /// Registers `node` with the server as the owner of `files`.
    pub async fn add_server(&self, node: &ServerNode, files: &[String]) -> Result<(), ClientError> {
        let manifest = files.join("\n");
        let announcement = format!("{} {}", node.address, node.port);

        let mut stream = TcpStream::connect(&self.target).await?;
        codec::write_request(&mut stream, Verb::AddServer, &announcement).await?;
        codec::write_size(&mut stream, manifest.len() as u64).await?;
        stream.write_all(manifest.as_bytes()).await?;
        stream.shutdown().await?;

        expect_ok(&mut stream).await?;
        info!("Registered {} with {} ({} file(s))", node, self.target, files.len());
        Ok(())
    }

    /// Connects, writes the request line and half-closes when nothing else follows it.
    async fn send(&self, verb: Verb, path: &str, addr: &str) -> Result<TcpStream, ClientError> {
        let mut stream = TcpStream::connect(addr).await?;
        codec::write_request(&mut stream, verb, path).await?;
        if verb != Verb::Put {
            stream.shutdown().await?;
        }
        Ok(stream)
    }

    /// Sends a GET or PUT request line and follows redirects until a node serves it.
    ///
    /// Returns the stream positioned right after the `0.0.0.0` redirect pair.
    async fn negotiate(&self, verb: Verb, remote: &str) -> Result<TcpStream, ClientError> {
        let mut addr = self.target.clone();

        for _ in 0..=MAX_REDIRECTS {
            let mut stream = self.send(verb, remote, &addr).await?;
            expect_ok(&mut stream).await?;

            match codec::read_redirect(&mut stream).await {
                Ok(RedirectTarget::Here) => return Ok(stream),
                Ok(RedirectTarget::Node(node)) => {
                    debug!("{} {} redirected to {}", verb, remote, node);
                    addr = node.connect_addr();
                }
                Err(e) => return Err(ClientError::Malformed(format!("redirect: {}", e))),
            }
        }

        Err(ClientError::TooManyRedirects)
    }
}

async fn expect_ok(stream: &mut TcpStream) -> Result<(), ClientError> {
    match codec::read_header(stream).await? {
        ResponseHeader::Ok => Ok(()),
        ResponseHeader::Error(message) => Err(ClientError::Server(message)),
    }
}

/// Counts bytes the server sent past the declared payload.
///
/// Stops at EOF, on any read error, or when nothing arrives within `DRAIN_GRACE`.
async fn drain_extra(stream: &mut TcpStream) -> u64 {
    let mut buf = vec![0u8; DRAIN_CHUNK];
    let mut extra = 0u64;
    loop {
        match tokio::time::timeout(DRAIN_GRACE, stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => extra += n as u64,
        }
    }
    extra
}

use super::connection::Connection;
use super::context::ServerContext;
use super::types::Phase;
use crate::protocol::codec;

use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;
/// How long unread request bytes are drained after the response is sent.
const LINGER: Duration = Duration::from_millis(100);

/// Accept loop: one task per connection, all sharing one `ServerContext`.
pub struct FileServer {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl FileServer {
    pub async fn bind(addr: SocketAddr, ctx: Arc<ServerContext>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to listen on {}", addr))?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `ServerContext::shutdown` is called.
    ///
    /// Connections still open at that point are aborted. Accept failures are fatal.
    pub async fn run(self) -> Result<()> {
        let mut shutdown = self.ctx.shutdown_signal();
        let mut live = JoinSet::new();

        info!(
            "Serving {} file(s) from {} on {}",
            self.ctx.files.len(),
            self.ctx.files.root().display(),
            self.local_addr()?
        );

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.context("accept failed")?;
                    let conn = Connection::new();
                    let span = tracing::info_span!("conn", id = %conn.id(), %peer);
                    live.spawn(serve_connection(stream, conn, self.ctx.clone()).instrument(span));
                }
                Some(joined) = live.join_next(), if !live.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Connection task failed: {}", e);
                    }
                }
            }
        }

        info!("Shutting down; aborting {} open connection(s)", live.len());
        live.shutdown().await;
        Ok(())
    }
}

/// Drives one accepted socket until its connection reaches a terminal phase.
pub async fn serve_connection(stream: TcpStream, mut conn: Connection, ctx: Arc<ServerContext>) {
    debug!("Accepted");
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_CHUNK];

    let result: io::Result<Phase> = async {
        loop {
            let n = reader.read(&mut buf).await?;
            let phase = if n == 0 {
                conn.finish_input(&ctx).await
            } else {
                conn.advance(&buf[..n], &ctx, &mut writer).await?
            };
            if phase.is_terminal() {
                return Ok(phase);
            }
        }
    }
    .await;

    match result {
        Ok(phase) => {
            if let Some(error) = phase.error()
                && let Err(e) = codec::write_error(&mut writer, error).await
            {
                debug!("Could not deliver error response: {}", e);
            }
            match conn.verb() {
                Some(verb) => debug!(
                    "{} closed in {:?} after {} byte(s)",
                    verb,
                    phase,
                    conn.bytes_received()
                ),
                None => debug!("Closed in {:?} after {} byte(s)", phase, conn.bytes_received()),
            }
        }
        Err(e) => {
            conn.abandon(&ctx).await;
            debug!("Connection dropped: {}", e);
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown failed: {}", e);
    }

    // Closing with unread input would reset the socket and could discard the response.
    let drain = async {
        while let Ok(n) = reader.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    };
    if tokio::time::timeout(LINGER, drain).await.is_err() {
        debug!("Peer still sending after {:?}; closing", LINGER);
    }
}

//! Verb Handlers
//!
//! `begin` runs once the request line is complete. GET, DELETE and LIST write
//! their whole response right there; PUT (when stored locally) and ADD_SERVER
//! hand back a `Transfer` that keeps consuming payload bytes across reads.

use super::context::ServerContext;
use crate::protocol::codec;
use crate::protocol::parser::{ExactBytes, Progress, SizeField};
use crate::protocol::types::{ProtocolError, RedirectTarget, ResponseHeader, Verb};
use crate::storage::types::{Placement, ServerNode, is_valid_file_name};

use std::io;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Result of starting a verb.
pub enum Outcome {
    Finished,
    Failed(ProtocolError),
    Continue(Transfer),
}

/// Result of feeding more bytes to a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Pending,
    Finished,
    Failed(ProtocolError),
}

pub async fn begin<W>(verb: Verb, path: &str, ctx: &ServerContext, out: &mut W) -> io::Result<Outcome>
where
    W: AsyncWrite + Unpin,
{
    match verb {
        Verb::Get => handle_get(path, ctx, out).await,
        Verb::Put => handle_put(path, ctx, out).await,
        Verb::Delete => handle_delete(path, ctx, out).await,
        Verb::List => handle_list(ctx, out).await,
        Verb::AddServer => Ok(handle_add_server(path)),
    }
}

async fn handle_get<W>(name: &str, ctx: &ServerContext, out: &mut W) -> io::Result<Outcome>
where
    W: AsyncWrite + Unpin,
{
    if !is_valid_file_name(name) {
        return Ok(Outcome::Failed(ProtocolError::InvalidFile));
    }

    if !ctx.files.contains(name) {
        return match ctx.shards.owner_of(name) {
            Some(node) => {
                info!("GET {} redirected to {}", name, node);
                send_redirect(out, RedirectTarget::Node(node)).await?;
                Ok(Outcome::Finished)
            }
            None => Ok(Outcome::Failed(ProtocolError::InvalidFile)),
        };
    }

    let file = match File::open(ctx.files.path_of(name)).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("{} is listed but missing on disk", name);
            return Ok(Outcome::Failed(ProtocolError::InvalidFile));
        }
        Err(e) => return Err(e),
    };
    let size = file.metadata().await?.len();

    codec::write_header(out, &ResponseHeader::Ok).await?;
    codec::write_redirect(out, &RedirectTarget::Here).await?;
    codec::write_size(out, size).await?;

    let mut body = file.take(size);
    let sent = tokio::io::copy(&mut body, out).await?;
    out.flush().await?;

    if sent < size {
        // The size is already on the wire; the client sees a short transfer.
        warn!("{} shrank while being sent ({} of {} bytes)", name, sent, size);
    } else {
        info!("GET {} served ({} bytes)", name, size);
    }
    Ok(Outcome::Finished)
}

async fn handle_put<W>(name: &str, ctx: &ServerContext, out: &mut W) -> io::Result<Outcome>
where
    W: AsyncWrite + Unpin,
{
    if !is_valid_file_name(name) {
        return Ok(Outcome::Failed(ProtocolError::InvalidFile));
    }

    match ctx.shards.route_put(name, ctx.files.contains(name)).await {
        Placement::Redirect(node) => {
            info!("PUT {} redirected to {}", name, node);
            send_redirect(out, RedirectTarget::Node(node)).await?;
            Ok(Outcome::Finished)
        }
        Placement::Local => {
            let path = ctx.files.path_of(name);
            let file = match File::create(&path).await {
                Ok(file) => file,
                Err(e) => {
                    warn!("Cannot create {}: {}", path.display(), e);
                    return Ok(Outcome::Failed(ProtocolError::InvalidFile));
                }
            };
            ctx.files.add(name);

            send_redirect(out, RedirectTarget::Here).await?;
            debug!("PUT {} accepted locally", name);
            Ok(Outcome::Continue(Transfer::Upload(Upload {
                name: name.to_string(),
                path,
                file,
                size: SizeField::new(),
                expected: None,
                bytes_transferred: 0,
            })))
        }
    }
}

async fn handle_delete<W>(name: &str, ctx: &ServerContext, out: &mut W) -> io::Result<Outcome>
where
    W: AsyncWrite + Unpin,
{
    if !is_valid_file_name(name) || !ctx.files.contains(name) {
        return Ok(Outcome::Failed(ProtocolError::InvalidFile));
    }

    if !ctx.files.delete(name).await? {
        // Lost a race with another DELETE of the same name.
        return Ok(Outcome::Failed(ProtocolError::InvalidFile));
    }

    codec::write_header(out, &ResponseHeader::Ok).await?;
    out.flush().await?;
    info!("Deleted {}", name);
    Ok(Outcome::Finished)
}

async fn handle_list<W>(ctx: &ServerContext, out: &mut W) -> io::Result<Outcome>
where
    W: AsyncWrite + Unpin,
{
    let listing = list_names(ctx);
    let body = listing.join("\n");

    codec::write_header(out, &ResponseHeader::Ok).await?;
    codec::write_size(out, body.len() as u64).await?;
    out.write_all(body.as_bytes()).await?;
    out.flush().await?;

    debug!("LIST returned {} name(s)", listing.len());
    Ok(Outcome::Finished)
}

/// Every name the cluster knows about: local files plus names pinned to other nodes, sorted.
pub fn list_names(ctx: &ServerContext) -> Vec<String> {
    let mut names = ctx.files.list_all();
    names.extend(
        ctx.shards
            .owned_names()
            .into_iter()
            .filter(|name| !ctx.files.contains(name)),
    );
    names.sort();
    names
}

fn handle_add_server(announcement: &str) -> Outcome {
    match ServerNode::parse_announcement(announcement) {
        Some(node) => {
            debug!("ADD_SERVER from {}", node);
            Outcome::Continue(Transfer::Manifest(Manifest {
                node,
                size: SizeField::new(),
                body: None,
            }))
        }
        None => {
            warn!("Malformed ADD_SERVER announcement {:?}", announcement);
            Outcome::Failed(ProtocolError::InvalidVerb)
        }
    }
}

async fn send_redirect<W>(out: &mut W, target: RedirectTarget) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    codec::write_header(out, &ResponseHeader::Ok).await?;
    codec::write_redirect(out, &target).await?;
    out.flush().await
}

/// Payload phase of a verb that outlives its request line.
pub enum Transfer {
    Upload(Upload),
    Manifest(Manifest),
}

impl Transfer {
    pub async fn advance<W>(
        &mut self,
        input: &mut &[u8],
        ctx: &ServerContext,
        out: &mut W,
    ) -> io::Result<Step>
    where
        W: AsyncWrite + Unpin,
    {
        match self {
            Transfer::Upload(upload) => upload.advance(input, out).await,
            Transfer::Manifest(manifest) => manifest.advance(input, ctx, out).await,
        }
    }

    /// Undoes whatever a transfer that will never finish left behind.
    pub async fn abandon(self, ctx: &ServerContext) {
        match self {
            Transfer::Upload(upload) => upload.abandon(ctx).await,
            Transfer::Manifest(manifest) => {
                debug!("Dropped incomplete file list from {}", manifest.node);
            }
        }
    }
}

/// A PUT being written to local disk.
pub struct Upload {
    name: String,
    path: PathBuf,
    file: File,
    size: SizeField,
    expected: Option<u64>,
    bytes_transferred: u64,
}

impl Upload {
    async fn advance<W>(&mut self, input: &mut &[u8], out: &mut W) -> io::Result<Step>
    where
        W: AsyncWrite + Unpin,
    {
        let expected = match self.expected {
            Some(expected) => expected,
            None => match self.size.advance(input) {
                Progress::Pending => return Ok(Step::Pending),
                Progress::Failed(e) => return Ok(Step::Failed(e)),
                Progress::Complete(expected) => {
                    debug!("PUT {} declares {} bytes", self.name, expected);
                    self.expected = Some(expected);
                    expected
                }
            },
        };

        let remaining = expected - self.bytes_transferred;
        let take = (input.len() as u64).min(remaining) as usize;
        if take > 0 {
            self.file.write_all(&input[..take]).await?;
            self.bytes_transferred += take as u64;
            *input = &input[take..];
        }
        if self.bytes_transferred < expected {
            return Ok(Step::Pending);
        }

        self.file.flush().await?;
        codec::write_header(out, &ResponseHeader::Ok).await?;
        out.flush().await?;
        info!("Stored {} ({} bytes)", self.name, expected);
        Ok(Step::Finished)
    }

    async fn abandon(self, ctx: &ServerContext) {
        let Upload {
            name,
            path,
            file,
            bytes_transferred,
            ..
        } = self;
        drop(file);

        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("Failed to remove partial upload {}: {}", path.display(), e);
        }
        // Creating the file already truncated any previous content.
        ctx.files.remove(&name);
        warn!(
            "Discarded partial upload of {} after {} bytes",
            name, bytes_transferred
        );
    }
}

/// The file list that follows an ADD_SERVER announcement.
pub struct Manifest {
    node: ServerNode,
    size: SizeField,
    body: Option<ExactBytes>,
}

impl Manifest {
    async fn advance<W>(
        &mut self,
        input: &mut &[u8],
        ctx: &ServerContext,
        out: &mut W,
    ) -> io::Result<Step>
    where
        W: AsyncWrite + Unpin,
    {
        if self.body.is_none() {
            match self.size.advance(input) {
                Progress::Pending => return Ok(Step::Pending),
                Progress::Failed(e) => return Ok(Step::Failed(e)),
                Progress::Complete(len) if len > ctx.limits().max_manifest_len => {
                    warn!("File list from {} too large ({} bytes)", self.node, len);
                    return Ok(Step::Failed(ProtocolError::IncorrectDataAmount));
                }
                Progress::Complete(len) => self.body = Some(ExactBytes::new(len as usize)),
            }
        }
        let Some(body) = self.body.as_mut() else {
            return Ok(Step::Pending);
        };

        let bytes = match body.advance(input) {
            Progress::Pending => return Ok(Step::Pending),
            Progress::Failed(e) => return Ok(Step::Failed(e)),
            Progress::Complete(bytes) => bytes,
        };
        let Ok(text) = String::from_utf8(bytes) else {
            warn!("File list from {} is not UTF-8", self.node);
            return Ok(Step::Failed(ProtocolError::IncorrectDataAmount));
        };

        let names = parse_manifest(&text);
        ctx.shards.register_node(self.node.clone(), names).await;

        codec::write_header(out, &ResponseHeader::Ok).await?;
        out.flush().await?;
        Ok(Step::Finished)
    }
}

/// One name per line; blank lines and unusable names are skipped.
pub fn parse_manifest(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let ok = is_valid_file_name(line);
            if !ok {
                warn!("Skipping unusable name {:?} in file list", line);
            }
            ok
        })
        .map(str::to_string)
        .collect()
}

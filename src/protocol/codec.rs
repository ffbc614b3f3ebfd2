//! Stream Codec
//!
//! Async read/write helpers for frames on a connected stream. The server uses
//! the write half; the client uses both.
//!
//! `read_exact_n` never fails outright: premature EOF and peer errors both
//! show up as a count short of the requested total, which callers compare
//! against what was declared.

use super::types::{
    ERROR_HEADER, OK_HEADER, ProtocolError, RedirectTarget, ResponseHeader, SIZE_FIELD_LEN, Verb,
};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest line accepted inside a response (redirect address or port).
pub const MAX_RESPONSE_LINE: usize = 256;

pub async fn write_header<W>(writer: &mut W, header: &ResponseHeader) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match header {
        ResponseHeader::Ok => writer.write_all(OK_HEADER).await,
        ResponseHeader::Error(message) => {
            writer.write_all(ERROR_HEADER).await?;
            writer.write_all(message.as_bytes()).await
        }
    }
}

pub async fn write_error<W>(writer: &mut W, error: ProtocolError) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = ResponseHeader::Error(error.wire_message().to_string());
    write_header(writer, &header).await?;
    writer.flush().await
}

/// Reads `OK\n`, or `ERROR\n` and everything after it until the peer closes.
pub async fn read_header<R>(reader: &mut R) -> io::Result<ResponseHeader>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 6];
    if read_exact_n(reader, &mut head[..OK_HEADER.len()]).await != OK_HEADER.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before response header",
        ));
    }
    if &head[..OK_HEADER.len()] == OK_HEADER {
        return Ok(ResponseHeader::Ok);
    }

    let rest = ERROR_HEADER.len() - OK_HEADER.len();
    if read_exact_n(reader, &mut head[OK_HEADER.len()..]).await != rest || head != ERROR_HEADER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "response header is neither OK nor ERROR",
        ));
    }

    let mut message = Vec::new();
    reader.read_to_end(&mut message).await?;
    Ok(ResponseHeader::Error(
        String::from_utf8_lossy(&message).into_owned(),
    ))
}

/// Reads up to and excluding `\n`, one byte at a time so nothing past the line is consumed.
pub async fn read_line<R>(reader: &mut R, max_len: usize) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    while line.len() < max_len {
        let byte = reader.read_u8().await?;
        if byte == b'\n' {
            return String::from_utf8(line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
        }
        line.push(byte);
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("no line terminator within {} bytes", max_len),
    ))
}

/// Fills `buf` completely unless EOF or an error intervenes; returns the bytes actually read.
pub async fn read_exact_n<R>(reader: &mut R, buf: &mut [u8]) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("Read stopped after {} of {} bytes: {}", filled, buf.len(), e);
                break;
            }
        }
    }
    filled
}

pub async fn write_size<W>(writer: &mut W, size: u64) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&size.to_ne_bytes()).await
}

/// Reads the 8-byte length field; `None` if the stream ended first.
pub async fn read_size<R>(reader: &mut R) -> Option<u64>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = [0u8; SIZE_FIELD_LEN];
    if read_exact_n(reader, &mut bytes).await == SIZE_FIELD_LEN {
        Some(u64::from_ne_bytes(bytes))
    } else {
        None
    }
}

pub async fn write_redirect<W>(writer: &mut W, target: &RedirectTarget) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&target.encode()).await
}

pub async fn read_redirect<R>(reader: &mut R) -> io::Result<RedirectTarget>
where
    R: AsyncRead + Unpin,
{
    let address = read_line(reader, MAX_RESPONSE_LINE).await?;
    let port = read_line(reader, MAX_RESPONSE_LINE).await?;
    RedirectTarget::from_lines(&address, &port).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed redirect {:?} {:?}", address, port),
        )
    })
}

pub async fn write_request<W>(writer: &mut W, verb: Verb, path: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&verb.request_line(path)).await?;
    writer.flush().await
}

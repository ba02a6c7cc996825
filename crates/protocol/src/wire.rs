//! Length-prefixed framing for control messages.
//!
//! # Wire format
//!
//! ```text
//! CONTROL FRAME: [2 bytes BE: payload_len][payload_len bytes: ASCII payload]
//! ```
//!
//! Payloads are at most [`MAX_CONTROL_LEN`] bytes. Image bytes sent after
//! the handshake are not framed.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Hello, MAX_CONTROL_LEN, MetadataReply, ProtocolError};

/// Writes one control frame and flushes.
pub async fn write_control<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &str,
) -> Result<(), ProtocolError> {
    let bytes = payload.as_bytes();
    if bytes.len() > MAX_CONTROL_LEN {
        return Err(ProtocolError::FrameTooLarge(bytes.len()));
    }

    writer.write_u16(bytes.len() as u16).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one control frame.
pub async fn read_control<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, ProtocolError> {
    let len = reader.read_u16().await? as usize;
    if len > MAX_CONTROL_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf)
        .map_err(|e| ProtocolError::Malformed(format!("control message is not UTF-8: {e}")))
}

pub async fn write_hello<W: AsyncWrite + Unpin>(
    writer: &mut W,
    hello: &Hello,
) -> Result<(), ProtocolError> {
    write_control(writer, &hello.encode()).await
}

pub async fn read_hello<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Hello, ProtocolError> {
    Hello::parse(&read_control(reader).await?)
}

pub async fn write_metadata_reply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    reply: &MetadataReply,
) -> Result<(), ProtocolError> {
    write_control(writer, &reply.encode()).await
}

pub async fn read_metadata_reply<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<MetadataReply, ProtocolError> {
    MetadataReply::parse(&read_control(reader).await?)
}

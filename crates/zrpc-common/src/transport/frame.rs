use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{Result, RpcError};

/// Maximum frame payload (100 MB). Guards against allocating absurd buffers
/// from a corrupt or hostile length prefix.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Reads one length-prefixed frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Writes one length-prefixed frame. Does not flush.
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge(data.len()));
    }

    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    Ok(())
}

/// Writes one complete message, a header frame followed by a body frame, and
/// flushes. The caller serializes invocations through its send lock so the
/// two frames land contiguously on the wire.
pub async fn write_message<W>(writer: &mut W, header: &[u8], body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, header).await?;
    write_frame(writer, body).await?;
    writer.flush().await?;
    Ok(())
}

//! Message framing: the 24-byte header around every P2P payload.
//!
//! A frame is `magic (4) || command (12, NUL-padded) || length (4, LE) ||
//! checksum (4)` followed by the payload, where the checksum is the first
//! four bytes of the payload's double SHA-256.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use tern_core::codec::double_sha256;
use tern_core::constants::MAX_PAYLOAD_SIZE;
use tern_core::error::{NetworkError, WireError};

const FRAME_HEADER_LEN: usize = 24;
const COMMAND_LEN: usize = 12;

/// A frame as read off the wire: command string plus raw payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub command: String,
    pub payload: Vec<u8>,
}

/// Read one frame, verifying magic, size bound, and checksum.
pub async fn read_frame<R>(io: &mut R, magic: [u8; 4]) -> Result<Frame, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    io.read_exact(&mut header)
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;

    if header[0..4] != magic {
        return Err(WireError::BadMagic.into());
    }

    let command = std::str::from_utf8(&header[4..4 + COMMAND_LEN])
        .map_err(|_| WireError::Malformed("command"))?
        .trim_end_matches('\0')
        .to_string();

    let length = u32::from_le_bytes(header[16..20].try_into().expect("fixed slice")) as usize;
    if length > MAX_PAYLOAD_SIZE {
        return Err(WireError::OversizedPayload { size: length, max: MAX_PAYLOAD_SIZE }.into());
    }
    let checksum: [u8; 4] = header[20..24].try_into().expect("fixed slice");

    let mut payload = vec![0u8; length];
    io.read_exact(&mut payload)
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;

    if double_sha256(&payload)[..4] != checksum {
        return Err(WireError::BadChecksum(command).into());
    }

    Ok(Frame { command, payload })
}

/// Write one framed message.
pub async fn write_frame<W>(
    io: &mut W,
    magic: [u8; 4],
    command: &str,
    payload: &[u8],
) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
{
    debug_assert!(command.len() <= COMMAND_LEN);

    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0..4].copy_from_slice(&magic);
    header[4..4 + command.len()].copy_from_slice(command.as_bytes());
    header[16..20].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    header[20..24].copy_from_slice(&double_sha256(payload)[..4]);

    io.write_all(&header)
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;
    io.write_all(payload)
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;
    io.flush()
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: [u8; 4] = [0xFA, 0xBF, 0xB5, 0xDA];

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        write_frame(&mut a, MAGIC, "ping", &7u64.to_le_bytes()).await.unwrap();
        let frame = read_frame(&mut b, MAGIC).await.unwrap();
        assert_eq!(frame.command, "ping");
        assert_eq!(frame.payload, 7u64.to_le_bytes());
    }

    #[tokio::test]
    async fn empty_payload_frame() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, MAGIC, "verack", &[]).await.unwrap();
        let frame = read_frame(&mut b, MAGIC).await.unwrap();
        assert_eq!(frame.command, "verack");
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn wrong_magic_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, [0; 4], "verack", &[]).await.unwrap();
        let err = read_frame(&mut b, MAGIC).await.unwrap_err();
        assert_eq!(err, NetworkError::Wire(WireError::BadMagic));
    }

    #[tokio::test]
    async fn corrupted_checksum_rejected() {
        let (mut a, mut b) = tokio::io::duplex(4096);

        // Hand-build a frame with a zeroed checksum over a non-empty payload.
        let payload = [1u8, 2, 3];
        let mut raw = Vec::new();
        raw.extend_from_slice(&MAGIC);
        let mut cmd = [0u8; 12];
        cmd[..4].copy_from_slice(b"ping");
        raw.extend_from_slice(&cmd);
        raw.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        raw.extend_from_slice(&[0u8; 4]);
        raw.extend_from_slice(&payload);
        tokio::io::AsyncWriteExt::write_all(&mut a, &raw).await.unwrap();

        let err = read_frame(&mut b, MAGIC).await.unwrap_err();
        assert!(matches!(err, NetworkError::Wire(WireError::BadChecksum(_))));
    }

    #[tokio::test]
    async fn oversized_length_rejected_before_allocation() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let mut raw = Vec::new();
        raw.extend_from_slice(&MAGIC);
        raw.extend_from_slice(&[0u8; 12]);
        raw.extend_from_slice(&(u32::MAX).to_le_bytes());
        raw.extend_from_slice(&[0u8; 4]);
        tokio::io::AsyncWriteExt::write_all(&mut a, &raw).await.unwrap();

        let err = read_frame(&mut b, MAGIC).await.unwrap_err();
        assert!(matches!(err, NetworkError::Wire(WireError::OversizedPayload { .. })));
    }
}

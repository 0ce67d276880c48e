//! Raw whole-file transfer over a single TCP stream.
//!
//! A frame is a plaintext header followed by exactly `FILE_SIZE` raw bytes:
//!
//! ```text
//! USER_ID:<id>\n
//! FILE_SIZE:<decimal>\n
//! \n
//! <FILE_SIZE bytes>
//! ```
//!
//! There is no acknowledgement: the sender reports success once its own write finished
//! without a socket error.

use crate::config::TransferConfig;
use crate::error::{RelayError, RelayResult};
use chrono::Utc;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Upper bound on the header, delimiter included.
pub const MAX_HEADER_BYTES: usize = 1024;

const USER_ID_KEY: &str = "USER_ID";
const FILE_SIZE_KEY: &str = "FILE_SIZE";

/// Frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    /// Owner of the payload, restricted to `[A-Za-z0-9_-]`
    pub user_id: String,
    /// Exact number of payload bytes after the blank line
    pub file_size: u64,
}

impl TransferHeader {
    /// Header for a payload of `file_size` bytes.
    pub fn new(user_id: impl Into<String>, file_size: u64) -> Self {
        Self {
            user_id: user_id.into(),
            file_size,
        }
    }

    /// Wire form, blank line included.
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "{USER_ID_KEY}:{}\n{FILE_SIZE_KEY}:{}\n\n",
            self.user_id, self.file_size
        )
        .into_bytes()
    }

    /// Parses the header lines, without the trailing blank line.
    pub fn parse(text: &str) -> RelayResult<Self> {
        let mut user_id = None;
        let mut file_size = None;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| RelayError::Transfer(format!("malformed header line: {line}")))?;
            match key.trim() {
                USER_ID_KEY => user_id = Some(value.trim().to_string()),
                FILE_SIZE_KEY => {
                    let size = value.trim().parse::<u64>().map_err(|_| {
                        RelayError::Transfer(format!("invalid {FILE_SIZE_KEY}: {value}"))
                    })?;
                    file_size = Some(size);
                }
                other => debug!(key = other, "ignoring unknown transfer header"),
            }
        }

        match (user_id, file_size) {
            (Some(user_id), Some(file_size)) => Ok(Self { user_id, file_size }),
            (None, _) => Err(RelayError::Transfer(format!("missing {USER_ID_KEY}"))),
            (_, None) => Err(RelayError::Transfer(format!("missing {FILE_SIZE_KEY}"))),
        }
    }
}

/// Rejects user ids that could not round-trip through a header line.
pub fn validate_user_id(user_id: &str) -> RelayResult<()> {
    if user_id.is_empty() || sanitize_user_id(user_id) != user_id {
        return Err(RelayError::Transfer(format!(
            "user id {user_id:?} must be non-empty and use only [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

/// Writes one frame: header, then `payload` unchanged.
pub async fn write_frame<W>(writer: &mut W, user_id: &str, payload: &[u8]) -> RelayResult<()>
where
    W: AsyncWrite + Unpin,
{
    validate_user_id(user_id)?;
    let header = TransferHeader::new(user_id, payload.len() as u64);
    writer.write_all(&header.encode()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Sends the whole file at `path` to the configured receiver.
///
/// Returns the number of payload bytes written. The connect and the write together are
/// bounded by the transfer timeout.
pub async fn transfer_file(path: &Path, user_id: &str, config: &TransferConfig) -> RelayResult<u64> {
    validate_user_id(user_id)?;
    let payload = tokio::fs::read(path).await.map_err(|e| {
        RelayError::Transfer(format!("cannot read {}: {e}", path.display()))
    })?;
    let address = config.address();

    let send = async {
        let mut stream = TcpStream::connect(&address).await?;
        write_frame(&mut stream, user_id, &payload).await?;
        stream.shutdown().await?;
        Ok::<(), RelayError>(())
    };

    match timeout(config.timeout(), send).await {
        Ok(Ok(())) => {
            info!(
                user_id,
                bytes = payload.len(),
                %address,
                "file transferred: {}",
                path.display()
            );
            Ok(payload.len() as u64)
        }
        Ok(Err(e)) => Err(RelayError::Transfer(format!("send to {address} failed: {e}"))),
        Err(_) => Err(RelayError::Transfer(format!(
            "send to {address} timed out after {:?}",
            config.timeout()
        ))),
    }
}

/// Reads one frame. Payloads larger than `max_bytes` are refused before any of their
/// bytes are read.
pub async fn read_frame<R>(
    reader: &mut R,
    max_bytes: u64,
) -> RelayResult<(TransferHeader, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut header = Vec::new();

    loop {
        let remaining = MAX_HEADER_BYTES.saturating_sub(header.len());
        if remaining == 0 {
            return Err(RelayError::Transfer(format!(
                "header exceeds {MAX_HEADER_BYTES} bytes"
            )));
        }
        let mut line = Vec::new();
        let n = (&mut reader)
            .take(remaining as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            return Err(RelayError::Transfer("connection closed inside header".into()));
        }
        let blank = line == b"\n" || line == b"\r\n";
        header.extend_from_slice(&line);
        if blank {
            break;
        }
        if !line.ends_with(b"\n") && header.len() >= MAX_HEADER_BYTES {
            return Err(RelayError::Transfer(format!(
                "header exceeds {MAX_HEADER_BYTES} bytes"
            )));
        }
    }

    let text = String::from_utf8(header)
        .map_err(|_| RelayError::Transfer("header is not UTF-8".into()))?;
    let parsed = TransferHeader::parse(&text)?;
    if parsed.file_size > max_bytes {
        return Err(RelayError::Transfer(format!(
            "payload of {} bytes exceeds limit of {max_bytes}",
            parsed.file_size
        )));
    }

    let mut payload = vec![0u8; parsed.file_size as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        RelayError::Transfer(format!(
            "expected {} payload bytes: {e}",
            parsed.file_size
        ))
    })?;
    Ok((parsed, payload))
}

/// Keeps characters that are safe in a directory name.
pub fn sanitize_user_id(user_id: &str) -> String {
    user_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

/// Accepts frames and stores each payload under the inbox directory.
pub struct TransferReceiver {
    listener: TcpListener,
    inbox: PathBuf,
    max_bytes: u64,
    read_timeout: Duration,
}

impl TransferReceiver {
    /// Binds the listener and creates the inbox directory.
    pub async fn bind(
        addr: &str,
        inbox: impl Into<PathBuf>,
        max_bytes: u64,
        read_timeout: Duration,
    ) -> RelayResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let inbox = inbox.into();
        tokio::fs::create_dir_all(&inbox).await?;
        info!("Transfer receiver listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            inbox,
            max_bytes,
            read_timeout,
        })
    }

    /// Address actually bound, useful with port 0.
    pub fn local_addr(&self) -> RelayResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop; one task per connection.
    pub async fn run(self) -> RelayResult<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    let inbox = self.inbox.clone();
                    let max_bytes = self.max_bytes;
                    let read_timeout = self.read_timeout;
                    tokio::spawn(async move {
                        match Self::handle_connection(socket, &inbox, max_bytes, read_timeout)
                            .await
                        {
                            Ok(path) => info!("Stored transfer from {} at {}", addr, path.display()),
                            Err(e) => warn!("Transfer from {} rejected: {}", addr, e),
                        }
                    });
                }
                Err(e) => error!("Accept error: {}", e),
            }
        }
    }

    /// Accepts a single connection and handles it on the current task.
    pub async fn accept_one(&self) -> RelayResult<PathBuf> {
        let (socket, _) = self.listener.accept().await?;
        Self::handle_connection(socket, &self.inbox, self.max_bytes, self.read_timeout).await
    }

    /// Reads one frame from `socket` and writes its payload to a fresh file.
    pub async fn handle_connection(
        mut socket: TcpStream,
        inbox: &Path,
        max_bytes: u64,
        read_timeout: Duration,
    ) -> RelayResult<PathBuf> {
        let (header, payload) = timeout(read_timeout, read_frame(&mut socket, max_bytes))
            .await
            .map_err(|_| RelayError::Transfer(format!("read timed out after {read_timeout:?}")))??;

        let owner = sanitize_user_id(&header.user_id);
        if owner.is_empty() {
            return Err(RelayError::Transfer(format!(
                "unusable user id {:?}",
                header.user_id
            )));
        }

        let dir = inbox.join(&owner);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!(
            "{}-{}.bin",
            Utc::now().format("%Y%m%dT%H%M%S"),
            Uuid::new_v4()
        ));
        tokio::fs::write(&path, &payload).await?;
        Ok(path)
    }
}

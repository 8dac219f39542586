use crate::foundation::{BridgeError, Result};
use crate::infrastructure::signer::commands::FIELD_COMMAND;
use async_trait::async_trait;
use log::{debug, trace};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// One request/response exchange with the remote signer.
#[async_trait]
pub trait SignerConnection: Send {
    async fn exchange(&mut self, request: &Value) -> Result<Value>;
}

/// Longest reply line accepted from the remote signer.
pub const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

pub(crate) fn command_of(request: &Value) -> &str {
    request.get(FIELD_COMMAND).and_then(Value::as_str).unwrap_or("unknown")
}

/// Newline-delimited JSON over a long-lived TCP socket.
///
/// Connects lazily on the first exchange and drops the socket after any failure or cancellation,
/// so the next exchange starts from a fresh connection.
pub struct TcpJsonConnection {
    addr: String,
    socket_timeout: Duration,
    stream: Option<BufStream<TcpStream>>,
}

impl TcpJsonConnection {
    pub fn new(addr: impl Into<String>, socket_timeout: Duration) -> Self {
        Self { addr: addr.into(), socket_timeout, stream: None }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&self) -> Result<BufStream<TcpStream>> {
        debug!("connecting to remote signer addr={}", self.addr);
        let stream = timeout(self.socket_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| BridgeError::transport("connect", format!("timed out connecting to {}", self.addr)))?
            .map_err(|err| BridgeError::transport("connect", format!("{}: {}", self.addr, err)))?;
        stream.set_nodelay(true).map_err(|err| BridgeError::transport("connect", err))?;
        Ok(BufStream::new(stream))
    }

    async fn round_trip(stream: &mut BufStream<TcpStream>, socket_timeout: Duration, command: &str, payload: &[u8]) -> Result<String> {
        let write = async {
            stream.write_all(payload).await?;
            stream.write_all(b"\n").await?;
            stream.flush().await
        };
        timeout(socket_timeout, write)
            .await
            .map_err(|_| BridgeError::transport(command, "timed out writing request"))?
            .map_err(|err| BridgeError::transport(command, err))?;

        let mut line = String::new();
        let mut limited = AsyncReadExt::take(&mut *stream, MAX_RESPONSE_BYTES);
        let read = timeout(socket_timeout, limited.read_line(&mut line))
            .await
            .map_err(|_| BridgeError::transport(command, "timed out waiting for response"))?
            .map_err(|err| BridgeError::transport(command, err))?;
        if read == 0 {
            return Err(BridgeError::transport(command, "connection closed by remote signer"));
        }
        if !line.ends_with('\n') {
            return Err(BridgeError::protocol_violation(command, format!("response exceeds {} bytes", MAX_RESPONSE_BYTES)));
        }
        Ok(line)
    }
}

#[async_trait]
impl SignerConnection for TcpJsonConnection {
    async fn exchange(&mut self, request: &Value) -> Result<Value> {
        let command = command_of(request).to_string();
        let payload = serde_json::to_vec(request)?;
        trace!("remote signer request command={} bytes={}", command, payload.len());

        // The socket is held outside `self` until the reply is read, so an exchange dropped
        // mid-flight closes it instead of leaving an unread reply for the next request.
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };
        let line = Self::round_trip(&mut stream, self.socket_timeout, &command, &payload).await?;
        let response = serde_json::from_str(line.trim_end())
            .map_err(|err| BridgeError::protocol_violation(command, format!("malformed response: {}", err)))?;
        self.stream = Some(stream);
        Ok(response)
    }
}

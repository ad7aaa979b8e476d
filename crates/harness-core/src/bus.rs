//! Event bus transport.
//!
//! The harness only consumes. A relay in front of the message bus forwards
//! each message as one JSON document per line, either on the daemon's stdin
//! or over a TCP connection. Delivery guarantees belong to the relay.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::error::{HarnessError, Result};
use crate::event::BusMessage;

/// A stream of bus messages. `Ok(None)` means the stream has ended.
#[async_trait]
pub trait EventSource: Send {
    async fn recv(&mut self) -> Result<Option<BusMessage>>;
}

/// Newline-delimited JSON over any async reader.
///
/// Lines are decoded as raw bytes, so one that is not valid UTF-8 is skipped
/// like any other undecodable line.
pub struct JsonLinesSource<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    skipped: u64,
}

impl<R: AsyncRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            skipped: 0,
        }
    }

    /// Lines that could not be decoded so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl JsonLinesSource<tokio::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl JsonLinesSource<TcpStream> {
    /// Connect to a relay at `endpoint` (`host:port`).
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| HarnessError::Bus(format!("connect to {endpoint}: {e}")))?;
        info!(endpoint = %endpoint, "connected to bus relay");
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> EventSource for JsonLinesSource<R> {
    async fn recv(&mut self) -> Result<Option<BusMessage>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .map_err(|e| HarnessError::Bus(e.to_string()))?;
            if read == 0 {
                return Ok(None);
            }
            if self.buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<BusMessage>(&self.buf) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    self.skipped += 1;
                    let line = String::from_utf8_lossy(&self.buf);
                    warn!(error = %e, line = %line.trim_end(), "skipping undecodable bus line");
                }
            }
        }
    }
}

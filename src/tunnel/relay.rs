//! Per-connection duplex relay between the published and private
//! endpoints.
//!
//! One session owns exactly one accepted public connection and the
//! private connection dialed for it. Two symmetric copy loops run
//! concurrently; the session ends as soon as either direction hits
//! end-of-stream or errors, and dropping both streams on the way out of
//! [`RelaySession::run`] unblocks whatever the other direction was
//! waiting on. There is no retry inside a session.

use std::fmt;
use std::time::Duration;

use interprocess::local_socket::tokio::Stream;
use interprocess::local_socket::traits::tokio::Stream as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::endpoint;
use super::error::TunnelError;

/// Chunk buffer capacity per copy direction.
pub const RELAY_BUFFER_SIZE: usize = 10_240;

/// Which way bytes are flowing, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    PublicToPrivate,
    PrivateToPublic,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::PublicToPrivate => write!(f, "public->private"),
            Direction::PrivateToPublic => write!(f, "private->public"),
        }
    }
}

/// How a finished session terminated, for logging.
#[derive(Debug)]
pub struct RelayOutcome {
    /// Direction that ended the session.
    pub direction: Direction,
    /// Bytes moved in that direction before it ended.
    pub bytes: u64,
}

/// One accepted public connection paired with its private counterpart.
pub struct RelaySession {
    sequence: u64,
    public: Stream,
    private_name: String,
    connect_timeout: Duration,
}

impl RelaySession {
    pub fn new(
        sequence: u64,
        public: Stream,
        private_name: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            sequence,
            public,
            private_name: private_name.into(),
            connect_timeout,
        }
    }

    /// Dial the private endpoint and relay until one direction ends.
    ///
    /// A connect timeout or refusal fails the session before any byte is
    /// relayed. Both connections are released when this returns.
    pub async fn run(self) -> Result<RelayOutcome, TunnelError> {
        let sequence = self.sequence;

        let private = match tokio::time::timeout(
            self.connect_timeout,
            endpoint::connect(&self.private_name),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TunnelError::PrivateConnect {
                    name: self.private_name,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(TunnelError::PrivateConnect {
                    name: self.private_name,
                    reason: format!("timed out after {:?}", self.connect_timeout),
                })
            }
        };

        tracing::debug!(sequence, private = %self.private_name, "private connection established");

        let (mut public_read, mut public_write) = self.public.split();
        let (mut private_read, mut private_write) = private.split();

        // First direction to finish ends the session; the other copy
        // future is dropped here and both connections close on return.
        let outcome = tokio::select! {
            result = copy_chunks(
                &mut public_read,
                &mut private_write,
                sequence,
                Direction::PublicToPrivate,
            ) => result,
            result = copy_chunks(
                &mut private_read,
                &mut public_write,
                sequence,
                Direction::PrivateToPublic,
            ) => result,
        };

        outcome
    }
}

/// Copy chunks from `reader` to `writer` until EOF or error.
///
/// Every read is written out (and flushed) before the next read, so
/// bytes keep strict FIFO order within the direction and never sit in a
/// userspace buffer.
async fn copy_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    sequence: u64,
    direction: Direction,
) -> Result<RelayOutcome, TunnelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let io_err = |source: std::io::Error| TunnelError::RelayIo { direction, source };

    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            tracing::debug!(sequence, %direction, bytes = total, "end of stream");
            return Ok(RelayOutcome { direction, bytes: total });
        }

        tracing::trace!(sequence, %direction, chunk = n, "relaying chunk");

        writer.write_all(&buf[..n]).await.map_err(io_err)?;
        writer.flush().await.map_err(io_err)?;
        total += n as u64;
    }
}

//! Stream transport
//!
//! Runs the protocol over any async byte stream: a serial port opened by
//! the caller, a TCP serial bridge or an in-memory pipe.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, info, trace};

use crate::{error::*, StateChange, Transport};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Opens a fresh stream to the device
pub type Connector<S> = Box<dyn Fn() -> BoxFuture<io::Result<S>> + Send + Sync>;

/// Default read/write timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1200);

const EVENT_CAPACITY: usize = 16;

/// Transport over an async byte stream
///
/// The stream is opened lazily on first I/O and reopened after a
/// disconnect. Opening and closing are reported to subscribers.
pub struct StreamTransport<S> {
    name: String,
    connector: Connector<S>,
    stream: Option<S>,
    events: broadcast::Sender<StateChange>,
    open_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    /// Create new stream transport
    ///
    /// `name` identifies the port in diagnostics; `connector` opens the stream.
    pub fn new<F, Fut>(name: impl Into<String>, connector: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<S>> + Send + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            name: name.into(),
            connector: Box::new(move || Box::pin(connector())),
            stream: None,
            events,
            open_timeout: Duration::from_secs(5),
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set open timeout
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Set read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    async fn ensure_open(&mut self) -> Result<&mut S> {
        if self.stream.is_none() {
            debug!(port = %self.name, "Opening stream");

            let stream = timeout(self.open_timeout, (self.connector)())
                .await
                .map_err(|_| Error::ConnectionTimeout)?
                .map_err(|e| self.open_error(e))?;

            info!(port = %self.name, "Connected");

            self.stream = Some(stream);
            let _ = self.events.send(StateChange::Connected);
        }

        self.stream.as_mut().ok_or(Error::NotConnected)
    }

    fn open_error(&self, err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::NotFound => Error::PortNotFound(self.name.clone()),
            io::ErrorKind::PermissionDenied
            | io::ErrorKind::AddrInUse
            | io::ErrorKind::ResourceBusy => Error::PortBusy(self.name.clone()),
            _ => Error::Io(err),
        }
    }

    fn close(&mut self, reason: &str) {
        if self.stream.take().is_some() {
            info!(port = %self.name, reason, "Disconnected");
            let _ = self.events.send(StateChange::Disconnected);
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let write_timeout = self.write_timeout;
        let stream = self.ensure_open().await?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));

        let result = timeout(write_timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.close("write failed");
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::WriteTimeout),
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read_timeout = self.read_timeout;
        let stream = self.ensure_open().await?;

        let result = timeout(read_timeout, stream.read(buf)).await;

        match result {
            Ok(Ok(0)) => {
                self.close("closed by peer");
                Err(Error::ConnectionClosed)
            }
            Ok(Ok(n)) => {
                trace!("Received {} bytes: {}", n, hex::encode(&buf[..n]));
                Ok(n)
            }
            Ok(Err(e)) => {
                self.close("read failed");
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::ReadTimeout),
        }
    }

    async fn discard_buffers(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        let mut scratch = [0u8; 256];
        let mut discarded = 0;

        // only input that is ready right now
        loop {
            let result = timeout(Duration::ZERO, stream.read(&mut scratch)).await;

            match result {
                Ok(Ok(0)) => {
                    self.close("closed by peer");
                    break;
                }
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => {
                    self.close("read failed");
                    return Err(Error::Io(e));
                }
                Err(_) => break,
            }
        }

        if discarded > 0 {
            debug!(port = %self.name, discarded, "Discarded buffered input");
        }

        Ok(())
    }

    fn disconnect(&mut self, reason: &str) {
        self.close(reason);
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn timeout(&self) -> Duration {
        self.read_timeout
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

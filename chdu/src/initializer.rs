//! Connection initialization
//!
//! After (re)connecting, the device parser may be mid-frame. The handshake
//! soft-resets it and then checks the link with a status query.

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chdu_core::{constants::HANDSHAKE_ATTEMPTS, request::GetStatus, ConnectionState, LinkState};
use chdu_transport::StateChange;

use crate::{
    engine::CommandTransport,
    error::{Error, Result},
};

/// Tracks whether the link needs a handshake and performs it
///
/// Subscribes to transport notifications on construction; dropping the
/// initializer drops the subscription.
pub struct Initializer {
    events: broadcast::Receiver<StateChange>,
    state: LinkState,
}

impl Initializer {
    pub fn new(engine: &CommandTransport) -> Self {
        Self::with_events(engine.subscribe())
    }

    fn with_events(events: broadcast::Receiver<StateChange>) -> Self {
        Self {
            events,
            state: LinkState::new(),
        }
    }

    /// Apply transport notifications received since the last call
    pub fn sync(&mut self) -> ConnectionState {
        loop {
            match self.events.try_recv() {
                Ok(StateChange::Disconnected) => {
                    debug!("Transport disconnected, handshake required");
                    self.state.reset();
                }
                Ok(StateChange::Connected) => {}
                Err(TryRecvError::Lagged(missed)) => {
                    // missed notifications may include a disconnect
                    debug!(missed, "Transport notifications lagged");
                    self.state.reset();
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        self.state.get()
    }

    pub fn is_pending(&mut self) -> bool {
        self.sync() == ConnectionState::Pending
    }

    /// Perform the handshake
    ///
    /// Soft-resets the device, then sends up to [`HANDSHAKE_ATTEMPTS`] status
    /// queries. A rejected query is retried while attempts remain; any other
    /// failure ends the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Initialization`] wrapping the last failure, or
    /// [`Error::Cancelled`]. The link stays pending.
    pub async fn initialize(
        &mut self,
        engine: &mut CommandTransport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.state.begin_initialization()?;
        let mut pending = PendingOnDrop(Some(self.state.clone()));

        info!("Initializing connection...");

        match Self::handshake(engine, cancel).await {
            Ok(()) => {
                // notifications caused by the handshake itself
                while self.events.try_recv().is_ok() {}

                self.state.mark_ready()?;
                pending.disarm();
                info!("Connection ready");
                Ok(())
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(err) => {
                warn!("Connection initialization failed: {}", err);
                Err(Error::Initialization(Box::new(err)))
            }
        }
    }

    async fn handshake(engine: &mut CommandTransport, cancel: &CancellationToken) -> Result<()> {
        engine.soft_reset(cancel).await?;

        let mut attempt = 1;
        loop {
            match engine.execute(&GetStatus, cancel).await {
                Ok(status) => {
                    debug!("Handshake status: {}", status);
                    return Ok(());
                }
                Err(Error::CommandFailed(code)) if attempt < HANDSHAKE_ATTEMPTS => {
                    debug!(attempt, "Handshake status query rejected with {}, retrying", code);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Puts the link back to `Pending` unless the handshake completed
///
/// Also covers a handshake future dropped before it finished.
struct PendingOnDrop(Option<LinkState>);

impl PendingOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for PendingOnDrop {
    fn drop(&mut self) {
        if let Some(state) = self.0.take() {
            state.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{status_payload, FakeDevice, Reply};
    use chdu_core::constants::SOFT_RESET_LEN;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn ready(events: broadcast::Receiver<StateChange>) -> Initializer {
        let initializer = Initializer::with_events(events);
        initializer.state.begin_initialization().unwrap();
        initializer.state.mark_ready().unwrap();
        initializer
    }

    #[test]
    fn test_connect_notifications_keep_ready() {
        let (sender, events) = broadcast::channel(16);
        let mut initializer = ready(events);

        sender.send(StateChange::Connected).unwrap();
        assert_eq!(initializer.sync(), ConnectionState::Ready);

        sender.send(StateChange::Disconnected).unwrap();
        assert!(initializer.is_pending());
    }

    #[test]
    fn test_lagged_notifications_reset_link() {
        let (sender, events) = broadcast::channel(16);
        let mut initializer = ready(events);

        // overflow the channel with notifications that alone keep the link
        for _ in 0..20 {
            sender.send(StateChange::Connected).unwrap();
        }

        assert_eq!(initializer.sync(), ConnectionState::Pending);
    }

    #[tokio::test]
    async fn test_initialize() {
        let device = FakeDevice::scripted(vec![Reply::single(status_payload())]);
        let mut engine = CommandTransport::new(Box::new(device.transport()));
        let mut initializer = Initializer::new(&engine);
        let cancel = CancellationToken::new();

        initializer.initialize(&mut engine, &cancel).await.unwrap();
        assert_eq!(initializer.sync(), ConnectionState::Ready);

        // already initialized
        let result = initializer.initialize(&mut engine, &cancel).await;
        assert!(matches!(result, Err(Error::Core(_))));
        assert_eq!(initializer.sync(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_dropped_handshake_leaves_pending() {
        let device = FakeDevice::scripted(vec![Reply::Silent, Reply::single(status_payload())]);
        let mut engine = CommandTransport::new(Box::new(device.transport()));
        let mut initializer = Initializer::new(&engine);
        let cancel = CancellationToken::new();

        let handshake = initializer.initialize(&mut engine, &cancel);
        let dropped = tokio::time::timeout(Duration::from_millis(50), handshake).await;
        assert!(dropped.is_err());

        assert_eq!(initializer.sync(), ConnectionState::Pending);

        // the next attempt starts over on a fresh connection
        initializer.initialize(&mut engine, &cancel).await.unwrap();
        assert_eq!(initializer.sync(), ConnectionState::Ready);
        assert_eq!(device.connections(), 2);
        assert_eq!(device.soft_reset_bytes(), 2 * SOFT_RESET_LEN);
    }
}

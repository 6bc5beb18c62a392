//! Command exchange with the device
//!
//! One exchange is: write the request frame, read the ACK/NAK byte, then
//! read the response blocks the request expects. Multi-packet requests
//! confirm every block with ACK, or abort the transfer with NUL when
//! cancelled.
//!
//! Cancellation interrupts simple requests at any transport call. A
//! multi-packet transfer is only cancelled at a confirmation point, so the
//! device is always told to stop.

use std::future::Future;

use bytes::BytesMut;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use chdu_core::{
    constants::{control, SOFT_RESET_LEN},
    CommandId, ErrorCode, Request, ResponseMessage,
};
use chdu_transport::{StateChange, Transport};
use chdu_types::Validity;

use crate::error::{Error, Result};

/// Sends requests and receives their responses over a transport
pub struct CommandTransport {
    transport: Box<dyn Transport>,

    /// Last exchange was interrupted mid-I/O, framing state is unknown
    interrupted: bool,

    /// An exchange started and has not finished; still set on entry means
    /// its future was dropped mid-I/O
    in_flight: bool,
}

impl CommandTransport {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            interrupted: false,
            in_flight: false,
        }
    }

    /// Close the link if the previous exchange was abandoned
    ///
    /// A dropped exchange leaves its reply on the wire, where the next
    /// command would read it. Returns whether the link was closed.
    pub fn recover(&mut self) -> bool {
        if !std::mem::take(&mut self.in_flight) {
            return false;
        }

        warn!("Closing link after abandoned exchange");
        self.transport.disconnect("exchange abandoned");
        true
    }

    /// Subscribe to transport connect/disconnect notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.transport.subscribe()
    }

    pub fn disconnect(&mut self, reason: &str) {
        self.transport.disconnect(reason);
    }

    /// Execute one request
    ///
    /// Device errors and framing violations tear the link down; client
    /// errors leave it open.
    pub async fn execute<R: Request>(
        &mut self,
        request: &R,
        cancel: &CancellationToken,
    ) -> Result<R::Response> {
        self.recover();
        self.interrupted = false;
        self.in_flight = true;

        let result = self.exchange(request, cancel).await;
        self.in_flight = false;

        if let Err(err) = &result {
            self.handle_failure(request.id(), err);
        }

        result
    }

    /// Force the device parser back to a frame boundary
    ///
    /// Writes a burst of EOT bytes and drops whatever the device sent back.
    pub async fn soft_reset(&mut self, cancel: &CancellationToken) -> Result<()> {
        debug!("Soft reset ({} x EOT)", SOFT_RESET_LEN);

        self.recover();
        self.in_flight = true;

        let burst = [control::EOT; SOFT_RESET_LEN];
        let outcome = interruptible(Some(cancel), self.transport.write(&burst)).await;
        let result = match self.settle(outcome) {
            Ok(()) => {
                let outcome =
                    interruptible(Some(cancel), self.transport.discard_buffers()).await;
                self.settle(outcome)
            }
            Err(err) => Err(err),
        };

        self.in_flight = false;
        result
    }

    async fn exchange<R: Request>(
        &mut self,
        request: &R,
        cancel: &CancellationToken,
    ) -> Result<R::Response> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let command = request.id();
        let frame = request.frame()?.encode();
        let watch = (!request.supports_multi_packet()).then_some(cancel);

        debug!(%command, len = frame.len(), "Sending request");

        let outcome = interruptible(watch, self.transport.write_and_read(&frame, 1)).await;
        let reply = self.settle(outcome)?;

        match reply.first().copied() {
            Some(control::ACK) => {}
            Some(control::NAK) => {
                let outcome = interruptible(watch, self.transport.read_one()).await;
                let code = ErrorCode::from(self.settle(outcome)?);

                warn!(
                    "Device rejected {} ({}) with {}",
                    command,
                    hex::encode(&frame[..frame.len().min(16)]),
                    code
                );
                return Err(Error::CommandFailed(code));
            }
            other => {
                return Err(Error::UnexpectedResponse(format!(
                    "expected ACK or NAK after {}, got {:02X?}",
                    command, other
                )));
            }
        }

        let expected = request.response_blocks();
        let mut blocks = Vec::new();

        for index in 0..expected {
            let (message, last) = self.receive_block(request, cancel, watch, index).await?;
            blocks.push(message);

            if last && index + 1 < expected {
                return Err(Error::IncompleteData {
                    received: index + 1,
                    expected,
                });
            }
        }

        let outcome = interruptible(watch, self.transport.discard_buffers()).await;
        self.settle(outcome)?;

        debug!(%command, blocks = blocks.len(), "Response received");

        Ok(request.decode(blocks)?)
    }

    /// Read one response block
    ///
    /// Returns the block and whether the device marked it as the last one.
    /// Transport calls are interrupted only if `watch` is set.
    async fn receive_block<R: Request>(
        &mut self,
        request: &R,
        cancel: &CancellationToken,
        watch: Option<&CancellationToken>,
        index: u32,
    ) -> Result<(ResponseMessage, bool)> {
        let expected = request.response_blocks();

        let outcome = interruptible(watch, self.transport.read_one()).await;
        let start = self.settle(outcome)?;

        if start != control::STX {
            return Err(Error::UnexpectedResponse(format!(
                "block {} of {} starts with 0x{:02X}",
                index + 1,
                expected,
                start
            )));
        }

        // read ahead until the length header arrives, then switch to the real size
        let mut target = ResponseMessage::HEADER_LEN + request.min_response_data_len();
        let mut raw = BytesMut::zeroed(target);
        let mut filled = 0;
        let mut length_known = false;

        while filled < target {
            let outcome = interruptible(watch, self.transport.read(&mut raw[filled..target])).await;
            filled += self.settle(outcome)?;

            if length_known {
                continue;
            }

            if let Some(payload_len) = ResponseMessage::parse_payload_len(&raw[..filled]) {
                length_known = true;

                if payload_len > ResponseMessage::MAX_PAYLOAD_LEN {
                    return Err(Error::UnexpectedResponse(format!(
                        "block {} declares {} payload bytes (max {})",
                        index + 1,
                        payload_len,
                        ResponseMessage::MAX_PAYLOAD_LEN
                    )));
                }

                let block_len = ResponseMessage::HEADER_LEN + payload_len;
                if filled > block_len {
                    return Err(Error::UnexpectedResponse(format!(
                        "block {} shorter than {} payload bytes",
                        index + 1,
                        request.min_response_data_len()
                    )));
                }

                target = block_len;
                raw.resize(target, 0);
            }
        }

        trace!("Block {}/{}: {}", index + 1, expected, hex::encode(&raw));

        if request.supports_multi_packet() {
            if cancel.is_cancelled() {
                // device must stop sending before the caller gets control back
                self.transport
                    .write_one(control::NUL)
                    .await
                    .map_err(|source| self.transport_error(source))?;

                info!(command = %request.id(), block = index + 1, "Transfer aborted");

                if let Err(err) = self.transport.discard_buffers().await {
                    debug!("Discard after aborted transfer failed: {}", err);
                }
                return Err(Error::Cancelled);
            }

            self.transport
                .write_one(control::ACK)
                .await
                .map_err(|source| self.transport_error(source))?;
        }

        let outcome = interruptible(watch, self.transport.read_one()).await;
        let end = self.settle(outcome)?;

        let validity = match end {
            control::ACK | control::EOT => Validity::Valid,
            control::BEL => {
                warn!(block = index + 1, "Device reported checksum mismatch");
                Validity::Invalid
            }
            other => {
                return Err(Error::UnexpectedResponse(format!(
                    "unexpected end byte 0x{:02X} for block {} of {}",
                    other,
                    index + 1,
                    expected
                )));
            }
        };

        let message = ResponseMessage::new(raw.freeze(), validity)?;
        Ok((message, end == control::EOT))
    }

    /// Turn a transport call outcome into a result; `None` means cancelled
    fn settle<T>(&mut self, outcome: Option<chdu_transport::Result<T>>) -> Result<T> {
        match outcome {
            Some(result) => result.map_err(|source| self.transport_error(source)),
            None => {
                self.interrupted = true;
                Err(Error::Cancelled)
            }
        }
    }

    fn transport_error(&self, source: chdu_transport::Error) -> Error {
        Error::Transport {
            port: self.transport.name(),
            timeout: self.transport.timeout(),
            source,
        }
    }

    fn handle_failure(&mut self, command: CommandId, err: &Error) {
        if err.requires_reconnect() {
            warn!(%command, "Closing link after failure: {}", err);
            self.transport.disconnect(&err.to_string());
        } else if self.interrupted {
            warn!(%command, "Closing link after interrupted exchange");
            self.transport.disconnect("exchange interrupted");
        } else if let Error::CommandFailed(code) = err {
            info!(%command, "{} is a client error, link stays open", code);
        }
    }
}

/// Run `fut` unless `cancel` fires first
async fn interruptible<T>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = T>,
) -> Option<T> {
    let Some(cancel) = cancel else {
        return Some(fut.await);
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{status_payload, FakeDevice, Reply};
    use chdu_core::request::{GetStatus, OpenDrawer, ReadBlocks};
    use chdu_types::{BlockAddress, DrawerPin};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn engine(device: &FakeDevice) -> (CommandTransport, broadcast::Receiver<StateChange>) {
        let engine = CommandTransport::new(Box::new(device.transport()));
        let events = engine.subscribe();
        (engine, events)
    }

    fn drain(events: &mut broadcast::Receiver<StateChange>) -> Vec<StateChange> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    fn read_request(count: u32) -> ReadBlocks {
        ReadBlocks::new(BlockAddress::ZERO, count)
    }

    #[tokio::test]
    async fn test_status_exchange() {
        let device = FakeDevice::scripted(vec![Reply::single(status_payload())]);
        let (mut engine, _events) = engine(&device);
        let cancel = CancellationToken::new();

        let status = engine.execute(&GetStatus, &cancel).await.unwrap();
        assert!(status.is_printer_ready());
        assert_eq!(status.serial_number(), "1234");

        assert_eq!(device.requests(), vec![(0x5A, Vec::new())]);
        // simple queries are not confirmed per block
        assert!(device.flow_control().is_empty());
    }

    #[tokio::test]
    async fn test_nak_client_error_keeps_link() {
        let device = FakeDevice::scripted(vec![Reply::Nak(ErrorCode::InvalidCommand as u8)]);
        let (mut engine, mut events) = engine(&device);
        let cancel = CancellationToken::new();

        let err = engine.execute(&OpenDrawer(DrawerPin::A), &cancel).await.unwrap_err();

        assert!(matches!(err, Error::CommandFailed(ErrorCode::InvalidCommand)));
        assert_eq!(drain(&mut events), vec![StateChange::Connected]);
    }

    #[tokio::test]
    async fn test_nak_device_error_closes_link() {
        let device = FakeDevice::scripted(vec![Reply::Nak(ErrorCode::Busy as u8)]);
        let (mut engine, mut events) = engine(&device);
        let cancel = CancellationToken::new();

        let err = engine.execute(&GetStatus, &cancel).await.unwrap_err();

        assert_eq!(err.error_code(), Some(ErrorCode::Busy));
        assert_eq!(
            drain(&mut events),
            vec![StateChange::Connected, StateChange::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_multi_block_read() {
        let device = FakeDevice::scripted(vec![Reply::blocks(vec![
            vec![0xB2, 1],
            vec![0xB3, 2, 2],
            vec![0xB2, 3, 3, 3],
        ])]);
        let (mut engine, _events) = engine(&device);
        let cancel = CancellationToken::new();

        let blocks = engine.execute(&read_request(3), &cancel).await.unwrap();

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].content(), &[1]);
        assert_eq!(blocks[1].content(), &[2, 2]);
        assert_eq!(blocks[2].content(), &[3, 3, 3]);
        assert_eq!(device.flow_control(), vec![control::ACK; 3]);
    }

    #[tokio::test]
    async fn test_early_eot_is_incomplete() {
        let device = FakeDevice::scripted(vec![Reply::Blocks(vec![
            (vec![0xB2, 1], control::ACK),
            (vec![0xB2, 2], control::EOT),
        ])]);
        let (mut engine, mut events) = engine(&device);
        let cancel = CancellationToken::new();

        let err = engine.execute(&read_request(3), &cancel).await.unwrap_err();

        assert!(matches!(
            err,
            Error::IncompleteData { received: 2, expected: 3 }
        ));
        assert_eq!(
            drain(&mut events),
            vec![StateChange::Connected, StateChange::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_bel_marks_block_invalid() {
        let device = FakeDevice::scripted(vec![Reply::Blocks(vec![
            (vec![0xB2, 1], control::BEL),
            (vec![0xB2, 2], control::EOT),
        ])]);
        let (mut engine, mut events) = engine(&device);
        let cancel = CancellationToken::new();

        let blocks = engine.execute(&read_request(2), &cancel).await.unwrap();

        assert_eq!(blocks[0].validity, Validity::Invalid);
        assert_eq!(blocks[1].validity, Validity::Valid);
        assert_eq!(drain(&mut events), vec![StateChange::Connected]);
    }

    #[tokio::test]
    async fn test_unknown_terminator_closes_link() {
        let device = FakeDevice::scripted(vec![Reply::Blocks(vec![(status_payload(), 0x99)])]);
        let (mut engine, mut events) = engine(&device);
        let cancel = CancellationToken::new();

        let err = engine.execute(&GetStatus, &cancel).await.unwrap_err();

        assert!(matches!(err, Error::UnexpectedResponse(_)));
        assert!(err.requires_reconnect());
        assert!(drain(&mut events).contains(&StateChange::Disconnected));
    }

    #[tokio::test]
    async fn test_unexpected_ack_byte() {
        let device = FakeDevice::scripted(vec![Reply::Raw(vec![0x41])]);
        let (mut engine, mut events) = engine(&device);
        let cancel = CancellationToken::new();

        let err = engine.execute(&GetStatus, &cancel).await.unwrap_err();

        assert!(matches!(err, Error::UnexpectedResponse(_)));
        assert!(drain(&mut events).contains(&StateChange::Disconnected));
    }

    #[tokio::test]
    async fn test_missing_start_byte() {
        let device = FakeDevice::scripted(vec![Reply::Raw(vec![control::ACK, 0x30, 0x01, 0x00])]);
        let (mut engine, _events) = engine(&device);
        let cancel = CancellationToken::new();

        let err = engine.execute(&GetStatus, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_overlong_block_rejected() {
        let mut raw = vec![control::ACK, control::STX];
        raw.extend_from_slice(&0x4000u16.to_le_bytes());
        let device = FakeDevice::scripted(vec![Reply::Raw(raw)]);
        let (mut engine, _events) = engine(&device);
        let cancel = CancellationToken::new();

        let err = engine.execute(&GetStatus, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_read_timeout_is_transport_error() {
        let device = FakeDevice::scripted(vec![Reply::Silent]);
        let (mut engine, mut events) = engine(&device);
        let cancel = CancellationToken::new();

        let err = engine.execute(&GetStatus, &cancel).await.unwrap_err();

        match err {
            Error::Transport { port, timeout, source } => {
                assert_eq!(port, "fake");
                assert_eq!(timeout, std::time::Duration::from_millis(200));
                assert!(matches!(source, chdu_transport::Error::ReadTimeout));
            }
            other => panic!("unexpected error: {}", other),
        }

        // timeouts are left to the transport
        assert_eq!(drain(&mut events), vec![StateChange::Connected]);
    }

    #[tokio::test]
    async fn test_cancel_at_flow_control_sends_nul() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let device = FakeDevice::new(move |_, _| {
            trigger.cancel();
            Reply::blocks(vec![vec![0xB2, 1], vec![0xB2, 2], vec![0xB2, 3]])
        });
        let (mut engine, mut events) = engine(&device);

        let err = engine.execute(&read_request(3), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        device.wait_for_flow_control(1).await;
        assert_eq!(device.flow_control(), vec![control::NUL]);

        // the device was told to stop, the link stays open
        assert_eq!(drain(&mut events), vec![StateChange::Connected]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_simple_request() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let device = FakeDevice::new(move |_, _| {
            trigger.cancel();
            Reply::Silent
        });
        let (mut engine, mut events) = engine(&device);

        let err = engine.execute(&GetStatus, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        // framing state unknown after an interrupted exchange
        assert_eq!(
            drain(&mut events),
            vec![StateChange::Connected, StateChange::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_abandoned_exchange_closes_link() {
        let device = FakeDevice::scripted(vec![Reply::Silent, Reply::single(status_payload())]);
        let (mut engine, mut events) = engine(&device);
        let cancel = CancellationToken::new();

        let exchange = engine.execute(&GetStatus, &cancel);
        let dropped = tokio::time::timeout(Duration::from_millis(50), exchange).await;
        assert!(dropped.is_err());

        assert!(engine.recover());
        assert!(!engine.recover());
        assert_eq!(
            drain(&mut events),
            vec![StateChange::Connected, StateChange::Disconnected]
        );

        engine.execute(&GetStatus, &cancel).await.unwrap();
        assert_eq!(device.connections(), 2);
    }

    #[tokio::test]
    async fn test_next_exchange_recovers_abandoned_one() {
        let device = FakeDevice::scripted(vec![Reply::Silent, Reply::Ack]);
        let (mut engine, mut events) = engine(&device);
        let cancel = CancellationToken::new();

        let exchange = engine.execute(&GetStatus, &cancel);
        assert!(tokio::time::timeout(Duration::from_millis(50), exchange).await.is_err());

        engine.execute(&OpenDrawer(DrawerPin::A), &cancel).await.unwrap();

        assert_eq!(
            drain(&mut events),
            vec![
                StateChange::Connected,
                StateChange::Disconnected,
                StateChange::Connected
            ]
        );
    }

    #[tokio::test]
    async fn test_soft_reset() {
        let device = FakeDevice::scripted(Vec::new());
        let (mut engine, _events) = engine(&device);
        let cancel = CancellationToken::new();

        engine.soft_reset(&cancel).await.unwrap();

        // let the device task consume the burst
        engine.execute(&OpenDrawer(DrawerPin::B), &cancel).await.unwrap_err();
        assert_eq!(device.soft_reset_bytes(), SOFT_RESET_LEN);
    }
}

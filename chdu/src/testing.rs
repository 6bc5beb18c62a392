//! In-process device for protocol tests
//!
//! Speaks the device side of the wire protocol over an in-memory pipe and
//! records what the client sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use chdu_core::constants::control;
use chdu_transport::StreamTransport;

/// Device answer to one request frame
pub enum Reply {
    /// ACK without response blocks
    Ack,
    /// ACK followed by blocks, each with its terminator
    Blocks(Vec<(Vec<u8>, u8)>),
    /// NAK with an error code
    Nak(u8),
    /// Arbitrary bytes
    Raw(Vec<u8>),
    /// No answer at all
    Silent,
}

impl Reply {
    /// ACK and one block terminated with EOT
    pub fn single(payload: Vec<u8>) -> Self {
        Self::Blocks(vec![(payload, control::EOT)])
    }

    /// ACK and blocks terminated with ACK, the last one with EOT
    pub fn blocks(payloads: Vec<Vec<u8>>) -> Self {
        let count = payloads.len();
        Self::Blocks(
            payloads
                .into_iter()
                .enumerate()
                .map(|(i, payload)| {
                    let terminator = if i + 1 == count { control::EOT } else { control::ACK };
                    (payload, terminator)
                })
                .collect(),
        )
    }
}

type Handler = Box<dyn FnMut(u8, &[u8]) -> Reply + Send>;

#[derive(Default)]
struct Record {
    requests: Vec<(u8, Vec<u8>)>,
    flow_control: Vec<u8>,
    connections: usize,
    rejected_frames: usize,
    soft_reset_bytes: usize,
}

/// Fake device; every transport connection gets its own serving task
#[derive(Clone)]
pub struct FakeDevice {
    handler: Arc<Mutex<Handler>>,
    record: Arc<Mutex<Record>>,
}

impl FakeDevice {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(u8, &[u8]) -> Reply + Send + 'static,
    {
        Self {
            handler: Arc::new(Mutex::new(Box::new(handler))),
            record: Arc::new(Mutex::new(Record::default())),
        }
    }

    /// Device answering requests with `replies` in order, then staying silent
    pub fn scripted(replies: Vec<Reply>) -> Self {
        let mut replies = VecDeque::from(replies);
        Self::new(move |_, _| replies.pop_front().unwrap_or(Reply::Silent))
    }

    /// Transport connecting to this device
    pub fn transport(&self) -> StreamTransport<DuplexStream> {
        let device = self.clone();

        StreamTransport::new("fake", move || {
            let (client, server) = tokio::io::duplex(1024);
            device.record.lock().unwrap().connections += 1;
            tokio::spawn(device.clone().serve(server));
            async move { Ok(client) }
        })
        .with_read_timeout(Duration::from_millis(200))
    }

    pub fn requests(&self) -> Vec<(u8, Vec<u8>)> {
        self.record.lock().unwrap().requests.clone()
    }

    /// Per-block flow control bytes received
    pub fn flow_control(&self) -> Vec<u8> {
        self.record.lock().unwrap().flow_control.clone()
    }

    pub fn connections(&self) -> usize {
        self.record.lock().unwrap().connections
    }

    pub fn rejected_frames(&self) -> usize {
        self.record.lock().unwrap().rejected_frames
    }

    pub fn soft_reset_bytes(&self) -> usize {
        self.record.lock().unwrap().soft_reset_bytes
    }

    /// Wait until the serving task has recorded `count` flow control bytes
    pub async fn wait_for_flow_control(&self, count: usize) {
        for _ in 0..200 {
            if self.flow_control().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn serve(self, mut stream: DuplexStream) {
        loop {
            let Ok(byte) = stream.read_u8().await else {
                return;
            };

            match byte {
                control::STX => {}
                control::EOT => {
                    self.record.lock().unwrap().soft_reset_bytes += 1;
                    continue;
                }
                _ => {
                    self.record.lock().unwrap().rejected_frames += 1;
                    continue;
                }
            }

            let Ok(len) = stream.read_u16_le().await else {
                return;
            };
            let mut body = vec![0u8; usize::from(len)];
            if stream.read_exact(&mut body).await.is_err() {
                return;
            }
            let Ok(end) = stream.read_u8().await else {
                return;
            };

            if end != control::EOT || body.is_empty() {
                self.record.lock().unwrap().rejected_frames += 1;
                continue;
            }

            let opcode = body[0];
            let arguments = body[1..].to_vec();
            self.record
                .lock()
                .unwrap()
                .requests
                .push((opcode, arguments.clone()));

            let reply = (self.handler.lock().unwrap())(opcode, &arguments);

            if self.send_reply(&mut stream, opcode, reply).await.is_err() {
                return;
            }
        }
    }

    async fn send_reply(
        &self,
        stream: &mut DuplexStream,
        opcode: u8,
        reply: Reply,
    ) -> std::io::Result<()> {
        match reply {
            Reply::Ack => stream.write_all(&[control::ACK]).await,
            Reply::Nak(code) => stream.write_all(&[control::NAK, code]).await,
            Reply::Raw(bytes) => stream.write_all(&bytes).await,
            Reply::Silent => Ok(()),
            Reply::Blocks(blocks) => {
                stream.write_all(&[control::ACK]).await?;

                for (payload, terminator) in blocks {
                    let mut block = vec![control::STX];
                    block.extend_from_slice(&(payload.len() as u16).to_le_bytes());
                    block.extend_from_slice(&payload);
                    stream.write_all(&block).await?;

                    // bulk reads wait for the client to confirm each block
                    if opcode == 0xB1 {
                        let confirm = stream.read_u8().await?;
                        self.record.lock().unwrap().flow_control.push(confirm);

                        if confirm == control::NUL {
                            return Ok(());
                        }
                    }

                    stream.write_all(&[terminator]).await?;
                }

                Ok(())
            }
        }
    }
}

/// Status payload of a ready device running firmware v1.3
pub fn status_payload() -> Vec<u8> {
    let mut payload = vec![3, 1];
    payload.extend_from_slice(&0x0003u16.to_le_bytes());
    payload.extend_from_slice(&1234u32.to_le_bytes());
    payload.extend_from_slice(&10_000u32.to_le_bytes());
    payload.extend_from_slice(&9_000u32.to_le_bytes());
    payload.extend_from_slice(&508u32.to_le_bytes());
    payload.extend_from_slice(&38_400u32.to_le_bytes());
    payload
}

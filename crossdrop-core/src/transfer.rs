//! Transfer protocol: chunked file send/receive over an already-open peer channel.
//!
//! Framing on the channel: one `meta` text frame `{"meta":true,"name":..,"size":..}`, zero or
//! more binary chunk frames, then one `{"finished":true}` text frame. The channel is trusted to
//! be ordered and reliable; there is no sequencing or retransmission here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default chunk size in bytes. Any size ≥ 1 is correct; this only tunes frame count.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024; // 64 KiB

/// Elapsed time below this is rounded up when computing speed.
const MIN_SPEED_WINDOW: Duration = Duration::from_secs(1);

/// One message on the peer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Application-level transfer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferFrame {
    Meta { name: String, size: u64 },
    Chunk(Vec<u8>),
    Finished,
}

/// JSON shape of the text control frames.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ControlFrame {
    #[serde(default, skip_serializing_if = "is_false")]
    meta: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("control frame is not JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("meta frame missing name or size")]
    IncompleteMeta,
    #[error("control frame is neither meta nor finished")]
    UnknownControl,
}

impl TransferFrame {
    pub fn encode(&self) -> ChannelFrame {
        match self {
            TransferFrame::Meta { name, size } => ChannelFrame::Text(control_json(&ControlFrame {
                meta: true,
                name: Some(name.clone()),
                size: Some(*size),
                ..Default::default()
            })),
            TransferFrame::Chunk(bytes) => ChannelFrame::Binary(bytes.clone()),
            TransferFrame::Finished => ChannelFrame::Text(control_json(&ControlFrame {
                finished: true,
                ..Default::default()
            })),
        }
    }

    pub fn decode(frame: ChannelFrame) -> Result<TransferFrame, FrameError> {
        match frame {
            ChannelFrame::Binary(bytes) => Ok(TransferFrame::Chunk(bytes)),
            ChannelFrame::Text(text) => {
                let control: ControlFrame = serde_json::from_str(&text)?;
                if control.meta {
                    match (control.name, control.size) {
                        (Some(name), Some(size)) => Ok(TransferFrame::Meta { name, size }),
                        _ => Err(FrameError::IncompleteMeta),
                    }
                } else if control.finished {
                    Ok(TransferFrame::Finished)
                } else {
                    Err(FrameError::UnknownControl)
                }
            }
        }
    }
}

fn control_json(frame: &ControlFrame) -> String {
    // Plain struct of bools, strings and integers.
    serde_json::to_string(frame).unwrap_or_default()
}

/// Sender progress after each chunk. `speed` is bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendProgress {
    pub sent: u64,
    pub total: u64,
    pub speed: u64,
}

/// Receiver progress after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveProgress {
    pub received: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    MetadataSent,
    Streaming,
    Complete,
}

/// Summary once the sender wrote `finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFile {
    pub name: String,
    pub bytes: u64,
}

/// Sender state machine. The host reads the source, hands each chunk in, and writes out the
/// frames it gets back in order.
#[derive(Debug)]
pub struct TransferSender {
    name: String,
    total: u64,
    sent: u64,
    state: SenderState,
}

impl TransferSender {
    pub fn new(name: impl Into<String>, total: u64) -> Self {
        Self {
            name: name.into(),
            total,
            sent: 0,
            state: SenderState::Idle,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// First frame of the transfer.
    pub fn start(&mut self) -> TransferFrame {
        self.state = SenderState::MetadataSent;
        TransferFrame::Meta {
            name: self.name.clone(),
            size: self.total,
        }
    }

    /// Wrap one chunk; `elapsed` is time since `start`.
    pub fn chunk(&mut self, bytes: Vec<u8>, elapsed: Duration) -> (TransferFrame, SendProgress) {
        self.state = SenderState::Streaming;
        self.sent += bytes.len() as u64;
        let progress = SendProgress {
            sent: self.sent,
            total: self.total,
            speed: speed(self.sent, elapsed),
        };
        (TransferFrame::Chunk(bytes), progress)
    }

    /// Last frame of the transfer.
    pub fn finish(&mut self) -> (TransferFrame, SentFile) {
        if self.sent != self.total {
            warn!(
                file = %self.name,
                sent = self.sent,
                declared = self.total,
                "sent byte count differs from declared size"
            );
        }
        self.state = SenderState::Complete;
        let summary = SentFile {
            name: self.name.clone(),
            bytes: self.sent,
        };
        (TransferFrame::Finished, summary)
    }
}

/// Bytes per second over `elapsed`, floored at one second, rounded to nearest.
pub fn speed(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.max(MIN_SPEED_WINDOW).as_secs_f64();
    (bytes as f64 / secs).round() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    AwaitingData,
    Streaming,
    Complete,
}

/// What the receiver reports to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    Incoming { name: String, size: u64 },
    Progress(ReceiveProgress),
    Complete { name: String, data: Vec<u8> },
}

/// Receiver state machine. Each frame is handled atomically; buffers belong to the one
/// transfer in progress and are dropped once it completes.
#[derive(Debug)]
pub struct TransferReceiver {
    state: ReceiverState,
    name: String,
    expected: u64,
    received: u64,
    buffers: Vec<Vec<u8>>,
}

impl TransferReceiver {
    pub fn new() -> Self {
        Self {
            state: ReceiverState::Idle,
            name: String::new(),
            expected: 0,
            received: 0,
            buffers: Vec::new(),
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Decode and apply one channel frame. Control frames that fail to parse are logged and
    /// dropped; the transfer carries on.
    pub fn on_frame(&mut self, frame: ChannelFrame) -> Option<ReceiveEvent> {
        match TransferFrame::decode(frame) {
            Ok(frame) => self.apply(frame),
            Err(e) => {
                warn!(error = %e, "discarding malformed control frame");
                None
            }
        }
    }

    pub fn apply(&mut self, frame: TransferFrame) -> Option<ReceiveEvent> {
        match frame {
            TransferFrame::Meta { name, size } => {
                if matches!(self.state, ReceiverState::AwaitingData | ReceiverState::Streaming) {
                    warn!(file = %self.name, "new transfer started before previous finished");
                }
                self.reset();
                self.name = name.clone();
                self.expected = size;
                self.state = ReceiverState::AwaitingData;
                debug!(file = %name, size, "incoming transfer");
                Some(ReceiveEvent::Incoming { name, size })
            }
            TransferFrame::Chunk(bytes) => {
                if !self.in_transfer() {
                    warn!(len = bytes.len(), "chunk outside a transfer discarded");
                    return None;
                }
                self.state = ReceiverState::Streaming;
                self.received += bytes.len() as u64;
                self.buffers.push(bytes);
                Some(ReceiveEvent::Progress(ReceiveProgress {
                    received: self.received,
                    total: self.expected,
                }))
            }
            TransferFrame::Finished => {
                if !self.in_transfer() {
                    warn!("finished without a transfer discarded");
                    return None;
                }
                if self.received != self.expected {
                    warn!(
                        file = %self.name,
                        received = self.received,
                        expected = self.expected,
                        "received byte count differs from declared size"
                    );
                }
                let data = self.buffers.concat();
                let name = std::mem::take(&mut self.name);
                self.reset();
                self.state = ReceiverState::Complete;
                Some(ReceiveEvent::Complete { name, data })
            }
        }
    }

    fn in_transfer(&self) -> bool {
        matches!(
            self.state,
            ReceiverState::AwaitingData | ReceiverState::Streaming
        )
    }

    fn reset(&mut self) {
        self.name.clear();
        self.expected = 0;
        self.received = 0;
        self.buffers.clear();
    }
}

impl Default for TransferReceiver {
    fn default() -> Self {
        Self::new()
    }
}

//! Async drivers running the transfer state machines over a bounded peer-channel queue.
//!
//! The host bridges the queue to the real peer channel. Capacity is the write-ready signal:
//! the sender reserves a slot before reading each chunk, so at most `capacity` frames are ever
//! waiting. Dropping either end cancels the transfer.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::transfer::{
    ChannelFrame, ReceiveEvent, ReceiverState, SendProgress, SentFile, TransferFrame,
    TransferReceiver, TransferSender, DEFAULT_CHUNK_SIZE,
};

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("peer channel closed")]
    ChannelClosed,
    #[error("source read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Bounded queue standing in for one direction of a peer channel.
pub fn peer_channel(capacity: usize) -> (mpsc::Sender<ChannelFrame>, mpsc::Receiver<ChannelFrame>) {
    mpsc::channel(capacity.max(1))
}

/// Send `size` bytes from `reader` as `name`: meta, chunks of at most `chunk_size` bytes,
/// finished. `on_progress` runs after every chunk. A `chunk_size` of 0 means the default.
pub async fn send_stream<R, F>(
    mut reader: R,
    name: &str,
    size: u64,
    chunk_size: usize,
    channel: &mpsc::Sender<ChannelFrame>,
    mut on_progress: F,
) -> Result<SentFile, TransferError>
where
    R: AsyncRead + Unpin,
    F: FnMut(SendProgress),
{
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    let mut sender = TransferSender::new(name, size);
    let started = Instant::now();
    write(channel, sender.start()).await?;
    info!(file = name, size, "sending");

    loop {
        let permit = channel
            .reserve()
            .await
            .map_err(|_| TransferError::ChannelClosed)?;
        let mut buf = vec![0u8; chunk_size];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        buf.truncate(n);
        let (frame, progress) = sender.chunk(buf, started.elapsed());
        permit.send(frame.encode());
        on_progress(progress);
    }

    let (frame, summary) = sender.finish();
    write(channel, frame).await?;
    info!(file = name, bytes = summary.bytes, "sent");
    Ok(summary)
}

async fn write(
    channel: &mpsc::Sender<ChannelFrame>,
    frame: TransferFrame,
) -> Result<(), TransferError> {
    channel
        .send(frame.encode())
        .await
        .map_err(|_| TransferError::ChannelClosed)
}

/// Feed every frame from `channel` into a receiver until the channel closes, reporting
/// events to `on_event`. Returns the number of completed transfers; a transfer cut off by
/// the close is discarded.
pub async fn receive_stream<F>(channel: &mut mpsc::Receiver<ChannelFrame>, mut on_event: F) -> usize
where
    F: FnMut(ReceiveEvent),
{
    let mut receiver = TransferReceiver::new();
    let mut completed = 0;
    while let Some(frame) = channel.recv().await {
        if let Some(event) = receiver.on_frame(frame) {
            if matches!(event, ReceiveEvent::Complete { .. }) {
                completed += 1;
            }
            on_event(event);
        }
    }
    if matches!(
        receiver.state(),
        ReceiverState::AwaitingData | ReceiverState::Streaming
    ) {
        debug!("peer channel closed mid-transfer; partial data dropped");
    }
    completed
}

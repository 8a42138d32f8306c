//! The per-connection read loop and its table of waiting requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use labnode_frame::{Fields, FrameReader, FrameWriter};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SessionError};
use crate::pool::RequestIdPool;
use crate::protocol::REQUEST_ID;

/// Where the read loop delivers the response for one request.
pub(crate) type ResponseSlot = oneshot::Sender<Result<Fields>>;

/// Messages from requesting tasks to the read loop.
#[derive(Debug)]
pub(crate) enum Command {
    /// Deliver the response carrying `id` to `slot`.
    Register { id: u8, slot: ResponseSlot },
    /// The waiter for `id` gave up; drop its slot.
    Forget(u8),
}

/// Everything the read loop needs besides the stream.
pub(crate) struct ReadLoop<R, W> {
    pub(crate) reader: FrameReader<R>,
    pub(crate) writer: Arc<Mutex<FrameWriter<W>>>,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) ids: RequestIdPool,
    pub(crate) read_error_backoff: Duration,
    pub(crate) close_timeout: Duration,
    pub(crate) peer: String,
}

impl<R, W> ReadLoop<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Read frames until the stream ends or `shutdown` fires, then tear down.
    pub(crate) async fn run(mut self) {
        let mut pending: HashMap<u8, ResponseSlot> = HashMap::new();

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!(peer = %self.peer, "read loop cancelled");
                    break;
                }
                Some(command) = self.commands.recv() => apply(&mut pending, command),
                frame = self.reader.read_frame() => match frame {
                    Ok(fields) => {
                        // A registration sent before the request was written
                        // may still be queued behind this response.
                        while let Ok(command) = self.commands.try_recv() {
                            apply(&mut pending, command);
                        }
                        dispatch(&mut pending, fields);
                    }
                    Err(err) if err.is_end_of_stream() => {
                        info!(peer = %self.peer, reason = %err, "link closed by peer");
                        break;
                    }
                    Err(err) if err.is_frame_local() => {
                        warn!(peer = %self.peer, error = %err, "dropping malformed frame");
                    }
                    Err(err) => {
                        error!(peer = %self.peer, error = %err, "read failed, backing off");
                        tokio::select! {
                            () = self.shutdown.cancelled() => break,
                            () = tokio::time::sleep(self.read_error_backoff) => {}
                        }
                    }
                },
            }
        }

        self.teardown(pending).await;
    }

    async fn teardown(mut self, mut pending: HashMap<u8, ResponseSlot>) {
        // Stop new work first: senders see a dead connection from here on.
        self.shutdown.cancel();
        self.ids.close();
        self.commands.close();

        let mut failed = 0usize;
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Register { slot, .. } = command {
                let _ = slot.send(Err(SessionError::ConnectionClosed));
                failed += 1;
            }
        }
        for (_, slot) in pending.drain() {
            let _ = slot.send(Err(SessionError::ConnectionClosed));
            failed += 1;
        }
        if failed > 0 {
            debug!(peer = %self.peer, failed, "failed outstanding requests");
        }

        let close = async {
            let mut writer = self.writer.lock().await;
            writer.close().await
        };
        match tokio::time::timeout(self.close_timeout, close).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(peer = %self.peer, error = %err, "error while closing link"),
            Err(_) => warn!(peer = %self.peer, "timed out closing link"),
        }
        info!(peer = %self.peer, "disconnected");
    }
}

fn apply(pending: &mut HashMap<u8, ResponseSlot>, command: Command) {
    match command {
        Command::Register { id, slot } => {
            if pending.insert(id, slot).is_some() {
                // Only possible if a Forget was lost; the newer waiter wins.
                warn!(id, "replaced stale waiter");
            }
        }
        Command::Forget(id) => {
            pending.remove(&id);
        }
    }
}

fn dispatch(pending: &mut HashMap<u8, ResponseSlot>, mut fields: Fields) {
    let Some(raw_id) = fields.remove(&REQUEST_ID) else {
        warn!(?fields, "dropping response without request id");
        return;
    };
    let Some(id) = raw_id.as_i64().and_then(|id| u8::try_from(id).ok()) else {
        warn!(request_id = %raw_id, "dropping response with invalid request id");
        return;
    };

    match pending.remove(&id) {
        Some(slot) => {
            if slot.send(Ok(fields)).is_err() {
                debug!(id, "waiter already gone");
            }
        }
        None => debug!(id, "no waiter for response, dropping"),
    }
}

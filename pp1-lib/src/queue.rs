//! Serializes device commands onto the single BLE request/response channel.
//!
//! The machine's read characteristic only ever holds the answer to the last
//! write, so two exchanges must never interleave. Callers submit through
//! [`CommandQueue::enqueue`]; a worker task owning the transport pops one
//! entry at a time and runs its write, settle, read cycle to completion
//! before looking at the next.
//!
//! There is no timeout on top of the transport: a read that never returns
//! stalls the worker, and everything queued behind it waits too.

use crate::command::{CommandId, encode_frame};
use crate::error::PP1Error;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, info, warn};

/// The link to the machine: one characteristic to write commands to and one
/// to read the latest response from.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Writes a framed command (write without response).
    async fn write_command(&mut self, frame: &[u8]) -> Result<(), PP1Error>;

    /// Reads the response characteristic.
    async fn read_response(&mut self) -> Result<Bytes, PP1Error>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write_command(&mut self, frame: &[u8]) -> Result<(), PP1Error> {
        (**self).write_command(frame).await
    }

    async fn read_response(&mut self) -> Result<Bytes, PP1Error> {
        (**self).read_response().await
    }
}

struct PendingCommand {
    command: CommandId,
    frame: Bytes,
    reply: oneshot::Sender<Result<Bytes, PP1Error>>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingCommand>,
    active: Option<CommandId>,
    connected: bool,
    generation: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    /// Held by the worker using the transport. A retired worker keeps it until
    /// its last exchange is read back.
    link: tokio::sync::Mutex<()>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A poisoned lock only means a holder panicked; the queue data is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// FIFO of pending device commands with a single in-flight slot.
#[derive(Clone, Default)]
pub struct CommandQueue {
    shared: Arc<Shared>,
    settle_interval: Duration,
}

impl CommandQueue {
    pub fn new(settle_interval: Duration) -> Self {
        Self {
            shared: Arc::default(),
            settle_interval,
        }
    }

    /// Hands the transport to a new worker task and starts accepting commands.
    ///
    /// Must be called from within a tokio runtime. A previously attached
    /// transport is detached first; the new worker sends nothing until the old
    /// one has finished the exchange it had in flight.
    pub fn attach<T: Transport>(&self, transport: T) {
        self.detach();
        let generation = {
            let mut state = self.shared.lock();
            state.connected = true;
            state.generation += 1;
            state.generation
        };
        info!(generation, "Transport attached, command queue running");
        let shared = Arc::clone(&self.shared);
        tokio::spawn(run_worker(shared, transport, self.settle_interval, generation));
    }

    /// Drops the transport. Commands that have not started yet fail with
    /// [`PP1Error::Disconnected`]; an exchange already in flight finishes.
    pub fn detach(&self) {
        let dropped: Vec<PendingCommand> = {
            let mut state = self.shared.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            state.generation += 1;
            state.pending.drain(..).collect()
        };
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "Disconnected with commands still queued");
        }
        for pending in dropped {
            let _ = pending.reply.send(Err(PP1Error::Disconnected));
        }
        self.shared.wake.notify_waiters();
        info!("Transport detached");
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// Number of commands waiting behind the one in flight.
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// The command currently being exchanged, if any.
    pub fn active_command(&self) -> Option<CommandId> {
        self.shared.lock().active
    }

    /// Queues a command and waits for the machine's raw response, echoed id included.
    ///
    /// A failure is reported to this caller only; the queue carries on with
    /// the next entry.
    pub async fn enqueue(&self, command: CommandId, payload: &[u8]) -> Result<Bytes, PP1Error> {
        let frame = encode_frame(command, payload);
        let (reply, response) = oneshot::channel();
        {
            let mut state = self.shared.lock();
            if !state.connected {
                return Err(PP1Error::NotConnected);
            }
            state.pending.push_back(PendingCommand { command, frame, reply });
        }
        self.shared.wake.notify_waiters();
        response.await.unwrap_or(Err(PP1Error::Disconnected))
    }
}

async fn run_worker<T: Transport>(shared: Arc<Shared>, mut transport: T, settle_interval: Duration, generation: u64) {
    let _link = shared.link.lock().await;
    loop {
        let notified = shared.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let next = {
            let mut state = shared.lock();
            // Detaching or reattaching retires this worker.
            if state.generation != generation {
                break;
            }
            let next = state.pending.pop_front();
            state.active = next.as_ref().map(|p| p.command);
            next
        };

        let Some(pending) = next else {
            notified.await;
            continue;
        };

        let result = exchange(&mut transport, &pending.frame, settle_interval).await;
        if let Err(e) = &result {
            warn!(command = ?pending.command, error = %e, "Command failed");
        }
        let _ = pending.reply.send(result);
        shared.lock().active = None;
    }
    debug!(generation, "Command queue worker stopped");
}

async fn exchange<T: Transport>(transport: &mut T, frame: &[u8], settle_interval: Duration) -> Result<Bytes, PP1Error> {
    debug!(bytes = hex::encode(frame), "BLE Write");
    transport.write_command(frame).await?;
    if !settle_interval.is_zero() {
        tokio::time::sleep(settle_interval).await;
    }
    let response = transport.read_response().await?;
    debug!(bytes = hex::encode(&response), "BLE Read");
    Ok(response)
}

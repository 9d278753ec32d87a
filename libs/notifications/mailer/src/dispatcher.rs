//! Concurrent mail dispatcher and its completion gate.
//!
//! ```text
//! submit(msg) ──spawn──▶ deliver task ──Transport::send──▶ relay
//!                             │ failure
//!                             ▼
//!                   bounded error channel ──▶ ErrorReceiver (recv / drain_to)
//!
//! wait_for_completion(): stop accepting → join every task → close channel
//! ```
//!
//! Every task owns a clone of the channel sender and the dispatcher drops its
//! own clone only after all tasks were joined, so the channel cannot close
//! while a send is still in flight. A full channel blocks the reporting task,
//! which in turn holds up `wait_for_completion` until someone drains.
//!
//! Dropping a `wait_for_completion` future (timeout, `select!`) hands the
//! unjoined tasks back to the dispatcher; sends are never aborted.

use crate::config::{MailSender, TransportConfig};
use crate::error::{MailerError, MailerResult, SendError};
use crate::message::MailMessage;
use crate::transport::{SendResult, SmtpTransport, Transport};
use core_config::FromEnv;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Dispatches messages concurrently and collects their failures.
///
/// All methods take `&self`; wrap the dispatcher in an `Arc` to share it
/// between tasks. `submit` may be called from any thread, tasks run on the
/// runtime that constructed the dispatcher.
pub struct Dispatcher<T: Transport = SmtpTransport> {
    transport: Arc<T>,
    default_sender: Arc<MailSender>,
    runtime: Handle,
    tasks: Mutex<JoinSet<()>>,
    intake: Mutex<Intake>,
    /// Held by the caller joining tasks; `true` once the channel is closed
    gate: tokio::sync::Mutex<bool>,
    errors: ErrorReceiver,
}

struct Intake {
    accepting: bool,
    /// Dropped only after every task was joined
    errors_tx: Option<mpsc::Sender<SendError>>,
}

impl Dispatcher<SmtpTransport> {
    /// Validate `config`, build the SMTP transport and probe it.
    pub async fn connect(config: &TransportConfig) -> MailerResult<Self> {
        config.validate()?;
        let transport = SmtpTransport::new(config)?;
        Self::new(transport, config.sender.clone(), config.error_channel_capacity()).await
    }

    /// [`connect`](Self::connect) using [`TransportConfig::from_env`].
    pub async fn from_env() -> MailerResult<Self> {
        let config = TransportConfig::from_env()?;
        Self::connect(&config).await
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Create a dispatcher around `transport`.
    ///
    /// Performs one liveness probe; a failing probe is a
    /// [`MailerError::Connection`] and nothing is retried.
    pub async fn new(
        transport: T,
        default_sender: MailSender,
        error_channel_capacity: usize,
    ) -> MailerResult<Self> {
        default_sender.validate()?;
        if error_channel_capacity == 0 {
            return Err(MailerError::validation(
                "error channel capacity must be at least 1",
            ));
        }

        transport.ping().await.map_err(MailerError::Connection)?;

        info!(
            transport = transport.name(),
            sender = %default_sender.address,
            error_channel_capacity,
            "Mail dispatcher ready"
        );

        let (tx, rx) = mpsc::channel(error_channel_capacity);

        Ok(Self {
            transport: Arc::new(transport),
            default_sender: Arc::new(default_sender),
            runtime: Handle::current(),
            tasks: Mutex::new(JoinSet::new()),
            intake: Mutex::new(Intake {
                accepting: true,
                errors_tx: Some(tx),
            }),
            gate: tokio::sync::Mutex::new(false),
            errors: ErrorReceiver::new(rx),
        })
    }

    /// Launch a send for `message` and return immediately.
    ///
    /// Failures are reported on the error channel, never here. Returns
    /// [`MailerError::Closed`] once [`wait_for_completion`](Self::wait_for_completion)
    /// has started; the message is then not sent.
    pub fn submit(&self, message: MailMessage) -> MailerResult<()> {
        // Held until the task is registered so the gate cannot miss it.
        let intake = lock(&self.intake);
        let Some(errors) = intake.errors_tx.as_ref().filter(|_| intake.accepting).cloned() else {
            warn!(subject = %message.subject(), "Submit after completion gate started");
            return Err(MailerError::Closed);
        };

        debug!(
            subject = %message.subject(),
            recipients = message.recipients().len(),
            "Submitting email"
        );

        let mut tasks = lock(&self.tasks);
        while let Some(finished) = tasks.try_join_next() {
            log_join_error(finished);
        }
        tasks.spawn_on(
            deliver(
                Arc::clone(&self.transport),
                Arc::clone(&self.default_sender),
                message,
                errors,
            ),
            &self.runtime,
        );
        Ok(())
    }

    /// Read-only handle on the error channel.
    pub fn errors(&self) -> ErrorReceiver {
        self.errors.clone()
    }

    /// Write every failure to `sink` until the channel is closed.
    ///
    /// See [`ErrorReceiver::drain_to`].
    pub async fn drain_to<W>(&self, sink: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        self.errors.drain_to(sink).await
    }

    /// Wait for every submitted send to finish, then close the error channel.
    ///
    /// Concurrent callers all wait for the same join; calls after it finished
    /// return immediately. Buffered errors stay readable after the channel is
    /// closed. Dropping the returned future stops waiting but not the sends,
    /// and a later call picks up where it left off.
    pub async fn wait_for_completion(&self) {
        lock(&self.intake).accepting = false;

        let mut closed = self.gate.lock().await;
        if *closed {
            return;
        }

        let mut joining = Joining::take(&self.tasks);
        let pending = joining.tasks.len();
        while let Some(finished) = joining.tasks.join_next().await {
            log_join_error(finished);
        }
        drop(joining);

        lock(&self.intake).errors_tx.take();
        *closed = true;
        debug!(pending, "All sends finished, error channel closed");
    }
}

impl<T: Transport> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        // Sends cannot be cancelled: let unfinished tasks run to completion.
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            warn!(
                pending = tasks.len(),
                "Dispatcher dropped before wait_for_completion, detaching sends"
            );
            tasks.detach_all();
        }
    }
}

/// Tasks being joined by `wait_for_completion`, returned to the dispatcher
/// when dropped.
struct Joining<'a> {
    slot: &'a Mutex<JoinSet<()>>,
    tasks: JoinSet<()>,
}

impl<'a> Joining<'a> {
    fn take(slot: &'a Mutex<JoinSet<()>>) -> Self {
        let tasks = std::mem::take(&mut *lock(slot));
        Self { slot, tasks }
    }
}

impl Drop for Joining<'_> {
    fn drop(&mut self) {
        let mut returned = std::mem::take(&mut self.tasks);
        let mut slot = lock(self.slot);
        if slot.is_empty() {
            *slot = returned;
        } else {
            returned.detach_all();
        }
    }
}

async fn deliver<T: Transport>(
    transport: Arc<T>,
    default_sender: Arc<MailSender>,
    message: MailMessage,
    errors: mpsc::Sender<SendError>,
) {
    let result: eyre::Result<SendResult> = async {
        let native = message.to_lettre(&default_sender)?;
        transport.send(native).await
    }
    .await;

    match result {
        Ok(sent) => {
            info!(
                subject = %message.subject(),
                recipients = message.recipients().len(),
                message_id = %sent.message_id,
                "Email sent successfully"
            );
        }
        Err(cause) => {
            warn!(
                subject = %message.subject(),
                recipients = message.recipients().len(),
                error = %format!("{cause:#}"),
                "Email send failed"
            );
            let report = SendError::new(&message, cause);
            if let Err(mpsc::error::SendError(lost)) = errors.send(report).await {
                error!(error = %lost, "Error channel closed while a send was in flight");
            }
        }
    }
}

fn log_join_error(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        error!(error = %e, "Send task terminated abnormally");
    }
}

fn lock<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared, read-only view of the error channel.
///
/// Clones read from the same channel; each error is delivered to exactly one
/// reader.
#[derive(Clone)]
pub struct ErrorReceiver {
    inner: Arc<tokio::sync::Mutex<mpsc::Receiver<SendError>>>,
}

impl ErrorReceiver {
    fn new(rx: mpsc::Receiver<SendError>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Next error, or `None` once the channel is closed and empty.
    pub async fn recv(&self) -> Option<SendError> {
        self.inner.lock().await.recv().await
    }

    /// Next buffered error without waiting.
    pub fn try_recv(&self) -> Option<SendError> {
        self.inner.try_lock().ok()?.try_recv().ok()
    }

    /// Read until the channel is closed, writing each error's message and a
    /// newline to `sink`. Returns the number of errors written.
    pub async fn drain_to<W>(&self, sink: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let mut drained = 0;
        while let Some(error) = self.recv().await {
            sink.write_all(format!("{error}\n").as_bytes()).await?;
            drained += 1;
        }
        sink.flush().await?;
        Ok(drained)
    }

    /// Collect every remaining error until the channel is closed.
    pub async fn collect(&self) -> Vec<SendError> {
        let mut collected = Vec::new();
        while let Some(error) = self.recv().await {
            collected.push(error);
        }
        collected
    }
}

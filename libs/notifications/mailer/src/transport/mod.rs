//! Transport implementations

pub mod mock;
pub mod smtp;

pub use mock::MockTransport;
pub use smtp::SmtpTransport;

use async_trait::async_trait;
use eyre::Result;
use lettre::Message;

/// Result of sending a message
#[derive(Debug)]
pub struct SendResult {
    /// Server-provided message ID or response line
    pub message_id: String,
}

/// Connection factory shared by every in-flight send.
///
/// Implementations open a connection per `send` and close it afterwards, so
/// no locking is needed around a shared handle.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one message
    async fn send(&self, message: Message) -> Result<SendResult>;

    /// Liveness probe: connect, then close
    async fn ping(&self) -> Result<()>;

    /// Get transport name
    fn name(&self) -> &'static str;
}

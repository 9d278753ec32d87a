//! Mock transport for testing

use super::{SendResult, Transport};
use async_trait::async_trait;
use eyre::Result;
use lettre::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
enum Failure {
    Never,
    Always(String),
    /// Fail every n-th send attempt (1-based)
    Every(usize),
}

/// Mock transport that captures sent messages.
///
/// Clones share state, so a test can keep one clone for inspection and hand
/// the other to a dispatcher.
#[derive(Clone)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<Message>>>,
    attempts: Arc<AtomicUsize>,
    failure: Failure,
    ping_failure: Option<String>,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Create a mock transport that accepts everything
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
            failure: Failure::Never,
            ping_failure: None,
            delay: None,
        }
    }

    /// Create a mock transport whose sends always fail
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Failure::Always(message.into()),
            ..Self::new()
        }
    }

    /// Create a mock transport that fails every `n`-th send attempt
    pub fn fail_every(n: usize) -> Self {
        Self {
            failure: Failure::Every(n.max(1)),
            ..Self::new()
        }
    }

    /// Make the liveness probe fail
    pub fn unreachable(mut self, message: impl Into<String>) -> Self {
        self.ping_failure = Some(message.into());
        self
    }

    /// Sleep for `delay` inside every send
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all successfully sent messages
    pub async fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().await.clone()
    }

    /// Get the count of successfully sent messages
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Number of send attempts, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Check if a message was delivered to a specific address
    pub async fn was_sent_to(&self, address: &str) -> bool {
        self.sent
            .lock()
            .await
            .iter()
            .any(|m| m.envelope().to().iter().any(|a| a.to_string() == address))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: Message) -> Result<SendResult> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.failure {
            Failure::Always(reason) => return Err(eyre::eyre!("{reason}")),
            Failure::Every(n) if attempt % n == 0 => {
                return Err(eyre::eyre!("Mock failure on attempt {attempt}"));
            }
            _ => {}
        }

        self.sent.lock().await.push(message);

        Ok(SendResult {
            message_id: format!("mock-{attempt}"),
        })
    }

    async fn ping(&self) -> Result<()> {
        match &self.ping_failure {
            Some(reason) => Err(eyre::eyre!("{reason}")),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> Message {
        Message::builder()
            .from("noreply@example.com".parse().unwrap())
            .to(to.parse().unwrap())
            .subject("Test")
            .body("Body".to_string())
            .unwrap()
    }

    #[tokio::test]
    async fn test_mock_transport_captures_messages() {
        let transport = MockTransport::new();

        let result = transport.send(message("user@example.com")).await.unwrap();
        assert_eq!(result.message_id, "mock-1");

        assert_eq!(transport.sent_count().await, 1);
        assert!(transport.was_sent_to("user@example.com").await);
        assert!(!transport.was_sent_to("other@example.com").await);
    }

    #[tokio::test]
    async fn test_mock_transport_fails() {
        let transport = MockTransport::failing("Simulated failure");

        let err = transport.send(message("user@example.com")).await.unwrap_err();
        assert!(err.to_string().contains("Simulated failure"));
        assert_eq!(transport.attempts(), 1);
        assert_eq!(transport.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_mock_transport_fail_every() {
        let transport = MockTransport::fail_every(3);

        let mut failures = 0;
        for _ in 0..9 {
            if transport.send(message("user@example.com")).await.is_err() {
                failures += 1;
            }
        }

        assert_eq!(failures, 3);
        assert_eq!(transport.sent_count().await, 6);
    }

    #[tokio::test]
    async fn test_mock_transport_unreachable_ping() {
        assert!(MockTransport::new().ping().await.is_ok());
        assert!(MockTransport::new().unreachable("refused").ping().await.is_err());
    }
}

//! SMTP transport using lettre

use super::{SendResult, Transport};
use crate::config::{TlsPolicy, TransportConfig};
use crate::error::{MailerError, MailerResult};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use lettre::{
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::debug;

/// SMTP transport handle
///
/// Built once from a [`TransportConfig`]. lettre's connection pool is not
/// enabled, so every send dials, authenticates and quits on its own.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
    port: u16,
}

impl SmtpTransport {
    /// Create the transport. No connection is opened here.
    pub fn new(config: &TransportConfig) -> MailerResult<Self> {
        let tls = Self::tls(config).map_err(MailerError::Connection)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(tls);

        if !config.username.is_empty() {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            builder = builder.credentials(creds);
        }

        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Some(Duration::from_secs(secs)));
        }

        Ok(Self {
            transport: builder.build(),
            host: config.host.clone(),
            port: config.port,
        })
    }

    fn tls(config: &TransportConfig) -> Result<Tls> {
        let parameters = || {
            TlsParameters::builder(config.host.clone())
                .dangerous_accept_invalid_certs(config.accept_invalid_certs)
                .build()
                .wrap_err("Invalid TLS parameters")
        };

        Ok(match config.tls_policy() {
            TlsPolicy::None => Tls::None,
            TlsPolicy::Opportunistic => Tls::Opportunistic(parameters()?),
            TlsPolicy::Required => Tls::Required(parameters()?),
            TlsPolicy::Wrapper => Tls::Wrapper(parameters()?),
        })
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: Message) -> Result<SendResult> {
        let response = self
            .transport
            .send(message)
            .await
            .wrap_err("Failed to send email via SMTP")?;

        let message_id = response
            .message()
            .next()
            .map(|s| s.to_string())
            .unwrap_or_default();

        Ok(SendResult { message_id })
    }

    async fn ping(&self) -> Result<()> {
        debug!(host = %self.host, port = self.port, "Probing SMTP server");
        let connected = self
            .transport
            .test_connection()
            .await
            .wrap_err_with(|| format!("SMTP connection to {}:{} failed", self.host, self.port))?;

        if !connected {
            return Err(eyre::eyre!(
                "SMTP server {}:{} did not accept the connection",
                self.host,
                self.port
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

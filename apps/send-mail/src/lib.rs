//! send-mail
//!
//! One-shot command line front end for the mail dispatcher.
//!
//! ## Flow
//!
//! ```text
//! CLI args ──▶ MailMessage::builder (validate, render template)
//!                 ↓
//! Dispatcher::connect (SMTP liveness probe, fatal on failure)
//!                 ↓ submit
//! concurrent sends ──failures──▶ error channel ──▶ stderr
//!                 ↓
//! wait_for_completion ──▶ exit status
//! ```
//!
//! Environment variables:
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
//!   `SMTP_TLS_POLICY`, `EMAIL_FROM_ADDRESS`, `EMAIL_FROM_NAME`, ...
//! - `APP_ENV`, `LOG_FILE`, `RUST_LOG` for logging

use clap::Parser;
use core_config::tracing::{fatal, install_color_eyre, Logger, LoggerConfig};
use core_config::FromEnv;
use eyre::{Result, WrapErr};
use mailer::{
    Dispatcher, MailMessage, MailSender, MailerResult, MessageSource, Transport, TransportConfig,
};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

/// Send an HTML email through the configured SMTP relay
#[derive(Debug, Parser)]
#[command(name = "send-mail", version)]
pub struct Cli {
    /// Subject line
    #[arg(long)]
    pub subject: String,

    /// Recipient address (repeatable)
    #[arg(long = "to", required = true)]
    pub recipients: Vec<String>,

    /// Literal HTML body
    #[arg(long, conflicts_with = "template", required_unless_present = "template")]
    pub text: Option<String>,

    /// Handlebars template file used as the body
    #[arg(long, requires = "data")]
    pub template: Option<PathBuf>,

    /// JSON object rendered into the template
    #[arg(long, value_parser = parse_json)]
    pub data: Option<Value>,

    /// Sender address override
    #[arg(long, requires = "from_name")]
    pub from_address: Option<String>,

    /// Sender display name override
    #[arg(long, requires = "from_address")]
    pub from_name: Option<String>,

    /// Send one message per recipient instead of a single blind-copied one
    #[arg(long)]
    pub batch: bool,
}

fn parse_json(raw: &str) -> std::result::Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

impl Cli {
    fn source(&self) -> MessageSource {
        match (&self.text, &self.template) {
            (Some(text), _) => MessageSource::Literal(text.clone()),
            (None, Some(path)) => MessageSource::Template {
                path: path.clone(),
                data: self.data.clone().unwrap_or(Value::Null),
            },
            (None, None) => MessageSource::Literal(String::new()),
        }
    }

    fn sender(&self) -> Option<MailSender> {
        match (&self.from_address, &self.from_name) {
            (Some(address), Some(name)) => Some(MailSender::new(address, name)),
            _ => None,
        }
    }

    /// Build the messages this invocation asks for.
    pub fn messages(&self) -> MailerResult<Vec<MailMessage>> {
        let groups: Vec<Vec<String>> = if self.batch {
            self.recipients.iter().map(|r| vec![r.clone()]).collect()
        } else {
            vec![self.recipients.clone()]
        };

        groups
            .into_iter()
            .map(|recipients| {
                let mut builder =
                    MailMessage::builder(&self.subject, recipients).source(self.source());
                if let Some(sender) = self.sender() {
                    builder = builder.sender(sender);
                }
                builder.build()
            })
            .collect()
    }
}

/// Run the command
///
/// Returns an error if configuration is invalid, a message cannot be built,
/// or any send failed. A transport that cannot be reached at startup
/// terminates the process.
pub async fn run() -> Result<()> {
    install_color_eyre();
    let cli = Cli::parse();

    let logger = Logger::new(&LoggerConfig::from_env()?)?;
    logger.install()?;

    let config = TransportConfig::from_env().wrap_err("Invalid SMTP configuration")?;
    let messages = cli.messages().wrap_err("Invalid message")?;

    let dispatcher = match Dispatcher::connect(&config).await {
        Ok(dispatcher) => dispatcher,
        Err(e) => fatal("Failed to start mail dispatcher", e),
    };

    execute(&dispatcher, messages).await
}

/// Submit `messages`, report failures on stderr while they happen and wait
/// for every send. Fails if any message could not be delivered.
pub async fn execute<T: Transport>(
    dispatcher: &Dispatcher<T>,
    messages: Vec<MailMessage>,
) -> Result<()> {
    let errors = dispatcher.errors();
    let drain = tokio::spawn(async move {
        let mut stderr = tokio::io::stderr();
        errors.drain_to(&mut stderr).await
    });

    let total = messages.len();
    for message in messages {
        dispatcher.submit(message)?;
    }

    dispatcher.wait_for_completion().await;
    let failed = drain.await.wrap_err("Error drain task failed")??;

    info!(total, failed, "Dispatch finished");

    if failed > 0 {
        eyre::bail!("{failed} of {total} messages could not be delivered");
    }
    Ok(())
}

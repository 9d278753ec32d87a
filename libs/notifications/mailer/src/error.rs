//! Error types for the mail dispatcher.
//!
//! Errors fall into two groups:
//! - **Synchronous**: [`MailerError`] is returned directly from construction,
//!   message building and submission. Only that operation is aborted.
//! - **Asynchronous**: [`SendError`] is produced by an in-flight send and is
//!   delivered through the dispatcher's bounded error channel, one per failed
//!   message. Sibling sends are never affected.

use crate::message::MailMessage;
use core_config::ConfigError;
use thiserror::Error;

/// Result type for mailer operations.
pub type MailerResult<T> = Result<T, MailerError>;

/// Errors returned synchronously by the mailer.
#[derive(Error, Debug)]
pub enum MailerError {
    /// The transport could not be built or failed its liveness probe
    #[error("failed to connect to email server: {0:#}")]
    Connection(eyre::Report),

    /// Malformed request or settings, correctable by the caller
    #[error("{0}")]
    Validation(String),

    /// Template could not be read, parsed or rendered
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The completion gate has started; no further messages are accepted
    #[error("dispatcher is closed, no further messages are accepted")]
    Closed,
}

impl MailerError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Template rendering failures.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to read template '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse template '{path}': {source}")]
    Parse {
        path: String,
        source: Box<handlebars::TemplateError>,
    },

    #[error("failed to execute template '{path}': {source}")]
    Render {
        path: String,
        source: Box<handlebars::RenderError>,
    },
}

/// A single failed send, delivered through the error channel.
#[derive(Error, Debug)]
#[error("failed to send {subject:?} to {}: {cause:#}", .recipients.join(", "))]
pub struct SendError {
    subject: String,
    recipients: Vec<String>,
    cause: eyre::Report,
}

impl SendError {
    pub(crate) fn new(message: &MailMessage, cause: eyre::Report) -> Self {
        Self {
            subject: message.subject().to_string(),
            recipients: message.recipients().to_vec(),
            cause,
        }
    }

    /// Subject of the message that was not delivered.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Recipients of the message that was not delivered.
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Underlying transport or message-construction failure.
    pub fn cause(&self) -> &eyre::Report {
        &self.cause
    }
}

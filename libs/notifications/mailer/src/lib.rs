//! Asynchronous outbound mail dispatcher
//!
//! Messages are built and validated up front, then handed to a [`Dispatcher`]
//! which sends each one on its own task over a shared [`Transport`]. Failed
//! sends are reported through a bounded error channel; the caller waits for
//! everything to finish with [`Dispatcher::wait_for_completion`].
//!
//! ## Components
//!
//! - **Transport**: `SmtpTransport` (lettre) and `MockTransport` for tests
//! - **Message Builder**: `MailMessage::builder` with literal or Handlebars
//!   template bodies
//! - **Dispatcher**: concurrent sends, bounded error channel, completion gate
//!
//! ## Usage
//!
//! ```ignore
//! use mailer::{Dispatcher, MailMessage, TransportConfig};
//! use core_config::FromEnv;
//!
//! let dispatcher = Dispatcher::connect(&TransportConfig::from_env()?).await?;
//! let errors = dispatcher.errors();
//! let drain = tokio::spawn(async move { errors.drain_to(&mut tokio::io::stderr()).await });
//!
//! let message = MailMessage::builder("Deploy finished", ["ops@example.com"])
//!     .text("<p>All green.</p>")
//!     .build()?;
//! dispatcher.submit(message)?;
//!
//! dispatcher.wait_for_completion().await;
//! let failed = drain.await??;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod templates;
pub mod transport;

pub use config::{MailSender, TlsPolicy, TransportConfig, DEFAULT_ERROR_CHANNEL_CAPACITY};
pub use dispatcher::{Dispatcher, ErrorReceiver};
pub use error::{MailerError, MailerResult, SendError, TemplateError};
pub use message::{Addressing, MailMessage, MailMessageBuilder, MessageSource};
pub use transport::{MockTransport, SendResult, SmtpTransport, Transport};

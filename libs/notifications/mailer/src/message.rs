//! Outbound message model and builder.
//!
//! A [`MailMessage`] can only be obtained from [`MailMessageBuilder::build`],
//! so every message handed to the dispatcher has at least one valid recipient
//! and a non-empty body.

use crate::config::MailSender;
use crate::error::{MailerError, MailerResult};
use crate::templates::render_template_file;
use eyre::{Result, WrapErr};
use lettre::message::{header::ContentType, Mailbox};
use lettre::Message;
use serde_json::Value;
use std::path::PathBuf;

/// Where the message body comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageSource {
    /// Body used verbatim
    Literal(String),
    /// Handlebars template file rendered against `data` at build time
    Template { path: PathBuf, data: Value },
}

/// Which header carries the recipients.
///
/// A single recipient is addressed directly. With more than one, every
/// recipient goes on `Bcc` so that no recipient sees the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing<'a> {
    To(&'a str),
    Bcc(&'a [String]),
}

/// A validated message ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    subject: String,
    recipients: Vec<String>,
    sender: Option<MailSender>,
    body: String,
}

impl MailMessage {
    /// Start building a message.
    pub fn builder<I, S>(subject: impl Into<String>, recipients: I) -> MailMessageBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MailMessageBuilder {
            subject: subject.into(),
            recipients: recipients.into_iter().map(Into::into).collect(),
            sender: None,
            source: None,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn sender(&self) -> Option<&MailSender> {
        self.sender.as_ref()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn addressing(&self) -> Addressing<'_> {
        match self.recipients.as_slice() {
            [single] => Addressing::To(single),
            all => Addressing::Bcc(all),
        }
    }

    /// Build the transport-native message, falling back to `default_sender`
    /// when no sender override is set.
    pub(crate) fn to_lettre(&self, default_sender: &MailSender) -> Result<Message> {
        let from = self
            .sender
            .as_ref()
            .unwrap_or(default_sender)
            .mailbox()
            .wrap_err("Invalid from address")?;

        let mut builder = Message::builder().from(from).subject(&self.subject);

        builder = match self.addressing() {
            Addressing::To(recipient) => {
                let to: Mailbox = recipient.parse().wrap_err("Invalid to address")?;
                builder.to(to)
            }
            Addressing::Bcc(recipients) => {
                for recipient in recipients {
                    let bcc: Mailbox = recipient.parse().wrap_err("Invalid BCC address")?;
                    builder = builder.bcc(bcc);
                }
                builder
            }
        };

        builder
            .header(ContentType::TEXT_HTML)
            .body(self.body.clone())
            .wrap_err("Failed to build HTML message")
    }
}

/// Builder for [`MailMessage`].
///
/// Only one body source is held at a time; setting a new one replaces the
/// previous one.
#[derive(Debug, Clone)]
pub struct MailMessageBuilder {
    subject: String,
    recipients: Vec<String>,
    sender: Option<MailSender>,
    source: Option<MessageSource>,
}

impl MailMessageBuilder {
    /// Use `text` as the body.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.source(MessageSource::Literal(text.into()))
    }

    /// Render the template at `path` with `data` as the body.
    pub fn template(self, path: impl Into<PathBuf>, data: Value) -> Self {
        self.source(MessageSource::Template {
            path: path.into(),
            data,
        })
    }

    pub fn source(mut self, source: MessageSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Override the dispatcher's default sender for this message.
    pub fn sender(mut self, sender: MailSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Validate the request and resolve the body.
    ///
    /// Templates are rendered here, once; a rendering failure is returned and
    /// nothing is scheduled.
    pub fn build(self) -> MailerResult<MailMessage> {
        if self.recipients.is_empty() {
            return Err(MailerError::validation("no recipients"));
        }
        for recipient in &self.recipients {
            recipient.parse::<Mailbox>().map_err(|e| {
                MailerError::validation(format!("invalid recipient address '{recipient}': {e}"))
            })?;
        }

        if let Some(sender) = &self.sender {
            sender.validate()?;
        }

        let body = match self.source {
            Some(MessageSource::Template { path, data }) => {
                if path.as_os_str().is_empty() {
                    return Err(MailerError::validation("template file path not set"));
                }
                if data.is_null() {
                    return Err(MailerError::validation("template data not set"));
                }
                render_template_file(&path, &data)?
            }
            Some(MessageSource::Literal(text)) => text,
            None => String::new(),
        };

        if body.is_empty() {
            return Err(MailerError::validation("body not set"));
        }

        Ok(MailMessage {
            subject: self.subject,
            recipients: self.recipients,
            sender: self.sender,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn default_sender() -> MailSender {
        MailSender::new("noreply@example.com", "Notifier")
    }

    #[test]
    fn test_single_recipient_is_addressed_directly() {
        let message = MailMessage::builder("Alert", ["alice@example.com"])
            .text("<p>disk full</p>")
            .build()
            .unwrap();

        assert_eq!(message.addressing(), Addressing::To("alice@example.com"));

        let native = message.to_lettre(&default_sender()).unwrap();
        assert!(native.headers().get_raw("To").unwrap().contains("alice@example.com"));
        assert_eq!(native.envelope().to().len(), 1);
    }

    #[test]
    fn test_multiple_recipients_are_blind_copied() {
        let recipients = ["alice@example.com", "bob@example.com", "carol@example.com"];
        let message = MailMessage::builder("Alert", recipients)
            .text("<p>disk full</p>")
            .build()
            .unwrap();

        match message.addressing() {
            Addressing::Bcc(all) => assert_eq!(all, recipients),
            other => panic!("expected Bcc addressing, got {other:?}"),
        }

        let native = message.to_lettre(&default_sender()).unwrap();
        assert!(native.headers().get_raw("To").is_none());
        let envelope: Vec<String> =
            native.envelope().to().iter().map(ToString::to_string).collect();
        assert_eq!(envelope, recipients);

        let wire = String::from_utf8(native.formatted()).unwrap();
        assert!(!wire.contains("bob@example.com"));
    }

    #[test]
    fn test_sender_override_and_default() {
        let message = MailMessage::builder("Alert", ["alice@example.com"])
            .text("body")
            .build()
            .unwrap();
        let native = message.to_lettre(&default_sender()).unwrap();
        assert!(native.headers().get_raw("From").unwrap().contains("noreply@example.com"));

        let message = MailMessage::builder("Alert", ["alice@example.com"])
            .text("body")
            .sender(MailSender::new("ops@example.com", "Ops"))
            .build()
            .unwrap();
        let native = message.to_lettre(&default_sender()).unwrap();
        let from = native.headers().get_raw("From").unwrap();
        assert!(from.contains("ops@example.com"));
        assert!(!from.contains("noreply@example.com"));
    }

    #[test]
    fn test_body_is_sent_as_html() {
        let message = MailMessage::builder("Alert", ["alice@example.com"])
            .text("<b>hi</b>")
            .build()
            .unwrap();
        let native = message.to_lettre(&default_sender()).unwrap();
        assert!(native.headers().get_raw("Content-Type").unwrap().contains("text/html"));
    }

    #[test]
    fn test_body_not_set() {
        let err = MailMessage::builder("Alert", ["alice@example.com"]).build().unwrap_err();
        assert_eq!(err.to_string(), "body not set");

        let err = MailMessage::builder("Alert", ["alice@example.com"])
            .text("")
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "body not set");
    }

    #[test]
    fn test_empty_recipients_rejected() {
        let err = MailMessage::builder("Alert", Vec::<String>::new())
            .text("body")
            .build()
            .unwrap_err();
        assert!(matches!(err, MailerError::Validation(ref m) if m == "no recipients"));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let err = MailMessage::builder("Alert", ["alice@example.com", "not an address"])
            .text("body")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not an address"));
    }

    #[test]
    fn test_invalid_sender_override_rejected() {
        let err = MailMessage::builder("Alert", ["alice@example.com"])
            .text("body")
            .sender(MailSender::new("ops@example.com", ""))
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "sender name not set");
    }

    #[test]
    fn test_template_checks_happen_before_reading() {
        let err = MailMessage::builder("Alert", ["alice@example.com"])
            .template("", json!({ "name": "Ann" }))
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "template file path not set");

        let err = MailMessage::builder("Alert", ["alice@example.com"])
            .template("/definitely/not/here.html", Value::Null)
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "template data not set");
    }

    #[test]
    fn test_template_body_rendered_eagerly() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<h1>Welcome, {{name}}!</h1>").unwrap();

        let message = MailMessage::builder("Welcome", ["alice@example.com"])
            .template(file.path(), json!({ "name": "Alice" }))
            .build()
            .unwrap();

        assert_eq!(message.body(), "<h1>Welcome, Alice!</h1>");
    }

    #[test]
    fn test_template_failure_is_template_error() {
        let err = MailMessage::builder("Welcome", ["alice@example.com"])
            .template("/definitely/not/here.html", json!({ "name": "Alice" }))
            .build()
            .unwrap_err();
        assert!(matches!(err, MailerError::Template(_)));
    }

    #[test]
    fn test_last_source_wins() {
        let message = MailMessage::builder("Alert", ["alice@example.com"])
            .template("", Value::Null)
            .text("literal wins")
            .build()
            .unwrap();
        assert_eq!(message.body(), "literal wins");
    }
}

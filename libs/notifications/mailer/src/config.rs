//! Transport configuration.
//!
//! `TransportConfig` can be deserialized from a configuration document (with
//! a nested `sender` table) or loaded from environment variables.

use crate::error::{MailerError, MailerResult};
use core_config::{env_flag, env_or_default, env_parse, env_required, ConfigError, FromEnv};
use lettre::message::Mailbox;
use lettre::Address;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Error channel capacity used when none is configured.
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 10;

const DEFAULT_SMTP_PORT: u16 = 587;
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sender identity used in the `From` header.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MailSender {
    pub address: String,
    pub name: String,
}

impl MailSender {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// Check that both fields are set and the address is well formed.
    pub fn validate(&self) -> MailerResult<()> {
        if self.address.trim().is_empty() {
            return Err(MailerError::validation("sender address not set"));
        }
        if self.name.trim().is_empty() {
            return Err(MailerError::validation("sender name not set"));
        }
        self.address.parse::<Address>().map_err(|e| {
            MailerError::validation(format!("invalid sender address '{}': {e}", self.address))
        })?;
        Ok(())
    }

    pub(crate) fn mailbox(&self) -> Result<Mailbox, lettre::address::AddressError> {
        Ok(Mailbox::new(Some(self.name.clone()), self.address.parse()?))
    }
}

/// How the SMTP session is secured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsPolicy {
    /// Plain text session (local relays such as Mailpit)
    None,
    /// Upgrade with STARTTLS when the server offers it
    Opportunistic,
    /// STARTTLS is mandatory
    Required,
    /// Implicit TLS from the first byte
    Wrapper,
}

impl TlsPolicy {
    /// Policy applied when none is configured: implicit TLS on 465, otherwise
    /// STARTTLS when available.
    pub fn for_port(port: u16) -> Self {
        if port == IMPLICIT_TLS_PORT {
            Self::Wrapper
        } else {
            Self::Opportunistic
        }
    }
}

impl FromStr for TlsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "opportunistic" => Ok(Self::Opportunistic),
            "required" => Ok(Self::Required),
            "wrapper" => Ok(Self::Wrapper),
            other => Err(format!(
                "unknown TLS policy '{other}' (expected none, opportunistic, required or wrapper)"
            )),
        }
    }
}

/// SMTP transport configuration
#[derive(Clone, Deserialize)]
pub struct TransportConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub sender: MailSender,
    #[serde(default)]
    pub tls_policy: Option<TlsPolicy>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub error_channel_capacity: Option<usize>,
}

fn default_port() -> u16 {
    DEFAULT_SMTP_PORT
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16, sender: MailSender) -> Self {
        Self {
            host: host.into(),
            port,
            username: String::new(),
            password: String::new(),
            sender,
            tls_policy: None,
            accept_invalid_certs: false,
            timeout_secs: None,
            error_channel_capacity: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.tls_policy = Some(policy);
        self
    }

    pub fn with_error_channel_capacity(mut self, capacity: usize) -> Self {
        self.error_channel_capacity = Some(capacity);
        self
    }

    /// Effective TLS policy.
    pub fn tls_policy(&self) -> TlsPolicy {
        self.tls_policy.unwrap_or_else(|| TlsPolicy::for_port(self.port))
    }

    /// Effective error channel capacity.
    pub fn error_channel_capacity(&self) -> usize {
        self.error_channel_capacity.unwrap_or(DEFAULT_ERROR_CHANNEL_CAPACITY)
    }

    /// Validate everything that can be checked without a network round trip.
    pub fn validate(&self) -> MailerResult<()> {
        self.sender.validate()?;
        if self.host.trim().is_empty() {
            return Err(MailerError::validation("SMTP host not set"));
        }
        if self.error_channel_capacity() == 0 {
            return Err(MailerError::validation("error channel capacity must be at least 1"));
        }
        Ok(())
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sender", &self.sender)
            .field("tls_policy", &self.tls_policy)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout_secs", &self.timeout_secs)
            .field("error_channel_capacity", &self.error_channel_capacity)
            .finish()
    }
}

impl FromEnv for TransportConfig {
    /// - SMTP_HOST, EMAIL_FROM_ADDRESS, EMAIL_FROM_NAME: required
    /// - SMTP_PORT: defaults to 587
    /// - SMTP_USERNAME / SMTP_PASSWORD: optional, no auth when unset
    /// - SMTP_TLS_POLICY: none | opportunistic | required | wrapper
    /// - SMTP_ACCEPT_INVALID_CERTS, SMTP_TIMEOUT_SECS,
    ///   MAILER_ERROR_CHANNEL_CAPACITY: optional
    fn from_env() -> Result<Self, ConfigError> {
        let port = env_or_default("SMTP_PORT", &DEFAULT_SMTP_PORT.to_string())
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "SMTP_PORT".to_string(),
                details: format!("{}", e),
            })?;

        Ok(Self {
            host: env_required("SMTP_HOST")?,
            port,
            username: env_or_default("SMTP_USERNAME", ""),
            password: env_or_default("SMTP_PASSWORD", ""),
            sender: MailSender {
                address: env_required("EMAIL_FROM_ADDRESS")?,
                name: env_required("EMAIL_FROM_NAME")?,
            },
            tls_policy: env_parse("SMTP_TLS_POLICY")?,
            accept_invalid_certs: env_flag("SMTP_ACCEPT_INVALID_CERTS"),
            timeout_secs: env_parse("SMTP_TIMEOUT_SECS")?,
            error_channel_capacity: env_parse("MAILER_ERROR_CHANNEL_CAPACITY")?,
        })
    }
}

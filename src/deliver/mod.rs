//! SMTP delivery client.
//!
//! Wraps lettre's blocking [`SmtpTransport`] behind a small trait so tests
//! can inject a recording transport. The connection is opened lazily on the
//! first real send, reused for the whole run, and released on drop, so a
//! partially-sent batch never leaves a dangling handle. No automatic
//! retries: the first transport or authentication failure aborts the run.

mod ratelimit;

pub use ratelimit::{Clock, RateLimiter, SystemClock};

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{SmtpTransport, Transport};
use tracing::{debug, info};

use crate::config::{SecurityMode, ServerConfig};
use crate::error::{MergeError, Result};
use crate::message::CompiledMessage;

/// Supplies the authentication secret (password or OAuth2 token).
///
/// Injected at client construction so headless tests never touch a
/// terminal. Called at most once per run, on first connection.
pub trait CredentialSource {
    fn secret(&mut self, username: &str, host: &str) -> Result<String>;
}

/// Interactive prompt on the controlling terminal, echo disabled.
pub struct PromptCredentials;

impl CredentialSource for PromptCredentials {
    fn secret(&mut self, username: &str, host: &str) -> Result<String> {
        rpassword::prompt_password(format!(">>> password for {username} on {host}: "))
            .map_err(|e| MergeError::io("<stdin>", e))
    }
}

/// A pre-supplied secret (environment variable, test fixture).
pub struct StaticCredentials {
    secret: String,
}

impl StaticCredentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn secret(&mut self, _username: &str, _host: &str) -> Result<String> {
        Ok(self.secret.clone())
    }
}

/// Transport seam: submit one serialized message to a set of recipients.
pub trait MailTransport {
    fn submit(&mut self, envelope: &Envelope, wire: &[u8]) -> Result<()>;
}

/// Production transport backed by lettre.
struct SmtpMailTransport {
    inner: SmtpTransport,
    host: String,
    port: u16,
    username: String,
}

impl MailTransport for SmtpMailTransport {
    fn submit(&mut self, envelope: &Envelope, wire: &[u8]) -> Result<()> {
        self.inner
            .send_raw(envelope, wire)
            .map(|_| ())
            .map_err(|e| classify_smtp_error(&e.to_string(), &self.host, self.port, &self.username))
    }
}

/// A client connection to an SMTP server.
///
/// One instance per run: rate-limit state and the (lazily opened)
/// connection both live here and die with it.
pub struct SendmailClient {
    config: ServerConfig,
    credentials: Box<dyn CredentialSource>,
    limiter: RateLimiter,
    transport: Option<Box<dyn MailTransport>>,
}

impl SendmailClient {
    /// Create a client. No I/O happens until the first [`send`](Self::send).
    pub fn new(config: ServerConfig, credentials: Box<dyn CredentialSource>) -> Self {
        let limiter = RateLimiter::new(config.ratelimit);
        Self {
            config,
            credentials,
            limiter,
            transport: None,
        }
    }

    /// Create a client with an already-open transport (test seam).
    pub fn with_transport(config: ServerConfig, transport: Box<dyn MailTransport>) -> Self {
        let limiter = RateLimiter::new(config.ratelimit);
        Self {
            config,
            credentials: Box::new(StaticCredentials::new("")),
            limiter,
            transport: Some(transport),
        }
    }

    /// Serialize and transmit one compiled message.
    ///
    /// Blocks on the rate limiter when the configured ceiling would be
    /// exceeded, opens the connection on first use, and propagates any
    /// transport failure without retrying.
    pub fn send(&mut self, message: &CompiledMessage) -> Result<()> {
        self.limiter.acquire();

        let envelope = envelope_for(message)?;
        let wire = message.to_wire();

        if self.transport.is_none() {
            let transport = open_transport(&self.config, self.credentials.as_mut())?;
            self.transport = Some(transport);
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.submit(&envelope, wire.as_bytes())?;
        }

        debug!(
            ordinal = message.ordinal(),
            recipients = message.recipients().len(),
            "message submitted"
        );
        Ok(())
    }
}

/// Build the SMTP envelope from a compiled message's sender/recipients.
fn envelope_for(message: &CompiledMessage) -> Result<Envelope> {
    let sender = message
        .sender()
        .parse::<lettre::Address>()
        .map_err(|e| MergeError::HeaderParse(format!("invalid sender address: {e}")))?;
    let recipients = message
        .recipients()
        .iter()
        .map(|r| {
            r.parse::<lettre::Address>()
                .map_err(|e| MergeError::HeaderParse(format!("invalid recipient '{r}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Envelope::new(Some(sender), recipients)
        .map_err(|e| MergeError::HeaderParse(format!("invalid envelope: {e}")))
}

/// Open the transport for the configured security mode and verify the
/// connection (and credentials) with a NOOP before the first message.
fn open_transport(
    config: &ServerConfig,
    credentials: &mut dyn CredentialSource,
) -> Result<Box<dyn MailTransport>> {
    let username = config.username.clone().unwrap_or_default();
    let secret = if config.security.requires_auth() {
        Some(credentials.secret(&username, &config.host)?)
    } else {
        None
    };

    let builder = SmtpTransport::builder_dangerous(config.host.as_str()).port(config.port);

    let builder = match config.security {
        SecurityMode::SslTls => builder.tls(Tls::Wrapper(tls_parameters(config)?)),
        SecurityMode::StartTls => builder.tls(Tls::Required(tls_parameters(config)?)),
        SecurityMode::Plain | SecurityMode::Xoauth | SecurityMode::Never => builder,
    };

    let builder = match (config.security, secret) {
        (SecurityMode::Xoauth, Some(token)) => builder
            .credentials(Credentials::new(username.clone(), token))
            .authentication(vec![Mechanism::Xoauth2]),
        (_, Some(password)) => builder.credentials(Credentials::new(username.clone(), password)),
        (_, None) => builder,
    };

    let transport = builder.build();

    match transport.test_connection() {
        Ok(true) => {}
        Ok(false) => {
            return Err(MergeError::Connection {
                host: config.host.clone(),
                port: config.port,
                reason: "server did not accept the connection".to_string(),
            });
        }
        Err(e) => {
            return Err(classify_smtp_error(
                &e.to_string(),
                &config.host,
                config.port,
                &username,
            ));
        }
    }

    info!(
        host = %config.host,
        port = config.port,
        security = %config.security,
        "SMTP connection established"
    );

    Ok(Box::new(SmtpMailTransport {
        inner: transport,
        host: config.host.clone(),
        port: config.port,
        username,
    }))
}

fn tls_parameters(config: &ServerConfig) -> Result<TlsParameters> {
    TlsParameters::new(config.host.clone()).map_err(|e| MergeError::Connection {
        host: config.host.clone(),
        port: config.port,
        reason: format!("TLS setup failed: {e}"),
    })
}

/// Split transport failures into authentication vs connection errors.
///
/// lettre reports both through one error type; authentication rejections
/// carry a 535 reply code or mention credentials in the server text.
fn classify_smtp_error(text: &str, host: &str, port: u16, username: &str) -> MergeError {
    let lower = text.to_lowercase();
    // The reply code is the first three-digit token; codes buried in
    // addresses or server prose must not count.
    let reply_code = text
        .split(|c: char| !c.is_ascii_digit())
        .find(|token| token.len() == 3);
    let auth_code = matches!(reply_code, Some("535") | Some("530"));
    if auth_code || lower.contains("authentication") || lower.contains("credentials") {
        MergeError::Authentication {
            host: host.to_string(),
            port,
            username: username.to_string(),
            reason: text.to_string(),
        }
    } else {
        MergeError::Connection {
            host: host.to_string(),
            port,
            reason: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::compile;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    /// Recording transport: captures every submitted envelope and wire
    /// body, optionally failing the next submission.
    struct MockTransport {
        log: Rc<RefCell<Vec<(Envelope, String)>>>,
        fail_with: Option<MergeError>,
    }

    impl MockTransport {
        fn new() -> (Self, Rc<RefCell<Vec<(Envelope, String)>>>) {
            let log = Rc::new(RefCell::new(Vec::new()));
            (
                Self {
                    log: Rc::clone(&log),
                    fail_with: None,
                },
                log,
            )
        }
    }

    impl MailTransport for MockTransport {
        fn submit(&mut self, envelope: &Envelope, wire: &[u8]) -> Result<()> {
            if let Some(err) = self.fail_with.take() {
                return Err(err);
            }
            self.log.borrow_mut().push((
                envelope.clone(),
                String::from_utf8_lossy(wire).into_owned(),
            ));
            Ok(())
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "smtp.example.com".to_string(),
            port: 25,
            security: SecurityMode::Never,
            username: None,
            ratelimit: 0,
        }
    }

    fn sample_message() -> CompiledMessage {
        compile(
            "TO: x@y.com\nCC: c@d.com\nBCC: hidden@e.com\nSUBJECT: Hi\nFROM: a@b.com\n\nHello X.",
            Path::new("."),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_send_submits_wire_and_envelope() {
        let (mock, log) = MockTransport::new();
        let mut client = SendmailClient::with_transport(test_config(), Box::new(mock));

        client.send(&sample_message()).unwrap();

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        let (envelope, wire) = &log[0];
        let recipients: Vec<String> = envelope.to().iter().map(ToString::to_string).collect();
        assert_eq!(recipients, ["x@y.com", "c@d.com", "hidden@e.com"]);
        assert!(wire.contains("To: x@y.com\r\n"));
        assert!(wire.contains("Subject: Hi\r\n"));
        // BCC goes into the envelope only, never onto the wire.
        assert!(!wire.contains("hidden@e.com"));
    }

    #[test]
    fn test_send_propagates_transport_failure() {
        let (mut mock, _log) = MockTransport::new();
        mock.fail_with = Some(MergeError::Connection {
            host: "smtp.example.com".to_string(),
            port: 25,
            reason: "connection refused".to_string(),
        });
        let mut client = SendmailClient::with_transport(test_config(), Box::new(mock));

        let err = client.send(&sample_message()).unwrap_err();
        assert!(matches!(err, MergeError::Connection { .. }));
    }

    #[test]
    fn test_injected_transport_never_prompts_for_credentials() {
        struct PanicCredentials;
        impl CredentialSource for PanicCredentials {
            fn secret(&mut self, _: &str, _: &str) -> Result<String> {
                panic!("credentials must not be requested when a transport is injected");
            }
        }

        let (mock, log) = MockTransport::new();
        let mut client = SendmailClient {
            config: test_config(),
            credentials: Box::new(PanicCredentials),
            limiter: RateLimiter::new(0),
            transport: Some(Box::new(mock)),
        };

        client.send(&sample_message()).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_classify_auth_errors() {
        let err = classify_smtp_error("535 5.7.8 Invalid credentials", "h", 587, "alice");
        assert!(matches!(err, MergeError::Authentication { .. }));

        let err = classify_smtp_error("authentication failed", "h", 587, "alice");
        assert!(matches!(err, MergeError::Authentication { .. }));

        let err = classify_smtp_error("connection refused", "h", 587, "alice");
        assert!(matches!(err, MergeError::Connection { .. }));

        // A 535 inside an address must not count as an auth code.
        let err = classify_smtp_error("550 mailbox user535@example.com unavailable", "h", 25, "");
        assert!(matches!(err, MergeError::Connection { .. }));
    }

    #[test]
    fn test_static_credentials() {
        let mut creds = StaticCredentials::new("hunter2");
        assert_eq!(creds.secret("alice", "host").unwrap(), "hunter2");
    }
}

//! Outbound email: the send boundary used by the dispatcher and its SMTP
//! implementation.

use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::{Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::entry::Recipient;
use crate::{Error, ErrorKind, Result};

pub mod list;
pub mod template;

pub use template::{render, Rendered, Template};

/// Result of a single send attempt as reported by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum SendOutcome {
    Sent,
    Failed(String),
}

impl SendOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Send boundary.
///
/// Expected failures (rejected address, bad credentials) are reported as
/// `SendOutcome::Failed`. An `Err` is treated as an unexpected fault of the
/// transport.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, recipient: &Recipient, template: &Template) -> Result<SendOutcome>;
}

pub async fn send_async(message: Message, config: &crate::config::Email) -> Result<()> {
    let creds = Credentials::new(config.smtp_user.clone(), config.smtp_password.clone());

    // Open a remote connection to mail server
    let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    // Send the email
    let response = mailer.send(message).await?;
    if response.is_positive() {
        Ok(())
    } else {
        Err(ErrorKind::Other(format!(
            "smtp server responded with {}",
            response.code()
        ))
        .into())
    }
}

/// Builds the personalized message for a recipient.
pub fn message(
    recipient: &Recipient,
    template: &Template,
    config: &crate::config::Email,
) -> Result<Message> {
    let rendered = render(template, recipient);

    let from: Mailbox = if config.from_name.is_empty() {
        config.address.parse()
    } else {
        format!("{} <{}>", config.from_name, config.address).parse()
    }
    .map_err(|e: AddressError| Error::new(ErrorKind::EmailParseError(e.to_string())))?;
    let to: Mailbox = recipient
        .email
        .parse()
        .map_err(|e: AddressError| Error::new(ErrorKind::EmailParseError(e.to_string())))?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(rendered.subject)
        .multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(strip_tags(&rendered.body)))
                .singlepart(SinglePart::html(rendered.body)),
        )?;
    Ok(message)
}

/// Crude plain-text alternative for the html body.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => (),
        }
    }
    out.trim().to_string()
}

/// Sends through the configured SMTP relay.
#[derive(Clone, Debug)]
pub struct SmtpSender {
    config: crate::config::Email,
}

impl SmtpSender {
    pub fn new(config: crate::config::Email) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Sender for SmtpSender {
    async fn send(&self, recipient: &Recipient, template: &Template) -> Result<SendOutcome> {
        let message = match message(recipient, template, &self.config) {
            Ok(m) => m,
            // A bad recipient address is an expected per-entry failure.
            Err(Error {
                kind: ErrorKind::EmailParseError(e),
                ..
            }) => return Ok(SendOutcome::failed(format!("invalid address: {e}"))),
            Err(e) => return Err(e),
        };

        match send_async(message, &self.config).await {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(e) => match e.kind {
                ErrorKind::LettreSmtpError(e) => Ok(SendOutcome::failed(describe_smtp(&e))),
                ErrorKind::Other(msg) => Ok(SendOutcome::Failed(msg)),
                kind => Err(kind.into()),
            },
        }
    }
}

/// Message for a failed smtp exchange. Rejected logins are worded so that
/// they read as credential problems.
fn describe_smtp(e: &lettre::transport::smtp::Error) -> String {
    match e.status() {
        Some(code) if code.to_string() == "535" || code.to_string() == "534" => {
            format!("authentication failed, check smtp credentials: {e}")
        }
        _ => e.to_string(),
    }
}

/// Sender that only logs what would be sent. Used for dry runs and in dev
/// mode.
#[derive(Clone, Debug, Default)]
pub struct LogSender;

#[async_trait]
impl Sender for LogSender {
    async fn send(&self, recipient: &Recipient, template: &Template) -> Result<SendOutcome> {
        let rendered = render(template, recipient);
        tracing::info!(
            to = %recipient.email,
            subject = %rendered.subject,
            body_len = rendered.body.len(),
            "dry run, not sending"
        );
        Ok(SendOutcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_config() -> crate::config::Email {
        crate::config::Email {
            address: "news@shop.com".to_string(),
            from_name: "Shop".to_string(),
            ..Default::default()
        }
    }

    fn recipient(email: &str) -> Recipient {
        Recipient {
            email: email.to_string(),
            image_link: "http://img/1.png".to_string(),
            name: Some("Ann".to_string()),
        }
    }

    #[test]
    fn message_is_personalized() {
        let template = Template::new("Hi {{name}}", "<p><img src=\"{{imageLink}}\"></p>");
        let message = message(&recipient("ann@x.com"), &template, &email_config()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Hi Ann"));
        assert!(raw.contains("To: ann@x.com"));
        assert!(raw.contains("http://img/1.png"));
    }

    #[test]
    fn bad_address_is_parse_error() {
        let template = Template::new("s", "b");
        let err = message(&recipient("not an address"), &template, &email_config()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::EmailParseError(_)));
    }

    #[test]
    fn strips_markup() {
        assert_eq!(strip_tags("<p>Hello <b>Ann</b></p>"), "Hello Ann");
    }

    #[tokio::test]
    async fn smtp_sender_reports_bad_address_as_failure() {
        let sender = SmtpSender::new(email_config());
        let outcome = sender
            .send(&recipient("nope"), &Template::new("s", "b"))
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Failed(msg) if msg.starts_with("invalid address")));
    }

    #[tokio::test]
    async fn log_sender_always_sends() {
        let outcome = LogSender
            .send(&recipient("a@x.com"), &Template::new("s", "b"))
            .await
            .unwrap();
        assert!(outcome.is_sent());
    }
}

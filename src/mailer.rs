#![cfg(feature = "web")]

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use std::sync::Arc;

use crate::config::SmtpConfig;
use crate::error::{AppError, Result};

pub const WELCOME_SUBJECT: &str = "Welcome to Big Picture Ideas";

const WELCOME_TEXT: &str = "Welcome to Big Picture Ideas!\n\n\
You'll receive one powerful idea to improve clarity and thinking.\n\n\
No spam. No noise. Just perspective.\n\n\
- Big Picture Ideas";

const WELCOME_HTML: &str = r#"<html>
  <body style="font-family: Arial, sans-serif; color:#333;">
    <h2>Welcome to Big Picture Ideas</h2>
    <p>You'll receive <b>one powerful idea</b> to improve clarity and thinking.</p>
    <p>No spam. No noise. Just perspective.</p>
    <p>- <b>Big Picture Ideas</b></p>
  </body>
</html>"#;

/// Anything able to greet a new subscriber
pub trait WelcomeMailer: Send + Sync {
    fn send_welcome(&self, to_email: &str) -> Result<()>;
}

/// Welcome mails over an implicit-TLS SMTP relay
pub struct Mailer {
    smtp: SmtpTransport,
    sender: String,
}

impl Mailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let tls_parameters =
            TlsParameters::new(config.host.clone()).map_err(|e| AppError::Mail(e.to_string()))?;

        let smtp = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::Mail(e.to_string()))?
            .credentials(creds)
            .port(config.port)
            .tls(Tls::Wrapper(tls_parameters))
            .build();

        Ok(Mailer {
            smtp,
            sender: config.sender.clone(),
        })
    }
}

impl WelcomeMailer for Mailer {
    fn send_welcome(&self, to_email: &str) -> Result<()> {
        let email = Message::builder()
            .from(
                self.sender
                    .parse::<Mailbox>()
                    .map_err(|e| AppError::Mail(e.to_string()))?,
            )
            .to(to_email
                .parse::<Mailbox>()
                .map_err(|e| AppError::Mail(e.to_string()))?)
            .subject(WELCOME_SUBJECT)
            .multipart(MultiPart::alternative_plain_html(
                WELCOME_TEXT.to_string(),
                WELCOME_HTML.to_string(),
            ))
            .map_err(|e| AppError::Mail(e.to_string()))?;

        self.smtp
            .send(&email)
            .map_err(|e| AppError::Mail(e.to_string()))?;
        Ok(())
    }
}

/// Build the mailer from optional settings; `None` means mail is switched off
pub fn from_config(config: Option<&SmtpConfig>) -> Option<Arc<dyn WelcomeMailer>> {
    let config = config?;
    match Mailer::new(config) {
        Ok(mailer) => Some(Arc::new(mailer)),
        Err(e) => {
            log::warn!("Welcome mailer disabled: {}", e);
            None
        }
    }
}

/// Send the welcome mail on a blocking thread without waiting for it
///
/// Delivery problems are logged and never reach the subscriber.
pub fn send_welcome_in_background(mailer: Option<Arc<dyn WelcomeMailer>>, to_email: String) {
    let Some(mailer) = mailer else {
        log::info!("Mailer not configured. Skipping welcome email to {}", to_email);
        return;
    };

    tokio::task::spawn_blocking(move || match mailer.send_welcome(&to_email) {
        Ok(()) => log::info!("Welcome email sent to {}", to_email),
        Err(e) => log::warn!("Welcome email to {} failed but user subscribed: {}", to_email, e),
    });
}

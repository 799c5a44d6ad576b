//! Report delivery over SMTP.
//!
//! [`render_subject`] and [`render_html`] are pure; [`Mailer`] owns the
//! SMTP settings and password and sends a rendered [`Report`].

mod render;

use std::time::Duration;

use chrono::{Local, NaiveDate};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{info, instrument};

use jobagent_shared::{EmailConfig, JobAgentError, Report, Result, read_secret};

pub use render::{render_html, render_subject};

/// Port on which SMTP is spoken over implicit TLS; every other port uses STARTTLS.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends reports to the configured recipient.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: EmailConfig,
    password: String,
}

impl Mailer {
    /// Build a mailer, reading the SMTP password from `config.password_env`.
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let password = read_secret(&config.password_env)?;
        Self::new(config.clone(), password)
    }

    /// Build a mailer with an explicit password.
    pub fn new(config: EmailConfig, password: String) -> Result<Self> {
        for (field, value) in [
            ("smtp_server", &config.smtp_server),
            ("username", &config.username),
            ("recipient", &config.recipient),
        ] {
            if value.trim().is_empty() {
                return Err(JobAgentError::config(format!(
                    "email.{field} is not set in the config file"
                )));
            }
        }
        Ok(Self { config, password })
    }

    /// Compose the message for `report`, dated `date`.
    pub fn compose(&self, report: &Report, date: NaiveDate) -> Result<Message> {
        let from: Mailbox = self
            .config
            .username
            .parse()
            .map_err(|e| JobAgentError::Email(format!("invalid sender address: {e}")))?;
        let to: Mailbox = self
            .config
            .recipient
            .parse()
            .map_err(|e| JobAgentError::Email(format!("invalid recipient address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(render_subject(date))
            .header(ContentType::TEXT_HTML)
            .body(render_html(report)?)
            .map_err(|e| JobAgentError::Email(format!("failed to build message: {e}")))
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let server = self.config.smtp_server.as_str();
        let builder = if self.config.smtp_port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(server)
        } else {
            SmtpTransport::starttls_relay(server)
        }
        .map_err(|e| JobAgentError::Email(format!("{server}: {e}")))?;

        Ok(builder
            .port(self.config.smtp_port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(self.config.timeout_secs)))
            .build())
    }

    /// Render and send `report`. Blocking SMTP I/O runs off the async runtime.
    #[instrument(skip_all, fields(to = %self.config.recipient, port = self.config.smtp_port))]
    pub async fn send(&self, report: &Report) -> Result<()> {
        let message = self.compose(report, Local::now().date_naive())?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| JobAgentError::Email(format!("send task failed: {e}")))?
            .map_err(|e| JobAgentError::Email(format!("SMTP send failed: {e}")))?;

        info!(
            matched = report.matched_jobs.len(),
            other = report.other_jobs.len(),
            "report email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobagent_shared::MatchOutcome;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_server: "smtp.example.com".into(),
            smtp_port: 465,
            username: "agent@example.com".into(),
            password_env: "JOBAGENT_TEST_SMTP_PASSWORD_UNSET".into(),
            recipient: "me@example.com".into(),
            timeout_secs: 10,
        }
    }

    #[test]
    fn missing_recipient_is_config_error() {
        let mut cfg = config();
        cfg.recipient = "  ".into();
        let err = Mailer::new(cfg, "pw".into()).unwrap_err();
        assert!(matches!(err, JobAgentError::Config { .. }));
        assert!(err.to_string().contains("email.recipient"));
    }

    #[test]
    fn missing_password_env_is_error() {
        assert!(Mailer::from_config(&config()).is_err());
    }

    #[test]
    fn compose_sets_html_content_type() {
        let mailer = Mailer::new(config(), "pw".into()).unwrap();
        let report = Report::new(Utc::now(), "summary".into(), MatchOutcome::default());
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();

        let message = mailer.compose(&report, date).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("me@example.com"));
    }

    #[test]
    fn bad_sender_address_is_email_error() {
        let mut cfg = config();
        cfg.username = "not an address".into();
        let mailer = Mailer::new(cfg, "pw".into()).unwrap();
        let report = Report::new(Utc::now(), String::new(), MatchOutcome::default());
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert!(matches!(
            mailer.compose(&report, date),
            Err(JobAgentError::Email(_))
        ));
    }

    #[test]
    fn both_tls_modes_build_transport() {
        let mailer = Mailer::new(config(), "pw".into()).unwrap();
        assert!(mailer.transport().is_ok());

        let mut cfg = config();
        cfg.smtp_port = 587;
        let mailer = Mailer::new(cfg, "pw".into()).unwrap();
        assert!(mailer.transport().is_ok());
    }
}

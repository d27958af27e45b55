use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailSettings;
use crate::error::{ReportError, ReportResult};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A fully composed report email, independent of the transport.
#[derive(Debug, Clone)]
pub struct ReportEmail {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

#[derive(Debug)]
pub enum DeliveryOutcome {
    Sent { recipients: Vec<String> },
    Failed { error: ReportError },
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent { .. })
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, email: &ReportEmail) -> ReportResult<()>;
}

pub fn subject_for(date: NaiveDate) -> String {
    format!("Epic Work Items Report for {}", date.format("%Y-%m-%d"))
}

pub fn html_body(date: NaiveDate) -> String {
    let date = date.format("%Y-%m-%d");
    format!(
        r#"<html>
    <body>
        <h2>Epic Work Items Report for {date}</h2>
        <p>Dear Team,</p>
        <p>Please find the attached <strong>Epic Work Items Report</strong> for {date}. This report provides a detailed overview of the progress of various epic work items, including their states and priorities.</p>
        <p>We encourage you to review the report and use the insights to plan your tasks and priorities effectively. If you have any questions or need further clarification, please feel free to reach out to the project manager.</p>
        <p>Best regards,</p>
        <p>Your Team</p>
    </body>
</html>
"#
    )
}

/// Read the report at `path` and wrap it into an email dated `date`.
pub fn compose(
    path: &Path,
    sender: &str,
    recipients: &[String],
    date: NaiveDate,
) -> ReportResult<ReportEmail> {
    let attachment = std::fs::read(path)?;
    let attachment_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "epics.xlsx".to_string());

    Ok(ReportEmail {
        sender: sender.to_string(),
        recipients: recipients.to_vec(),
        subject: subject_for(date),
        html_body: html_body(date),
        attachment_name,
        attachment,
    })
}

/// Compose and deliver the report. Never fails: delivery problems come back
/// as [`DeliveryOutcome::Failed`] so the report on disk stays a valid result.
pub async fn send_report(
    mailer: &dyn Mailer,
    path: &Path,
    sender: &str,
    recipients: &[String],
    date: NaiveDate,
) -> DeliveryOutcome {
    let email = match compose(path, sender, recipients, date) {
        Ok(email) => email,
        Err(e) => {
            return DeliveryOutcome::Failed {
                error: ReportError::Delivery(format!("could not attach {}: {e}", path.display())),
            }
        }
    };

    match mailer.deliver(&email).await {
        Ok(()) => {
            tracing::info!(recipients = %recipients.join(", "), "report emailed");
            DeliveryOutcome::Sent {
                recipients: recipients.to_vec(),
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "report email not delivered");
            let error = match e {
                ReportError::Delivery(_) => e,
                other => ReportError::Delivery(other.to_string()),
            };
            DeliveryOutcome::Failed { error }
        }
    }
}

fn mailbox(address: &str) -> ReportResult<Mailbox> {
    address
        .parse()
        .map_err(|e| ReportError::Delivery(format!("invalid address '{address}': {e}")))
}

/// Turn a [`ReportEmail`] into a multipart MIME message: HTML body plus the
/// workbook as a base64 attachment.
pub fn build_message(email: &ReportEmail) -> ReportResult<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&email.sender)?)
        .subject(email.subject.clone());
    for recipient in &email.recipients {
        builder = builder.to(mailbox(recipient)?);
    }

    let content_type = ContentType::parse(XLSX_CONTENT_TYPE)
        .map_err(|e| ReportError::Delivery(format!("bad attachment content type: {e}")))?;
    let attachment =
        Attachment::new(email.attachment_name.clone()).body(email.attachment.clone(), content_type);

    builder
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::html(email.html_body.clone()))
                .singlepart(attachment),
        )
        .map_err(|e| ReportError::Delivery(format!("could not build message: {e}")))
}

/// SMTP submission over STARTTLS, authenticated as the sender.
pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Credentials,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(settings: &MailSettings) -> Self {
        Self {
            host: settings.smtp_host.clone(),
            port: settings.smtp_port,
            credentials: Credentials::new(settings.sender.clone(), settings.password.clone()),
            timeout: settings.timeout,
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: &ReportEmail) -> ReportResult<()> {
        let message = build_message(email)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| ReportError::Delivery(format!("relay {}: {e}", self.host)))?
            .port(self.port)
            .credentials(self.credentials.clone())
            .timeout(Some(self.timeout))
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| ReportError::Delivery(format!("{}:{}: {e}", self.host, self.port)))?;
        Ok(())
    }
}

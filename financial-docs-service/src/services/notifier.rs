//! "Send to client" notification fired when a document enters `sent`.

use crate::config::SmtpConfig;
use crate::error::NotifyError;
use crate::export::PdfExporter;
use crate::models::money::format_money;
use crate::models::{DocumentKind, FinancialDocument};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::atomic::{AtomicU64, Ordering};

#[async_trait]
pub trait DocumentNotifier: Send + Sync {
    /// Deliver `document` to its client.
    async fn document_sent(&self, document: &FinancialDocument) -> Result<(), NotifyError>;
}

/// Logs instead of delivering. Used when SMTP is disabled.
pub struct LogNotifier;

#[async_trait]
impl DocumentNotifier for LogNotifier {
    async fn document_sent(&self, document: &FinancialDocument) -> Result<(), NotifyError> {
        tracing::info!(
            document_id = %document.id(),
            document_number = %document.document_number(),
            to = %document.header().client_email,
            "Document marked as sent; email delivery disabled"
        );
        Ok(())
    }
}

/// Emails the client with the exported PDF attached.
pub struct SmtpNotifier {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    exporter: PdfExporter,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig, exporter: PdfExporter) -> Result<Self, NotifyError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Configuration(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport,
            exporter,
        })
    }

    fn body(document: &FinancialDocument) -> String {
        let header = document.header();
        let totals = document.totals();
        let amount = format!(
            "{} {}",
            document.currency(),
            format_money(totals.total_amount, document.minor_units())
        );

        match document.kind() {
            DocumentKind::Invoice => format!(
                "Dear {},\n\nPlease find attached invoice {} for {}, due on {}.\n",
                header.client_name,
                document.document_number(),
                amount,
                header.due_date
            ),
            DocumentKind::Quotation => format!(
                "Dear {},\n\nPlease find attached quotation {} for {}, valid until {}.\n",
                header.client_name,
                document.document_number(),
                amount,
                header.due_date
            ),
        }
    }
}

#[async_trait]
impl DocumentNotifier for SmtpNotifier {
    async fn document_sent(&self, document: &FinancialDocument) -> Result<(), NotifyError> {
        let from_mailbox: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| NotifyError::Configuration(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = document
            .header()
            .client_email
            .parse()
            .map_err(|e| NotifyError::InvalidRecipient(format!("Invalid recipient: {}", e)))?;

        let exported = self.exporter.export(document)?;
        let pdf_type = ContentType::parse("application/pdf")
            .map_err(|e| NotifyError::Delivery(format!("Invalid content type: {}", e)))?;

        let subject = format!(
            "{} {}",
            document.kind().display_name(),
            document.document_number()
        );

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(Self::body(document)),
                    )
                    .singlepart(Attachment::new(exported.filename).body(exported.bytes, pdf_type)),
            )
            .map_err(|e| NotifyError::Delivery(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(format!("Failed to send email: {}", e)))?;

        tracing::info!(
            document_id = %document.id(),
            to = %document.header().client_email,
            "Document emailed to client"
        );

        Ok(())
    }
}

/// Counts deliveries; optionally fails every one.
pub struct MockNotifier {
    fail: bool,
    send_count: AtomicU64,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            fail: false,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentNotifier for MockNotifier {
    async fn document_sent(&self, document: &FinancialDocument) -> Result<(), NotifyError> {
        self.send_count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NotifyError::Delivery(format!(
                "[MOCK] delivery of {} refused",
                document.document_number()
            )));
        }
        tracing::info!(
            document_number = %document.document_number(),
            "[MOCK] Document would be sent"
        );
        Ok(())
    }
}

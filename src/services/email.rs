//! Email service for provisioning hand-offs and notifications

use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::{LineItem, ResourceRequest},
};

#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn provisioning_mailbox(&self) -> &str {
        &self.config.provisioning_mailbox
    }

    /// Ask the provisioning team to create the mailboxes of an approved request
    pub async fn send_provisioning_request(&self, request: &ResourceRequest) -> AppResult<()> {
        let subject = format!("Email account request #{} approved", request.id);

        let accounts: Vec<String> = request
            .items
            .iter()
            .filter_map(|item| match item {
                LineItem::EmailAccount {
                    proposed_address,
                    display_name,
                    group_email,
                } => Some(match group_email {
                    Some(group) => format!("- {} <{}> (group: {})", display_name, proposed_address, group),
                    None => format!("- {} <{}>", display_name, proposed_address),
                }),
                LineItem::Equipment { .. } => None,
            })
            .collect();

        let body = format!(
            r#"
Request #{id} has been approved and is waiting for provisioning.

Accounts to create:
{accounts}

Purpose: {purpose}

Report the outcome on the request once the accounts exist.
"#,
            id = request.id,
            accounts = accounts.join("\n"),
            purpose = request.purpose.as_deref().unwrap_or("-"),
        );

        self.send_email(self.provisioning_mailbox(), &subject, &body).await
    }

    /// Generic email sending function
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("HR Desk");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) = (
            &self.config.smtp_username,
            &self.config.smtp_password,
        ) {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        let mailer = mailer_builder.build();

        // The SMTP transport blocks; keep it off the async workers
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

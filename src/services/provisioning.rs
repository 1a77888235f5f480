//! Hand-off of approved email applications to the provisioning team

use async_trait::async_trait;

use crate::{error::AppResult, models::ResourceRequest};

use super::email::EmailService;

/// Collaborator that takes over an approved email application.
///
/// The outcome comes back later through `report_provisioning`; an error here
/// only means the hand-off itself failed.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn request_provisioning(&self, request: &ResourceRequest) -> AppResult<()>;
}

/// Notifies the provisioning mailbox by email
#[derive(Clone)]
pub struct MailProvisioner {
    email: EmailService,
}

impl MailProvisioner {
    pub fn new(email: EmailService) -> Self {
        Self { email }
    }
}

#[async_trait]
impl Provisioner for MailProvisioner {
    async fn request_provisioning(&self, request: &ResourceRequest) -> AppResult<()> {
        tracing::info!(
            request_id = request.id,
            mailbox = self.email.provisioning_mailbox(),
            "Handing email request to provisioning"
        );
        self.email.send_provisioning_request(request).await
    }
}

use std::sync::Arc;

use revhub_core::{CoreError, CoreResult};
use revhub_storage::ReviewRepository;
use serde::Serialize;
use tracing::info;

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, presented: &str) -> bool;
}

#[derive(Clone, Default)]
pub struct SharedSecretVerifier {
    secret: Option<String>,
}

impl SharedSecretVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }
}

impl CredentialVerifier for SharedSecretVerifier {
    fn verify(&self, presented: &str) -> bool {
        self.secret.as_deref() == Some(presented)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialCheck {
    Missing,
    Invalid,
    Valid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalChange {
    pub id: String,
    pub approved: bool,
}

#[derive(Clone)]
pub struct ApprovalGate {
    repo: Arc<dyn ReviewRepository>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl ApprovalGate {
    pub fn new(repo: Arc<dyn ReviewRepository>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { repo, verifier }
    }

    pub fn check(&self, presented: Option<&str>) -> CredentialCheck {
        match presented {
            None | Some("") => CredentialCheck::Missing,
            Some(key) if self.verifier.verify(key) => CredentialCheck::Valid,
            Some(_) => CredentialCheck::Invalid,
        }
    }

    pub fn authorize(&self, presented: Option<&str>) -> CoreResult<()> {
        match self.check(presented) {
            CredentialCheck::Valid => Ok(()),
            _ => Err(CoreError::Unauthorized),
        }
    }

    pub async fn set_approval(
        &self,
        presented: Option<&str>,
        id: &str,
        approved: bool,
    ) -> CoreResult<ApprovalChange> {
        self.authorize(presented)?;
        let review = self
            .repo
            .set_approval(id, approved)
            .await?
            .ok_or_else(|| CoreError::not_found("review", id))?;
        info!(id = %review.id, approved = review.approved, "review moderation changed");
        Ok(ApprovalChange {
            id: review.id,
            approved: review.approved,
        })
    }
}

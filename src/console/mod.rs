pub mod client;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::limiter::Limiter;
use crate::role::Role;

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ConsoleError {
    #[error("Console returned HTTP {status}: {message}")]
    #[diagnostic(code(permsync::console::remote))]
    Remote { status: u16, message: String },

    #[error("Console request failed: {0}")]
    #[diagnostic(code(permsync::console::transport))]
    Transport(String),

    #[error("Unexpected console response: {0}")]
    #[diagnostic(code(permsync::console::decode))]
    Decode(String),
}

/// A console account, whether or not it belongs to any organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleUser {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgSummary {
    pub id: i64,
    pub name: String,
}

/// Membership of a user in one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgUser {
    pub user_id: i64,
    pub email: String,
    #[serde(default)]
    pub login: String,
    pub role: Role,
}

/// Read and write access to console organizations.
#[async_trait]
pub trait ConsoleProvider: Send + Sync {
    async fn list_all_users(&self) -> Result<Vec<ConsoleUser>, ConsoleError>;

    async fn list_orgs(&self) -> Result<Vec<OrgSummary>, ConsoleError>;

    async fn list_org_users(&self, org_id: i64) -> Result<Vec<OrgUser>, ConsoleError>;

    async fn add_org_user(&self, org_id: i64, email: &str, role: Role) -> Result<(), ConsoleError>;

    async fn remove_org_user(&self, org_id: i64, user_id: i64) -> Result<(), ConsoleError>;

    async fn update_org_user(&self, org_id: i64, user_id: i64, role: Role)
        -> Result<(), ConsoleError>;
}

/// Console wrapper that makes every call wait for a token from the shared
/// console API limiter first.
#[derive(Clone)]
pub struct RateLimitedConsole {
    inner: Arc<dyn ConsoleProvider>,
    limiter: Limiter,
}

impl RateLimitedConsole {
    pub fn new(inner: Arc<dyn ConsoleProvider>, limiter: Limiter) -> Self {
        Self { inner, limiter }
    }

    pub async fn list_all_users(&self) -> Result<Vec<ConsoleUser>, ConsoleError> {
        self.limiter.until_ready().await;
        self.inner.list_all_users().await
    }

    pub async fn list_orgs(&self) -> Result<Vec<OrgSummary>, ConsoleError> {
        self.limiter.until_ready().await;
        self.inner.list_orgs().await
    }

    pub async fn list_org_users(&self, org_id: i64) -> Result<Vec<OrgUser>, ConsoleError> {
        self.limiter.until_ready().await;
        self.inner.list_org_users(org_id).await
    }

    pub async fn add_org_user(&self, org_id: i64, email: &str, role: Role) -> Result<(), ConsoleError> {
        self.limiter.until_ready().await;
        self.inner.add_org_user(org_id, email, role).await
    }

    pub async fn remove_org_user(&self, org_id: i64, user_id: i64) -> Result<(), ConsoleError> {
        self.limiter.until_ready().await;
        self.inner.remove_org_user(org_id, user_id).await
    }

    pub async fn update_org_user(
        &self,
        org_id: i64,
        user_id: i64,
        role: Role,
    ) -> Result<(), ConsoleError> {
        self.limiter.until_ready().await;
        self.inner.update_org_user(org_id, user_id, role).await
    }
}

use async_trait::async_trait;
use miette::Diagnostic;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::settings::DirectorySettings;

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum DirectoryError {
    #[error("Not found: {0}")]
    #[diagnostic(code(permsync::directory::not_found))]
    NotFound(String),

    #[error("Permission denied: {0}")]
    #[diagnostic(
        code(permsync::directory::permission_denied),
        help("The directory token must be allowed to read group memberships")
    )]
    PermissionDenied(String),

    #[error("Directory request failed: {0}")]
    #[diagnostic(code(permsync::directory::transient))]
    Transient(String),
}

/// Kind of a group member as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemberKind {
    User,
    Group,
    Other(String),
}

impl From<String> for MemberKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "USER" => MemberKind::User,
            "GROUP" => MemberKind::Group,
            _ => MemberKind::Other(value),
        }
    }
}

impl From<MemberKind> for String {
    fn from(value: MemberKind) -> Self {
        match value {
            MemberKind::User => "USER".to_string(),
            MemberKind::Group => "GROUP".to_string(),
            MemberKind::Other(s) => s,
        }
    }
}

/// A direct member of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MemberKind,
    #[serde(default)]
    pub email: String,
}

impl Member {
    pub fn user(email: &str) -> Self {
        Self {
            id: email.to_string(),
            kind: MemberKind::User,
            email: email.to_string(),
        }
    }

    pub fn group(email: &str) -> Self {
        Self {
            id: email.to_string(),
            kind: MemberKind::Group,
            email: email.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(default)]
    pub name: String,
    pub email: String,
}

/// Read access to the identity directory.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    /// Direct members of a group (nested groups are not expanded).
    async fn list_members(&self, group_key: &str) -> Result<Vec<Member>, DirectoryError>;

    /// Groups that contain the given user.
    async fn list_user_groups(&self, user_key: &str) -> Result<Vec<GroupSummary>, DirectoryError>;
}

/// Directory provider speaking the Admin Directory REST API.
pub struct HttpDirectory {
    client: Client,
    base_url: String,
    domain: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembersPage {
    #[serde(default)]
    members: Vec<Member>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupsPage {
    #[serde(default)]
    groups: Vec<GroupSummary>,
    next_page_token: Option<String>,
}

impl HttpDirectory {
    pub fn new(settings: &DirectorySettings) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| DirectoryError::Transient(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            domain: settings.domain.clone(),
            access_token: settings.access_token.clone().unwrap_or_default(),
        })
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        subject: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| DirectoryError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::NOT_FOUND => DirectoryError::NotFound(subject.to_string()),
                StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                    DirectoryError::PermissionDenied(format!("{subject}: {body}"))
                }
                _ => DirectoryError::Transient(format!("{subject}: HTTP {status}: {body}")),
            });
        }

        response
            .json()
            .await
            .map_err(|e| DirectoryError::Transient(format!("{subject}: invalid response: {e}")))
    }
}

#[async_trait]
impl DirectoryProvider for HttpDirectory {
    async fn list_members(&self, group_key: &str) -> Result<Vec<Member>, DirectoryError> {
        let url = format!(
            "{}/groups/{}/members",
            self.base_url,
            urlencoding::encode(group_key)
        );

        let mut members = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("includeDerivedMembership", "false")];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: MembersPage = self.get_page(group_key, &url, &query).await?;
            members.extend(page.members);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(members)
    }

    async fn list_user_groups(&self, user_key: &str) -> Result<Vec<GroupSummary>, DirectoryError> {
        let url = format!("{}/groups", self.base_url);

        let mut groups = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("domain", self.domain.as_str()), ("userKey", user_key)];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: GroupsPage = self.get_page(user_key, &url, &query).await?;
            groups.extend(page.groups);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(groups)
    }
}

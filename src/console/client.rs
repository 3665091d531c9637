use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::console::{ConsoleError, ConsoleProvider, ConsoleUser, OrgSummary, OrgUser};
use crate::role::Role;
use crate::settings::ConsoleSettings;

const PAGE_SIZE: usize = 1000;

/// Console provider speaking the Grafana HTTP API with basic auth.
pub struct HttpConsole {
    client: Client,
    base_url: String,
    user: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

impl HttpConsole {
    pub fn new(settings: &ConsoleSettings) -> Result<Self, ConsoleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ConsoleError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            user: settings.user.clone(),
            password: settings.password.clone().unwrap_or_default(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ConsoleError> {
        let response = request
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| ConsoleError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiMessage>(&body)
            .map(|m| m.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(body);
        Err(ConsoleError::Remote {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConsoleError> {
        let response = self.send(self.client.get(self.url(path))).await?;
        response
            .json()
            .await
            .map_err(|e| ConsoleError::Decode(format!("{path}: {e}")))
    }

    /// Fetch every page of a `perpage`/`page` paginated listing.
    async fn get_all_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ConsoleError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let batch: Vec<T> = self
                .get_json(&format!("{path}?perpage={PAGE_SIZE}&page={page}"))
                .await?;
            let len = batch.len();
            items.extend(batch);
            if len < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(items)
    }
}

#[async_trait]
impl ConsoleProvider for HttpConsole {
    async fn list_all_users(&self) -> Result<Vec<ConsoleUser>, ConsoleError> {
        self.get_all_pages("/api/users").await
    }

    async fn list_orgs(&self) -> Result<Vec<OrgSummary>, ConsoleError> {
        self.get_all_pages("/api/orgs").await
    }

    async fn list_org_users(&self, org_id: i64) -> Result<Vec<OrgUser>, ConsoleError> {
        self.get_json(&format!("/api/orgs/{org_id}/users")).await
    }

    async fn add_org_user(&self, org_id: i64, email: &str, role: Role) -> Result<(), ConsoleError> {
        let body = json!({ "loginOrEmail": email, "role": role });
        self.send(
            self.client
                .post(self.url(&format!("/api/orgs/{org_id}/users")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn remove_org_user(&self, org_id: i64, user_id: i64) -> Result<(), ConsoleError> {
        self.send(
            self.client
                .delete(self.url(&format!("/api/orgs/{org_id}/users/{user_id}"))),
        )
        .await?;
        Ok(())
    }

    async fn update_org_user(
        &self,
        org_id: i64,
        user_id: i64,
        role: Role,
    ) -> Result<(), ConsoleError> {
        let body = json!({ "role": role });
        self.send(
            self.client
                .patch(self.url(&format!("/api/orgs/{org_id}/users/{user_id}")))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

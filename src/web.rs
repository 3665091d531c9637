//! Admin HTTP endpoints: liveness, readiness and directory introspection.
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use miette::IntoDiagnostic;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::groups::directory::{DirectoryError, DirectoryProvider, GroupSummary, MemberKind};
use crate::sync::SyncStatus;

/// Nesting limit for recursive group listings.
pub const MAX_DEPTH: usize = 5;

#[derive(Clone)]
pub struct AdminState {
    pub status: Arc<SyncStatus>,
    pub directory: Arc<dyn DirectoryProvider>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub plans_created: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_plan_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupQuery {
    #[serde(default)]
    pub recurse: bool,
}

/// One member in a group listing. Sub-groups carry their own members when
/// listed recursively, or the error that prevented it.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MemberView {
    pub email: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<MemberView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupListing {
    pub group: String,
    pub items: Vec<MemberView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserGroups {
    pub user: String,
    pub groups: Vec<GroupSummary>,
}

struct ApiError(DirectoryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DirectoryError::NotFound(_) => StatusCode::NOT_FOUND,
            DirectoryError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            DirectoryError::Transient(_) => StatusCode::BAD_GATEWAY,
        };
        let body = json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/alive", get(alive))
        .route("/admin/ready", get(ready))
        .route("/admin/groups/{email}", get(group_members))
        .route("/admin/users/{email}", get(user_groups))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: &str, state: AdminState) -> miette::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "Admin API listening");
    axum::serve(listener, router(state)).await.into_diagnostic()?;
    Ok(())
}

async fn alive() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn ready(State(state): State<AdminState>) -> impl IntoResponse {
    let body = ReadyResponse {
        ready: state.status.is_ready(),
        plans_created: state.status.plans_created(),
        last_plan_at: state.status.last_plan_at(),
    };
    let status = if body.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn group_members(
    State(state): State<AdminState>,
    Path(email): Path<String>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<GroupListing>, ApiError> {
    let depth = if query.recurse { MAX_DEPTH } else { 0 };
    let items = list_members(state.directory.as_ref(), email.clone(), depth, vec![])
        .await
        .map_err(ApiError)?;
    Ok(Json(GroupListing { group: email, items }))
}

async fn user_groups(
    State(state): State<AdminState>,
    Path(email): Path<String>,
) -> Result<Json<UserGroups>, ApiError> {
    let groups = state
        .directory
        .list_user_groups(&email)
        .await
        .map_err(ApiError)?;
    Ok(Json(UserGroups {
        user: email,
        groups,
    }))
}

type Listing<'a> = Pin<Box<dyn Future<Output = Result<Vec<MemberView>, DirectoryError>> + Send + 'a>>;

/// List the direct members of `key`, descending `depth` more levels into
/// sub-groups. `path` holds the groups above `key` and stops cycles.
fn list_members(
    directory: &dyn DirectoryProvider,
    key: String,
    depth: usize,
    path: Vec<String>,
) -> Listing<'_> {
    Box::pin(async move {
        let members = directory.list_members(&key).await?;
        let mut path = path;
        path.push(key);

        let mut items = Vec::with_capacity(members.len());
        for member in members {
            let mut view = MemberView {
                email: member.email.clone(),
                kind: String::from(member.kind.clone()),
                items: None,
                error: None,
            };
            if member.kind == MemberKind::Group && depth > 0 {
                if path.contains(&member.email) {
                    view.error = Some("cycle".to_string());
                } else {
                    match list_members(directory, member.email, depth - 1, path.clone()).await {
                        Ok(sub) => view.items = Some(sub),
                        Err(err) => view.error = Some(err.to_string()),
                    }
                }
            }
            items.push(view);
        }
        Ok(items)
    })
}

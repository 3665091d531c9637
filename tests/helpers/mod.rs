//! Fake remote services for integration tests.
#![allow(dead_code)]

use permsync::settings::{ConsoleSettings, DirectorySettings};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CONSOLE_USER: &str = "admin";
pub const CONSOLE_PASSWORD: &str = "secret";
pub const DIRECTORY_TOKEN: &str = "dir-token";

pub fn console_settings(server: &MockServer) -> ConsoleSettings {
    ConsoleSettings {
        url: server.uri(),
        user: CONSOLE_USER.to_string(),
        password: Some(CONSOLE_PASSWORD.to_string()),
        requests_per_second: 0,
        ..Default::default()
    }
}

pub fn directory_settings(server: &MockServer) -> DirectorySettings {
    DirectorySettings {
        base_url: server.uri(),
        domain: "x".to_string(),
        access_token: Some(DIRECTORY_TOKEN.to_string()),
        ..Default::default()
    }
}

pub fn members_path(group_key: &str) -> String {
    format!("/groups/{}/members", urlencoding::encode(group_key))
}

/// Serve a single page of direct members. `members` are `(type, email)` pairs.
pub async fn mount_group(server: &MockServer, group_key: &str, members: &[(&str, &str)]) {
    let members: Vec<Value> = members
        .iter()
        .map(|(kind, email)| json!({ "id": email, "type": kind, "email": email }))
        .collect();
    Mock::given(method("GET"))
        .and(path(members_path(group_key)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "members": members })))
        .mount(server)
        .await;
}

/// Serve console users, organizations and memberships. Memberships are
/// `(user id, email, role)`.
pub async fn mount_console(
    server: &MockServer,
    users: &[(i64, &str)],
    orgs: &[(i64, &str, Vec<(i64, &str, &str)>)],
) {
    let user_list: Vec<Value> = users
        .iter()
        .map(|(id, email)| json!({ "id": id, "email": email, "login": email }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_list))
        .mount(server)
        .await;

    let org_list: Vec<Value> = orgs
        .iter()
        .map(|(id, name, _)| json!({ "id": id, "name": name }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(org_list))
        .mount(server)
        .await;

    for (org_id, _, members) in orgs {
        let body: Vec<Value> = members
            .iter()
            .map(|(user_id, email, role)| {
                json!({ "orgId": org_id, "userId": user_id, "email": email, "login": email, "role": role })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/api/orgs/{org_id}/users")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

mod helpers;

use helpers::*;
use permsync::console::client::HttpConsole;
use permsync::console::{ConsoleError, ConsoleProvider};
use permsync::groups::directory::{DirectoryError, DirectoryProvider, HttpDirectory, MemberKind};
use permsync::role::Role;
use serde_json::{json, Value};
use wiremock::matchers::{basic_auth, bearer_token, body_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_console_lists_all_user_pages() {
    let server = MockServer::start().await;

    let first: Vec<Value> = (0..1000)
        .map(|i| json!({ "id": i, "email": format!("u{i}@x"), "login": format!("u{i}") }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(query_param("page", "1"))
        .and(basic_auth(CONSOLE_USER, CONSOLE_PASSWORD))
        .respond_with(ResponseTemplate::new(200).set_body_json(first))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "id": 1000, "email": "last@x", "login": "last" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let console = HttpConsole::new(&console_settings(&server)).unwrap();
    let users = console.list_all_users().await.unwrap();
    assert_eq!(users.len(), 1001);
    assert_eq!(users[1000].email, "last@x");
}

#[tokio::test]
async fn test_console_org_users() {
    let server = MockServer::start().await;
    mount_console(
        &server,
        &[(7, "a@x")],
        &[(2, "Platform", vec![(7, "a@x", "Editor")])],
    )
    .await;

    let console = HttpConsole::new(&console_settings(&server)).unwrap();
    let orgs = console.list_orgs().await.unwrap();
    assert_eq!(orgs[0].name, "Platform");

    let members = console.list_org_users(2).await.unwrap();
    assert_eq!(members[0].user_id, 7);
    assert_eq!(members[0].role, Role::Editor);
}

#[tokio::test]
async fn test_console_writes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orgs/2/users"))
        .and(body_json(json!({ "loginOrEmail": "a@x", "role": "Viewer" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "User added to organization" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/orgs/2/users/7"))
        .and(body_json(json!({ "role": "Admin" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/orgs/2/users/8"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let console = HttpConsole::new(&console_settings(&server)).unwrap();
    console.add_org_user(2, "a@x", Role::Viewer).await.unwrap();
    console.update_org_user(2, 7, Role::Admin).await.unwrap();
    console.remove_org_user(2, 8).await.unwrap();
}

#[tokio::test]
async fn test_console_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/orgs/2/users"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({ "message": "User is already member of this organization" })),
        )
        .mount(&server)
        .await;

    let console = HttpConsole::new(&console_settings(&server)).unwrap();
    let err = console.add_org_user(2, "a@x", Role::Viewer).await.unwrap_err();
    match err {
        ConsoleError::Remote { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "User is already member of this organization");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_directory_members_follow_page_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(members_path("eng@x")))
        .and(bearer_token(DIRECTORY_TOKEN))
        .and(query_param("includeDerivedMembership", "false"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "members": [{ "id": "1", "type": "USER", "email": "a@x" }],
            "nextPageToken": "p2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(members_path("eng@x")))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "members": [{ "id": "2", "type": "GROUP", "email": "sre@x" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let directory = HttpDirectory::new(&directory_settings(&server)).unwrap();
    let members = directory.list_members("eng@x").await.unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].kind, MemberKind::User);
    assert_eq!(members[1].kind, MemberKind::Group);
    assert_eq!(members[1].email, "sre@x");
}

#[tokio::test]
async fn test_directory_error_mapping() {
    let server = MockServer::start().await;
    for (key, status) in [("gone@x", 404), ("secret@x", 403), ("flaky@x", 503)] {
        Mock::given(method("GET"))
            .and(path(members_path(key)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let directory = HttpDirectory::new(&directory_settings(&server)).unwrap();
    assert!(matches!(
        directory.list_members("gone@x").await,
        Err(DirectoryError::NotFound(_))
    ));
    assert!(matches!(
        directory.list_members("secret@x").await,
        Err(DirectoryError::PermissionDenied(_))
    ));
    assert!(matches!(
        directory.list_members("flaky@x").await,
        Err(DirectoryError::Transient(_))
    ));
}

#[tokio::test]
async fn test_directory_user_groups() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups"))
        .and(query_param("domain", "x"))
        .and(query_param("userKey", "a@x"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "groups": [
                { "name": "Engineering", "email": "eng@x" },
                { "name": "Everyone", "email": "all@x" }
            ]
        })))
        .mount(&server)
        .await;

    let directory = HttpDirectory::new(&directory_settings(&server)).unwrap();
    let groups = directory.list_user_groups("a@x").await.unwrap();
    let emails: Vec<&str> = groups.iter().map(|g| g.email.as_str()).collect();
    assert_eq!(emails, vec!["eng@x", "all@x"]);
}

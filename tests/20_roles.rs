mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn plain_user_is_forbidden_from_admin_routes() -> Result<()> {
    let server = common::spawn_server().await?;
    let (_, session) = server.user("user@example.com", Some("user"));

    let res = server.get("admin/users").bearer_auth(&session.access_token).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Forbidden");
    assert_eq!(body["message"], "Insufficient permissions");
    assert_eq!(body["code"], "FORBIDDEN");
    Ok(())
}

#[tokio::test]
async fn defaulted_user_is_forbidden_not_unauthorized() -> Result<()> {
    let server = common::spawn_server().await?;
    let (_, session) = server.user("norow@example.com", None);

    let res = server.get("admin/users").bearer_auth(&session.access_token).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn unauthenticated_admin_request_is_401() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server.get("admin/users").send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn manager_lists_users_newest_first() -> Result<()> {
    let server = common::spawn_server().await?;
    let (first, _) = server.user("first@example.com", Some("user"));
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (manager, session) = server.user("manager@example.com", Some("manager"));

    let res = server.get("admin/users").bearer_auth(&session.access_token).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .map(|rows| rows.iter().filter_map(|r| r["id"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(ids, vec![manager.id.as_str(), first.id.as_str()]);
    Ok(())
}

#[tokio::test]
async fn manager_cannot_change_roles() -> Result<()> {
    let server = common::spawn_server().await?;
    let (target, _) = server.user("target@example.com", Some("user"));
    let (_, session) = server.user("manager@example.com", Some("manager"));

    let res = server
        .put(&format!("admin/users/{}/role", target.id))
        .bearer_auth(&session.access_token)
        .json(&json!({ "role": "admin" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(server.profiles.snapshot(&target.id).map(|p| p.role), Some("user".to_string()));
    Ok(())
}

#[tokio::test]
async fn admin_role_change_applies_on_next_request() -> Result<()> {
    let server = common::spawn_server().await?;
    let (target, target_session) = server.user("target@example.com", Some("user"));
    let (_, admin_session) = server.user("admin@example.com", Some("admin"));

    let res = server
        .get("admin/users")
        .bearer_auth(&target_session.access_token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server
        .put(&format!("admin/users/{}/role", target.id))
        .bearer_auth(&admin_session.access_token)
        .json(&json!({ "role": "manager" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["role"], "manager");

    // Same token, new role: nothing is cached between requests
    let res = server
        .get("admin/users")
        .bearer_auth(&target_session.access_token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn unknown_role_is_bad_request() -> Result<()> {
    let server = common::spawn_server().await?;
    let (target, _) = server.user("target@example.com", Some("user"));
    let (_, session) = server.user("admin@example.com", Some("admin"));

    let res = server
        .put(&format!("admin/users/{}/role", target.id))
        .bearer_auth(&session.access_token)
        .json(&json!({ "role": "superuser" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn missing_user_is_not_found() -> Result<()> {
    let server = common::spawn_server().await?;
    let (_, session) = server.user("admin@example.com", Some("admin"));

    let res = server
        .get("admin/users/00000000-0000-0000-0000-000000000000")
        .bearer_auth(&session.access_token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server
        .put("admin/users/00000000-0000-0000-0000-000000000000/role")
        .bearer_auth(&session.access_token)
        .json(&json!({ "role": "user" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

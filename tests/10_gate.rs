mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn missing_header_is_rejected_without_provider_call() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server.get("auth/whoami").send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "No valid authorization token provided");
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(server.provider.verify_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_schemes_are_rejected_without_provider_call() -> Result<()> {
    let server = common::spawn_server().await?;

    for header in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer    ", "bearer abc", "Token abc"] {
        let res = server
            .get("auth/whoami")
            .header("Authorization", header)
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "header {:?}", header);
    }
    assert_eq!(server.provider.verify_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn stored_role_is_attached_to_request() -> Result<()> {
    let server = common::spawn_server().await?;
    let (identity, session) = server.user("counsellor@example.com", Some("counsellor"));

    let res = server
        .get("auth/whoami")
        .bearer_auth(&session.access_token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["user"]["id"], identity.id.as_str());
    assert_eq!(body["user"]["email"], "counsellor@example.com");
    assert_eq!(body["user"]["role"], "counsellor");
    Ok(())
}

#[tokio::test]
async fn absent_role_record_defaults_to_user() -> Result<()> {
    let server = common::spawn_server().await?;
    let (identity, session) = server.user("fresh@example.com", None);

    let body: Value = server
        .get("auth/whoami")
        .bearer_auth(&session.access_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["user"]["role"], "user");
    // The gate resolves the default without writing a row
    assert!(server.profiles.snapshot(&identity.id).is_none());
    Ok(())
}

#[tokio::test]
async fn expired_token_is_rejected_before_role_lookup() -> Result<()> {
    let server = common::spawn_server().await?;
    let (_, session) = server.user("expired@example.com", Some("admin"));
    server.provider.expire_access_token(&session.access_token);

    let res = server
        .get("auth/whoami")
        .bearer_auth(&session.access_token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body: Value = res.json().await?;
    assert_eq!(body["message"], "Invalid or expired token");
    assert_eq!(server.provider.verify_calls(), 1);
    assert_eq!(server.profiles.get_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn role_store_failure_is_internal_error() -> Result<()> {
    let server = common::spawn_server().await?;
    let (_, session) = server.user("u@example.com", Some("admin"));
    server.profiles.set_failing(true);

    let res = server
        .get("auth/whoami")
        .bearer_auth(&session.access_token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Internal Server Error");
    assert_eq!(body["message"], "Error fetching user profile");
    assert!(!body["message"].as_str().unwrap_or_default().contains("memory store"));
    Ok(())
}

#[tokio::test]
async fn repeated_requests_resolve_identically() -> Result<()> {
    let server = common::spawn_server().await?;
    let (_, session) = server.user("same@example.com", Some("manager"));

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let body: Value = server
            .get("auth/whoami")
            .bearer_auth(&session.access_token)
            .send()
            .await?
            .json()
            .await?;
        bodies.push(body);
    }
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    // Role is read fresh on every request
    assert_eq!(server.profiles.get_calls(), 3);
    Ok(())
}

#[tokio::test]
async fn health_reports_store_status() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server.http.get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["profiles"], "ok");

    server.profiles.set_failing(true);
    let res = server.http.get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn unknown_route_is_json_404_with_security_headers() -> Result<()> {
    let server = common::spawn_server().await?;

    let res = server.get("does/not/exist").send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        res.headers().get("x-content-type-options").and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );
    assert_eq!(res.headers().get("x-frame-options").and_then(|v| v.to_str().ok()), Some("DENY"));
    assert_eq!(
        res.headers().get("x-xss-protection").and_then(|v| v.to_str().ok()),
        Some("1; mode=block")
    );
    assert_eq!(
        res.headers().get("permissions-policy").and_then(|v| v.to_str().ok()),
        Some("geolocation=(), microphone=(), camera=()")
    );
    let csp = res
        .headers()
        .get("content-security-policy")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(csp.contains("frame-ancestors 'none'"), "csp {:?}", csp);
    // HTTPS is not required in development
    assert!(res.headers().get("strict-transport-security").is_none());

    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["message"], "Route /api/v1/does/not/exist not found");
    Ok(())
}

#[tokio::test]
async fn root_describes_service() -> Result<()> {
    let server = common::spawn_server().await?;

    let body: Value = server.http.get(&server.base_url).send().await?.json().await?;
    assert_eq!(body["name"], "U-Recover API");
    assert!(body["endpoints"]["admin"].as_str().unwrap_or_default().contains("/api/v1/admin"));
    Ok(())
}

#[tokio::test]
async fn api_requests_beyond_budget_get_429() -> Result<()> {
    let server = common::spawn_server_with(|c| {
        c.rate_limit.enabled = true;
        c.rate_limit.window_ms = 60_000;
        c.rate_limit.max_requests = 3;
    })
    .await?;
    let (_, session) = server.user("busy@example.com", Some("user"));

    for _ in 0..3 {
        let res = server.get("auth/whoami").bearer_auth(&session.access_token).send().await?;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = server.get("auth/whoami").bearer_auth(&session.access_token).send().await?;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().get("retry-after").is_some());
    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Too Many Requests");
    assert_eq!(body["message"], "Too many requests from this IP, please try again later.");
    let retry_after = body["retryAfter"].as_u64().expect("retryAfter is a number");
    assert!((1..=60).contains(&retry_after), "retryAfter {}", retry_after);

    // Rejected before the gate runs
    assert_eq!(server.provider.verify_calls(), 3);

    // Health and root sit outside the API prefix
    let res = server.http.get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn credential_endpoints_have_a_stricter_budget() -> Result<()> {
    let server = common::spawn_server_with(|c| {
        c.rate_limit.enabled = true;
        c.rate_limit.window_ms = 60_000;
        c.rate_limit.max_requests = 100;
        c.rate_limit.auth_max_requests = 2;
    })
    .await?;
    server.user("guess@example.com", None);

    for _ in 0..2 {
        let res = server
            .post("auth/signin")
            .json(&json!({ "email": "guess@example.com", "password": "wrong" }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let res = server
        .post("auth/signin")
        .json(&json!({ "email": "guess@example.com", "password": "password123" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "Too many authentication attempts, please try again later.");

    // Refresh is only under the general budget
    let res = server
        .post("auth/refresh")
        .json(&json!({ "refreshToken": "unknown" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

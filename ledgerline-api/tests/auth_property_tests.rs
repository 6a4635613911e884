//! Property-Based Tests for Authentication Enforcement
//!
//! For any request to `/api/v1`, a missing or invalid bearer token yields
//! 401, and a valid token without the route's capability yields 403.

mod support;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use proptest::prelude::*;
use support::Harness;
use tower::ServiceExt;

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

/// Role names that grant nothing on the connection routes.
fn arb_unrelated_roles() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![
            Just("erp:read".to_string()),
            Just("credentials:test".to_string()),
            Just("tenants:manage".to_string()),
            Just("admin".to_string()),
            "[a-z]{1,10}",
        ],
        0..4,
    )
    .prop_filter("must not grant connection access", |roles| {
        roles
            .iter()
            .all(|r| r != "super_admin" && !r.starts_with("connections:"))
    })
}

async fn status_for(h: &Harness, header: Option<String>) -> StatusCode {
    let mut builder = Request::builder().method("GET").uri("/api/v1/connections/stats");
    if let Some(value) = header {
        builder = builder.header("authorization", value);
    }
    let request = builder.body(Body::empty()).expect("request");
    h.app
        .clone()
        .oneshot(request)
        .await
        .expect("response")
        .status()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_garbage_authorization_is_unauthorized(value in "[ -~]{0,64}") {
        let rt = test_runtime();
        rt.block_on(async {
            let h = Harness::new();
            let status = status_for(&h, Some(value)).await;
            prop_assert_eq!(status, StatusCode::UNAUTHORIZED);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_foreign_signature_is_unauthorized(user in "[a-z]{1,12}") {
        let rt = test_runtime();
        rt.block_on(async {
            let h = Harness::new();
            let foreign = ledgerline_api::AuthConfig::with_secret(
                "some-other-secret-entirely-0123456789",
                std::sync::Arc::new(ledgerline_api::FixedClock(support::NOW)),
            );
            let token = ledgerline_api::generate_jwt_token(
                &foreign,
                user,
                None,
                vec!["super_admin".to_string()],
            )
            .expect("token");
            let status = status_for(&h, Some(format!("Bearer {}", token))).await;
            prop_assert_eq!(status, StatusCode::UNAUTHORIZED);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_missing_capability_is_forbidden(roles in arb_unrelated_roles()) {
        let rt = test_runtime();
        rt.block_on(async {
            let h = Harness::new();
            let refs: Vec<&str> = roles.iter().map(String::as_str).collect();
            let token = h.token(&refs, None);
            let status = status_for(&h, Some(format!("Bearer {}", token))).await;
            prop_assert_eq!(status, StatusCode::FORBIDDEN);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[tokio::test]
async fn test_no_header_is_unauthorized() {
    let h = Harness::new();
    assert_eq!(status_for(&h, None).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_capability_or_super_admin_passes() {
    let h = Harness::new();
    for roles in [&["connections:read"][..], &["super_admin"][..]] {
        let token = h.token(roles, None);
        let status = status_for(&h, Some(format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::OK);
    }
}

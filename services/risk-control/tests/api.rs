// HTTP-level tests against the in-memory stores.

use actix_web::{
    body::to_bytes,
    dev::Service,
    http::{header::AUTHORIZATION, StatusCode},
    test, App,
};
use chrono::{Duration, NaiveDate, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use risk_control::{
    activity::InMemoryActivityMetrics,
    app::{self, AppServices, RouteGuards},
    middleware::AdminClaims,
    models::{Restriction, RiskControlRecord, RiskState, TimedLevel},
    policy::RiskPolicy,
    store::{InMemoryRiskControlStore, RiskControlStore},
    StubPaymentProcessor,
};
use serde_json::{json, Value};
use std::sync::Arc;

const CRON_SECRET: &str = "cron-test-secret";
const JWT_SECRET: &str = "jwt-test-secret";

struct Harness {
    services: AppServices,
    guards: RouteGuards,
    store: InMemoryRiskControlStore,
    activity: InMemoryActivityMetrics,
}

impl Harness {
    async fn new(records: Vec<RiskControlRecord>) -> Self {
        Self::with_rate(records, 1000).await
    }

    async fn with_rate(records: Vec<RiskControlRecord>, per_minute: u32) -> Self {
        let store = InMemoryRiskControlStore::with_records(records).await;
        let activity = InMemoryActivityMetrics::new();
        let services = AppServices::new(
            Arc::new(store.clone()),
            Arc::new(activity.clone()),
            Arc::new(StubPaymentProcessor),
            RiskPolicy::default(),
        );
        let guards = RouteGuards::new("x-cron-secret", CRON_SECRET, JWT_SECRET, per_minute);
        Harness {
            services,
            guards,
            store,
            activity,
        }
    }

    /// Sends the request and returns status plus JSON body, whether the response
    /// came from a handler or a rejecting middleware.
    async fn send(&self, req: test::TestRequest) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new().configure(|cfg| app::configure(cfg, &self.services, &self.guards)),
        )
        .await;

        let response = match app.call(req.to_request()).await {
            Ok(resp) => resp.into_parts().1,
            Err(err) => err.error_response(),
        };
        let status = response.status();
        let body = to_bytes(response.into_body()).await.unwrap_or_default();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }
}

fn admin_token(role: &str) -> String {
    let claims = AdminClaims {
        sub: "ops@example.com".to_string(),
        role: role.to_string(),
        exp: (Utc::now().timestamp() + 600) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

fn timed(user: &str, level: TimedLevel, release_in: Duration) -> RiskControlRecord {
    RiskControlRecord::new(
        user,
        RiskState::Restricted(Restriction::Timed {
            level,
            auto_release_at: Some(Utc::now() + release_in),
        }),
        Utc::now() - Duration::days(1),
    )
}

fn locked(user: &str) -> RiskControlRecord {
    RiskControlRecord::new(
        user,
        RiskState::Restricted(Restriction::Locked),
        Utc::now() - Duration::days(100),
    )
}

fn yesterday() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(1)
}

// ===== /risk/check =====

#[actix_web::test]
async fn test_check_unknown_user_is_allowed() {
    let h = Harness::new(vec![]).await;
    let (status, body) = h
        .send(test::TestRequest::post().uri("/risk/check").set_json(json!({"userId": "u1"})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"allowed": true}));
}

#[actix_web::test]
async fn test_check_restricted_user_reports_level_and_timer() {
    let h = Harness::new(vec![timed("u1", TimedLevel::Elevated, Duration::hours(5))]).await;
    let (status, body) = h
        .send(test::TestRequest::post().uri("/risk/check").set_json(json!({"userId": "u1"})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "restricted");
    assert_eq!(body["level"], 2);
    assert!(body["autoReleaseAt"].is_string());
}

#[actix_web::test]
async fn test_check_missing_user_id_is_bad_request() {
    let h = Harness::new(vec![]).await;
    let (status, body) = h
        .send(test::TestRequest::post().uri("/risk/check").set_json(json!({})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[actix_web::test]
async fn test_check_malformed_json_is_bad_request() {
    let h = Harness::new(vec![]).await;
    let (status, _) = h
        .send(
            test::TestRequest::post()
                .uri("/risk/check")
                .insert_header(("content-type", "application/json"))
                .set_payload("{not json"),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_check_store_outage_is_unavailable() {
    let h = Harness::new(vec![]).await;
    h.store.set_offline(true);
    let (status, body) = h
        .send(test::TestRequest::post().uri("/risk/check").set_json(json!({"userId": "u1"})))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "STORE_UNAVAILABLE");
}

// ===== /payment/authorize =====

#[actix_web::test]
async fn test_payment_for_clean_user_is_charged() {
    let h = Harness::new(vec![]).await;
    let (status, body) = h
        .send(test::TestRequest::post().uri("/payment/authorize").set_json(json!({
            "userId": "u1",
            "amount": "25.50",
            "token": "tok_visa"
        })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["amount"], "25.50");
    assert!(body["chargeId"].is_string());
}

#[actix_web::test]
async fn test_payment_for_timed_restriction_is_forbidden() {
    let h = Harness::new(vec![timed("u1", TimedLevel::Mild, Duration::hours(3))]).await;
    let (status, body) = h
        .send(test::TestRequest::post().uri("/payment/authorize").set_json(json!({
            "userId": "u1",
            "amount": "10",
            "token": "tok_visa"
        })))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "payment_temporarily_restricted");
    assert_eq!(body["level"], 1);
    assert!(body["autoReleaseAt"].is_string());
}

#[actix_web::test]
async fn test_payment_for_level_three_is_forbidden() {
    let h = Harness::new(vec![locked("u3")]).await;
    let (status, body) = h
        .send(test::TestRequest::post().uri("/payment/authorize").set_json(json!({
            "userId": "u3",
            "amount": "10",
            "token": "tok_visa"
        })))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "restricted_level_3");
    assert_eq!(body["level"], 3);
    assert!(body.get("autoReleaseAt").is_none());
}

#[actix_web::test]
async fn test_payment_after_timer_expiry_is_charged_and_released() {
    let h = Harness::new(vec![timed("u1", TimedLevel::Elevated, -Duration::minutes(1))]).await;
    let (status, _) = h
        .send(test::TestRequest::post().uri("/payment/authorize").set_json(json!({
            "userId": "u1",
            "amount": "10",
            "token": "tok_visa"
        })))
        .await;

    assert_eq!(status, StatusCode::OK);
    let stored = h.store.get("u1").await.unwrap().unwrap();
    assert_eq!(stored.state, RiskState::Normal { level: 2 });
}

#[actix_web::test]
async fn test_payment_rejects_non_positive_amount() {
    let h = Harness::new(vec![]).await;
    let (status, body) = h
        .send(test::TestRequest::post().uri("/payment/authorize").set_json(json!({
            "userId": "u1",
            "amount": "0",
            "token": "tok_visa"
        })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[actix_web::test]
async fn test_payment_store_outage_fails_closed() {
    let h = Harness::new(vec![]).await;
    h.store.set_offline(true);
    let (status, _) = h
        .send(test::TestRequest::post().uri("/payment/authorize").set_json(json!({
            "userId": "u1",
            "amount": "10",
            "token": "tok_visa"
        })))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn test_payment_route_is_rate_limited() {
    let h = Harness::with_rate(vec![], 1).await;
    let payment = || {
        test::TestRequest::post().uri("/payment/authorize").set_json(json!({
            "userId": "u1",
            "amount": "10",
            "token": "tok_visa"
        }))
    };

    assert_eq!(h.send(payment()).await.0, StatusCode::OK);
    assert_eq!(h.send(payment()).await.0, StatusCode::TOO_MANY_REQUESTS);
}

// ===== /risk/unlock =====

#[actix_web::test]
async fn test_unlock_level_three_with_admin_token() {
    let h = Harness::new(vec![locked("u3")]).await;
    let (status, body) = h
        .send(
            test::TestRequest::post()
                .uri("/risk/unlock")
                .insert_header((AUTHORIZATION, admin_token("admin")))
                .set_json(json!({"userId": "u3"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let stored = h.store.get("u3").await.unwrap().unwrap();
    assert_eq!(stored.state, RiskState::Normal { level: 1 });
    assert_eq!(stored.state.auto_release_at(), None);
}

#[actix_web::test]
async fn test_unlock_requires_admin_role() {
    let h = Harness::new(vec![locked("u3")]).await;

    let (status, _) = h
        .send(test::TestRequest::post().uri("/risk/unlock").set_json(json!({"userId": "u3"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .send(
            test::TestRequest::post()
                .uri("/risk/unlock")
                .insert_header((AUTHORIZATION, admin_token("support")))
                .set_json(json!({"userId": "u3"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(h.store.get("u3").await.unwrap().unwrap().state.is_restricted());
}

#[actix_web::test]
async fn test_unlock_unknown_user_is_not_found() {
    let h = Harness::new(vec![]).await;
    let (status, body) = h
        .send(
            test::TestRequest::post()
                .uri("/risk/unlock")
                .insert_header((AUTHORIZATION, admin_token("admin")))
                .set_json(json!({"userId": "ghost"})),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

// ===== /risk/escalate =====

#[actix_web::test]
async fn test_escalate_creates_and_raises_levels() {
    let h = Harness::new(vec![]).await;
    let escalate = |severe: bool| {
        test::TestRequest::post()
            .uri("/risk/escalate")
            .insert_header((AUTHORIZATION, admin_token("admin")))
            .set_json(json!({"userId": "u1", "severe": severe}))
    };

    let (status, body) = h.send(escalate(false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["escalated"], true);
    assert_eq!(body["fromLevel"], 0);
    assert_eq!(body["record"]["level"], 1);
    assert_eq!(body["record"]["status"], "restricted");

    let (_, body) = h.send(escalate(true)).await;
    assert_eq!(body["record"]["level"], 3);
    assert!(body["record"]["autoReleaseAt"].is_null());

    let (status, body) = h.send(escalate(false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["escalated"], false);
    assert_eq!(body["reason"], "already_locked");
}

// ===== Scheduled sweeps =====

#[actix_web::test]
async fn test_downgrade_requires_scheduler_secret() {
    let h = Harness::new(vec![timed("u1", TimedLevel::Mild, Duration::hours(3))]).await;

    let (status, _) = h
        .send(test::TestRequest::get().uri("/risk/downgrade"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .send(
            test::TestRequest::get()
                .uri("/risk/downgrade")
                .insert_header(("x-cron-secret", "wrong")),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(h.store.get("u1").await.unwrap().unwrap().state.is_restricted());
}

#[actix_web::test]
async fn test_downgrade_sweep_reports_per_user_results() {
    let h = Harness::new(vec![
        timed("clean", TimedLevel::Mild, Duration::hours(3)),
        timed("noisy", TimedLevel::Elevated, Duration::hours(3)),
    ])
    .await;
    h.activity.record_suspicious("noisy", yesterday(), 2).await;

    let (status, body) = h
        .send(
            test::TestRequest::get()
                .uri("/risk/downgrade")
                .insert_header(("x-cron-secret", CRON_SECRET)),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.contains(&json!({"userId": "clean", "result": "downgraded", "from": 1, "to": 0})));
    assert!(results.contains(&json!({
        "userId": "noisy",
        "result": "unchanged",
        "reason": "recent_suspicious_activity"
    })));

    assert_eq!(
        h.store.get("clean").await.unwrap().unwrap().state,
        RiskState::Normal { level: 0 }
    );
}

#[actix_web::test]
async fn test_escalation_sweep_is_idempotent_within_a_day() {
    let h = Harness::new(vec![]).await;
    h.activity.record_suspicious("u1", yesterday(), 4).await;
    let sweep = || {
        test::TestRequest::get()
            .uri("/risk/escalation")
            .insert_header(("x-cron-secret", CRON_SECRET))
    };

    let (status, body) = h.send(sweep()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"],
        json!([{"userId": "u1", "result": "escalated", "from": 0, "to": 1}])
    );

    h.send(sweep()).await;
    assert_eq!(h.store.get("u1").await.unwrap().unwrap().state.level(), 1);
}

#[actix_web::test]
async fn test_sweep_batch_failure_is_unavailable() {
    let h = Harness::new(vec![]).await;
    h.store.set_offline(true);
    let (status, _) = h
        .send(
            test::TestRequest::get()
                .uri("/risk/downgrade")
                .insert_header(("x-cron-secret", CRON_SECRET)),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ===== Health / metrics =====

#[actix_web::test]
async fn test_health_reflects_store() {
    let h = Harness::new(vec![]).await;
    let (status, body) = h.send(test::TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    h.store.set_offline(true);
    let (status, body) = h.send(test::TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["store"], "unavailable");
}

#[actix_web::test]
async fn test_metrics_endpoint_is_text() {
    let h = Harness::new(vec![]).await;
    let app = test::init_service(
        App::new().configure(|cfg| app::configure(cfg, &h.services, &h.guards)),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/plain")));
}

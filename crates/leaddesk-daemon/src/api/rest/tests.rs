use super::{create_router, AppState};
use crate::config::{QuoteConfig, ServerConfig};
use crate::rate_limit::RateLimiter;
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use leaddesk_storage::{InMemoryStorage, LeadDeskStorage, NewQuoteVersion};
use leaddesk_types::{AuditContext, LeadDeskEvent, LeadId, LineItem};
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;

fn test_state(max_requests: u32) -> AppState {
    let storage: Arc<dyn LeadDeskStorage> = Arc::new(InMemoryStorage::new());
    let (event_tx, _) = broadcast::channel(64);
    let limiter = RateLimiter::new(max_requests, std::time::Duration::from_secs(60));
    AppState::new(storage, event_tx, Arc::new(limiter), QuoteConfig::default())
}

fn app(state: &AppState) -> Router {
    create_router(state.clone(), &ServerConfig::default())
}

async fn send_raw(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .header("user-agent", "integration-test/1.0")
                .header("x-forwarded-for", "203.0.113.9")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    send_raw(app, method, uri, body).await
}

struct Seeded {
    lead_id: String,
    quote_id: String,
    accept_uri: String,
}

async fn seed_quote(app: &Router) -> Seeded {
    let (status, lead) = send(
        app,
        "POST",
        "/api/v1/leads",
        Some(json!({
            "client": { "name": "Ada Byron", "email": "ada@example.com", "company": "Byron Logistics" },
            "project": { "title": "Warehouse slab", "service": "structural" },
            "source": "referral"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let lead_id = lead["id"].as_str().unwrap().to_string();

    let (status, issued) = send(
        app,
        "POST",
        &format!("/api/v1/leads/{}/quotes", lead_id),
        Some(json!({
            "line_items": [
                { "description": "Slab design", "quantity": 2, "unit_price_minor": 127_500 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(issued["lead_status"], "quoted");

    Seeded {
        lead_id,
        quote_id: issued["quote"]["id"].as_str().unwrap().to_string(),
        accept_uri: format!("{}/accept", issued["acceptance_path"].as_str().unwrap()),
    }
}

/// Public GET as seen by the server: a socket peer plus a forwarding header
async fn public_get(app: &Router, uri: &str, peer: [u8; 4], forwarded_for: &str) -> StatusCode {
    let mut request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 51_000))));
    app.clone().oneshot(request).await.unwrap().status()
}

async fn lead_audit(app: &Router, lead_id: &str) -> Vec<Value> {
    let (status, entries) = send(
        app,
        "GET",
        &format!("/api/v1/audit?entity_type=lead&entity_id={}", lead_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    entries.as_array().unwrap().clone()
}

fn accept_body() -> Option<Value> {
    Some(json!({ "terms_accepted": true, "note": "Please start in May" }))
}

#[tokio::test]
async fn accepting_updates_quote_lead_timeline_and_audit() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;
    let mut events = state.event_tx.subscribe();

    let (status, receipt) = send(&app, "POST", &seeded.accept_uri, accept_body()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["quote_id"], seeded.quote_id.as_str());
    assert_eq!(receipt["lead_id"], seeded.lead_id.as_str());
    assert!(receipt["accepted_at"].is_string());

    let (_, quote) = send(&app, "GET", &format!("/api/v1/quotes/{}", seeded.quote_id), None).await;
    assert_eq!(quote["status"], "accepted");
    assert_eq!(quote["accepted_by_email"], "ada@example.com");
    assert_eq!(quote["accepted_ip"], "203.0.113.9");
    assert_eq!(quote["accepted_user_agent"], "integration-test/1.0");
    assert_eq!(quote["acceptance_note"], "Please start in May");
    assert_eq!(quote["terms_accepted"], true);

    let (_, lead) = send(&app, "GET", &format!("/api/v1/leads/{}", seeded.lead_id), None).await;
    assert_eq!(lead["status"], "order");

    let (_, activities) = send(
        &app,
        "GET",
        &format!("/api/v1/leads/{}/activities", seeded.lead_id),
        None,
    )
    .await;
    assert_eq!(activities[0]["kind"], "quote_accepted");

    let (_, audit) = send(
        &app,
        "GET",
        &format!("/api/v1/audit?entity_type=quote&entity_id={}", seeded.quote_id),
        None,
    )
    .await;
    let actions: Vec<&str> = audit
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|entry| entry["action"].as_str())
        .collect();
    assert_eq!(actions.first(), Some(&"accept"));

    let (_, lead_audit) = send(
        &app,
        "GET",
        &format!("/api/v1/audit?entity_type=lead&entity_id={}&limit=1", seeded.lead_id),
        None,
    )
    .await;
    assert_eq!(lead_audit[0]["action"], "quote_accepted");
    assert_eq!(lead_audit[0]["ip"], "203.0.113.9");

    let mut saw_acceptance = false;
    while let Ok(envelope) = events.try_recv() {
        if let LeadDeskEvent::QuoteAccepted { client_email, .. } = envelope.event {
            assert_eq!(client_email.as_deref(), Some("ada@example.com"));
            saw_acceptance = true;
        }
    }
    assert!(saw_acceptance);
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;

    let (status, body) = send_raw(&app, "POST", &seeded.accept_uri, Body::from("{\"terms_accepted\": tru")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn invalid_input_returns_first_validation_message() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &seeded.accept_uri,
        Some(json!({ "terms_accepted": false, "note": "x".repeat(1001) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "terms must be accepted");

    let (status, body) = send(
        &app,
        "POST",
        &seeded.accept_uri,
        Some(json!({ "termsAccepted": true, "note": "x".repeat(1001) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "note must be at most 1000 characters");

    // Nothing was written by the rejected attempts.
    let (_, quote) = send(&app, "GET", &format!("/api/v1/quotes/{}", seeded.quote_id), None).await;
    assert_eq!(quote["status"], "sent");
}

#[tokio::test]
async fn unknown_link_is_not_found() {
    let state = test_state(100);
    let app = app(&state);

    let uri = format!("/api/v1/public/quotes/{}/accept", "ab".repeat(32));
    let (status, _) = send(&app, "POST", &uri, accept_body()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/v1/public/quotes/not-a-hash", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_acceptance_conflicts() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;

    let (status, _) = send(&app, "POST", &seeded.accept_uri, accept_body()).await;
    assert_eq!(status, StatusCode::OK);

    // Link state is checked before the body, so even an invalid body conflicts.
    let (status, body) = send(&app, "POST", &seeded.accept_uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn expired_link_is_gone() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;
    let lead_id: LeadId = seeded.lead_id.parse().unwrap();

    let now = Utc::now();
    let expired = state
        .storage
        .create_quote_version(
            NewQuoteVersion {
                lead_id,
                line_items: vec![LineItem {
                    description: "Revised slab design".to_string(),
                    quantity: 1,
                    unit_price_minor: 240_000,
                }],
                currency: "EUR".to_string(),
                hash_expires_at: now - Duration::minutes(1),
            },
            &AuditContext::new("staff"),
            now - Duration::days(31),
        )
        .await
        .unwrap();

    let uri = format!(
        "/api/v1/public/quotes/{}/accept",
        expired.quote.acceptance_hash
    );
    let (status, body) = send(&app, "POST", &uri, accept_body()).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "GONE");

    let (status, view) = send(
        &app,
        "GET",
        &format!("/api/v1/public/quotes/{}", expired.quote.acceptance_hash),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["acceptable"], false);
    assert_eq!(view["status"], "expired");

    let (_, quote) = send(
        &app,
        "GET",
        &format!("/api/v1/quotes/{}", expired.quote.id),
        None,
    )
    .await;
    assert_eq!(quote["status"], "expired");

    // Issuing the lapsed version retired the first one.
    let (_, quote) = send(&app, "GET", &format!("/api/v1/quotes/{}", seeded.quote_id), None).await;
    assert_eq!(quote["status"], "superseded");
}

#[tokio::test]
async fn lost_lead_refuses_acceptance() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;
    let status_uri = format!("/api/v1/leads/{}/status", seeded.lead_id);

    let (status, _) = send(&app, "POST", &status_uri, Some(json!({ "status": "lost" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", &status_uri, Some(json!({ "status": "order" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let view_uri = seeded.accept_uri.trim_end_matches("/accept").to_string();
    let (_, view) = send(&app, "GET", &view_uri, None).await;
    assert_eq!(view["acceptable"], false);

    let audit_before = lead_audit(&app, &seeded.lead_id).await.len();
    let (status, body) = send(&app, "POST", &seeded.accept_uri, accept_body()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (_, lead) = send(&app, "GET", &format!("/api/v1/leads/{}", seeded.lead_id), None).await;
    assert_eq!(lead["status"], "lost");
    let (_, quote) = send(&app, "GET", &format!("/api/v1/quotes/{}", seeded.quote_id), None).await;
    assert!(quote["accepted_at"].is_null());
    assert_eq!(lead_audit(&app, &seeded.lead_id).await.len(), audit_before);
}

#[tokio::test]
async fn lead_set_to_order_by_staff_refuses_acceptance() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/leads/{}/status", seeded.lead_id),
        Some(json!({ "status": "order" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", &seeded.accept_uri, accept_body()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let entries = lead_audit(&app, &seeded.lead_id).await;
    assert!(entries.iter().all(|entry| entry["action"] != "quote_accepted"));
    let into_order = entries
        .iter()
        .filter(|entry| {
            entry["changes"]
                .as_array()
                .map(|changes| changes.iter().any(|change| change["new"] == "order"))
                .unwrap_or(false)
        })
        .count();
    assert_eq!(into_order, 1);
}

#[tokio::test]
async fn superseded_link_is_gone() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;

    let (status, issued) = send(
        &app,
        "POST",
        &format!("/api/v1/leads/{}/quotes", seeded.lead_id),
        Some(json!({
            "line_items": [{ "description": "Slab design, phased", "quantity": 1, "unit_price_minor": 260_000 }],
            "validity_days": 14
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(issued["quote"]["version"], 2);
    assert_eq!(issued["superseded"][0], seeded.quote_id.as_str());

    let (status, _) = send(&app, "POST", &seeded.accept_uri, accept_body()).await;
    assert_eq!(status, StatusCode::GONE);

    let (_, versions) = send(
        &app,
        "GET",
        &format!("/api/v1/leads/{}/quotes", seeded.lead_id),
        None,
    )
    .await;
    assert_eq!(versions[0]["status"], "superseded");
    assert_eq!(versions[1]["status"], "sent");
}

#[tokio::test]
async fn public_endpoints_are_rate_limited() {
    let state = test_state(2);
    let app = app(&state);
    let uri = format!("/api/v1/public/quotes/{}", "cd".repeat(32));

    for _ in 0..2 {
        let (status, _) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["details"]["retry_after_secs"].as_u64().unwrap() > 0);

    // Staff routes are not limited.
    let (status, _) = send(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_the_limit() {
    let state = test_state(2);
    let app = app(&state);
    let uri = format!("/api/v1/public/quotes/{}", "cd".repeat(32));

    let mut statuses = Vec::new();
    for i in 0..20 {
        let forwarded = format!("198.18.0.{}", i);
        statuses.push(public_get(&app, &uri, [192, 0, 2, 44], &forwarded).await);
    }
    assert_eq!(statuses[0], StatusCode::NOT_FOUND);
    assert_eq!(statuses[1], StatusCode::NOT_FOUND);
    assert!(statuses[2..]
        .iter()
        .all(|status| *status == StatusCode::TOO_MANY_REQUESTS));

    // A different peer has its own window.
    assert_eq!(
        public_get(&app, &uri, [192, 0, 2, 45], "198.18.0.1").await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn trusted_proxy_forwards_the_client_address() {
    let state = test_state(1).with_trusted_proxies(vec![IpAddr::from([10, 0, 0, 1])]);
    let app = app(&state);
    let uri = format!("/api/v1/public/quotes/{}", "cd".repeat(32));

    assert_eq!(
        public_get(&app, &uri, [10, 0, 0, 1], "203.0.113.20").await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        public_get(&app, &uri, [10, 0, 0, 1], "203.0.113.21").await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        public_get(&app, &uri, [10, 0, 0, 1], "203.0.113.20").await,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn malformed_query_strings_use_the_error_body() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;

    for uri in [
        "/api/v1/leads?limit=abc".to_string(),
        "/api/v1/audit?offset=-1".to_string(),
        format!("/api/v1/leads/{}/activities?limit=ten", seeded.lead_id),
    ] {
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["code"], "BAD_REQUEST", "{}", uri);
        assert!(body["error"].as_str().unwrap().contains("query"), "{}", uri);
    }
}

#[tokio::test]
async fn acceptance_is_queued_for_confirmation_mail() {
    let (mail_tx, mut mail_rx) = mpsc::unbounded_channel();
    let state = test_state(100).with_mail_queue(mail_tx);
    let app = app(&state);
    let seeded = seed_quote(&app).await;

    let (status, _) = send(&app, "POST", &seeded.accept_uri, accept_body()).await;
    assert_eq!(status, StatusCode::OK);

    let queued = mail_rx.try_recv().unwrap();
    match queued.event {
        LeadDeskEvent::QuoteAccepted { client_email, .. } => {
            assert_eq!(client_email.as_deref(), Some("ada@example.com"));
        }
        other => panic!("unexpected queued event: {:?}", other),
    }
    // Intake, quote and status events are not mail requests.
    assert!(mail_rx.try_recv().is_err());
}

#[tokio::test]
async fn pipeline_moves_follow_the_rules() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;
    let status_uri = format!("/api/v1/leads/{}/status", seeded.lead_id);

    let (status, _) = send(&app, "POST", &status_uri, Some(json!({ "status": "quoted" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", &status_uri, Some(json!({ "status": "won" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, moved) = send(&app, "POST", &status_uri, Some(json!({ "status": "lost" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["from"], "quoted");

    let (status, _) = send(&app, "POST", &status_uri, Some(json!({ "status": "contacted" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, board) = send(&app, "GET", "/api/v1/pipeline", None).await;
    assert_eq!(board[5]["status"], "lost");
    assert_eq!(board[5]["count"], 1);
}

#[tokio::test]
async fn lead_lookups_and_notes() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;

    let (status, _) = send(&app, "GET", "/api/v1/leads/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/v1/leads/{}", LeadId::generate()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, note) = send(
        &app,
        "POST",
        &format!("/api/v1/leads/{}/activities", seeded.lead_id),
        Some(json!({ "note": "Called client, site visit on Tuesday" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(note["kind"], "note");
    assert_eq!(note["actor"], "staff");

    let (_, leads) = send(&app, "GET", "/api/v1/leads?status=quoted&limit=10", None).await;
    assert_eq!(leads.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/api/v1/leads?status=won", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn report_and_health() {
    let state = test_state(100);
    let app = app(&state);
    let seeded = seed_quote(&app).await;
    send(&app, "POST", &seeded.accept_uri, accept_body()).await;

    let (status, report) = send(&app, "GET", "/api/v1/reports/pipeline", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_leads"], 1);
    assert_eq!(report["quotes_accepted"], 1);
    assert_eq!(report["accepted_value"][0]["total"], "EUR 2550.00");
    assert_eq!(report["conversion_rate"], 1.0);

    let (status, health) = send(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["storage"], "memory");
}

//! Integration tests for sahayak-api endpoints

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use sahayak_api::config::{CliOverrides, ServiceConfig};
use sahayak_api::services::gemini_client::{ModelError, ModelReply, PlaybookModel};
use sahayak_api::services::KnowledgeIndex;
use sahayak_api::{build_router, AppState};
use sahayak_common::auth::TokenIssuer;
use sahayak_common::config::TomlConfig;
use serde_json::{json, Value};
use tower::util::ServiceExt;

const MODEL_TEXT: &str = "### Title\nFraction Pizza\n\n### Summary\nUse pizza slices to show equal parts of a whole for the class.\n\n### Immediate Actions\n1. Draw a circle\n2. Cut it into four\n\n### Time Estimate: 12 minutes\n### Difficulty: Easy\n";

struct CannedModel;

#[async_trait]
impl PlaybookModel for CannedModel {
    fn name(&self) -> &str {
        "canned-model"
    }

    async fn generate(&self, _prompt: &str) -> Result<ModelReply, ModelError> {
        Ok(ModelReply {
            text: MODEL_TEXT.to_string(),
            prompt_tokens: Some(120),
            response_tokens: Some(60),
        })
    }
}

/// Test helper: app over a fresh database in a temp directory
async fn create_test_app(model: Option<Arc<dyn PlaybookModel>>) -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = sahayak_common::db::init_database(&dir.path().join("sahayak.db"))
        .await
        .expect("Failed to initialize database");

    let config = ServiceConfig::resolve(&TomlConfig::default(), &CliOverrides::default());
    let tokens = TokenIssuer::new("integration-test-secret", 30).expect("token issuer");
    let index = KnowledgeIndex::with_curriculum().await;

    let state = AppState::new(db, config, tokens, model, index);
    (dir, build_router(state))
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Registers an account and returns (access token, user id)
async fn register(app: &Router, email: &str, role: &str) -> (String, String) {
    let (status, json) = call(
        app,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({
            "email": email,
            "password": "secret123",
            "name": format!("User {}", email),
            "role": role,
            "district": "Mysuru",
            "block": "Hunsur",
            "subjects": ["Mathematics"],
            "grades": [4, 5]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", json);
    (
        json["access_token"].as_str().unwrap().to_string(),
        json["user"]["id"].as_str().unwrap().to_string(),
    )
}

async fn submit_sos(app: &Router, token: &str, raw_input: &str) -> Value {
    let (status, json) = call(
        app,
        "POST",
        "/api/v1/sos",
        Some(token),
        Some(json!({ "raw_input": raw_input, "grade": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "sos failed: {}", json);
    json
}

async fn share(app: &Router, token: &str) -> Value {
    let (status, json) = call(
        app,
        "POST",
        "/api/v1/knowledge/share",
        Some(token),
        Some(json!({
            "problem_description": "Students mix up tens and ones in place value",
            "subject": "Mathematics",
            "grade": 3,
            "solution_title": "Bundle sticks",
            "solution_description": "Use bundles of ten sticks so students can see tens and ones side by side",
            "steps": ["Make bundles of ten", "Count bundles then loose sticks"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "share failed: {}", json);
    json
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app) = create_test_app(None).await;
    let (status, json) = call(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "sahayak-api");
    assert_eq!(json["database"], "connected");
    assert_eq!(json["model_available"], false);
}

#[tokio::test]
async fn test_service_info_and_cache_stats() {
    let (_dir, app) = create_test_app(None).await;

    let (status, json) = call(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["api_prefix"], "/api/v1");

    let (status, json) = call(&app, "GET", "/cache/stats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["entries"], 0);
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let (_dir, app) = create_test_app(None).await;
    let (token, _) = register(&app, "asha@school.in", "teacher").await;

    let (status, json) = call(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["email"], "asha@school.in");
    assert!(json.get("password_hash").is_none());

    let (status, json) = call(
        &app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "asha@school.in", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["token_type"], "bearer");

    let refresh = json["refresh_token"].as_str().unwrap().to_string();
    let (status, json) = call(
        &app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["access_token"].is_string());

    let (status, json) = call(
        &app,
        "PUT",
        "/api/v1/auth/me",
        Some(&token),
        Some(json!({ "name": "Asha K", "role": "diet" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Asha K");
    assert_eq!(json["role"], "teacher");
}

#[tokio::test]
async fn test_register_rejects_duplicate_and_bad_input() {
    let (_dir, app) = create_test_app(None).await;
    register(&app, "asha@school.in", "teacher").await;

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": "asha@school.in", "password": "secret123", "name": "Asha" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": "ravi@school.in", "password": "123", "name": "Ravi" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_role_registers_as_teacher() {
    let (_dir, app) = create_test_app(None).await;
    let (token, _) = register(&app, "ravi@school.in", "principal").await;

    let (_, json) = call(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(json["role"], "teacher");
}

#[tokio::test]
async fn test_login_wrong_password_is_unauthorized() {
    let (_dir, app) = create_test_app(None).await;
    register(&app, "asha@school.in", "teacher").await;

    let (status, json) = call(
        &app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "asha@school.in", "password": "wrong-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let (_dir, app) = create_test_app(None).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/v1/sos").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    let (status, _) = call(&app, "GET", "/api/v1/sos", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sos_fallback_flow() {
    let (_dir, app) = create_test_app(None).await;
    let (token, _) = register(&app, "asha@school.in", "teacher").await;

    let json = submit_sos(&app, &token, "Students don't understand fractions at all").await;
    assert_eq!(json["status"], "resolved");
    assert_eq!(json["subject"], "Mathematics");
    assert_eq!(json["playbook"]["source"], "fallback");
    let sos_id = json["id"].as_str().unwrap().to_string();

    let (status, json) = call(&app, "GET", "/api/v1/sos", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, json) = call(&app, "GET", &format!("/api/v1/sos/{}", sos_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["playbook"]["times_viewed"], 1);

    let (_, me) = call(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(me["total_sos_requests"], 1);
}

#[tokio::test]
async fn test_sos_with_model_reply() {
    let (_dir, app) = create_test_app(Some(Arc::new(CannedModel))).await;
    let (token, _) = register(&app, "asha@school.in", "teacher").await;

    let json = submit_sos(&app, &token, "Students don't understand fractions at all").await;
    assert_eq!(json["playbook"]["source"], "model");
    assert_eq!(json["playbook"]["title"], "Fraction Pizza");
    assert_eq!(json["playbook"]["model_used"], "canned-model");
}

#[tokio::test]
async fn test_sos_input_length_is_validated() {
    let (_dir, app) = create_test_app(None).await;
    let (token, _) = register(&app, "asha@school.in", "teacher").await;

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/sos",
        Some(&token),
        Some(json!({ "raw_input": "help" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_quick_sos_anonymous() {
    let (_dir, app) = create_test_app(None).await;

    let (status, json) = call(
        &app,
        "POST",
        "/api/v1/sos/quick?raw_input=Class%20is%20too%20noisy%20after%20lunch&grade=3",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["detected_grade"], 3);
    assert!(json["playbook"]["title"].is_string());
}

#[tokio::test]
async fn test_sos_access_and_feedback_ownership() {
    let (_dir, app) = create_test_app(None).await;
    let (owner, _) = register(&app, "asha@school.in", "teacher").await;
    let (other, _) = register(&app, "ravi@school.in", "teacher").await;
    let (crp, _) = register(&app, "crp@school.in", "crp").await;

    let json = submit_sos(&app, &owner, "Students cannot read simple words fluently").await;
    let uri = format!("/api/v1/sos/{}", json["id"].as_str().unwrap());

    let (status, _) = call(&app, "GET", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "GET", &uri, Some(&crp), None).await;
    assert_eq!(status, StatusCode::OK);

    let feedback = json!({ "was_helpful": true, "effectiveness_rating": 4 });
    let (status, _) = call(&app, "POST", &format!("{}/feedback", uri), Some(&other), Some(feedback.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = call(&app, "POST", &format!("{}/feedback", uri), Some(&owner), Some(feedback)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Thank you for your feedback!");

    let (status, _) = call(
        &app,
        "POST",
        &format!("{}/feedback", uri),
        Some(&owner),
        Some(json!({ "was_helpful": true, "effectiveness_rating": 6 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = call(&app, "GET", &uri, Some(&owner), None).await;
    assert_eq!(json["was_helpful"], true);
    assert_eq!(json["playbook"]["effectiveness_rating"], 4);
}

#[tokio::test]
async fn test_malformed_id_is_not_found() {
    let (_dir, app) = create_test_app(None).await;
    let (token, _) = register(&app, "asha@school.in", "teacher").await;

    let (status, _) = call(&app, "GET", "/api/v1/sos/not-an-id", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboard_permissions() {
    let (_dir, app) = create_test_app(None).await;
    let (teacher, _) = register(&app, "asha@school.in", "teacher").await;
    let (crp, _) = register(&app, "crp@school.in", "crp").await;
    let (diet, _) = register(&app, "diet@school.in", "diet").await;
    submit_sos(&app, &teacher, "Students don't understand fractions at all").await;

    let (status, json) = call(&app, "GET", "/api/v1/dashboard/teacher", Some(&teacher), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["summary"]["total_sos_requests"], 1);
    assert_eq!(json["weekly_heatmap"].as_array().unwrap().len(), 24);

    let (status, _) = call(&app, "GET", "/api/v1/dashboard/crp", Some(&teacher), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = call(&app, "GET", "/api/v1/dashboard/crp", Some(&crp), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["summary"]["total_teachers"], 1);
    assert_eq!(json["summary"]["total_sos"], 1);

    let (status, _) = call(&app, "GET", "/api/v1/dashboard/diet", Some(&crp), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = call(&app, "GET", "/api/v1/dashboard/diet?days=30", Some(&diet), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["summary"]["days_analyzed"], 30);

    let (status, _) = call(&app, "GET", "/api/v1/dashboard/diet?days=31", Some(&diet), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/api/v1/dashboard/principal", Some(&diet), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_teacher_listing_requires_supervisor() {
    let (_dir, app) = create_test_app(None).await;
    let (teacher, _) = register(&app, "asha@school.in", "teacher").await;
    let (crp, _) = register(&app, "crp@school.in", "crp").await;

    let (status, _) = call(&app, "GET", "/api/v1/dashboard/teachers", Some(&teacher), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = call(&app, "GET", "/api/v1/dashboard/teachers", Some(&crp), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_teacher_listing_pages() {
    let (_dir, app) = create_test_app(None).await;
    for email in ["a@school.in", "b@school.in", "c@school.in"] {
        register(&app, email, "teacher").await;
    }
    let (crp, _) = register(&app, "crp@school.in", "crp").await;

    let (_, all) = call(&app, "GET", "/api/v1/dashboard/teachers", Some(&crp), None).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (status, page) = call(&app, "GET", "/api/v1/dashboard/teachers?skip=1&limit=1", Some(&crp), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["id"], all[1]["id"]);

    let (_, past_end) = call(&app, "GET", "/api/v1/dashboard/teachers?skip=3", Some(&crp), None).await;
    assert!(past_end.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_public_overview() {
    let (_dir, app) = create_test_app(None).await;
    let (teacher, _) = register(&app, "asha@school.in", "teacher").await;
    submit_sos(&app, &teacher, "Students don't understand fractions at all").await;

    let (status, json) = call(&app, "GET", "/api/v1/dashboard/overview", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_sos_requests"], 1);
    assert_eq!(json["successful_resolutions"], 1);
    assert_eq!(json["success_rate"], 100.0);
}

#[tokio::test]
async fn test_share_moderate_vote_and_offline_pack() {
    let (_dir, app) = create_test_app(None).await;
    let (author, _) = register(&app, "asha@school.in", "teacher").await;
    let (peer, _) = register(&app, "ravi@school.in", "teacher").await;
    let (crp, _) = register(&app, "crp@school.in", "crp").await;

    let shared = share(&app, &author).await;
    assert_eq!(shared["status"], "pending");
    assert_eq!(shared["teacher_name"], "Teacher from Mysuru");
    assert!(shared["district"].is_null());
    let id = shared["id"].as_str().unwrap().to_string();

    // Pending solutions stay out of the library
    let (_, json) = call(&app, "GET", "/api/v1/knowledge/library", None, None).await;
    assert!(json.as_array().unwrap().is_empty());
    let (status, _) = call(&app, "GET", &format!("/api/v1/knowledge/library/{}", id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let status_uri = format!("/api/v1/knowledge/library/{}/status", id);
    let (status, _) = call(&app, "PUT", &status_uri, Some(&author), Some(json!({ "status": "approved" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "PUT", &status_uri, Some(&crp), Some(json!({ "status": "published" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, "PUT", &status_uri, Some(&crp), Some(json!({ "status": "approved" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = call(&app, "GET", "/api/v1/knowledge/library?subject=Mathematics", None, None).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    let (status, _) = call(&app, "GET", "/api/v1/knowledge/library?sort_by=popularity", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = call(&app, "GET", &format!("/api/v1/knowledge/library/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["usage_count"], 1);

    let vote_uri = format!("/api/v1/knowledge/library/{}/vote", id);
    let (status, json) = call(&app, "POST", &vote_uri, Some(&author), Some(json!({ "vote": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["message"], "Cannot vote on your own solution");

    let (status, json) = call(&app, "POST", &vote_uri, Some(&peer), Some(json!({ "vote": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["helpful_count"], 1);
    assert_eq!(json["your_vote"], 1);
    assert!(json["voted_at"].is_string());
    assert!(json["new_trust_score"].as_f64().unwrap() >= 4.0);

    // A second ballot from the same voter replaces the first
    let (_, json) = call(&app, "POST", &vote_uri, Some(&peer), Some(json!({ "vote": 1 }))).await;
    assert_eq!(json["total_votes"], 1);

    let (status, json) = call(&app, "GET", "/api/v1/knowledge/offline/pack?grade=3", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["problem_count"], 1);
    assert_eq!(json["version"], "1.0.0");
    assert!(!json["problems"][0]["solution"].as_str().unwrap().is_empty());

    let (_, json) = call(&app, "GET", "/api/v1/knowledge/my-solutions", Some(&author), None).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_share_validation() {
    let (_dir, app) = create_test_app(None).await;
    let (token, _) = register(&app, "asha@school.in", "teacher").await;

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/knowledge/share",
        Some(&token),
        Some(json!({
            "problem_description": "too short",
            "subject": "Mathematics",
            "grade": 3,
            "solution_title": "Bundle sticks",
            "solution_description": "Use bundles of ten sticks to show tens and ones"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_offline_sync_and_mentor_endpoints() {
    let (_dir, app) = create_test_app(None).await;
    let (token, _) = register(&app, "asha@school.in", "teacher").await;

    let (status, _) = call(&app, "POST", "/api/v1/knowledge/offline/sync", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = call(
        &app,
        "POST",
        "/api/v1/knowledge/offline/sync?current_version=0.9.0",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["needs_update"], true);
    assert_eq!(json["latest_version"], "1.0.0");

    submit_sos(&app, &token, "Students don't understand fractions at all").await;

    let (status, json) = call(&app, "GET", "/api/v1/knowledge/mentor/insights", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_sos_requests"], 1);

    let (status, json) = call(&app, "GET", "/api/v1/knowledge/mentor/weekly-report", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["period"], "Last 7 days");
    assert_eq!(json["daily_activity"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_curriculum_search() {
    let (_dir, app) = create_test_app(None).await;

    let (status, json) = call(
        &app,
        "GET",
        "/api/v1/knowledge/ncert/search?topic=fractions&subject=Maths&grade=6",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["results"][0]["chapter"], 7);

    let (status, _) = call(&app, "GET", "/api/v1/knowledge/ncert/search?topic=f", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_knowledge_index_search_includes_shared_solutions() {
    let (_dir, app) = create_test_app(None).await;
    let (token, _) = register(&app, "asha@school.in", "teacher").await;

    let (_, before) = call(&app, "GET", "/api/v1/knowledge/rag/stats", None, None).await;
    share(&app, &token).await;
    let (_, after) = call(&app, "GET", "/api/v1/knowledge/rag/stats", None, None).await;
    assert_eq!(
        after["total_documents"].as_u64().unwrap(),
        before["total_documents"].as_u64().unwrap() + 1
    );

    let (status, json) = call(
        &app,
        "GET",
        "/api/v1/knowledge/rag/search?query=bundle%20sticks%20place%20value&type=solution",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sources"][0]["type"], "solution");

    let (status, _) = call(&app, "GET", "/api/v1/knowledge/rag/search?query=ab", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_archived_solution_leaves_knowledge_index() {
    let (_dir, app) = create_test_app(None).await;
    let (token, _) = register(&app, "asha@school.in", "teacher").await;
    let (crp, _) = register(&app, "crp@school.in", "crp").await;
    let id = share(&app, &token).await["id"].as_str().unwrap().to_string();

    let search = "/api/v1/knowledge/rag/search?query=bundle%20sticks%20place%20value&type=solution";
    let status_uri = format!("/api/v1/knowledge/library/{}/status", id);
    let (_, json) = call(&app, "GET", search, None, None).await;
    assert_eq!(json["sources"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, "PUT", &status_uri, Some(&crp), Some(json!({ "status": "archived" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = call(&app, "GET", search, None, None).await;
    assert!(json["sources"].as_array().unwrap().is_empty());
    let (_, stats) = call(&app, "GET", "/api/v1/knowledge/rag/stats", None, None).await;
    assert!(stats["by_type"]["solution"].is_null());

    // Restoring puts it back
    let (status, _) = call(&app, "PUT", &status_uri, Some(&crp), Some(json!({ "status": "approved" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = call(&app, "GET", search, None, None).await;
    assert_eq!(json["sources"].as_array().unwrap().len(), 1);
}

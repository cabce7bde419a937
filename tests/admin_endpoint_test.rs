use axum::http::StatusCode;
use profit_engine::api;
use profit_engine::db::init_db;
use profit_engine::domain::{Decimal, NewPosition, PeriodUnit, PositionId, TimeMs, UserId};
use profit_engine::{LifecycleManager, ProfitDistributor, Repository};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

const HOUR: i64 = 3_600_000;

struct TestApp {
    app: axum::Router,
    repo: Arc<Repository>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let distributor = Arc::new(ProfitDistributor::new(repo.clone(), 2));
    let lifecycle = Arc::new(LifecycleManager::new(repo.clone(), distributor.clone(), 2));
    let state = api::AppState::new(repo.clone(), distributor, lifecycle);
    let app = api::create_router(state);

    TestApp {
        app,
        repo,
        _temp: temp_dir,
    }
}

async fn request(app: axum::Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn money(value: &serde_json::Value) -> Decimal {
    d(value.as_str().expect("money is serialized as a string"))
}

async fn seed_position(repo: &Repository, total_periods: u32) -> PositionId {
    let user = UserId::new("alice");
    repo.provision_account(&user, d("1000"))
        .await
        .unwrap();
    repo.open_position(&NewPosition {
        user_id: user,
        plan_id: "starter".to_string(),
        principal: d("1000"),
        period_rate: d("0.001"),
        period_unit: PeriodUnit::Hour,
        total_periods,
        start: TimeMs::new(0),
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_health_and_ready() {
    let test_app = setup_test_app().await;

    let (status, body) = request(test_app.app.clone(), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = request(test_app.app, "GET", "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_distribute_endpoint_reports_counts() {
    let test_app = setup_test_app().await;
    seed_position(&test_app.repo, 24).await;

    let uri = format!("/v1/admin/distribute?nowMs={}", 5 * HOUR);
    let (status, body) = request(test_app.app.clone(), "POST", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credited"], 5);
    assert_eq!(body["skipped"], 0);
    assert_eq!(money(&body["amountCredited"]), d("5"));
    assert_eq!(body["errors"].as_array().unwrap().len(), 0);
    assert!(body["runId"].is_string());

    let (status, body) = request(test_app.app, "POST", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credited"], 0);
    assert_eq!(body["skipped"], 5);
}

#[tokio::test]
async fn test_complete_expired_endpoint() {
    let test_app = setup_test_app().await;
    let id = seed_position(&test_app.repo, 3).await;

    let uri = format!("/v1/admin/complete-expired?nowMs={}", 4 * HOUR);
    let (status, body) = request(test_app.app.clone(), "POST", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed"], 1);
    assert_eq!(body["credited"], 3);
    assert_eq!(money(&body["principalReturned"]), d("1000"));

    let (status, body) = request(
        test_app.app.clone(),
        "GET",
        &format!("/v1/positions/{}/ledger", id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["creditedPeriods"], serde_json::json!([1, 2, 3]));
    assert_eq!(body["contiguous"], true);
    assert_eq!(body["consistent"], true);

    let (status, body) = request(test_app.app, "GET", "/v1/accounts/alice/ledger").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consistent"], true);
}

#[tokio::test]
async fn test_ledger_not_found() {
    let test_app = setup_test_app().await;

    let (status, body) = request(test_app.app.clone(), "GET", "/v1/positions/99/ledger").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("99"));

    let (status, _) = request(test_app.app, "GET", "/v1/accounts/ghost/ledger").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_distribute_rejects_get() {
    let test_app = setup_test_app().await;
    let (status, _) = request(test_app.app, "GET", "/v1/admin/distribute").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

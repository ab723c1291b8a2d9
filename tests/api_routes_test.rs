use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use logo_service::config::Config;
use logo_service::database::Database;
use logo_service::processing::ImageProcessor;
use logo_service::providers::LogoResult;
use logo_service::service::LogoService;
use logo_service::storage::LogoStorage;
use logo_service::web::WebServer;

fn sample_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(20, 10, image::Rgba([30, 60, 200, 255]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

struct TestApp {
    app: Router,
    service: LogoService,
    _dir: tempfile::TempDir,
}

async fn test_app(configure: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}/logos.db", dir.path().display());
    let database = Database::new(&url).await.unwrap();
    database.migrate().await.unwrap();
    let storage = LogoStorage::new(dir.path().join("logos"));
    let service = LogoService::new(database, storage, ImageProcessor::new(), Vec::new());

    let mut config = Config::default();
    config.web.host = "127.0.0.1".to_string();
    config.web.port = 0;
    config.auth.api_keys = vec!["test-key".to_string()];
    config.auth.admin_keys = vec!["admin-key".to_string()];
    config.ratelimit.requests_per_second = 100.0;
    config.ratelimit.burst = 100;
    configure(&mut config);

    let server = WebServer::new(config, service.clone(), CancellationToken::new()).unwrap();
    TestApp {
        app: server.app(),
        service,
        _dir: dir,
    }
}

async fn ingest_sample(service: &LogoService, symbol: &str) {
    let result = LogoResult {
        symbol: symbol.to_string(),
        company_name: "Sample Corp".to_string(),
        image_data: sample_png(),
        source: "github:owner/repo".to_string(),
        original_url: "https://raw.example.com/logo.png".to_string(),
    };
    service.process_and_store(&result).await.unwrap();
}

// Helper to drive requests through the router without binding a socket
async fn raw_request(
    app: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn send_request(
    app: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let response = raw_request(app, method, uri, headers).await;
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
    };

    (status, json)
}

const KEY: &[(&str, &str)] = &[("x-api-key", "test-key")];
const ADMIN: &[(&str, &str)] = &[("x-api-key", "admin-key")];

#[tokio::test]
async fn healthz_needs_no_key() {
    let t = test_app(|_| {}).await;

    let (status, body) = send_request(&t.app, Method::GET, "/healthz", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "logo-service");
}

#[tokio::test]
async fn logo_route_requires_an_api_key() {
    let t = test_app(|_| {}).await;

    let (status, body) = send_request(&t.app, Method::GET, "/api/v1/logos/AAPL", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing API key");

    let (status, body) = send_request(
        &t.app,
        Method::GET,
        "/api/v1/logos/AAPL",
        &[("x-api-key", "wrong-key")],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid API key");
}

#[tokio::test]
async fn api_key_query_parameter_is_accepted() {
    let t = test_app(|_| {}).await;
    ingest_sample(&t.service, "AAPL").await;

    let (status, _) = send_request(
        &t.app,
        Method::GET,
        "/api/v1/logos/AAPL?api_key=test-key",
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn invalid_size_is_a_bad_request() {
    let t = test_app(|_| {}).await;

    let (status, body) = send_request(
        &t.app,
        Method::GET,
        "/api/v1/logos/AAPL?size=huge",
        KEY,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid size: must be xs, s, m, l, or xl");
}

#[tokio::test]
async fn unknown_symbol_is_a_miss() {
    let t = test_app(|_| {}).await;

    let (status, body) = send_request(&t.app, Method::GET, "/api/v1/logos/ZZZZ", KEY).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "logo not found");
}

#[tokio::test]
async fn served_logo_carries_image_headers() {
    let t = test_app(|_| {}).await;
    ingest_sample(&t.service, "AAPL").await;

    let response = raw_request(&t.app, Method::GET, "/api/v1/logos/aapl?size=s", KEY).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.headers()["cache-control"], "public, max-age=86400");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let img = image::load_from_memory(&body).unwrap();
    assert_eq!((img.width(), img.height()), (32, 32));
    // Wide source centered on a square canvas leaves the corners transparent
    assert_eq!(img.to_rgba8().get_pixel(0, 0)[3], 0);
}

#[tokio::test]
async fn background_color_flattens_transparency() {
    let t = test_app(|_| {}).await;
    ingest_sample(&t.service, "AAPL").await;

    let response = raw_request(
        &t.app,
        Method::GET,
        "/api/v1/logos/AAPL?size=s&bg=0088ff",
        KEY,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let img = image::load_from_memory(&body).unwrap().to_rgba8();
    let corner = img.get_pixel(0, 0);
    assert_eq!(corner[3], 255);
    assert_eq!((corner[0], corner[1], corner[2]), (0, 0x88, 0xff));
}

#[tokio::test]
async fn malformed_background_color_is_rejected() {
    let t = test_app(|_| {}).await;
    ingest_sample(&t.service, "AAPL").await;

    let (status, body) = send_request(
        &t.app,
        Method::GET,
        "/api/v1/logos/AAPL?bg=zzzzzz",
        KEY,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("invalid background color:"), "{message}");
}

#[tokio::test]
async fn admin_routes_need_the_admin_key() {
    let t = test_app(|_| {}).await;
    ingest_sample(&t.service, "AAPL").await;

    let (status, body) = send_request(&t.app, Method::GET, "/api/v1/admin/stats", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing admin API key");

    // A valid serving key is still not an admin key
    let (status, body) = send_request(&t.app, Method::GET, "/api/v1/admin/stats", KEY).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "invalid admin API key");

    let (status, body) = send_request(&t.app, Method::GET, "/api/v1/admin/stats", ADMIN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["processed"], 1);
    assert_eq!(body["pending"], 0);
    assert_eq!(body["failed"], 0);
}

#[tokio::test]
async fn import_validates_the_source() {
    let t = test_app(|_| {}).await;

    let (status, body) = send_request(
        &t.app,
        Method::POST,
        "/api/v1/admin/import?source=bloomberg",
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid source: must be 'all' or 'github'");
}

#[tokio::test]
async fn import_is_accepted_and_detached() {
    let t = test_app(|_| {}).await;

    let (status, body) = send_request(
        &t.app,
        Method::POST,
        "/api/v1/admin/import?source=github",
        ADMIN,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["source"], "github");
    assert_eq!(body["message"], "import started in background");
}

#[tokio::test]
async fn per_key_rate_limit_returns_429_with_retry_after() {
    let t = test_app(|config| {
        config.ratelimit.requests_per_second = 1.0;
        config.ratelimit.burst = 2;
    })
    .await;
    ingest_sample(&t.service, "AAPL").await;

    for _ in 0..2 {
        let (status, _) = send_request(&t.app, Method::GET, "/api/v1/logos/AAPL", KEY).await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = raw_request(&t.app, Method::GET, "/api/v1/logos/AAPL", KEY).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response.headers()["retry-after"].to_str().unwrap();
    assert!(retry_after.parse::<u64>().unwrap() >= 1);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "rate limit exceeded");
}

#[tokio::test]
async fn cors_preflight_allows_the_configured_origin() {
    let t = test_app(|config| {
        config.cors.allowed_origins = vec!["https://dash.example.com".to_string()];
    })
    .await;

    let response = raw_request(
        &t.app,
        Method::OPTIONS,
        "/api/v1/logos/AAPL",
        &[
            ("origin", "https://dash.example.com"),
            ("access-control-request-method", "GET"),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://dash.example.com"
    );
}

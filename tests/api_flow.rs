//! End-to-end pipeline tests against a mock HTTP server.
//!
//! Each test points the client at a local wiremock instance standing in
//! for the remote service: handshake, task creation, storage upload,
//! status polling, and result download.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use remini::auth::{MemoryTokenStore, SessionToken, TokenStore};
use remini::{PollConfig, Remini, ReminiConfig, ReminiError, RetryPolicy, Style};

const FRESH_TOKEN: &str = "fresh-token";
const CACHED_TOKEN: &str = "cached-token";
const STALE_TOKEN: &str = "stale-token";

// =============================================================================
// Fixtures
// =============================================================================

/// Route client log output through the test harness; `RUST_LOG` controls
/// verbosity when a test needs tracing output for diagnosis.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config(server: &MockServer) -> ReminiConfig {
    init_tracing();
    let mut config = ReminiConfig::default();
    config.api_base_url = format!("{}/v1/mobile", server.uri());
    config.oracle_base_url = format!("{}/oracle", server.uri());
    config.retry = RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
    };
    config.poll = PollConfig {
        interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(40),
        max_wait: Duration::from_secs(2),
    };
    config
}

fn client_with_empty_cache(server: &MockServer) -> Remini {
    Remini::with_store(test_config(server), Arc::new(MemoryTokenStore::new())).unwrap()
}

fn client_with_cached_token(server: &MockServer) -> Remini {
    let store = MemoryTokenStore::with_token(SessionToken::new(CACHED_TOKEN.to_string()));
    Remini::with_store(test_config(server), Arc::new(store)).unwrap()
}

/// Write a small input image and return (dir, input path, output path).
fn scratch_files() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("photo.jpg");
    std::fs::write(&input, b"\xff\xd8\xff fake jpeg bytes").unwrap();
    let output = dir.path().join("enhanced.jpg");
    (dir, input, output)
}

async fn mount_handshake(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/oracle/setup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "settings": {"__identity__": {"token": FRESH_TOKEN}}
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_profile(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/mobile/users/@me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"balance": 42})))
        .mount(server)
        .await;
}

/// Task creation, storage upload, and the processing ping for `task_id`.
async fn mount_submission(server: &MockServer, task_id: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/mobile/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": task_id,
            "upload_url": format!("{}/storage/blob", server.uri()),
            "upload_headers": {"x-goog-meta-source": "remini"}
        })))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/storage/blob"))
        .and(header("x-goog-meta-source", "remini"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/mobile/tasks/{}/process", task_id)))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn mount_completed_status(server: &MockServer, task_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/mobile/tasks/{}", task_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "result": {"outputs": [{"url": format!("{}/results/out.jpg", server.uri())}]}
        })))
        .mount(server)
        .await;
}

async fn mount_result_download(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/results/out.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"enhanced image bytes".to_vec()))
        .mount(server)
        .await;
}

// =============================================================================
// Happy paths
// =============================================================================

#[tokio::test]
async fn test_process_writes_non_empty_output() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-1").await;
    mount_completed_status(&server, "t-1").await;
    mount_result_download(&server).await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    client.process(&input, &output).await.expect("process should succeed");

    let written = std::fs::read(&output).unwrap();
    assert_eq!(written, b"enhanced image bytes");
    // The .part staging file must be gone
    assert!(!Path::new(&format!("{}.part", output.display())).exists());
}

#[tokio::test]
async fn test_process_polls_until_completed() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-2").await;

    // 404 (not registered yet), then processing, then completed
    Mock::given(method("GET"))
        .and(path("/v1/mobile/tasks/t-2"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/mobile/tasks/t-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "processing"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_completed_status(&server, "t-2").await;
    mount_result_download(&server).await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    client.process(&input, &output).await.expect("process should succeed");
    assert!(std::fs::metadata(&output).unwrap().len() > 0);
}

#[tokio::test]
async fn test_stylize_reprocesses_base_task() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-base").await;
    mount_completed_status(&server, "t-base").await;

    Mock::given(method("POST"))
        .and(path("/v1/mobile/tasks/t-base/reprocess"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-style"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_completed_status(&server, "t-style").await;
    mount_result_download(&server).await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    client
        .stylize(&input, Style::Toon, &output)
        .await
        .expect("stylize should succeed");
    assert!(std::fs::metadata(&output).unwrap().len() > 0);
}

// =============================================================================
// Local input validation
// =============================================================================

#[tokio::test]
async fn test_missing_input_fails_before_any_network_call() {
    let server = MockServer::start().await;
    let client = client_with_empty_cache(&server);

    let err = client
        .process("/no/such/image.jpg", "/tmp/never-written.jpg")
        .await
        .expect_err("missing input must fail");
    assert!(matches!(err, ReminiError::InputNotFound(_)));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty(), "no network traffic expected, saw {:?}", requests);
}

// =============================================================================
// Token caching
// =============================================================================

#[tokio::test]
async fn test_cached_token_skips_handshake() {
    let server = MockServer::start().await;
    // A valid cached token must never trigger /setup
    mount_handshake(&server, 0).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-3").await;
    mount_completed_status(&server, "t-3").await;
    mount_result_download(&server).await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_cached_token(&server);

    client.process(&input, &output).await.expect("process should succeed");
}

#[tokio::test]
async fn test_empty_cache_triggers_exactly_one_handshake() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-4").await;
    mount_completed_status(&server, "t-4").await;
    mount_result_download(&server).await;

    let (_dir, input, output) = scratch_files();
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let client = Remini::with_store(test_config(&server), Arc::clone(&store)).unwrap();

    client.process(&input, &output).await.expect("process should succeed");

    // The fresh token was persisted through the injected store
    assert_eq!(store.load().unwrap().token, FRESH_TOKEN);
}

#[tokio::test]
async fn test_expired_cached_token_triggers_one_handshake() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-12").await;
    mount_completed_status(&server, "t-12").await;
    mount_result_download(&server).await;

    let (_dir, input, output) = scratch_files();
    // Token acquired well past the 12h lifetime
    let stale = SessionToken {
        token: STALE_TOKEN.to_string(),
        acquired_at: chrono::Utc::now() - chrono::Duration::hours(13),
    };
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::with_token(stale));
    let client = Remini::with_store(test_config(&server), Arc::clone(&store)).unwrap();

    client.process(&input, &output).await.expect("process should succeed");

    // The stale token was replaced in the store and never sent anywhere
    assert_eq!(store.load().unwrap().token, FRESH_TOKEN);
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| {
        r.headers
            .get("identity-token")
            .map_or(true, |v| v.as_bytes() != STALE_TOKEN.as_bytes())
    }));
}

#[tokio::test]
async fn test_rejected_handshake_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oracle/setup"))
        .respond_with(ResponseTemplate::new(403).set_body_string("blocked client"))
        .mount(&server)
        .await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    let err = client.process(&input, &output).await.expect_err("handshake must fail");
    match err {
        ReminiError::Auth(msg) => assert!(msg.contains("blocked client"), "{}", msg),
        other => panic!("expected Auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_schema_drift_in_setup_response_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oracle/setup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "settings": {"renamed_identity": {"token": "tok"}}
        })))
        .mount(&server)
        .await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    let err = client.process(&input, &output).await.expect_err("drifted schema must fail");
    assert!(matches!(err, ReminiError::Auth(_)));
}

// =============================================================================
// Retry behavior
// =============================================================================

#[tokio::test]
async fn test_transient_503s_are_retried_to_success() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;

    // Two 503s, then the normal task creation response
    Mock::given(method("POST"))
        .and(path("/v1/mobile/tasks"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_submission(&server, "t-5").await;
    mount_completed_status(&server, "t-5").await;
    mount_result_download(&server).await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    client.process(&input, &output).await.expect("retries should recover");
}

#[tokio::test]
async fn test_persistent_503_exhausts_retries() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/mobile/tasks"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    let err = client.process(&input, &output).await.expect_err("must exhaust retries");
    match err {
        ReminiError::Transport { attempts, .. } => {
            // max_retries = 2 in the test config: 1 initial + 2 retries
            assert_eq!(attempts, 3);
        }
        other => panic!("expected Transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/mobile/tasks"))
        .respond_with(ResponseTemplate::new(413).set_body_string("payload too large"))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    let err = client.process(&input, &output).await.expect_err("413 must fail fast");
    match err {
        ReminiError::Api(msg) => assert!(msg.contains("payload too large"), "{}", msg),
        other => panic!("expected Api error, got {:?}", other),
    }
}

// =============================================================================
// 401 re-authentication cycle
// =============================================================================

#[tokio::test]
async fn test_single_401_triggers_one_reauth_and_succeeds() {
    let server = MockServer::start().await;
    // Cached token logs in fine, then gets rejected mid-pipeline; the
    // re-auth handshake must run exactly once.
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-6").await;

    Mock::given(method("GET"))
        .and(path("/v1/mobile/tasks/t-6"))
        .and(header("identity-token", CACHED_TOKEN))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/mobile/tasks/t-6"))
        .and(header("identity-token", FRESH_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "result": {"outputs": [{"url": format!("{}/results/out.jpg", server.uri())}]}
        })))
        .mount(&server)
        .await;
    mount_result_download(&server).await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_cached_token(&server);

    client.process(&input, &output).await.expect("one re-auth should recover");
}

#[tokio::test]
async fn test_second_consecutive_401_surfaces_as_auth_error() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-7").await;
    Mock::given(method("GET"))
        .and(path("/v1/mobile/tasks/t-7"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_cached_token(&server);

    let err = client.process(&input, &output).await.expect_err("second 401 must fail");
    assert!(matches!(err, ReminiError::Auth(_)), "got {:?}", err);
}

// =============================================================================
// Terminal job states
// =============================================================================

#[tokio::test]
async fn test_failed_job_carries_remote_reason() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-8").await;
    Mock::given(method("GET"))
        .and(path("/v1/mobile/tasks/t-8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "errors": ["unsupported image format"]
        })))
        .mount(&server)
        .await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    let err = client.process(&input, &output).await.expect_err("failed job must error");
    match err {
        ReminiError::Api(msg) => assert!(msg.contains("unsupported image format"), "{}", msg),
        other => panic!("expected Api error, got {:?}", other),
    }
    assert!(!output.exists());
}

#[tokio::test]
async fn test_slow_job_times_out_locally() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-9").await;
    Mock::given(method("GET"))
        .and(path("/v1/mobile/tasks/t-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "processing"})))
        .mount(&server)
        .await;

    let (_dir, input, output) = scratch_files();
    let mut config = test_config(&server);
    config.poll.max_wait = Duration::from_millis(80);
    let client = Remini::with_store(config, Arc::new(MemoryTokenStore::new())).unwrap();

    let err = client.process(&input, &output).await.expect_err("must time out");
    match err {
        ReminiError::Timeout { task_id, waited } => {
            assert_eq!(task_id, "t-9");
            assert_eq!(waited, Duration::from_millis(80));
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert!(!output.exists());
}

// =============================================================================
// Result download
// =============================================================================

#[tokio::test]
async fn test_expired_result_reference_leaves_no_output_file() {
    let server = MockServer::start().await;
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-10").await;
    mount_completed_status(&server, "t-10").await;
    Mock::given(method("GET"))
        .and(path("/results/out.jpg"))
        .respond_with(ResponseTemplate::new(410).set_body_string("signed URL expired"))
        .mount(&server)
        .await;

    let (_dir, input, output) = scratch_files();
    let client = client_with_empty_cache(&server);

    let err = client.process(&input, &output).await.expect_err("expired result must fail");
    assert!(matches!(err, ReminiError::Api(_)), "got {:?}", err);
    assert!(!output.exists());
    assert!(!Path::new(&format!("{}.part", output.display())).exists());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_jobs_share_one_session() {
    let server = MockServer::start().await;
    // Both jobs race to log in; the shared session means at most one
    // handshake between them.
    mount_handshake(&server, 1).await;
    mount_profile(&server).await;
    mount_submission(&server, "t-11").await;
    mount_completed_status(&server, "t-11").await;
    mount_result_download(&server).await;

    let (_dir, input, _) = scratch_files();
    let out_a = input.with_file_name("a.jpg");
    let out_b = input.with_file_name("b.jpg");
    let client = client_with_empty_cache(&server);
    let second = client.clone();

    let (a, b) = tokio::join!(
        client.process(&input, &out_a),
        second.process(&input, &out_b),
    );
    a.expect("first job should succeed");
    b.expect("second job should succeed");
    assert!(out_a.exists() && out_b.exists());
}

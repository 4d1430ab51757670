use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tally::error::EvalError;
use tally::finder::DfsFinder;
use tally::model::Batch;
use tally::orchestrator::{DataflowExecutor, Evaluation, Executor, OrchestratorConfig};
use tally::protocol::{ErrorBody, ProcessResponse};
use tally::server;

/// A running server on an ephemeral port. Shuts down on drop.
struct TestServer {
    url: String,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start(request_timeout: Duration) -> TestServer {
    let executor = Arc::new(DataflowExecutor::new(
        Arc::new(DfsFinder),
        OrchestratorConfig::default(),
    ));
    start_with(executor, request_timeout).await
}

async fn start_with(executor: Arc<dyn Executor>, request_timeout: Duration) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(server::serve(
        listener,
        executor,
        request_timeout,
        shutdown.clone(),
    ));
    TestServer {
        url: format!("http://{addr}/process"),
        shutdown,
    }
}

async fn post(server: &TestServer, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(&server.url)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn evaluates_batch() {
    let server = start(Duration::from_secs(5)).await;
    let body = json!([
        {"type": "calc", "op": "+", "var": "x", "left": 1, "right": 2},
        {"type": "calc", "op": "*", "var": "y", "left": "x", "right": 3},
        {"type": "calc", "op": "-", "var": "z", "left": "x", "right": 4},
        {"type": "print", "var": "y"},
        {"type": "print", "var": "z"},
        {"type": "print", "var": "y"}
    ]);

    let response = post(&server, body).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let parsed: ProcessResponse = response.json().await.unwrap();
    let pairs: Vec<_> = parsed
        .items
        .iter()
        .map(|i| (i.var.as_str(), i.value))
        .collect();
    assert_eq!(pairs, vec![("y", 9), ("z", -1), ("y", 9)]);
}

#[tokio::test]
async fn rejects_malformed_json() {
    let server = start(Duration::from_secs(5)).await;
    let response = reqwest::Client::new()
        .post(&server.url)
        .header("content-type", "application/json")
        .body("invalid json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error, "invalid_request");
}

#[tokio::test]
async fn rejects_unknown_operation() {
    let server = start(Duration::from_secs(5)).await;
    let response = post(
        &server,
        json!([{"type": "calc", "op": "/", "var": "x", "left": 1, "right": 2}]),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rejects_wrong_argument_type() {
    let server = start(Duration::from_secs(5)).await;
    let response = post(
        &server,
        json!([{"type": "calc", "op": "+", "var": "x", "left": true, "right": 2}]),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error, "invalid_request");
}

#[tokio::test]
async fn reports_cycle() {
    let server = start(Duration::from_secs(5)).await;
    let response = post(
        &server,
        json!([
            {"type": "calc", "op": "+", "var": "a", "left": "b", "right": 1},
            {"type": "calc", "op": "-", "var": "b", "left": "a", "right": 2},
            {"type": "print", "var": "a"}
        ]),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error, "cycle_detected");
}

#[tokio::test]
async fn reports_undefined_variable() {
    let server = start(Duration::from_secs(5)).await;
    let response = post(&server, json!([{"type": "print", "var": "x"}])).await;
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error, "undefined_variable");
}

#[tokio::test]
async fn get_is_not_allowed() {
    let server = start(Duration::from_secs(5)).await;
    let response = reqwest::get(&server.url).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
}

/// Never finishes a batch.
struct Stalled;

#[async_trait]
impl Executor for Stalled {
    async fn execute(
        &self,
        _token: &CancellationToken,
        _batch: &Batch,
    ) -> Result<Evaluation, EvalError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn slow_batch_times_out() {
    let server = start_with(Arc::new(Stalled), Duration::from_millis(100)).await;
    let response = post(
        &server,
        json!([
            {"type": "calc", "op": "+", "var": "x", "left": 1, "right": 2},
            {"type": "print", "var": "x"}
        ]),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error, "timeout");
}

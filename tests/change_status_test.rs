//! End-to-end polls against a mocked change-status API.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use change_gate::gate::{ChangeGate, PollSchedule};
use change_gate::interpret::{Interpreter, PollContext};
use change_gate::outcome::{PollOutcome, TransportError};
use change_gate::request::{Credentials, PollRequest};
use change_gate::sink::{MemorySink, RecordingReporter, CHANGE_REQUEST_NUMBER, CHANGE_REQUEST_SYS_ID};
use change_gate::transport::{ChangeStatusSource, HttpChangeStatusSource, HttpResult};

const V2_PATH: &str = "/api/sn_devops/v2/devops/orchestration/changeStatus";
const V1_PATH: &str = "/api/sn_devops/v1/devops/orchestration/changeStatus";

fn poll_request(base_url: String, credentials: Credentials) -> PollRequest {
    PollRequest {
        instance_url: base_url,
        tool_id: "tool-1".to_string(),
        credentials,
        job_name: "deploy prod".to_string(),
        repository: "acme/shop".to_string(),
        workflow: "Release".to_string(),
        run_id: "987".to_string(),
        run_attempt: "2".to_string(),
    }
}

fn gate_for(
    server: &MockServer,
    credentials: Credentials,
    abort: bool,
) -> (ChangeGate<HttpChangeStatusSource>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let interpreter = Interpreter::new(sink.clone(), Arc::new(RecordingReporter::new()));
    let source = HttpChangeStatusSource::new(None).unwrap();
    let request = poll_request(server.uri(), credentials).build();
    let context = PollContext::new(Utc::now(), 3600, abort);
    (ChangeGate::new(source, request, interpreter, context), sink)
}

fn details_body(details: serde_json::Value) -> serde_json::Value {
    json!({ "result": { "details": details } })
}

#[tokio::test]
async fn test_token_request_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(V2_PATH))
        .and(query_param("toolId", "tool-1"))
        .and(query_param("stageName", "deploy prod"))
        .and(query_param("pipelineName", "acme/shop/Release"))
        .and(query_param("buildNumber", "987"))
        .and(query_param("attemptNumber", "2"))
        .and(header("Authorization", "sn_devops.DevOpsToken tool-1:secret-token"))
        .and(header("Accept", "application/json"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(details_body(json!({
            "status": "implement",
            "number": "CHG0031",
            "sys_id": "5f1c"
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let (mut gate, sink) = gate_for(&server, Credentials::select("", "", "secret-token"), true);
    let outcome = gate.poll_once().await;

    assert_eq!(outcome, PollOutcome::Approved);
    assert_eq!(sink.get(CHANGE_REQUEST_NUMBER).as_deref(), Some("CHG0031"));
    assert_eq!(sink.get(CHANGE_REQUEST_SYS_ID).as_deref(), Some("5f1c"));
}

#[tokio::test]
async fn test_basic_auth_request_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(V1_PATH))
        .and(header("Authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(201).set_body_json(details_body(json!({
            "status": "pending_decision",
            "number": "CHG0031"
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let (mut gate, sink) = gate_for(&server, Credentials::select("admin", "secret", ""), true);
    let outcome = gate.poll_once().await;

    assert!(matches!(outcome, PollOutcome::Pending { .. }));
    assert_eq!(sink.get(CHANGE_REQUEST_NUMBER).as_deref(), Some("CHG0031"));
}

#[tokio::test]
async fn test_structured_bad_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(V2_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "result": { "errorMessage": "Invalid pipeline name" }
        })))
        .mount(&server)
        .await;

    let (mut gate, sink) = gate_for(&server, Credentials::select("", "", "tok"), true);
    let outcome = gate.poll_once().await;

    assert_eq!(
        outcome,
        PollOutcome::Transport(TransportError::BadRequest {
            message: Some(json!("Invalid pipeline name"))
        })
    );
    assert!(sink.outputs().is_empty());
}

#[tokio::test]
async fn test_non_json_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let (mut gate, _sink) = gate_for(&server, Credentials::select("", "", "tok"), true);
    let outcome = gate.poll_once().await;

    assert_eq!(outcome.marker(), "500");
    assert!(outcome.is_fatal());
}

#[tokio::test]
async fn test_connection_refused_is_no_response() {
    let source = HttpChangeStatusSource::new(None).unwrap();
    let request = poll_request(
        "http://127.0.0.1:1".to_string(),
        Credentials::select("", "", "tok"),
    )
    .build();

    let result = source.fetch(&request).await;
    assert!(matches!(result, HttpResult::NoResponse { .. }));
}

#[tokio::test]
async fn test_run_until_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(V2_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(details_body(json!({
            "status": "pending_decision",
            "number": "CHG0031"
        }))))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(V2_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(details_body(json!({
            "status": "rejected",
            "number": "CHG0031"
        }))))
        .mount(&server)
        .await;

    let (mut gate, _sink) = gate_for(&server, Credentials::select("", "", "tok"), true);
    let outcome = gate
        .run(PollSchedule {
            interval: std::time::Duration::from_millis(5),
            max_wait: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome, PollOutcome::Stopped);
    assert_eq!(outcome.marker(), "202");
    assert_eq!(gate.polls(), 3);
}

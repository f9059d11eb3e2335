//! `HttpControlSurface` against a mock agent server.

use std::time::Duration;

use overseer::core::types::AgentStatus;
use overseer::error::ClientError;
use overseer::io::client::{ControlSurface, HttpControlSurface};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn surface(server: &MockServer) -> HttpControlSurface {
    HttpControlSurface::new(server.uri(), Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn status_parses_full_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "executing_plan",
            "current_task": "Open the calculator app",
            "current_plan": [
                {"action": "open_app", "description": "Launch calculator", "app": "calc"},
                {"action": "screenshot", "description": "Confirm it opened"}
            ],
            "plan_step": 1,
            "history": [
                {"timestamp": 1700000000.5, "action": {"action": "open_app", "app": "calc"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = surface(&server).status().await.expect("status");
    assert_eq!(
        snapshot.status,
        AgentStatus::Other("executing_plan".to_string())
    );
    assert_eq!(
        snapshot.current_task.as_deref(),
        Some("Open the calculator app")
    );
    assert_eq!(snapshot.current_plan.len(), 2);
    assert_eq!(snapshot.current_plan[0].params["app"], "calc");
    let step = snapshot.current_step().expect("step");
    assert_eq!(step.description, "Confirm it opened");
    assert_eq!(snapshot.history[0].name(), Some("open_app"));
}

#[tokio::test]
async fn status_tolerates_placeholder_task_and_nulls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "idle",
            "current_task": "None",
            "current_plan": null,
            "plan_step": null
        })))
        .mount(&server)
        .await;

    let snapshot = surface(&server).status().await.expect("status");
    assert_eq!(snapshot.status, AgentStatus::Idle);
    assert_eq!(snapshot.current_task, None);
    assert!(snapshot.current_plan.is_empty());
    assert_eq!(snapshot.plan_step, 0);
}

#[tokio::test]
async fn status_server_error_is_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = surface(&server).status().await.expect_err("failed");
    assert_eq!(
        err,
        ClientError::Http {
            status: 500,
            body: "boom".to_string()
        }
    );
}

#[tokio::test]
async fn status_with_wrong_shape_is_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "idle"})))
        .mount(&server)
        .await;

    let err = surface(&server).status().await.expect_err("failed");
    assert!(matches!(err, ClientError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn logs_and_mirrored_input_are_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"logs": ["INFO start\n", "INFO planning\n"]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user_input"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user_input": "go left"})))
        .mount(&server)
        .await;

    let surface = surface(&server);
    assert_eq!(
        surface.logs().await.expect("logs"),
        vec!["INFO start".to_string(), "INFO planning".to_string()]
    );
    assert_eq!(surface.mirrored_input().await.expect("input"), "go left");
}

#[tokio::test]
async fn pending_question_is_optional() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pending_question"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"question": null})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pending_question"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"question": "Which file should I open?"})),
        )
        .mount(&server)
        .await;

    let surface = surface(&server);
    assert_eq!(surface.pending_question().await.expect("none"), None);
    assert_eq!(
        surface.pending_question().await.expect("question"),
        Some("Which file should I open?".to_string())
    );
}

#[tokio::test]
async fn missing_question_endpoint_falls_back_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "executing_plan",
            "pending_user_question": "Which file should I open?"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "idle"})))
        .mount(&server)
        .await;

    let surface = surface(&server);
    assert_eq!(
        surface.pending_question().await.expect("embedded question"),
        Some("Which file should I open?".to_string())
    );
    assert_eq!(surface.pending_question().await.expect("none"), None);
}

#[tokio::test]
async fn missing_question_endpoint_and_status_is_an_error() {
    let server = MockServer::start().await;
    let err = surface(&server)
        .pending_question()
        .await
        .expect_err("nothing mounted");
    assert!(matches!(err, ClientError::Http { status: 404, .. }));
}

#[tokio::test]
async fn task_submission_posts_task_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/task"))
        .and(body_json(json!({"task": "Open the calculator app"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Task received"})))
        .expect(1)
        .mount(&server)
        .await;

    surface(&server)
        .submit_task("Open the calculator app")
        .await
        .expect("submitted");
}

#[tokio::test]
async fn busy_agent_rejection_carries_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/task"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"error": "Agent is busy with another task."})),
        )
        .mount(&server)
        .await;

    let err = surface(&server)
        .submit_task("another")
        .await
        .expect_err("rejected");
    assert_eq!(
        err,
        ClientError::Rejected("Agent is busy with another task.".to_string())
    );
}

#[tokio::test]
async fn directive_and_answer_use_their_own_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user_input"))
        .and(body_json(json!({"user_input": "use the left monitor"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pending_answer"))
        .and(body_json(json!({"answer": "notes.txt"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let surface = surface(&server);
    surface
        .submit_directive("use the left monitor")
        .await
        .expect("directive");
    surface.submit_answer("notes.txt").await.expect("answer");
}

#[tokio::test]
async fn lifecycle_endpoints_are_posted() {
    let server = MockServer::start().await;
    for endpoint in ["/kill", "/reset", "/clear_logs"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let surface = surface(&server);
    surface.request_kill().await.expect("kill");
    surface.request_reset().await.expect("reset");
    surface.clear_logs().await.expect("clear");
}

#[tokio::test]
async fn unreachable_agent_is_request_failure() {
    // Reserve a free port, then release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let surface =
        HttpControlSurface::new(format!("http://{addr}"), Duration::from_secs(2)).expect("client");
    let err = surface.request_kill().await.expect_err("unreachable");
    assert!(matches!(err, ClientError::Request(_)), "{err:?}");
}

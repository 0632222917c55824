mod common;

use common::{spawn_app, TestApp, TEST_TOKEN};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(app: &TestApp, token: Option<&str>) -> Client {
    let mut request = app.ws_address.as_str().into_client_request().unwrap();
    if let Some(token) = token {
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {}", token).parse().unwrap());
    }
    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("WebSocket handshake failed");
    ws
}

/// Next text frame as JSON, skipping heartbeats
async fn recv(ws: &mut Client) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

async fn request(ws: &mut Client, body: Value) -> Value {
    ws.send(Message::Text(body.to_string())).await.unwrap();
    recv(ws).await
}

async fn assert_rejected(app: &TestApp, token: Option<&str>) {
    let mut ws = connect(app, token).await;
    match ws.next().await {
        Some(Ok(Message::Close(frame))) => {
            if let Some(frame) = frame {
                assert_eq!(frame.code, CloseCode::Policy);
            }
        }
        Some(Ok(Message::Text(text))) => panic!("rejected client received {}", text),
        // the socket may also be dropped before the close frame is read
        _ => {}
    }
    assert_eq!(app.sessions.live_count(), 0);
}

#[actix_web::test]
async fn bad_token_gets_no_session() {
    let app = spawn_app().await;

    assert_rejected(&app, Some("wrong")).await;
    assert_rejected(&app, None).await;

    let sessions_dir = app.data_dir.path().join("sessions");
    let written = std::fs::read_dir(&sessions_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(written, 0);
}

#[actix_web::test]
async fn token_in_query_is_accepted() {
    let app = spawn_app().await;
    let url = format!("{}?token={}", app.ws_address, TEST_TOKEN);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let init = recv(&mut ws).await;
    assert_eq!(init["type"], "session_init");
}

#[actix_web::test]
async fn verify_s2do_end_to_end() {
    let app = spawn_app().await;
    let mut ws = connect(&app, Some(TEST_TOKEN)).await;

    let init = recv(&mut ws).await;
    assert_eq!(init["type"], "session_init");
    assert_eq!(init["supported_versions"], json!(["1.0"]));
    let session_id = init["session_id"].as_str().unwrap().to_string();
    assert!(app.sessions.contains(&session_id));

    let response = request(
        &mut ws,
        json!({
            "type": "execute_tool",
            "request_id": "r1",
            "tool_id": "test/verify_s2do",
            "parameters": {
                "stem": "Project",
                "action": "Create",
                "initiator": "co-pilot",
                "expected_result": "success"
            }
        }),
    )
    .await;

    assert_eq!(response["type"], "tool_result");
    assert_eq!(response["request_id"], "r1");
    assert_eq!(response["result"]["result"], "success");
    assert_eq!(response["result"]["expected_result_matched"], true);

    ws.close(None).await.unwrap();
    assert!(app.wait_for_live_sessions(0).await);

    let summary_path = app
        .data_dir
        .path()
        .join("sessions")
        .join(format!("{}.summary.json", session_id));
    let summary: Value = serde_json::from_slice(&std::fs::read(summary_path).unwrap()).unwrap();
    assert_eq!(summary["event_counts"]["session_start"], 1);
    assert_eq!(summary["event_counts"]["session_end"], 1);
    assert_eq!(summary["event_counts"]["response_sent"], 1);
    assert_eq!(summary["results_logged"], 1);
}

#[actix_web::test]
async fn errors_keep_the_connection_open() {
    let app = spawn_app().await;
    let mut ws = connect(&app, Some(TEST_TOKEN)).await;
    recv(&mut ws).await;

    ws.send(Message::Text("not json".to_string())).await.unwrap();
    assert_eq!(recv(&mut ws).await["code"], "malformed_message");

    let unknown = request(&mut ws, json!({"type": "dance", "request_id": 5})).await;
    assert_eq!(unknown["code"], "unknown_message_type");
    assert_eq!(unknown["request_id"], 5);

    let missing = request(
        &mut ws,
        json!({"type": "execute_tool", "request_id": "m", "tool_id": "test/nope"}),
    )
    .await;
    assert_eq!(missing["code"], "tool_not_found");
    assert_eq!(missing["request_id"], "m");

    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    assert_eq!(recv(&mut ws).await["code"], "malformed_message");

    let tools = request(&mut ws, json!({"type": "list_tools", "request_id": "t"})).await;
    assert_eq!(tools["type"], "tools_list");
    assert_eq!(tools["tools"].as_array().unwrap().len(), 5);
}

#[actix_web::test]
async fn pipelined_frames_are_answered_in_order() {
    let app = spawn_app().await;
    let mut ws = connect(&app, Some(TEST_TOKEN)).await;
    recv(&mut ws).await;

    let frames = [
        json!({"type": "list_tools", "request_id": "a"}),
        json!({
            "type": "execute_tool",
            "request_id": "b",
            "tool_id": "test/log_result",
            "parameters": {"test_id": "pipelined", "result": "pass"}
        }),
        json!({
            "type": "execute_tool",
            "request_id": "c",
            "tool_id": "test/generate_report",
            "parameters": {"format": "summary", "test_ids": ["pipelined"]}
        }),
    ];
    for frame in &frames {
        ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    let first = recv(&mut ws).await;
    let second = recv(&mut ws).await;
    let third = recv(&mut ws).await;

    assert_eq!(first["request_id"], "a");
    assert_eq!(first["type"], "tools_list");
    assert_eq!(second["request_id"], "b");
    assert_eq!(second["result"]["logged"], true);
    assert_eq!(third["request_id"], "c");
    // the report only sees the result if "b" finished before "c" started
    assert_eq!(third["result"]["counts"]["total"], 1);
    assert!(third["result"]["missing_test_ids"].is_null());
}

#[actix_web::test]
async fn results_are_shared_across_sessions() {
    let app = spawn_app().await;

    let mut first = connect(&app, Some(TEST_TOKEN)).await;
    recv(&mut first).await;
    let logged = request(
        &mut first,
        json!({
            "type": "execute_tool",
            "request_id": 1,
            "tool_id": "test/log_result",
            "parameters": {"test_id": "login", "result": "pass"}
        }),
    )
    .await;
    assert_eq!(logged["result"]["replaced"], false);

    let mut second = connect(&app, Some(TEST_TOKEN)).await;
    recv(&mut second).await;
    let report = request(
        &mut second,
        json!({
            "type": "execute_tool",
            "request_id": 2,
            "tool_id": "test/generate_report",
            "parameters": {"format": "executive"}
        }),
    )
    .await;
    assert_eq!(report["result"]["counts"]["pass"], 1);
    assert_eq!(report["result"]["status"], "green");

    assert!(app
        .data_dir
        .path()
        .join("results")
        .join("login.json")
        .exists());
}

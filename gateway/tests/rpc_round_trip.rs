//! Full RPC round trips through the HTTP server, queue and host thread

use serde_json::{json, Map};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use gateway::{DocumentHost, Host};
use shared::{RpcCall, RpcEnvelope, RpcReply, SharedError};

mod common;
use common::TestGateway;

#[tokio::test]
async fn test_create_then_get_object_by_name() {
    let gateway = TestGateway::start().await;
    let client = gateway.client();

    let doc = client.create_document("Part").await.unwrap();
    assert!(doc.success, "{doc:?}");
    let doc = doc.document_name.unwrap();

    let created = client
        .create_object(&doc, "Part::Box", "Foo", json!({"Length": 25}).as_object().cloned().unwrap())
        .await
        .unwrap();
    assert_eq!(created.object_name.as_deref(), Some("Foo"));

    let object = client.get_object(&doc, "Foo").await.unwrap().unwrap();
    assert_eq!(object.name, "Foo");
    assert_eq!(object.properties["Length"], json!(25.0));

    assert_eq!(client.list_documents().await.unwrap(), vec!["Part"]);
    assert_eq!(client.get_objects(&doc).await.unwrap().len(), 1);
    assert!(client.get_object(&doc, "Bar").await.unwrap().is_none());

    let host = gateway.shutdown().await;
    assert_eq!(host.get_objects("Part").unwrap().len(), 1);
}

#[tokio::test]
async fn test_domain_failures_are_outcomes_not_faults() {
    let gateway = TestGateway::start().await;
    let client = gateway.client();

    let edit = client.edit_object("Missing", "Foo", Map::new()).await.unwrap();
    assert!(!edit.success);
    assert_eq!(edit.error.as_deref(), Some("Document 'Missing' not found"));

    let code = client.execute_code("y = undefined + 1").await.unwrap();
    assert!(!code.success);
    assert!(code.error.unwrap().contains("NameError on line 1"));

    // A failed outcome in place of data surfaces as a remote error
    let objects = client.get_objects("Missing").await;
    assert!(matches!(objects, Err(SharedError::Remote { .. })));

    let status = client.status().await.unwrap();
    assert_eq!(status.tasks_failed, 3);
    assert_eq!(status.queue_depth, 0);
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_callers_get_their_own_results() {
    let gateway = TestGateway::start().await;
    let client = gateway.client();

    let calls = (0..16).map(|i| {
        let client = client.clone();
        tokio::spawn(async move { (i, client.execute_code(&format!("print({i} * 10)")).await.unwrap()) })
    });

    for call in calls {
        let (i, outcome) = call.await.unwrap();
        assert!(outcome.success);
        let expected = format!("Output: {}", i * 10);
        assert!(outcome.message.unwrap().ends_with(&expected));
    }
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_session_state_and_screenshot() {
    let png = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    let gateway = TestGateway::start_with(DocumentHost::new().with_view_image("Isometric", png)).await;
    let client = gateway.client();

    assert_eq!(client.get_active_screenshot("Isometric").await.unwrap(), None);
    client.create_document("Part").await.unwrap();
    assert_eq!(
        client.get_active_screenshot("Isometric").await.unwrap().as_deref(),
        Some("iVBORw0KGgo=")
    );
    assert!(client.get_active_screenshot("Sideways").await.is_err());

    assert!(client.execute_code("x = 1 + 1").await.unwrap().success);
    let shown = client.execute_code("print(x)").await.unwrap();
    assert!(shown.message.unwrap().ends_with("Output: 2"));

    let recomputed = client.recompute_document("Part").await.unwrap();
    assert!(recomputed.success);

    let host = gateway.shutdown().await;
    assert_eq!(host.recompute_count("Part"), Some(1));
}

#[tokio::test]
async fn test_malformed_request_is_rejected_with_nil_id() {
    let gateway = TestGateway::start().await;

    let response = reqwest::Client::new()
        .post(format!("{}/rpc", gateway.base_url()))
        .header("content-type", "application/json")
        .body(r#"{"id": "not-a-uuid", "method": "ping"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let body: RpcEnvelope<RpcReply> = response.json().await.unwrap();
    assert!(body.id.is_nil());
    assert!(!body.body.is_success());

    let health = reqwest::get(format!("{}/health", gateway.base_url())).await.unwrap();
    assert!(health.status().is_success());
    gateway.shutdown().await;
}

#[tokio::test]
async fn test_legacy_socket_speaks_json_lines() {
    let gateway = TestGateway::start().await;
    let stream = TcpStream::connect(gateway.legacy_addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let request = RpcEnvelope::new(RpcCall::Ping);
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');
    writer.write_all(line.as_bytes()).await.unwrap();

    let reply: RpcEnvelope<RpcReply> = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply.id, request.id);
    assert_eq!(reply.body, RpcReply::Pong(true));

    writer.write_all(b"not json\n").await.unwrap();
    let reply: RpcEnvelope<RpcReply> = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert!(reply.id.is_nil());
    assert!(!reply.body.is_success());

    // The connection survives a bad line
    let request = RpcEnvelope::new(RpcCall::ListDocuments);
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');
    writer.write_all(line.as_bytes()).await.unwrap();
    let reply: RpcEnvelope<RpcReply> = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply.body, RpcReply::Documents(vec![]));

    gateway.shutdown().await;
}

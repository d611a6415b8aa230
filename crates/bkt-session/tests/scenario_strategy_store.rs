use bkt_config::ClientSettings;
use bkt_session::{StoreError, StrategyClient, StrategySource};
use httpmock::prelude::*;
use serde_json::json;

fn client(server: &MockServer) -> StrategyClient {
    StrategyClient::from_settings(&ClientSettings {
        server_url: server.base_url(),
        ..ClientSettings::default()
    })
    .unwrap()
}

#[tokio::test]
async fn list_and_get() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/strategies");
            then.status(200).json_body(json!(["grid", "trend-follow"]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/strategies/trend-follow");
            then.status(200)
                .json_body(json!({ "name": "trend-follow", "code": "def main(): pass" }));
        })
        .await;

    let c = client(&server);
    assert_eq!(c.list().await.unwrap(), vec!["grid", "trend-follow"]);
    assert_eq!(
        c.get("trend-follow").await.unwrap(),
        StrategySource {
            name: "trend-follow".to_string(),
            code: "def main(): pass".to_string()
        }
    );
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/strategies/nope");
            then.status(404).json_body(json!({ "detail": "Strategy not found" }));
        })
        .await;

    let err = client(&server).get("nope").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(ref n) if n == "nope"), "{err}");
}

#[tokio::test]
async fn save_updates_existing() {
    let server = MockServer::start_async().await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/api/strategies/grid")
                .json_body(json!({ "code": "x = 1" }));
            then.status(200).json_body(json!({ "name": "grid", "code": "x = 1" }));
        })
        .await;
    let post = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/strategies");
            then.status(201);
        })
        .await;

    client(&server).save("grid", "x = 1").await.unwrap();
    put.assert_async().await;
    assert_eq!(post.hits_async().await, 0);
}

#[tokio::test]
async fn save_creates_when_update_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/api/strategies/fresh");
            then.status(404);
        })
        .await;
    let post = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/strategies")
                .json_body(json!({ "name": "fresh", "code": "x = 2" }));
            then.status(201).json_body(json!({ "name": "fresh", "code": "x = 2" }));
        })
        .await;

    client(&server).save("fresh", "x = 2").await.unwrap();
    post.assert_async().await;
}

#[tokio::test]
async fn save_fails_when_both_writes_fail() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/api/strategies/dup");
            then.status(500);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/strategies");
            then.status(409);
        })
        .await;

    let err = client(&server).save("dup", "x").await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to save strategy (HTTP 409)");
}

#[tokio::test]
async fn delete() {
    let server = MockServer::start_async().await;
    let del = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/strategies/grid");
            then.status(204);
        })
        .await;

    client(&server).delete("grid").await.unwrap();
    del.assert_async().await;
}

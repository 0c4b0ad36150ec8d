use etcdv2::core::options::GetOptions;
use etcdv2::errors::{ErrorCode, EtcdError};
use etcdv2::{Action, ClientConfig, EtcdClient, EtcdResponse, KeyValueStore};
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;

fn client_for(server: &MockServer) -> EtcdClient {
    let mut config = ClientConfig::new(&server.base_url());
    config.max_retries = 2;
    config.retry_base_ms = 1;
    config.request_timeout = Duration::from_secs(5);
    EtcdClient::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_get_returns_node_and_cluster_index() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/keys/test4");
            then.status(200)
                .header("X-Etcd-Index", "35")
                .header("X-Raft-Index", "5398")
                .header("X-Raft-Term", "1")
                .json_body(json!({
                    "action": "get",
                    "node": {"key": "/test4", "value": "hello", "modifiedIndex": 35, "createdIndex": 35}
                }));
        })
        .await;

    let client = client_for(&server);
    let response = client.get("test4").await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.action, Action::Get);
    assert_eq!(response.value(), Some("hello"));
    assert_eq!(response.index.etcd_index, Some(35));
    assert_eq!(response.index.raft_index, Some(5398));
    assert_eq!(response.index.raft_term, Some(1));
}

#[tokio::test]
async fn test_missing_key_is_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/keys/missing");
            then.status(404).header("X-Etcd-Index", "12").json_body(json!({
                "errorCode": 100,
                "message": "Key not found",
                "cause": "/missing",
                "index": 12
            }));
        })
        .await;

    let client = client_for(&server);
    let err = client.get("/missing").await.unwrap_err();

    mock.assert_hits_async(1).await;
    assert!(err.is_key_not_found());
    let api = err.api_error().unwrap();
    assert_eq!(api.cause.as_deref(), Some("/missing"));
    assert_eq!(api.index, 12);
}

#[tokio::test]
async fn test_set_sends_value_as_form() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v2/keys/test1")
                .x_www_form_urlencoded_tuple("value", "testValue");
            then.status(200).json_body(json!({
                "action": "set",
                "node": {"key": "/test1", "value": "testValue", "modifiedIndex": 9, "createdIndex": 9},
                "prevNode": {"key": "/test1", "value": "before", "modifiedIndex": 8, "createdIndex": 8}
            }));
        })
        .await;

    let client = client_for(&server);
    let response = client.set("test1", "testValue").await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.action, Action::Set);
    assert_eq!(
        response.prev_node.and_then(|n| n.value).as_deref(),
        Some("before")
    );
}

#[tokio::test]
async fn test_set_with_ttl_rounds_up() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v2/keys/session")
                .x_www_form_urlencoded_tuple("value", "abc")
                .x_www_form_urlencoded_tuple("ttl", "2");
            then.status(201).json_body(json!({
                "action": "set",
                "node": {"key": "/session", "value": "abc", "ttl": 2, "modifiedIndex": 4, "createdIndex": 4}
            }));
        })
        .await;

    let client = client_for(&server);
    let response = client
        .set_with_ttl("/session", "abc", Duration::from_millis(1500))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.node.ttl, Some(2));
}

#[tokio::test]
async fn test_create_on_existing_key_reports_node_exist() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v2/keys/lock")
                .query_param("prevExist", "false");
            then.status(412).json_body(json!({
                "errorCode": 105,
                "message": "Key already exists",
                "cause": "/lock",
                "index": 39
            }));
        })
        .await;

    let client = client_for(&server);
    let err = client.create("lock", "owner-1").await.unwrap_err();

    mock.assert_hits_async(1).await;
    assert_eq!(err.error_code(), Some(ErrorCode::NodeExist));
}

#[tokio::test]
async fn test_update_refresh_and_delete() {
    let server = MockServer::start_async().await;
    let update = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v2/keys/mode")
                .query_param("prevExist", "true")
                .x_www_form_urlencoded_tuple("value", "green");
            then.status(200).json_body(json!({
                "action": "update",
                "node": {"key": "/mode", "value": "green", "modifiedIndex": 15, "createdIndex": 2}
            }));
        })
        .await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v2/keys/lease")
                .query_param("prevExist", "true")
                .x_www_form_urlencoded_tuple("ttl", "10")
                .x_www_form_urlencoded_tuple("refresh", "true");
            then.status(200).json_body(json!({
                "action": "update",
                "node": {"key": "/lease", "value": "held", "ttl": 10, "modifiedIndex": 16, "createdIndex": 5}
            }));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/v2/keys/mode");
            then.status(200).json_body(json!({
                "action": "delete",
                "node": {"key": "/mode", "modifiedIndex": 17, "createdIndex": 2},
                "prevNode": {"key": "/mode", "value": "green", "modifiedIndex": 15, "createdIndex": 2}
            }));
        })
        .await;

    let client = client_for(&server);

    let updated = client.update("mode", "green").await.unwrap();
    assert_eq!(updated.action, Action::Update);

    let refreshed = client
        .refresh_ttl("lease", Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(refreshed.node.ttl, Some(10));

    let deleted = client.delete("/mode").await.unwrap();
    assert_eq!(deleted.action, Action::Delete);
    assert_eq!(deleted.value(), None);

    update.assert_async().await;
    refresh.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn test_compare_and_swap() {
    let server = MockServer::start_async().await;
    let ok = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v2/keys/counter")
                .query_param("prevValue", "1")
                .x_www_form_urlencoded_tuple("value", "2");
            then.status(200).json_body(json!({
                "action": "compareAndSwap",
                "node": {"key": "/counter", "value": "2", "modifiedIndex": 11, "createdIndex": 3}
            }));
        })
        .await;
    let stale = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v2/keys/counter")
                .query_param("prevIndex", "3");
            then.status(412).json_body(json!({
                "errorCode": 101,
                "message": "Compare failed",
                "cause": "[3 != 11]",
                "index": 11
            }));
        })
        .await;

    let client = client_for(&server);
    let swapped = client
        .compare_and_swap("counter", "2", Some("1"), None)
        .await
        .unwrap();
    assert_eq!(swapped.action, Action::CompareAndSwap);

    let err = client
        .compare_and_swap("counter", "3", None, Some(3))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::TestFailed));

    ok.assert_async().await;
    stale.assert_async().await;
}

#[tokio::test]
async fn test_preconditions_are_required_for_compare_operations() {
    let server = MockServer::start_async().await;
    let client = client_for(&server);

    let err = client
        .compare_and_swap("counter", "2", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EtcdError::InvalidRequest(_)));

    let err = client
        .compare_and_delete("counter", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EtcdError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_compare_and_delete_and_delete_dir() {
    let server = MockServer::start_async().await;
    let cad = server
        .mock_async(|when, then| {
            when.method(DELETE)
                .path("/v2/keys/lock")
                .query_param("prevValue", "owner-1");
            then.status(200).json_body(json!({
                "action": "compareAndDelete",
                "node": {"key": "/lock", "modifiedIndex": 40, "createdIndex": 39},
                "prevNode": {"key": "/lock", "value": "owner-1", "modifiedIndex": 39, "createdIndex": 39}
            }));
        })
        .await;
    let rmdir = server
        .mock_async(|when, then| {
            when.method(DELETE)
                .path("/v2/keys/app")
                .query_param("dir", "true")
                .query_param("recursive", "true");
            then.status(200).json_body(json!({
                "action": "delete",
                "node": {"key": "/app", "dir": true, "modifiedIndex": 41, "createdIndex": 2}
            }));
        })
        .await;

    let client = client_for(&server);
    let response = client
        .compare_and_delete("/lock", Some("owner-1"), None)
        .await
        .unwrap();
    assert_eq!(response.action, Action::CompareAndDelete);

    let response = client.delete_dir("/app", true).await.unwrap();
    assert_eq!(response.action, Action::Delete);
    assert!(response.node.dir);

    cad.assert_async().await;
    rmdir.assert_async().await;
}

#[tokio::test]
async fn test_create_in_order_posts_to_directory() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v2/keys/queue")
                .x_www_form_urlencoded_tuple("value", "job1");
            then.status(201).json_body(json!({
                "action": "create",
                "node": {"key": "/queue/00000000000000000006", "value": "job1", "modifiedIndex": 6, "createdIndex": 6}
            }));
        })
        .await;

    let client = client_for(&server);
    let response = client.create_in_order("queue", "job1").await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.action, Action::Create);
    assert_eq!(response.node.name(), "00000000000000000006");
}

#[tokio::test]
async fn test_create_dir_and_list_dir() {
    let server = MockServer::start_async().await;
    let mkdir = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v2/keys/cfg")
                .x_www_form_urlencoded_tuple("dir", "true");
            then.status(201).json_body(json!({
                "action": "set",
                "node": {"key": "/cfg", "dir": true, "modifiedIndex": 20, "createdIndex": 20}
            }));
        })
        .await;
    let listing = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v2/keys/cfg")
                .query_param("recursive", "true")
                .query_param("sorted", "true");
            then.status(200).json_body(json!({
                "action": "get",
                "node": {"key": "/cfg", "dir": true, "modifiedIndex": 20, "createdIndex": 20, "nodes": [
                    {"key": "/cfg/a", "value": "1", "modifiedIndex": 21, "createdIndex": 21},
                    {"key": "/cfg/db", "dir": true, "modifiedIndex": 22, "createdIndex": 22, "nodes": [
                        {"key": "/cfg/db/url", "value": "postgres://", "modifiedIndex": 23, "createdIndex": 23}
                    ]}
                ]}
            }));
        })
        .await;

    let client = client_for(&server);
    let created = client.create_dir("/cfg", None).await.unwrap();
    assert!(created.node.dir);

    let response = client.list_dir("/cfg/", true).await.unwrap();
    let leaves: Vec<(&str, Option<&str>)> = response
        .node
        .leaves()
        .into_iter()
        .map(|n| (n.key.as_str(), n.value.as_deref()))
        .collect();
    assert_eq!(
        leaves,
        vec![
            ("/cfg/a", Some("1")),
            ("/cfg/db/url", Some("postgres://"))
        ]
    );

    mkdir.assert_async().await;
    listing.assert_async().await;
}

#[tokio::test]
async fn test_list_dir_on_plain_key_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/keys/plain");
            then.status(200).json_body(json!({
                "action": "get",
                "node": {"key": "/plain", "value": "x", "modifiedIndex": 2, "createdIndex": 2}
            }));
        })
        .await;

    let client = client_for(&server);
    let err = client.list_dir("plain", false).await.unwrap_err();
    assert!(matches!(err, EtcdError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_server_errors_are_retried_for_reads() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/keys/flaky");
            then.status(500).body("internal error");
        })
        .await;

    let client = client_for(&server);
    let err = client
        .get_with("flaky", &GetOptions::default())
        .await
        .unwrap_err();

    // One attempt plus two retries.
    mock.assert_hits_async(3).await;
    match err {
        EtcdError::UnexpectedStatus { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal error");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_post_is_not_resent_after_server_error() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v2/keys/queue");
            then.status(503).body("unavailable");
        })
        .await;

    let client = client_for(&server);
    let err = client.create_in_order("queue", "job").await.unwrap_err();

    mock.assert_hits_async(1).await;
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_failover_to_next_endpoint() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/keys/test4");
            then.status(200).json_body(json!({
                "action": "get",
                "node": {"key": "/test4", "value": "from-second", "modifiedIndex": 1, "createdIndex": 1}
            }));
        })
        .await;

    let mut config = ClientConfig::new("http://127.0.0.1:1");
    config.endpoints.push(server.base_url());
    config.max_retries = 2;
    config.retry_base_ms = 1;
    let client = EtcdClient::from_config(&config).unwrap();

    let response = client.get("test4").await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.value(), Some("from-second"));
    assert_eq!(
        client.active_endpoint().as_str().trim_end_matches('/'),
        server.base_url()
    );
}

#[tokio::test]
async fn test_basic_auth_header_is_sent() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v2/keys/secret")
                .header("Authorization", "Basic dXNlcjpwYXNz");
            then.status(200).json_body(json!({
                "action": "get",
                "node": {"key": "/secret", "value": "s3", "modifiedIndex": 1, "createdIndex": 1}
            }));
        })
        .await;

    let mut config = ClientConfig::new(&server.base_url());
    config.username = Some("user".to_string());
    config.password = Some("pass".to_string());
    let client = EtcdClient::from_config(&config).unwrap();

    client.get("secret").await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cluster_endpoints() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/version");
            then.status(200)
                .json_body(json!({"etcdserver": "2.3.8", "etcdcluster": "2.3.0"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/members");
            then.status(200).json_body(json!({"members": [
                {"id": "ce2a822cea30bfca", "name": "default", "peerURLs": ["http://localhost:2380"], "clientURLs": ["http://localhost:2379"]}
            ]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(json!({"health": "true"}));
        })
        .await;

    let client = client_for(&server);
    assert_eq!(client.version().await.unwrap().etcdcluster, "2.3.0");

    let members = client.members().await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].peer_urls, vec!["http://localhost:2380".to_string()]);

    assert!(client.health().await.unwrap().is_healthy());
}

async fn read_through<S: KeyValueStore>(store: &S, key: &str) -> Result<EtcdResponse, EtcdError> {
    store.get(key).await
}

#[tokio::test]
async fn test_client_behind_store_trait() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/keys/feature/flag");
            then.status(200).json_body(json!({
                "action": "get",
                "node": {"key": "/feature/flag", "value": "on", "modifiedIndex": 3, "createdIndex": 3}
            }));
        })
        .await;

    let client = client_for(&server);
    let response = read_through(&client, "feature/flag").await.unwrap();
    assert_eq!(response.value(), Some("on"));

    let boxed: Box<dyn KeyValueStore> = Box::new(client);
    let response = boxed.get("/feature/flag").await.unwrap();
    assert_eq!(response.node.key, "/feature/flag");
}

#[tokio::test]
async fn test_invalid_key_never_reaches_server() {
    let server = MockServer::start_async().await;
    let client = client_for(&server);

    let err = client.set("/a/../b", "x").await.unwrap_err();
    assert!(matches!(err, EtcdError::InvalidKey(_)));
}

//! Echo application served over real sockets.

use dispatch_host::config::{ListenerConfig, ServerConfig};
use dispatch_host::{DispatchServer, EchoApplication, TcpHttpListener};

fn start_echo(listener_config: ListenerConfig) -> (DispatchServer<TcpHttpListener>, String) {
    start_echo_at("http://127.0.0.1:0/", listener_config)
}

fn start_echo_at(
    address: &str,
    listener_config: ListenerConfig,
) -> (DispatchServer<TcpHttpListener>, String) {
    let config = ServerConfig {
        addresses: vec![address.to_string()],
        max_in_flight: 0,
    };
    let mut server = DispatchServer::from_config(TcpHttpListener::new(listener_config), &config);
    server.start(EchoApplication).unwrap();

    let address = server.listener().local_addrs()[0];
    (server, format!("http://{address}"))
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_echoes_request() {
    let (_server, base) = start_echo(ListenerConfig::default());

    let res = client()
        .post(format!("{base}/items?id=7"))
        .body("payload")
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()["content-type"],
        "text/plain; charset=utf-8"
    );
    assert_eq!(res.text().await.unwrap(), "POST /items?id=7\npayload");
}

#[tokio::test]
async fn test_handler_failure_becomes_500() {
    let (_server, base) = start_echo(ListenerConfig::default());

    let res = client()
        .get(format!("{base}/fail"))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 500);
    assert_eq!(
        res.text().await.unwrap(),
        "application failed to process the request: echo failure requested"
    );
}

#[tokio::test]
async fn test_failure_after_start_drops_connection() {
    let (_server, base) = start_echo(ListenerConfig::default());

    let result = client().get(format!("{base}/fail-late")).send().await;
    assert!(result.is_err(), "aborted response must not look complete");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (_server, base) = start_echo(ListenerConfig {
        max_connections: 16,
        max_body_bytes: 8,
    });

    let res = client()
        .post(format!("{base}/"))
        .body("far more than eight bytes")
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 413);
}

#[tokio::test]
async fn test_path_outside_prefixes_is_not_found() {
    let (_server, base) = start_echo_at("http://127.0.0.1:0/api/", ListenerConfig::default());

    let res = client()
        .get(format!("{base}/other"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 404);

    let res = client()
        .get(format!("{base}/api/items"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "GET /api/items\n");
}

#[tokio::test]
async fn test_oversized_error_response_drops_connection() {
    // The 500 description is longer than the response body limit.
    let (_server, base) = start_echo(ListenerConfig {
        max_connections: 16,
        max_body_bytes: 16,
    });

    let result = client().get(format!("{base}/fail")).send().await;
    assert!(result.is_err(), "failed recovery must abort the connection");
}

#[tokio::test]
async fn test_stop_shuts_listener_down() {
    let (mut server, _base) = start_echo(ListenerConfig::default());
    assert!(server.listener().is_running());

    server.stop();
    assert!(!server.listener().is_running());
    assert!(server.listener().local_addrs().is_empty());
}

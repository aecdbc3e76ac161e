use std::sync::Arc;

use assert_matches::assert_matches;

use crate::backend::MockBackend;
use crate::error::Error;
use crate::models::{Header, Request};
use crate::pool::PoolConfig;
use crate::proxy::ProxyPool;

fn ok_response() -> Vec<u8> {
    b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec()
}

fn proxy_pool(backend: &MockBackend) -> ProxyPool {
    ProxyPool::with_backend(
        "http://proxy.example:8080",
        Vec::new(),
        PoolConfig::default(),
        Arc::new(backend.clone()),
    )
    .unwrap()
}

#[tokio::test]
async fn forward_proxy_shares_one_connection_across_origins() {
    let backend = MockBackend::new(vec![ok_response()]);
    let pool = proxy_pool(&backend);

    for url in ["http://a.example/", "http://b.example/path"] {
        let mut response = pool.handle_request(Request::get(url).unwrap()).await.unwrap();
        assert_eq!(response.read().await.unwrap(), b"ok");
    }

    assert_eq!(backend.connect_count(), 1);
    assert_eq!(
        pool.connection_info(),
        vec!["'http://proxy.example:8080', HTTP/1.1, IDLE, Request Count: 2".to_string()]
    );

    let written = String::from_utf8_lossy(&backend.written_concat()).to_string();
    assert!(written.contains("GET http://a.example/ HTTP/1.1\r\nHost: a.example\r\n"));
    assert!(written.contains("GET http://b.example/path HTTP/1.1\r\nHost: b.example\r\n"));
}

#[tokio::test]
async fn forward_proxy_prepends_proxy_headers() {
    let backend = MockBackend::new(vec![ok_response()]);
    let pool = ProxyPool::with_backend(
        "http://proxy.example:8080",
        vec![Header::new("Proxy-Authorization", "Basic dXNlcjpwYXNz")],
        PoolConfig::default(),
        Arc::new(backend.clone()),
    )
    .unwrap();

    let mut response = pool
        .handle_request(Request::get("http://a.example/").unwrap())
        .await
        .unwrap();
    response.read().await.unwrap();

    let written = String::from_utf8_lossy(&backend.written_concat()).to_string();
    assert!(written.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
}

#[tokio::test]
async fn tunnel_proxy_opens_one_tunnel_per_target_origin() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 Connection established\r\n\r\n".to_vec(),
        ok_response(),
    ]);
    let pool = proxy_pool(&backend);

    for url in ["https://a.example/", "https://b.example/"] {
        let mut response = pool.handle_request(Request::get(url).unwrap()).await.unwrap();
        assert_eq!(response.read().await.unwrap(), b"ok");
    }

    // One proxy connection per tunnelled target.
    assert_eq!(backend.connect_count(), 2);
    assert_eq!(pool.connection_info().len(), 2);
    assert_eq!(
        backend.tls_hostnames(),
        vec!["a.example".to_string(), "b.example".to_string()]
    );

    let written = String::from_utf8_lossy(&backend.written_concat()).to_string();
    assert!(written.contains("CONNECT a.example:443 HTTP/1.1\r\nHost: a.example:443\r\n"));
    assert!(written.contains("CONNECT b.example:443 HTTP/1.1\r\nHost: b.example:443\r\n"));
}

#[tokio::test]
async fn tunnel_requests_reuse_the_established_tunnel() {
    // One CONNECT reply, then one response per request on the tunnel.
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 Connection established\r\n\r\n".to_vec(),
        ok_response(),
        ok_response(),
    ]);
    let pool = proxy_pool(&backend);

    for _ in 0..2 {
        let mut response = pool
            .handle_request(Request::get("https://a.example/").unwrap())
            .await
            .unwrap();
        response.read().await.unwrap();
    }

    assert_eq!(backend.connect_count(), 1);
    assert_eq!(backend.tls_hostnames().len(), 1);
    assert_eq!(
        pool.connection_info(),
        vec!["'https://a.example:443', HTTP/1.1, IDLE, Request Count: 2".to_string()]
    );
}

#[tokio::test]
async fn rejected_connect_fails_with_a_proxy_error() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n".to_vec(),
    ]);
    let pool = proxy_pool(&backend);

    let err = pool
        .handle_request(Request::get("https://blocked.example/").unwrap())
        .await
        .unwrap_err();
    assert_matches!(err, Error::Proxy(message) => {
        assert_eq!(message, "403 Forbidden");
    });
}

use std::time::Duration;

use assert_matches::assert_matches;

use crate::backend::{MockBackend, NetworkBackend};
use crate::error::Error;
use crate::http11::Http11Connection;
use crate::models::{Origin, Request, Url};

fn origin() -> Origin {
    Origin::new("http", "example.com", 80)
}

fn get_request() -> Request {
    Request::new("GET", Url::parse("http://example.com/").unwrap())
}

async fn connect(backend: &MockBackend, keepalive: Option<Duration>) -> Http11Connection {
    let stream = backend
        .connect_tcp("example.com", 80, None, None, &[])
        .await
        .unwrap();
    Http11Connection::new(origin(), stream, keepalive)
}

#[tokio::test]
async fn request_response_round_trip() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 13\r\n\r\nHello, world!".to_vec(),
    ]);
    let conn = connect(&backend, None).await;

    let mut request = get_request();
    let mut response = conn.handle_request(&mut request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.extensions.http_version, b"HTTP/1.1");
    assert_eq!(response.extensions.reason_phrase, b"OK");

    let body = response.read().await.unwrap();
    assert_eq!(body, b"Hello, world!");
    assert!(conn.is_idle());
    assert_eq!(
        conn.info(),
        "'http://example.com:80', HTTP/1.1, IDLE, Request Count: 1"
    );

    let written = backend.written_concat();
    assert!(written.starts_with(b"GET / HTTP/1.1\r\nHost: example.com\r\n"));
}

#[tokio::test]
async fn post_body_gets_content_length() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec(),
    ]);
    let conn = connect(&backend, None).await;

    let mut request = Request::new("POST", Url::parse("http://example.com/upload").unwrap());
    request.body = b"payload".as_slice().into();
    let mut response = conn.handle_request(&mut request).await.unwrap();
    response.read().await.unwrap();

    let written = backend.written_concat();
    let written = String::from_utf8_lossy(&written);
    assert!(written.contains("POST /upload HTTP/1.1\r\n"));
    assert!(written.contains("Content-Length: 7\r\n"));
    assert!(written.ends_with("payload"));
}

#[tokio::test]
async fn keepalive_connection_serves_multiple_requests() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec(),
    ]);
    let conn = connect(&backend, None).await;

    for _ in 0..3 {
        let mut request = get_request();
        let mut response = conn.handle_request(&mut request).await.unwrap();
        assert_eq!(response.read().await.unwrap(), b"ok");
    }
    assert_eq!(
        conn.info(),
        "'http://example.com:80', HTTP/1.1, IDLE, Request Count: 3"
    );
}

#[tokio::test]
async fn connection_close_response_closes_the_connection() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 2\r\n\r\nok".to_vec(),
    ]);
    let conn = connect(&backend, None).await;

    let mut request = get_request();
    let mut response = conn.handle_request(&mut request).await.unwrap();
    assert_eq!(response.read().await.unwrap(), b"ok");
    assert!(conn.is_closed());
    assert!(!conn.is_available());
}

#[tokio::test]
async fn chunked_response_body() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec(),
        b"5\r\nhello\r\n".to_vec(),
        b"6\r\n world\r\n".to_vec(),
        b"0\r\n\r\n".to_vec(),
    ]);
    let conn = connect(&backend, None).await;

    let mut request = get_request();
    let mut response = conn.handle_request(&mut request).await.unwrap();
    assert_eq!(response.read().await.unwrap(), b"hello world");
    assert!(conn.is_idle());
}

#[tokio::test]
async fn second_request_while_streaming_is_unavailable() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec(),
    ]);
    let conn = connect(&backend, None).await;

    let mut first = get_request();
    let response = conn.handle_request(&mut first).await.unwrap();
    assert!(!conn.is_available());

    let mut second = get_request();
    let err = conn.handle_request(&mut second).await.unwrap_err();
    assert_matches!(err, Error::ConnectionNotAvailable);
    drop(response);
}

#[tokio::test]
async fn wrong_origin_is_rejected() {
    let backend = MockBackend::new(vec![Vec::new()]);
    let conn = connect(&backend, None).await;

    let mut request = Request::new("GET", Url::parse("http://other.example/").unwrap());
    let err = conn.handle_request(&mut request).await.unwrap_err();
    assert_matches!(err, Error::ConnectionNotAvailable);
}

#[tokio::test]
async fn keepalive_expiry_is_armed_on_idle() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec(),
    ]);
    let conn = connect(&backend, Some(Duration::from_millis(10))).await;

    let mut request = get_request();
    let mut response = conn.handle_request(&mut request).await.unwrap();
    response.read().await.unwrap();
    assert!(!conn.has_expired());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(conn.has_expired());
}

#[tokio::test]
async fn eof_before_response_is_a_remote_protocol_error() {
    let backend = MockBackend::new(vec![Vec::new()]);
    let conn = connect(&backend, None).await;

    let mut request = get_request();
    let err = conn.handle_request(&mut request).await.unwrap_err();
    assert_matches!(err, Error::RemoteProtocol(_));
    assert!(conn.is_closed());
}

#[tokio::test]
async fn connect_2xx_exposes_the_network_stream() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 Connection established\r\n\r\n".to_vec(),
    ]);
    let conn = connect(&backend, None).await;

    let mut request = Request::new("CONNECT", Url::new("http", "example.com", Some(80), "example.com:80"));
    let response = conn.handle_request(&mut request).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.extensions.network_stream.is_some());
    // The transport has been handed off; the connection is spent.
    assert!(conn.is_closed());
}

#[tokio::test]
async fn dropping_an_unread_body_closes_the_connection() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec(),
    ]);
    let conn = connect(&backend, None).await;

    let mut request = get_request();
    let response = conn.handle_request(&mut request).await.unwrap();
    drop(response);
    assert!(conn.is_closed());
}

#[tokio::test]
async fn close_is_idempotent() {
    let backend = MockBackend::new(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec(),
    ]);
    let conn = connect(&backend, None).await;
    conn.close();
    conn.close();
    assert!(conn.is_closed());
}

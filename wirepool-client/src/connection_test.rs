use std::sync::Arc;

use assert_matches::assert_matches;

use wirepool_net::{
    encode_headers_from_fields, encode_settings_frame, HeaderField, HpackEncoder,
    SettingsFrame, DEFAULT_MAX_FRAME_SIZE,
};

use crate::backend::MockBackend;
use crate::connection::{ConnectConfig, HttpConnection};
use crate::error::Error;
use crate::models::{Origin, Request, Url};

fn connect_config(backend: &MockBackend) -> ConnectConfig {
    ConnectConfig {
        backend: Arc::new(backend.clone()),
        keepalive_expiry: None,
        http1: true,
        http2: false,
        retries: 0,
        local_address: None,
        uds: None,
        socket_options: Vec::new(),
    }
}

fn ok_response() -> Vec<u8> {
    b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec()
}

/// An HTTP/2 script: server settings, then a bodiless 200 that ends
/// stream 1 on its HEADERS frame.
fn h2_script() -> Vec<Vec<u8>> {
    let mut encoder = HpackEncoder::new();
    let mut script = vec![encode_settings_frame(&SettingsFrame {
        settings: Vec::new(),
        ack: false,
    })];
    let headers = vec![HeaderField {
        name: b":status".to_vec(),
        value: b"200".to_vec(),
    }];
    script.extend(encode_headers_from_fields(
        1,
        true,
        &headers,
        &mut encoder,
        DEFAULT_MAX_FRAME_SIZE,
    ));
    script
}

#[tokio::test]
async fn wrong_origin_requests_are_a_usage_error() {
    let backend = MockBackend::new(vec![ok_response()]);
    let conn = HttpConnection::new(
        Origin::new("https", "example.com", 443),
        connect_config(&backend),
    );

    let mut request = Request::new("GET", Url::parse("https://other.example/").unwrap());
    let err = conn.handle_request(&mut request).await.unwrap_err();
    assert_matches!(err, Error::Runtime(message) => {
        assert!(message.contains("https://other.example:443"));
        assert!(message.contains("https://example.com:443"));
    });
}

#[tokio::test]
async fn connect_failures_are_retried() {
    let backend = MockBackend::new(vec![ok_response()]).failing_connects(1);
    let mut config = connect_config(&backend);
    config.retries = 1;
    let conn = HttpConnection::new(Origin::new("http", "example.com", 80), config);

    let mut request = Request::new("GET", Url::parse("http://example.com/").unwrap());
    let mut response = conn.handle_request(&mut request).await.unwrap();
    assert_eq!(response.read().await.unwrap(), b"ok");
    assert_eq!(backend.connect_count(), 2);
}

#[tokio::test]
async fn exhausted_retries_close_the_connection() {
    let backend = MockBackend::new(vec![ok_response()]).failing_connects(2);
    let mut config = connect_config(&backend);
    config.retries = 1;
    let conn = HttpConnection::new(Origin::new("http", "example.com", 80), config);

    let mut request = Request::new("GET", Url::parse("http://example.com/").unwrap());
    let err = conn.handle_request(&mut request).await.unwrap_err();
    assert_matches!(err, Error::Connect(_));
    assert!(conn.is_closed());
    assert!(!conn.is_available());
}

#[tokio::test]
async fn negotiated_h2_selects_the_http2_engine() {
    let backend = MockBackend::with_alpn(h2_script(), b"h2").paused_after(2);
    let mut config = connect_config(&backend);
    config.http2 = true;
    let conn = HttpConnection::new(Origin::new("https", "example.com", 443), config);

    let mut request = Request::new("GET", Url::parse("https://example.com/").unwrap());
    let mut response = conn.handle_request(&mut request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.extensions.http_version, b"HTTP/2");
    response.read().await.unwrap();
    assert!(conn.info().contains("HTTP/2"));
}

#[tokio::test]
async fn request_extension_forces_http2_without_alpn() {
    let backend = MockBackend::new(h2_script()).paused_after(2);
    let conn = HttpConnection::new(
        Origin::new("http", "example.com", 80),
        connect_config(&backend),
    );

    let mut request = Request::new("GET", Url::parse("http://example.com/").unwrap());
    request.extensions.http2 = Some(true);
    let mut response = conn.handle_request(&mut request).await.unwrap();
    assert_eq!(response.extensions.http_version, b"HTTP/2");
    response.read().await.unwrap();
}

#[tokio::test]
async fn sni_hostname_extension_overrides_the_handshake_name() {
    let backend = MockBackend::new(vec![ok_response()]);
    let conn = HttpConnection::new(
        Origin::new("https", "example.com", 443),
        connect_config(&backend),
    );

    let mut request = Request::new("GET", Url::parse("https://example.com/").unwrap());
    request.extensions.sni_hostname = Some("sni.example".to_string());
    let mut response = conn.handle_request(&mut request).await.unwrap();
    response.read().await.unwrap();

    assert_eq!(backend.tls_hostnames(), vec!["sni.example".to_string()]);
}

#[tokio::test]
async fn undialed_connection_reports_connecting() {
    let backend = MockBackend::new(vec![ok_response()]);
    let conn = HttpConnection::new(
        Origin::new("https", "example.com", 443),
        connect_config(&backend),
    );
    assert_eq!(conn.info(), "CONNECTING");
    assert!(conn.is_available());
    assert!(!conn.is_idle());
    assert!(!conn.is_closed());
}

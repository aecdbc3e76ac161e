use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use wirepool_net::{
    encode_data_frames, encode_goaway_frame, encode_headers_from_fields, encode_raw_frame,
    encode_rst_stream_frame, encode_settings_frame, FrameType, GoAwayFrame, HeaderField,
    HpackEncoder, RstStreamFrame, SettingsFrame, DEFAULT_MAX_FRAME_SIZE, ERROR_NO_ERROR,
    ERROR_REFUSED_STREAM, SETTINGS_MAX_CONCURRENT_STREAMS,
};

use crate::backend::MockBackend;
use crate::error::Error;
use crate::models::Request;
use crate::pool::{ConnectionPool, PoolConfig};

fn h2_config() -> PoolConfig {
    PoolConfig {
        http2: true,
        ..PoolConfig::default()
    }
}

fn settings_frame(max_streams: u32) -> Vec<u8> {
    encode_settings_frame(&SettingsFrame {
        settings: vec![(SETTINGS_MAX_CONCURRENT_STREAMS, max_streams)],
        ack: false,
    })
}

fn response_frames(encoder: &mut HpackEncoder, stream_id: u32, body: &[u8]) -> Vec<Vec<u8>> {
    let headers = vec![
        HeaderField {
            name: b":status".to_vec(),
            value: b"200".to_vec(),
        },
        HeaderField {
            name: b"content-length".to_vec(),
            value: body.len().to_string().into_bytes(),
        },
    ];
    let mut frames =
        encode_headers_from_fields(stream_id, false, &headers, encoder, DEFAULT_MAX_FRAME_SIZE);
    frames.extend(encode_data_frames(stream_id, true, body, DEFAULT_MAX_FRAME_SIZE));
    frames
}

#[tokio::test]
async fn fifty_concurrent_requests_share_one_connection() {
    let mut encoder = HpackEncoder::new();
    // The server's responses for client streams 1, 3, .. 99 are held
    // back until every request has been written.
    let mut script = vec![settings_frame(100)];
    for index in 0..50u32 {
        script.extend(response_frames(&mut encoder, 1 + index * 2, b"hello"));
    }
    script.push(Vec::new());
    let backend = MockBackend::with_alpn(script, b"h2").paused_after(1);
    let pool = ConnectionPool::with_backend(h2_config(), Arc::new(backend.clone()));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..50 {
        let pool = pool.clone();
        tasks.spawn(async move {
            let mut response = pool
                .handle_request(Request::get("https://example.com/").unwrap())
                .await
                .unwrap();
            assert_eq!(response.status, 200);
            response.read().await.unwrap()
        });
    }

    // Hold the responses back until all 50 HEADERS frames are written.
    let headers_written = |backend: &MockBackend| {
        backend
            .written()
            .iter()
            .filter(|write| write.len() > 3 && write[3] == 0x1)
            .count()
    };
    while headers_written(&backend) < 50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    backend.resume();

    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap(), b"hello");
    }
    assert_eq!(backend.connect_count(), 1);
    assert_eq!(pool.connection_info().len(), 1);
}

#[tokio::test]
async fn idle_http2_connection_reports_its_state() {
    let mut encoder = HpackEncoder::new();
    let mut script = vec![settings_frame(100)];
    script.extend(response_frames(&mut encoder, 1, b"hello"));
    let backend = MockBackend::with_alpn(script, b"h2").paused_after(3);
    let pool = ConnectionPool::with_backend(h2_config(), Arc::new(backend.clone()));

    let mut response = pool
        .handle_request(Request::get("https://example.com/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.extensions.http_version, b"HTTP/2");
    assert_eq!(response.read().await.unwrap(), b"hello");

    assert_eq!(
        pool.connection_info(),
        vec!["'https://example.com:443', HTTP/2, IDLE, Request Count: 1".to_string()]
    );
}

#[tokio::test]
async fn goaway_fails_the_outstanding_streams() {
    let script = vec![
        settings_frame(100),
        encode_goaway_frame(&GoAwayFrame {
            last_stream_id: 0,
            error_code: ERROR_NO_ERROR,
            debug_data: Vec::new(),
        }),
    ];
    let backend = MockBackend::with_alpn(script, b"h2").paused_after(1);
    let pool = ConnectionPool::with_backend(h2_config(), Arc::new(backend.clone()));

    let request_pool = pool.clone();
    let task = tokio::spawn(async move {
        request_pool
            .handle_request(Request::get("https://example.com/").unwrap())
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    backend.resume();

    let err = task.await.unwrap().unwrap_err();
    assert_matches!(err, Error::RemoteProtocol(_));
}

#[tokio::test]
async fn saturated_connection_is_not_reused() {
    let mut encoder = HpackEncoder::new();
    // MAX_CONCURRENT_STREAMS=1 and a response head whose stream stays
    // open, so the connection saturates after one request.
    let headers = vec![HeaderField {
        name: b":status".to_vec(),
        value: b"200".to_vec(),
    }];
    let mut script = vec![settings_frame(1)];
    script.extend(encode_headers_from_fields(
        1,
        false,
        &headers,
        &mut encoder,
        DEFAULT_MAX_FRAME_SIZE,
    ));
    let backend = MockBackend::with_alpn(script, b"h2").paused_after(2);
    let pool = ConnectionPool::with_backend(h2_config(), Arc::new(backend.clone()));

    let first = pool
        .handle_request(Request::get("https://example.com/").unwrap())
        .await
        .unwrap();
    let second = pool
        .handle_request(Request::get("https://example.com/").unwrap())
        .await
        .unwrap();

    assert_eq!(backend.connect_count(), 2);
    assert_eq!(pool.connection_info().len(), 2);

    drop(first);
    drop(second);
    pool.close();
}

#[tokio::test]
async fn server_push_is_refused() {
    let mut encoder = HpackEncoder::new();
    let mut script = vec![
        settings_frame(100),
        // PUSH_PROMISE for stream 2 on stream 1, empty header block.
        encode_raw_frame(FrameType::PushPromise, 0x4, 1, &[0, 0, 0, 2]),
    ];
    script.extend(response_frames(&mut encoder, 1, b"hello"));
    let backend = MockBackend::with_alpn(script, b"h2").paused_after(4);
    let pool = ConnectionPool::with_backend(h2_config(), Arc::new(backend.clone()));

    let mut response = pool
        .handle_request(Request::get("https://example.com/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.read().await.unwrap(), b"hello");

    let refused = encode_rst_stream_frame(
        2,
        &RstStreamFrame {
            error_code: ERROR_REFUSED_STREAM,
        },
    );
    assert!(backend.written().iter().any(|write| *write == refused));
}

//! ABOUTME: End-to-end smoke test for the MJPEG egress path
//! ABOUTME: Drives the fake Frame Source through the broker and lifecycle controller to a real HTTP response

use bc_broker::{BrokerMetrics, FrameBroker, LifecycleController};
use bc_core::telemetry;
use bc_egress_mjpeg::MjpegState;
use bc_source::{fake::FakeFrameSource, FrameSource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn fake_source_streams_a_decodable_first_frame_over_http() {
    telemetry::init_tracing("test", "bambucamd-e2e-smoke");

    let source: Arc<dyn FrameSource> = Arc::new(FakeFrameSource::new());
    let broker = Arc::new(FrameBroker::new(source.clone(), BrokerMetrics::new()));
    let lifecycle = Arc::new(LifecycleController::new(source, broker));

    let http_bind_addr: std::net::SocketAddr = ([127, 0, 0, 1], 0).into();
    let listener = tokio::net::TcpListener::bind(http_bind_addr)
        .await
        .expect("bind ephemeral port");
    let bound_addr = listener.local_addr().unwrap();
    drop(listener);

    let shutdown = CancellationToken::new();
    let state = MjpegState::new(lifecycle.clone());
    let server = tokio::spawn(bc_egress_mjpeg::serve(bound_addr, state, shutdown.clone()));

    // Give actix a moment to bind before connecting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = read_response_prefix(bound_addr).await;
    assert!(response.starts_with(b"--boundary\r\n"));
    assert!(
        contains(&response, b"multipart/x-mixed-replace") || contains(&response, b"Content-Type: image/jpeg"),
        "expected a multipart JPEG part in the response prefix"
    );
    assert!(lifecycle.is_running().await, "viewer should have triggered a connect");

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
}

/// Connects with a raw socket rather than a full HTTP client: this test
/// only needs to assert on the first few hundred bytes of the body, and
/// the response has no `Content-Length` to wait for (spec §4, "unknown
/// length").
async fn read_response_prefix(addr: std::net::SocketAddr) -> Vec<u8> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect to mjpeg egress");
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut buf = vec![0u8; 4096];
    let mut total = Vec::new();
    for _ in 0..10 {
        let read_result = tokio::time::timeout(Duration::from_millis(500), stream.read(&mut buf)).await;
        match read_result {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => {
                total.extend_from_slice(&buf[..n]);
                if total.len() > 512 {
                    break;
                }
            }
            Ok(Err(_)) => break,
        }
    }
    total
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn lifecycle_controller_idles_with_zero_viewers() {
    let source: Arc<dyn FrameSource> = Arc::new(FakeFrameSource::new());
    let broker = Arc::new(FrameBroker::new(source.clone(), BrokerMetrics::new()));
    let lifecycle = LifecycleController::new(source, broker);

    assert!(!lifecycle.is_running().await);
    lifecycle.on_viewer_count_changed(0).await.unwrap();
    assert!(!lifecycle.is_running().await);
}

//! End-to-end tests for bundle preparation against a local HTTP server.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use waxtex_bundle::{BundleError, PrepareOptions, prepare_bundle};

/// A URL with nothing listening behind it. Connecting must fail fast, so
/// any test that hands this out asserts the connection is never attempted.
const DEAD_URL: &str = "http://127.0.0.1:1/bundle.tar";

// ============================================================================
// Helpers
// ============================================================================

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn append_file(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, data).unwrap();
}

/// Build an itar-style archive with `files` gzipped entries plus the raw
/// `SHA256SUM` marker.
fn fake_bundle_archive(files: usize) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for i in 0..files {
        let name = format!("texmf/file{i}.tfm");
        append_file(&mut builder, &name, &gzip(format!("contents {i}").as_bytes()));
    }
    append_file(&mut builder, "SHA256SUM", b"0123abcd\n");
    builder.into_inner().unwrap()
}

/// Serve exactly one HTTP response on an ephemeral port, then stop.
async fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let head = format!(
            "{status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{addr}/bundle.tar")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_full_download_and_extract() {
    let archive = fake_bundle_archive(120);
    let url = serve_once("HTTP/1.1 200 OK", archive).await;

    let dest = tempfile::tempdir().unwrap();
    prepare_bundle(dest.path(), &url, false, PrepareOptions::new())
        .await
        .unwrap();

    // Entries are flattened to basenames and decompressed
    assert_eq!(
        std::fs::read(dest.path().join("file0.tfm")).unwrap(),
        b"contents 0"
    );
    assert!(dest.path().join("file119.tfm").is_file());
    assert!(dest.path().join("SHA256SUM").is_file());
}

#[tokio::test]
async fn test_marker_short_circuits_the_download() {
    let dest = tempfile::tempdir().unwrap();
    std::fs::write(dest.path().join("SHA256SUM"), b"0123abcd\n").unwrap();

    // The dead URL proves no connection is attempted
    prepare_bundle(dest.path(), DEAD_URL, false, PrepareOptions::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_force_ignores_the_marker() {
    let dest = tempfile::tempdir().unwrap();
    std::fs::write(dest.path().join("SHA256SUM"), b"0123abcd\n").unwrap();

    let err = prepare_bundle(dest.path(), DEAD_URL, true, PrepareOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BundleError::Request { .. }), "got {err}");
}

#[tokio::test]
async fn test_http_error_status_is_surfaced() {
    let url = serve_once("HTTP/1.1 404 Not Found", Vec::new()).await;

    let dest = tempfile::tempdir().unwrap();
    let err = prepare_bundle(dest.path(), &url, false, PrepareOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BundleError::HttpStatus { status: 404 }), "got {err}");
}

#[tokio::test]
async fn test_truncated_bundle_is_rejected() {
    let archive = fake_bundle_archive(3);
    let url = serve_once("HTTP/1.1 200 OK", archive).await;

    let dest = tempfile::tempdir().unwrap();
    let err = prepare_bundle(dest.path(), &url, false, PrepareOptions::new())
        .await
        .unwrap_err();

    // 3 gzipped entries plus the marker
    assert!(
        matches!(err, BundleError::Incomplete { extracted: 4, minimum: 100 }),
        "got {err}"
    );
}

#[tokio::test]
async fn test_invalid_url_is_rejected() {
    let dest = tempfile::tempdir().unwrap();
    let err = prepare_bundle(dest.path(), "not a url", false, PrepareOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BundleError::Url { .. }), "got {err}");
}

#[tokio::test]
async fn test_pre_cancelled_token_stops_before_the_request() {
    let token = CancellationToken::new();
    token.cancel();

    let dest = tempfile::tempdir().unwrap();
    let err = prepare_bundle(
        dest.path(),
        DEAD_URL,
        false,
        PrepareOptions::new().cancel(token),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BundleError::Cancelled), "got {err}");
}

#[tokio::test]
async fn test_successful_prepare_is_idempotent() {
    let archive = fake_bundle_archive(120);
    let url = serve_once("HTTP/1.1 200 OK", archive).await;

    let dest = tempfile::tempdir().unwrap();
    prepare_bundle(dest.path(), &url, false, PrepareOptions::new())
        .await
        .unwrap();

    // The marker landed with the archive, so the second call never touches
    // the network
    prepare_bundle(dest.path(), DEAD_URL, false, PrepareOptions::new())
        .await
        .unwrap();
}

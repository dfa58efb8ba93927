//! Integration tests for the retrying fetcher against mock HTTP servers.

mod support;

use std::time::Duration;

use bookdl_core::download::{
    DownloadError, Fetch, FetchOutcome, FetchRequest, HttpClient, RetryPolicy, RetryingFetcher,
    TransferLimits,
};
use support::socket_guard::{should_skip_socket_bound_test, start_mock_server_or_skip};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10), 2.0)
}

fn fetcher_with_limit(max_file_size: u64) -> RetryingFetcher {
    let limits = TransferLimits {
        max_file_size,
        ..TransferLimits::default()
    };
    let client = HttpClient::with_settings(Duration::from_secs(10), limits).unwrap();
    RetryingFetcher::new(client, fast_policy())
}

fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_fetch_uses_encoded_greek_filename() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/get"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Content-Disposition",
                    "attachment; filename*=UTF-8''%CE%99%CE%BB%CE%B9%CE%AC%CE%B4%CE%B1.pdf",
                )
                .set_body_bytes(b"%PDF-1.4 iliad".to_vec()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = FetchRequest::new(format!("{}/get", mock_server.uri()), temp_dir.path(), "PDF");
    let outcome = fetcher_with_limit(1024).fetch(&request).await;

    let FetchOutcome::Saved {
        path,
        bytes,
        attempts,
        retry_delays,
    } = outcome
    else {
        panic!("expected saved file, got {outcome:?}");
    };
    assert_eq!(path, temp_dir.path().join("Ιλιάδα.pdf"));
    assert_eq!(bytes, 14);
    assert_eq!(attempts, 1);
    assert!(retry_delays.is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 iliad");
}

#[tokio::test]
async fn test_fetch_recovers_after_transient_errors() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/book.pdf"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/book.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"content".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = FetchRequest::new(
        format!("{}/book.pdf", mock_server.uri()),
        temp_dir.path(),
        "PDF",
    );
    let started = std::time::Instant::now();
    let outcome = fetcher_with_limit(1024).fetch(&request).await;
    let elapsed = started.elapsed();

    let FetchOutcome::Saved {
        path,
        attempts,
        retry_delays,
        ..
    } = outcome
    else {
        panic!("expected saved file, got {outcome:?}");
    };
    assert_eq!(attempts, 3);
    assert_eq!(path, temp_dir.path().join("book.pdf"));
    assert_eq!(
        retry_delays,
        [Duration::from_millis(10), Duration::from_millis(20)]
    );
    assert!(
        retry_delays.windows(2).all(|pair| pair[0] < pair[1]),
        "backoff must grow: {retry_delays:?}"
    );
    assert!(elapsed >= Duration::from_millis(30), "slept only {elapsed:?}");
}

#[tokio::test]
async fn test_fetch_oversize_is_not_retried_and_leaves_nothing() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("Book");

    Mock::given(method("GET"))
        .and(path("/huge.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 64]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = FetchRequest::new(format!("{}/huge.pdf", mock_server.uri()), &dest, "PDF");
    let outcome = fetcher_with_limit(16).fetch(&request).await;

    match outcome {
        FetchOutcome::TooLarge {
            declared_bytes,
            limit,
        } => {
            assert!(declared_bytes > 16);
            assert_eq!(limit, 16);
        }
        other => panic!("expected oversize skip, got {other:?}"),
    }
    assert!(dir_entries(&dest).is_empty(), "no file may be kept");
}

/// Serves one chunked response with no `Content-Length`, `body_len` bytes long.
async fn serve_chunked_once(body_len: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let mut response = Vec::from(
            &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"[..],
        );
        response.extend_from_slice(format!("{body_len:x}\r\n").as_bytes());
        response.extend(std::iter::repeat_n(b'x', body_len));
        response.extend_from_slice(b"\r\n0\r\n\r\n");
        let _ = socket.write_all(&response).await;
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}/stream.pdf")
}

#[tokio::test]
async fn test_fetch_undeclared_length_is_guarded_while_streaming() {
    if should_skip_socket_bound_test() {
        return;
    }
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("Book");
    let url = serve_chunked_once(64).await;

    let request = FetchRequest::new(url, &dest, "PDF");
    let outcome = fetcher_with_limit(16).fetch(&request).await;

    match outcome {
        FetchOutcome::TooLarge {
            declared_bytes,
            limit,
        } => {
            assert!(declared_bytes > 16);
            assert_eq!(limit, 16);
        }
        other => panic!("expected oversize skip, got {other:?}"),
    }
    assert!(dir_entries(&dest).is_empty(), "no partial file may remain");
}

#[tokio::test]
async fn test_fetch_exhausts_attempts_on_not_found() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("Book");

    Mock::given(method("GET"))
        .and(path("/missing.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&mock_server)
        .await;

    let request = FetchRequest::new(
        format!("{}/missing.pdf", mock_server.uri()),
        &dest,
        "PDF",
    );
    let outcome = fetcher_with_limit(1024).fetch(&request).await;

    match outcome {
        FetchOutcome::Failed {
            error,
            attempts,
            retry_delays,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(retry_delays.len(), 2);
            assert!(matches!(error, DownloadError::HttpStatus { status: 404, .. }));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(dir_entries(&dest).is_empty(), "no partial file may remain");
}

#[tokio::test]
async fn test_connection_limit_still_completes_concurrent_fetches() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp_dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"volume".to_vec()))
        .expect(4)
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_with_limit(1024).with_connection_limit(1);
    let requests: Vec<FetchRequest> = (1..=4)
        .map(|n| {
            FetchRequest::new(
                format!("{}/vol{n}.pdf", mock_server.uri()),
                temp_dir.path(),
                format!("Τόμος {n}"),
            )
        })
        .collect();
    let outcomes =
        futures_util::future::join_all(requests.iter().map(|request| fetcher.fetch(request))).await;

    assert!(outcomes.iter().all(FetchOutcome::is_success));
    let mut names = dir_entries(temp_dir.path());
    names.sort();
    assert_eq!(names, ["vol1.pdf", "vol2.pdf", "vol3.pdf", "vol4.pdf"]);
}

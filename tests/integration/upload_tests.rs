use cache_push::archive::peek_identity;
use cache_push::config::Config;
use cache_push::paths::Normalizer;
use cache_push::pipeline::{run_with, Outcome};
use cache_push::upload::{upload_archive, UploadError, UploadOptions};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_file_destination_creates_parents() {
    let work = TempDir::new().unwrap();
    fs::write(work.path().join("a.txt"), "a").unwrap();
    let remote = work.path().join("remote/nested/deeper/cache.tar.gz");

    let config = Config {
        cache_paths: "./a.txt".into(),
        cache_api_url: format!("file://{}", remote.display()),
        compress_archive: true,
        stack_id: "linux-docker".into(),
        archive_path: work.path().join("archive.tar.gz"),
        descriptor_path: work.path().join("cache-info.json"),
        meta_path: work.path().join("cache-meta.json"),
        pull_end_time_path: work.path().join("pull_end_time"),
        ..Config::default()
    };

    let outcome = run_with(&config, &Normalizer::new(work.path())).unwrap();
    let Outcome::Uploaded { size, .. } = outcome else {
        panic!("expected upload, got {outcome:?}");
    };

    assert_eq!(fs::metadata(&remote).unwrap().len(), size);
    assert_eq!(fs::read(&remote).unwrap(), fs::read(&config.archive_path).unwrap());
    assert_eq!(peek_identity(&remote).unwrap().stack_id, "linux-docker");
}

/// Read one request, returning its first line and body.
fn read_request(stream: &mut std::net::TcpStream) -> (String, Vec<u8>) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap();
            }
        }
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).unwrap();
    (request_line.trim_end().to_string(), body)
}

fn respond(stream: &mut std::net::TcpStream, status: u16, body: &str) {
    write!(
        stream,
        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
    .unwrap();
}

#[test]
fn test_http_upload_sends_archive_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let put_url = format!("{base}/bucket/cache.tar?signature=secret");

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let (line, body) = read_request(&mut stream);
        respond(&mut stream, 200, &format!(r#"{{"upload_url":"{put_url}"}}"#));
        drop(stream);

        let (mut stream, _) = listener.accept().unwrap();
        let (put_line, put_body) = read_request(&mut stream);
        respond(&mut stream, 200, "");
        (line, body, put_line, put_body)
    });

    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("archive.tar");
    fs::write(&archive, b"archive bytes").unwrap();

    let options = UploadOptions {
        timeout: Duration::from_secs(5),
        retry_delay: Duration::ZERO,
    };
    upload_archive(&archive, &format!("{base}/cache"), options).unwrap();

    let (post_line, post_body, put_line, put_body) = server.join().unwrap();
    assert!(post_line.starts_with("POST /cache"));
    let request: serde_json::Value = serde_json::from_slice(&post_body).unwrap();
    assert_eq!(request["file_size_in_bytes"], 13);
    assert!(put_line.starts_with("PUT /bucket/cache.tar"));
    assert_eq!(put_body, b"archive bytes");
}

#[test]
fn test_http_rejection_hides_credentials() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);
        respond(&mut stream, 401, "{}");
    });

    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("archive.tar");
    fs::write(&archive, b"x").unwrap();

    let url = format!("http://user:hunter2@{addr}/cache?token=abc123");
    let err = upload_archive(&archive, &url, UploadOptions::default()).unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, UploadError::Status { status: 401, .. }));
    let message = err.to_string();
    assert!(!message.contains("hunter2"), "{message}");
    assert!(!message.contains("abc123"), "{message}");
}

/// Answer the POST with an upload URL, then each PUT with the next status.
fn serve_put_statuses(statuses: Vec<u16>) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let put_url = format!("{base}/put");

    let server = thread::spawn(move || {
        let mut requests = Vec::new();

        let (mut stream, _) = listener.accept().unwrap();
        let (line, _) = read_request(&mut stream);
        requests.push(line);
        respond(&mut stream, 200, &format!(r#"{{"upload_url":"{put_url}"}}"#));
        drop(stream);

        for status in statuses {
            let (mut stream, _) = listener.accept().unwrap();
            let (line, body) = read_request(&mut stream);
            assert_eq!(body, b"archive bytes");
            requests.push(line);
            respond(&mut stream, status, "");
        }
        requests
    });

    (format!("{base}/api"), server)
}

fn request_targets(requests: &[String]) -> Vec<&str> {
    requests
        .iter()
        .map(|line| line.rsplit_once(' ').map_or(line.as_str(), |(target, _)| target))
        .collect()
}

#[test]
fn test_failed_put_is_retried_once() {
    let (url, server) = serve_put_statuses(vec![500, 200]);

    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("archive.tar");
    fs::write(&archive, b"archive bytes").unwrap();

    let options = UploadOptions {
        timeout: Duration::from_secs(5),
        retry_delay: Duration::ZERO,
    };
    upload_archive(&archive, &url, options).unwrap();

    let requests = server.join().unwrap();
    assert_eq!(
        request_targets(&requests),
        vec!["POST /api", "PUT /put", "PUT /put"]
    );
}

#[test]
fn test_second_put_failure_is_fatal() {
    let (url, server) = serve_put_statuses(vec![500, 503]);

    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("archive.tar");
    fs::write(&archive, b"archive bytes").unwrap();

    let options = UploadOptions {
        timeout: Duration::from_secs(5),
        retry_delay: Duration::ZERO,
    };
    let err = upload_archive(&archive, &url, options).unwrap_err();

    let requests = server.join().unwrap();
    assert_eq!(requests.len(), 3, "no third PUT attempt: {requests:?}");
    assert!(matches!(err, UploadError::Status { status: 503, .. }));
}

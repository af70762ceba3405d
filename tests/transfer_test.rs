//! Chunked upload and download against a mock Drive server.

mod common;

use folder_drive::DriveError;
use mockito::{Matcher, Server};
use tempfile::TempDir;

use common::{client, file_json, BEARER};

/// Deterministic, non-repeating-per-chunk payload.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn metadata_query() -> Matcher {
    Matcher::UrlEncoded("fields".into(), "id,name,size,createdTime,mimeType".into())
}

fn assert_progress(reports: &[f64]) {
    assert!(!reports.is_empty());
    assert!(reports.windows(2).all(|w| w[0] <= w[1]), "{reports:?}");
    assert!(reports.iter().all(|f| (0.0..=1.0).contains(f)), "{reports:?}");
    assert_eq!(reports.iter().filter(|f| **f == 1.0).count(), 1, "{reports:?}");
    assert_eq!(reports.last(), Some(&1.0));
}

mod upload {
    use super::*;

    #[tokio::test]
    async fn test_upload_in_three_chunks_with_one_retry() {
        let mut server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("backup.tar");
        std::fs::write(&local, payload(600_000)).unwrap();
        let session_uri = format!("{}/upload/session-1", server.url());

        let start = server
            .mock("POST", "/upload/drive/v3/files")
            .match_header("authorization", BEARER)
            .match_header("x-upload-content-length", "600000")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "resumable".into()))
            .match_body(Matcher::PartialJsonString(
                r#"{"name": "backup.tar", "parents": ["folder-1"]}"#.into(),
            ))
            .with_status(200)
            .with_header("location", &session_uri)
            .expect(1)
            .create_async()
            .await;
        let first = server
            .mock("PUT", "/upload/session-1")
            .match_header("content-range", "bytes 0-262143/600000")
            .with_status(308)
            .with_header("range", "bytes=0-262143")
            .expect(1)
            .create_async()
            .await;
        let second_fails = server
            .mock("PUT", "/upload/session-1")
            .match_header("content-range", "bytes 262144-524287/600000")
            .with_status(503)
            .with_body("backend unavailable")
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("PUT", "/upload/session-1")
            .match_header("content-range", "bytes 262144-524287/600000")
            .with_status(308)
            .with_header("range", "bytes=0-524287")
            .expect(1)
            .create_async()
            .await;
        let last = server
            .mock("PUT", "/upload/session-1")
            .match_header("content-range", "bytes 524288-599999/600000")
            .with_status(200)
            .with_body(r#"{"id": "new-file"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server, dir.path());
        let mut reports = Vec::new();
        let mut on_progress = |f: f64| reports.push(f);
        let id = client
            .upload_file(&local, None, Some("folder-1"), 262_144, Some(&mut on_progress))
            .await
            .unwrap();

        assert_eq!(id, "new-file");
        start.assert_async().await;
        first.assert_async().await;
        second_fails.assert_async().await;
        second.assert_async().await;
        last.assert_async().await;

        assert_eq!(reports.len(), 3);
        assert_progress(&reports);
    }

    #[tokio::test]
    async fn test_upload_gives_up_after_second_failure() {
        let mut server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("backup.tar");
        std::fs::write(&local, payload(1000)).unwrap();

        server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("location", &format!("{}/upload/session-2", server.url()))
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/upload/session-2")
            .with_status(500)
            .with_body(r#"{"error": {"code": 500, "message": "Backend Error"}}"#)
            .expect(2)
            .create_async()
            .await;

        let client = client(&server, dir.path());
        let err = client
            .upload_file(&local, Some("renamed.tar"), Some("folder-1"), 0, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DriveError::ApiError { status: 500, .. }));
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_permanent_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("backup.tar");
        std::fs::write(&local, payload(10)).unwrap();

        let start = server
            .mock("POST", "/upload/drive/v3/files")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(
                r#"{"error": {"code": 403, "message": "The user's Drive storage quota has been exceeded."}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = client(&server, dir.path());
        let err = client
            .upload_file(&local, None, Some("folder-1"), 0, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DriveError::ApiError { status: 403, .. }));
        start.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_empty_file() {
        let mut server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("empty.txt");
        std::fs::write(&local, b"").unwrap();

        server
            .mock("POST", "/upload/drive/v3/files")
            .match_header("x-upload-content-type", "text/plain")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("location", &format!("{}/upload/session-3", server.url()))
            .create_async()
            .await;
        let finish = server
            .mock("PUT", "/upload/session-3")
            .match_header("content-range", "bytes */0")
            .with_status(201)
            .with_body(r#"{"id": "empty-file"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server, dir.path());
        let mut reports = Vec::new();
        let mut on_progress = |f: f64| reports.push(f);
        let id = client
            .upload_file(&local, None, Some("folder-1"), 0, Some(&mut on_progress))
            .await
            .unwrap();

        assert_eq!(id, "empty-file");
        assert_eq!(reports, vec![1.0]);
        finish.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_missing_local_file() {
        let server = Server::new_async().await;
        let dir = TempDir::new().unwrap();

        let client = client(&server, dir.path());
        let err = client
            .upload_file(&dir.path().join("nope.tar"), None, Some("folder-1"), 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::Io(_)));
    }
}

mod download {
    use super::*;

    #[tokio::test]
    async fn test_download_in_one_range_with_default_hint() {
        let mut server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let data = payload(1_048_570);

        server
            .mock("GET", "/drive/v3/files/big")
            .match_query(metadata_query())
            .with_status(200)
            .with_body(file_json("big", 1_048_570, "2024-01-01T00:00:00Z").to_string())
            .create_async()
            .await;
        let media = server
            .mock("GET", "/drive/v3/files/big")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("range", "bytes=0-1048569")
            .with_status(206)
            .with_body(data.clone())
            .expect(1)
            .create_async()
            .await;

        let client = client(&server, dir.path());
        let mut reports = Vec::new();
        let mut on_progress = |f: f64| reports.push(f);
        let path = client
            .download_file("big", Some(dir.path()), 0, Some(&mut on_progress))
            .await
            .unwrap();

        media.assert_async().await;
        assert_eq!(path, dir.path().join("big.tar"));
        assert_eq!(std::fs::read(&path).unwrap(), data);
        assert_eq!(reports, vec![1.0]);
    }

    #[tokio::test]
    async fn test_download_retries_a_failed_range() {
        let mut server = Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let data = payload(600_000);
        let target = dir.path().join("restored.tar");

        server
            .mock("GET", "/drive/v3/files/f1")
            .match_query(metadata_query())
            .with_status(200)
            .with_body(file_json("f1", 600_000, "2024-01-01T00:00:00Z").to_string())
            .create_async()
            .await;
        let first = server
            .mock("GET", "/drive/v3/files/f1")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("range", "bytes=0-262143")
            .with_status(206)
            .with_body(&data[..262_144])
            .expect(1)
            .create_async()
            .await;
        let second_fails = server
            .mock("GET", "/drive/v3/files/f1")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("range", "bytes=262144-524287")
            .with_status(502)
            .with_body("bad gateway")
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/drive/v3/files/f1")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("range", "bytes=262144-524287")
            .with_status(206)
            .with_body(&data[262_144..524_288])
            .expect(1)
            .create_async()
            .await;
        let last = server
            .mock("GET", "/drive/v3/files/f1")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("range", "bytes=524288-599999")
            .with_status(206)
            .with_body(&data[524_288..])
            .expect(1)
            .create_async()
            .await;

        let client = client(&server, dir.path());
        let mut reports = Vec::new();
        let mut on_progress = |f: f64| reports.push(f);
        let path = client
            .download_file("f1", Some(&target), 262_144, Some(&mut on_progress))
            .await
            .unwrap();

        first.assert_async().await;
        second_fails.assert_async().await;
        second.assert_async().await;
        last.assert_async().await;
        assert_eq!(path, target);
        assert_eq!(std::fs::read(&path).unwrap(), data);
        assert_eq!(reports.len(), 3);
        assert_progress(&reports);
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let mut server = Server::new_async().await;
        let dir = TempDir::new().unwrap();

        server
            .mock("GET", "/drive/v3/files/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error": {"code": 404, "message": "File not found: missing."}}"#)
            .create_async()
            .await;

        let client = client(&server, dir.path());
        let err = client
            .download_file("missing", Some(dir.path()), 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_download_empty_file_makes_no_media_request() {
        let mut server = Server::new_async().await;
        let dir = TempDir::new().unwrap();

        server
            .mock("GET", "/drive/v3/files/empty")
            .match_query(metadata_query())
            .with_status(200)
            .with_body(file_json("empty", 0, "2024-01-01T00:00:00Z").to_string())
            .create_async()
            .await;
        let media = server
            .mock("GET", "/drive/v3/files/empty")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .expect(0)
            .create_async()
            .await;

        let client = client(&server, dir.path());
        let mut reports = Vec::new();
        let mut on_progress = |f: f64| reports.push(f);
        let path = client
            .download_file("empty", Some(dir.path()), 0, Some(&mut on_progress))
            .await
            .unwrap();

        media.assert_async().await;
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(reports, vec![1.0]);
    }
}

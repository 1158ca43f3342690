use std::time::Duration;

use gdrive_core::{ApiErrorClass, Credential, DriveClient, DriveError};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> DriveClient {
    DriveClient::with_base_url(&server.uri(), Credential::bearer("test-token")).unwrap()
}

#[tokio::test]
async fn list_folder_sends_parent_query_and_bearer_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", "'folder-1' in parents and trashed = false"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                {
                    "id": "id-a",
                    "name": "a.csv",
                    "mimeType": "text/csv",
                    "modifiedTime": "2024-01-01T00:00:00.000Z",
                    "md5Checksum": "5d41402abc4b2a76b9719d911017c592",
                    "size": "5"
                },
                {
                    "id": "id-sub",
                    "name": "nested",
                    "mimeType": "application/vnd.google-apps.folder",
                    "modifiedTime": "2024-01-02T00:00:00.000Z"
                }
            ]
        })))
        .mount(&server)
        .await;

    let page = client_for(&server)
        .list_folder("folder-1", None, None)
        .await
        .unwrap();

    assert_eq!(page.files.len(), 2);
    assert_eq!(page.files[0].name, "a.csv");
    assert_eq!(page.files[0].modified_time, "2024-01-01T00:00:00.000Z");
    assert!(!page.files[0].is_folder());
    assert!(page.files[1].is_folder());
    assert!(page.next_page_token.is_none());
}

#[tokio::test]
async fn list_folder_all_follows_page_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                { "id": "id-b", "name": "b.csv", "modifiedTime": "2024-02-01T00:00:00.000Z" }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "page-2",
            "files": [
                { "id": "id-a", "name": "a.csv", "modifiedTime": "2024-01-01T00:00:00.000Z" }
            ]
        })))
        .mount(&server)
        .await;

    let files = client_for(&server)
        .list_folder_all("folder-1")
        .await
        .unwrap();

    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.csv", "b.csv"]);
}

#[tokio::test]
async fn get_media_requests_alt_media() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/id-a"))
        .and(query_param("alt", "media"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x,y\n1,2\n"))
        .mount(&server)
        .await;

    let response = client_for(&server).get_media("id-a").await.unwrap();
    let body = response.bytes().await.unwrap();

    assert_eq!(&body[..], b"x,y\n1,2\n");
}

#[tokio::test]
async fn api_errors_carry_status_and_classification() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/id-busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let err = client
        .list_folder("folder-1", None, None)
        .await
        .expect_err("expected auth failure");
    assert!(matches!(err, DriveError::Api { ref body, .. } if body == "invalid credentials"));
    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
    assert!(!err.is_retryable());

    let err = client
        .get_media("id-busy")
        .await
        .expect_err("expected server error");
    assert_eq!(err.classification(), Some(ApiErrorClass::Transient));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn quota_responses_are_retryable_rate_limits() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "User Rate Limit Exceeded",
                "errors": [{ "domain": "usageLimits", "reason": "userRateLimitExceeded" }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/id-hot"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/id-private"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "errors": [{ "reason": "insufficientFilePermissions" }] }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let err = client
        .list_folder("folder-1", None, None)
        .await
        .expect_err("expected quota error");
    assert_eq!(err.classification(), Some(ApiErrorClass::RateLimit));
    assert!(err.is_retryable());
    assert_eq!(err.retry_after(), None);

    let err = client
        .get_media("id-hot")
        .await
        .expect_err("expected throttling");
    assert_eq!(err.classification(), Some(ApiErrorClass::RateLimit));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));

    let err = client
        .get_media("id-private")
        .await
        .expect_err("expected permission error");
    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
    assert!(!err.is_retryable());
}

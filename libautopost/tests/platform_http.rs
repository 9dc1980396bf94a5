//! Wire-level tests for the reqwest step APIs
//!
//! Each test points the configurable endpoint URLs at a local HTTP stub that
//! records every request and answers with canned JSON, then checks what
//! actually went over the socket.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use libautopost::config::{GraphConfig, RelayConfig, TwitterConfig};
use libautopost::credentials::{
    FacebookCredentials, InstagramCredentials, RelayCredentials, TwitterCredentials,
};
use libautopost::platforms::facebook::{FacebookApi, FacebookClient, GraphFacebookApi};
use libautopost::platforms::instagram::{GraphInstagramApi, InstagramApi, InstagramClient};
use libautopost::platforms::relay::{ImageKitRelay, ImageRelay};
use libautopost::platforms::twitter::{HttpTwitterApi, TwitterApi, TwitterClient};
use libautopost::platforms::Platform;
use libautopost::retry::RetryPolicy;
use libautopost::PlatformError;
use percent_encoding::percent_decode_str;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RecordedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Value of a text part in a multipart body
    fn multipart_field(&self, name: &str) -> Option<String> {
        let body = self.body_text();
        let start = body.find(&format!("name=\"{}\"", name))?;
        let rest = &body[start..];
        let value = &rest[rest.find("\r\n\r\n")? + 4..];
        let end = value.find("\r\n--")?;
        Some(value[..end].to_string())
    }

    /// Value of a field in an `application/x-www-form-urlencoded` body
    fn form_field(&self, name: &str) -> Option<String> {
        self.body_text().split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| {
                percent_decode_str(&value.replace('+', " "))
                    .decode_utf8_lossy()
                    .into_owned()
            })
        })
    }
}

/// Local HTTP/1.1 server answering requests in order with canned replies
///
/// The last reply repeats once the list is exhausted.
struct StubServer {
    url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    async fn start(replies: Vec<(u16, &'static str)>) -> Self {
        assert!(!replies.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            let mut served = 0usize;
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let Some(request) = read_request(&mut stream).await else {
                    continue;
                };
                log.lock().unwrap().push(request);

                let (status, body) = replies[served.min(replies.len() - 1)];
                served += 1;
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason_phrase(status),
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { url, requests }
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn only_request(&self) -> RecordedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected one request, got {:?}", requests);
        requests.into_iter().next().unwrap()
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        403 => "Forbidden",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decode a complete chunked body, or `None` if more bytes are needed
fn decode_chunked(raw: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let line_end = pos + find(&raw[pos..], b"\r\n")?;
        let size_line = String::from_utf8_lossy(&raw[pos..line_end]);
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16).ok()?;
        pos = line_end + 2;
        if size == 0 {
            return Some(out);
        }
        if raw.len() < pos + size + 2 {
            return None;
        }
        out.extend_from_slice(&raw[pos..pos + size]);
        pos += size + 2;
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let mut request = RecordedRequest {
        method,
        path,
        headers,
        body: buf[header_end + 4..].to_vec(),
    };

    let content_length = request
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok());
    let chunked = request
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));

    if let Some(length) = content_length {
        while request.body.len() < length {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            request.body.extend_from_slice(&chunk[..n]);
        }
        request.body.truncate(length);
    } else if chunked {
        let mut raw = std::mem::take(&mut request.body);
        request.body = loop {
            if let Some(decoded) = decode_chunked(&raw) {
                break decoded;
            }
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            raw.extend_from_slice(&chunk[..n]);
        };
    }

    Some(request)
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

fn graph_config(server: &StubServer) -> GraphConfig {
    GraphConfig {
        base_url: server.url.clone(),
        api_version: "v18.0".to_string(),
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10))
}

fn write_image(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"\x89PNG stand-in image bytes").unwrap();
    path
}

fn facebook_api(server: &StubServer) -> GraphFacebookApi {
    GraphFacebookApi::new(
        http_client(),
        &graph_config(server),
        FacebookCredentials {
            page_id: "1234".to_string(),
            access_token: SecretString::from("page-token".to_string()),
        },
    )
}

fn twitter_api(server: &StubServer) -> HttpTwitterApi {
    let config = TwitterConfig {
        upload_url: format!("{}/1.1/media/upload.json", server.url),
        tweet_url: format!("{}/2/tweets", server.url),
    };
    let credentials = TwitterCredentials {
        api_key: "x-key".to_string(),
        api_secret: SecretString::from("x-secret".to_string()),
        access_token: "x-token".to_string(),
        access_secret: SecretString::from("x-token-secret".to_string()),
    };
    HttpTwitterApi::new(http_client(), &config, &credentials)
}

fn imagekit_relay(server: &StubServer, folder: Option<&str>) -> ImageKitRelay {
    let config = RelayConfig {
        upload_url: format!("{}/api/v1/files/upload", server.url),
        folder: folder.map(str::to_string),
    };
    ImageKitRelay::new(
        http_client(),
        &config,
        RelayCredentials {
            private_key: SecretString::from("private_abc".to_string()),
        },
    )
}

fn instagram_api(server: &StubServer) -> GraphInstagramApi {
    GraphInstagramApi::new(
        http_client(),
        &graph_config(server),
        InstagramCredentials {
            user_id: "17841400000".to_string(),
            access_token: SecretString::from("ig-token".to_string()),
        },
    )
}

fn assert_protocol(err: PlatformError, expected_status: u16, body_fragment: &str) {
    match err {
        PlatformError::Protocol { status, body } => {
            assert_eq!(status, expected_status);
            assert!(body.contains(body_fragment), "body was {:?}", body);
        }
        other => panic!("Expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_facebook_photo_upload_request() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, "quake.png");
    let server = StubServer::start(vec![(200, r#"{"id":"99","post_id":"1234_99"}"#)]).await;

    let post_id = facebook_api(&server)
        .upload_photo(&image, "Gempa M5.2")
        .await
        .unwrap();
    assert_eq!(post_id, "1234_99");

    let request = server.only_request();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/v18.0/1234/photos");
    assert!(request
        .header("content-type")
        .unwrap()
        .starts_with("multipart/form-data; boundary="));
    assert!(request.body_text().contains("name=\"source\""));
    assert!(request.body_text().contains("filename=\"quake.png\""));
    assert_eq!(request.multipart_field("caption").as_deref(), Some("Gempa M5.2"));
    assert_eq!(
        request.multipart_field("access_token").as_deref(),
        Some("page-token")
    );
}

#[tokio::test]
async fn test_facebook_accepted_upload_without_id_is_posted_once() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, "quake.png");
    let server = StubServer::start(vec![(200, r#"{"success":true}"#)]).await;

    let client = FacebookClient::new(Arc::new(facebook_api(&server)), fast_retry());
    let err = client.publish_image(&image, "caption").await.unwrap_err();

    assert!(matches!(err, PlatformError::InvalidResponse(_)));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_facebook_rejection_keeps_status_and_body() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, "quake.png");
    let server = StubServer::start(vec![(
        400,
        r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#,
    )])
    .await;

    let err = facebook_api(&server)
        .upload_photo(&image, "caption")
        .await
        .unwrap_err();

    assert_protocol(err, 400, "Invalid OAuth access token.");
}

#[tokio::test]
async fn test_facebook_server_error_is_retried() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, "quake.png");
    let server = StubServer::start(vec![
        (500, r#"{"error":{"message":"An unknown error has occurred."}}"#),
        (200, r#"{"id":"99"}"#),
    ])
    .await;

    let client = FacebookClient::new(Arc::new(facebook_api(&server)), fast_retry());
    let post_id = client.publish_image(&image, "caption").await.unwrap();

    assert_eq!(post_id, "99");
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn test_x_media_upload_and_post_are_signed() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, "autopost-1.jpg");
    let server = StubServer::start(vec![
        (200, r#"{"media_id":710511363345354753,"media_id_string":"710511363345354753"}"#),
        (201, r#"{"data":{"id":"1445880548472328192","text":"Gempa M5.2"}}"#),
    ])
    .await;

    let client = TwitterClient::new(Arc::new(twitter_api(&server)), fast_retry());
    let post_id = client.publish_image(&image, "Gempa M5.2").await.unwrap();
    assert_eq!(post_id, "1445880548472328192");

    let requests = server.requests();
    assert_eq!(requests.len(), 2);

    let upload = &requests[0];
    assert_eq!(upload.method, "POST");
    assert_eq!(upload.path, "/1.1/media/upload.json");
    assert!(upload
        .header("content-type")
        .unwrap()
        .starts_with("multipart/form-data"));
    assert!(upload.body_text().contains("name=\"media\""));

    let tweet = &requests[1];
    assert_eq!(tweet.method, "POST");
    assert_eq!(tweet.path, "/2/tweets");
    assert_eq!(tweet.header("content-type"), Some("application/json"));
    let payload: serde_json::Value = serde_json::from_slice(&tweet.body).unwrap();
    assert_eq!(payload["text"], "Gempa M5.2");
    assert_eq!(
        payload["media"]["media_ids"],
        serde_json::json!(["710511363345354753"])
    );

    for request in &requests {
        let authorization = request.header("authorization").unwrap();
        assert!(authorization.starts_with("OAuth "), "got {}", authorization);
        assert!(authorization.contains("oauth_consumer_key=\"x-key\""));
        assert!(authorization.contains("oauth_token=\"x-token\""));
        assert!(authorization.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(authorization.contains("oauth_signature=\""));
        assert!(!authorization.contains("x-secret"));
    }
}

#[tokio::test]
async fn test_x_duplicate_post_keeps_status_and_body() {
    let server = StubServer::start(vec![(
        403,
        r#"{"detail":"You are not allowed to create a Tweet with duplicate content.","status":403}"#,
    )])
    .await;

    let err = twitter_api(&server)
        .create_tweet("Gempa M5.2", "710511363345354753")
        .await
        .unwrap_err();

    assert_protocol(err, 403, "duplicate content");
}

#[tokio::test]
async fn test_relay_upload_uses_basic_auth_and_multipart() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, "autopost-1.jpg");
    let server = StubServer::start(vec![(
        200,
        r#"{"fileId":"6673f","name":"autopost-1.jpg","url":"https://ik.imagekit.io/demo/quakes/autopost-1.jpg"}"#,
    )])
    .await;

    let url = imagekit_relay(&server, Some("/quakes"))
        .upload(&image)
        .await
        .unwrap();
    assert_eq!(url, "https://ik.imagekit.io/demo/quakes/autopost-1.jpg");

    let request = server.only_request();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/v1/files/upload");
    let expected_auth = format!("Basic {}", BASE64.encode("private_abc:"));
    assert_eq!(request.header("authorization"), Some(expected_auth.as_str()));

    assert!(request.body_text().contains("name=\"file\""));
    assert!(request.body_text().contains("filename=\"autopost-1.jpg\""));
    assert_eq!(
        request.multipart_field("fileName").as_deref(),
        Some("autopost-1.jpg")
    );
    assert_eq!(request.multipart_field("isPrivateFile").as_deref(), Some("false"));
    assert_eq!(request.multipart_field("folder").as_deref(), Some("/quakes"));
}

#[tokio::test]
async fn test_relay_server_error_keeps_status_and_body() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, "autopost-1.jpg");
    let server = StubServer::start(vec![(500, r#"{"message":"Internal server error"}"#)]).await;

    let relay = imagekit_relay(&server, None);
    let err = relay.upload(&image).await.unwrap_err();

    assert_protocol(err, 500, "Internal server error");
    assert!(server.only_request().multipart_field("folder").is_none());
}

#[tokio::test]
async fn test_instagram_container_and_publish_forms() {
    let server = StubServer::start(vec![
        (200, r#"{"id":"17889455560051444"}"#),
        (200, r#"{"id":"17895695668004550"}"#),
    ])
    .await;
    let api = instagram_api(&server);

    let creation_id = api
        .create_container(
            "https://ik.imagekit.io/demo/autopost-1.jpg",
            "Gempa M5.2 & aftershocks",
        )
        .await
        .unwrap();
    assert_eq!(creation_id, "17889455560051444");

    let media_id = api.publish_container(&creation_id).await.unwrap();
    assert_eq!(media_id, "17895695668004550");

    let requests = server.requests();
    assert_eq!(requests.len(), 2);

    let container = &requests[0];
    assert_eq!(container.method, "POST");
    assert_eq!(container.path, "/v18.0/17841400000/media");
    assert_eq!(
        container.header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(
        container.form_field("image_url").as_deref(),
        Some("https://ik.imagekit.io/demo/autopost-1.jpg")
    );
    assert_eq!(
        container.form_field("caption").as_deref(),
        Some("Gempa M5.2 & aftershocks")
    );
    assert_eq!(container.form_field("access_token").as_deref(), Some("ig-token"));

    let publish = &requests[1];
    assert_eq!(publish.path, "/v18.0/17841400000/media_publish");
    assert_eq!(
        publish.form_field("creation_id").as_deref(),
        Some("17889455560051444")
    );
    assert_eq!(publish.form_field("access_token").as_deref(), Some("ig-token"));
    assert!(publish.form_field("image_url").is_none());
}

#[tokio::test]
async fn test_instagram_chain_hands_relay_url_to_container() {
    let dir = TempDir::new().unwrap();
    let image = write_image(&dir, "autopost-1.jpg");
    let server = StubServer::start(vec![
        (200, r#"{"fileId":"f1","url":"https://ik.imagekit.io/demo/autopost-1.jpg"}"#),
        (200, r#"{"id":"17889455560051444"}"#),
        (200, r#"{"id":"17895695668004550"}"#),
    ])
    .await;

    let client = InstagramClient::new(
        Arc::new(instagram_api(&server)),
        Arc::new(imagekit_relay(&server, None)),
        RetryPolicy::none(),
    );
    let media_id = client.publish_image(&image, "caption").await.unwrap();
    assert_eq!(media_id, "17895695668004550");

    let paths: Vec<String> = server.requests().iter().map(|r| r.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            "/api/v1/files/upload",
            "/v18.0/17841400000/media",
            "/v18.0/17841400000/media_publish",
        ]
    );
    assert_eq!(
        server.requests()[1].form_field("image_url").as_deref(),
        Some("https://ik.imagekit.io/demo/autopost-1.jpg")
    );
}

#[tokio::test]
async fn test_instagram_publish_rejection_keeps_status_and_body() {
    let server = StubServer::start(vec![(
        400,
        r#"{"error":{"message":"Media ID is not available","code":9007}}"#,
    )])
    .await;

    let err = instagram_api(&server)
        .publish_container("17889455560051444")
        .await
        .unwrap_err();

    assert_protocol(err, 400, "Media ID is not available");
}

#[test]
fn test_form_field_decoding() {
    let request = RecordedRequest {
        method: "POST".to_string(),
        path: "/".to_string(),
        headers: Vec::new(),
        body: b"caption=Gempa+M5.2+%26+more&image_url=https%3A%2F%2Fexample.com%2Fa.jpg".to_vec(),
    };
    assert_eq!(
        request.form_field("caption").as_deref(),
        Some("Gempa M5.2 & more")
    );
    assert_eq!(
        request.form_field("image_url").as_deref(),
        Some("https://example.com/a.jpg")
    );
    assert_eq!(request.form_field("missing"), None);
}

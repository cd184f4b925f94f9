//! Integration tests for the SmartVault backend.

use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::post, Json, Router};
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, ChatManager, SessionManager, TagManager};
use crate::ocr::OcrClient;
use crate::{create_router, AppState};

const TEST_KEY: &str = "test-api-key";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_options(Some(TEST_KEY.to_string()), None).await
    }

    async fn with_options(psk: Option<String>, ocr_base_url: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let pool = init_database(&db_path).await.expect("Failed to init DB");

        let config = Config {
            api_psk: psk.clone(),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            ocr_base_url,
            ocr_timeout: Duration::from_secs(5),
        };

        let ocr = config.ocr_base_url.as_deref().map(|base_url| {
            Arc::new(OcrClient::new(base_url, config.ocr_timeout).expect("Failed to build OCR client"))
        });

        let state = AppState {
            chats: Arc::new(ChatManager::new(pool.clone())),
            tags: Arc::new(TagManager::new(pool.clone())),
            sessions: Arc::new(SessionManager::new(pool)),
            ocr,
            config: Arc::new(config),
        };

        let base_url = serve(create_router(state)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn vault(&self, user_id: i64, chat_id: i64, path: &str) -> String {
        self.url(&format!("/api/users/{}/chats/{}{}", user_id, chat_id, path))
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let resp = request.send().await.unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, url: String) -> (StatusCode, Value) {
        self.send_json(self.client.get(url)).await
    }

    async fn post(&self, url: String, body: Value) -> (StatusCode, Value) {
        self.send_json(self.client.post(url).json(&body)).await
    }

    async fn put(&self, url: String, body: Value) -> (StatusCode, Value) {
        self.send_json(self.client.put(url).json(&body)).await
    }

    async fn delete(&self, url: String) -> (StatusCode, Value) {
        self.send_json(self.client.delete(url)).await
    }

    /// Register a chat and remember a user in it.
    async fn join(&self, user_id: i64, chat_id: i64, is_main: bool) {
        let (status, _) = self.post(self.url("/api/chats"), json!({ "id": chat_id })).await;
        assert!(status == StatusCode::OK || status == StatusCode::CONFLICT);

        let (status, body) = self
            .post(
                self.url(&format!("/api/chats/{}/members", chat_id)),
                json!({ "userId": user_id, "isMain": is_main }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }
}

/// Serve a router on an ephemeral port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;
    format!("http://{}", addr)
}

/// Stand-in OCR service: echoes the image URL, fails for URLs containing "broken".
async fn fake_ocr_service() -> String {
    let app = Router::new().route(
        "/ocr",
        post(|Json(body): Json<Value>| async move {
            let image = body["image"].as_str().unwrap_or_default().to_string();
            if image.contains("broken") {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })))
            } else if image.contains("blank") {
                (StatusCode::OK, Json(json!({})))
            } else {
                (StatusCode::OK, Json(json!({ "text": format!("text of {}", image) })))
            }
        }),
    );
    serve(app).await
}

fn message_ids(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["messageId"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_and_invalid_psk() {
    let fixture = TestFixture::new().await;
    let anonymous = Client::new();

    // Request without API key
    let resp = anonymous
        .get(fixture.url("/api/users/42/chats"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // Request with wrong API key
    let resp = anonymous
        .get(fixture.url("/api/users/42/chats"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Bearer token is accepted too
    let resp = anonymous
        .get(fixture.url("/api/users/42/main-chat"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Health stays public
    let resp = anonymous.get(fixture.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_no_psk_configured_allows_requests() {
    let fixture = TestFixture::with_options(None, None).await;

    let (status, body) = fixture.get(fixture.url("/api/users/42/main-chat")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], Value::Null);
}

#[tokio::test]
async fn test_chat_and_membership_flow() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post(fixture.url("/api/chats"), json!({ "id": 100, "name": "Family" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], 100);

    // Duplicate chat
    let (status, body) = fixture.post(fixture.url("/api/chats"), json!({ "id": 100 })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_EXISTS");

    let (status, body) = fixture.get(fixture.url("/api/chats/100")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Family");

    let (status, body) = fixture.get(fixture.url("/api/chats/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    // Private chat plus a group chat
    fixture.join(42, 42, true).await;
    fixture.join(42, 100, false).await;
    fixture.join(7, 100, false).await;

    let (status, body) = fixture
        .post(
            fixture.url("/api/chats/100/members"),
            json!({ "userId": 42, "isMain": false }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_EXISTS");

    let (_, body) = fixture.get(fixture.url("/api/users/42/main-chat")).await;
    assert_eq!(body["data"], 42);

    let (_, body) = fixture.get(fixture.url("/api/users/7/main-chat")).await;
    assert_eq!(body["data"], Value::Null);

    let (_, body) = fixture.get(fixture.url("/api/users/42/ext-chats")).await;
    assert_eq!(body["data"], json!([{ "id": 100, "name": "Family" }]));

    let (_, body) = fixture.get(fixture.url("/api/users/42/chats")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = fixture.get(fixture.url("/api/chats/100/users")).await;
    assert_eq!(body["data"], json!([7, 42]));

    let (_, body) = fixture
        .get(fixture.url("/api/users/7/chats/100/membership"))
        .await;
    assert_eq!(body["data"], true);

    let (status, _) = fixture.delete(fixture.url("/api/chats/100/members/7")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = fixture.delete(fixture.url("/api/chats/100/members/7")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = fixture
        .get(fixture.url("/api/users/7/chats/100/membership"))
        .await;
    assert_eq!(body["data"], false);

    let (status, _) = fixture.delete(fixture.url("/api/chats/100")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = fixture.get(fixture.url("/api/users/42/ext-chats")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = fixture.get(fixture.url("/api/users/42/chats")).await;
    assert_eq!(body["data"], json!([{ "id": 42 }]));
    let (status, _) = fixture.delete(fixture.url("/api/chats/100")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tag_and_rename_merge_flow() {
    let fixture = TestFixture::new().await;
    fixture.join(42, 7, true).await;

    let (status, _) = fixture
        .post(fixture.vault(42, 7, "/messages/m1/tags"), json!({ "tags": ["travel"] }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = fixture
        .post(
            fixture.vault(42, 7, "/messages/m2/tags"),
            json!({ "tags": ["trip", "2024"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Same tag twice on one message
    let (status, body) = fixture
        .post(fixture.vault(42, 7, "/messages/m1/tags"), json!({ "tags": ["travel"] }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_EXISTS");

    let (_, body) = fixture.get(fixture.vault(42, 7, "/tags")).await;
    assert_eq!(body["data"], json!(["2024", "travel", "trip"]));

    // Rename into an existing tag merges
    let (status, _) = fixture
        .put(fixture.vault(42, 7, "/tags/trip"), json!({ "newName": "travel" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = fixture.get(fixture.vault(42, 7, "/messages?tags=travel")).await;
    assert_eq!(message_ids(&body), vec!["m1", "m2"]);
    assert_eq!(body["data"][0]["chatId"], 7);
    assert_eq!(body["data"][0]["tags"], json!(["travel"]));

    let (_, body) = fixture.get(fixture.vault(42, 7, "/tags")).await;
    assert_eq!(body["data"], json!(["2024", "travel"]));

    // Renaming a missing tag
    let (status, _) = fixture
        .put(fixture.vault(42, 7, "/tags/nope"), json!({ "newName": "x" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Removing the last assignment drops the tag
    let (status, _) = fixture
        .delete(fixture.vault(42, 7, "/messages/m2/tags/2024"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = fixture.get(fixture.vault(42, 7, "/tags")).await;
    assert_eq!(body["data"], json!(["travel"]));

    // Reassign on one message
    let (status, _) = fixture
        .put(
            fixture.vault(42, 7, "/messages/m1/tags/travel"),
            json!({ "newName": "holiday" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = fixture.get(fixture.vault(42, 7, "/messages/m1/tags")).await;
    assert_eq!(body["data"], json!(["holiday"]));

    // Deleting a message removes its tags
    let (status, _) = fixture.delete(fixture.vault(42, 7, "/messages/m1")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = fixture.get(fixture.vault(42, 7, "/tags")).await;
    assert_eq!(body["data"], json!(["travel"]));

    let (status, _) = fixture.delete(fixture.vault(42, 7, "/tags/travel")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = fixture.get(fixture.vault(42, 7, "/tags")).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_bulk_tagging_and_multitag_queries() {
    let fixture = TestFixture::new().await;
    fixture.join(42, 7, true).await;

    let (status, _) = fixture
        .post(
            fixture.vault(42, 7, "/messages/tags"),
            json!({ "messageIds": ["m1", "m2", "m3"], "tags": ["work"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = fixture
        .post(
            fixture.vault(42, 7, "/tags/urgent/messages"),
            json!({ "messageIds": ["m2", "m4"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = fixture
        .get(fixture.vault(42, 7, "/messages?tags=work&tags=urgent&op=AND"))
        .await;
    assert_eq!(message_ids(&body), vec!["m2"]);
    assert_eq!(body["data"][0]["tags"], json!(["work", "urgent"]));

    let (_, body) = fixture
        .get(fixture.vault(42, 7, "/messages?tags=work&tags=urgent&op=or"))
        .await;
    assert_eq!(message_ids(&body), vec!["m1", "m2", "m3", "m4"]);

    // OR is the default
    let (_, body) = fixture
        .get(fixture.vault(42, 7, "/messages?tags=urgent&tags=missing"))
        .await;
    assert_eq!(message_ids(&body), vec!["m2", "m4"]);

    let (status, body) = fixture
        .get(fixture.vault(42, 7, "/messages?tags=work&tags=urgent&op=XOR"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // A failing batch leaves nothing behind
    let (status, _) = fixture
        .post(
            fixture.vault(42, 7, "/tags/urgent/messages"),
            json!({ "messageIds": ["m5", "m4"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, body) = fixture.get(fixture.vault(42, 7, "/messages/m5/tags")).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_tag_names_with_commas_and_padding_round_trip() {
    let fixture = TestFixture::new().await;
    fixture.join(42, 7, true).await;

    let (status, _) = fixture
        .post(
            fixture.vault(42, 7, "/messages/m1/tags"),
            json!({ "tags": ["a,b", " padded "] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = fixture
        .post(fixture.vault(42, 7, "/messages/m2/tags"), json!({ "tags": ["a"] }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = fixture.get(fixture.vault(42, 7, "/messages?tags=a%2Cb")).await;
    assert_eq!(message_ids(&body), vec!["m1"]);
    assert_eq!(body["data"][0]["tags"], json!(["a,b"]));

    let (_, body) = fixture
        .get(fixture.vault(42, 7, "/messages?tags=%20padded%20"))
        .await;
    assert_eq!(message_ids(&body), vec!["m1"]);

    // The trimmed name is a different tag
    let (_, body) = fixture.get(fixture.vault(42, 7, "/messages?tags=padded")).await;
    assert_eq!(body["data"], json!([]));

    let (_, body) = fixture
        .get(fixture.vault(42, 7, "/messages?tags=a%2Cb&tags=%20padded%20&op=AND"))
        .await;
    assert_eq!(message_ids(&body), vec!["m1"]);
    assert_eq!(body["data"][0]["tags"], json!(["a,b", " padded "]));
}

#[tokio::test]
async fn test_non_member_is_rejected() {
    let fixture = TestFixture::new().await;
    fixture.join(42, 7, true).await;

    let (status, body) = fixture.get(fixture.vault(99, 7, "/tags")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = fixture
        .post(fixture.vault(99, 7, "/messages/m1/tags"), json!({ "tags": ["x"] }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = fixture
        .post(fixture.vault(99, 7, "/session"), json!({ "messageIds": ["b1"] }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validation_errors() {
    let fixture = TestFixture::new().await;
    fixture.join(42, 7, true).await;

    let (status, body) = fixture
        .post(fixture.vault(42, 7, "/messages/m1/tags"), json!({ "tags": ["  "] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture
        .post(fixture.vault(42, 7, "/messages/m1/tags"), json!({ "tags": [] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = fixture
        .put(fixture.vault(42, 7, "/tags/work"), json!({ "newName": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = fixture
        .post(
            fixture.vault(42, 7, "/messages/tags"),
            json!({ "messageIds": ["m1", " "], "tags": ["work"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = fixture
        .post(fixture.url("/api/ocr"), json!({ "imageUrl": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was written by the rejected requests
    let (_, body) = fixture.get(fixture.vault(42, 7, "/tags")).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_session_accumulates_and_drains() {
    let fixture = TestFixture::new().await;
    fixture.join(42, 7, true).await;

    for batch in [json!(["b1", "b2"]), json!(["b3"])] {
        let (status, _) = fixture
            .post(fixture.vault(42, 7, "/session"), json!({ "messageIds": batch }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = fixture.delete(fixture.url("/api/chats/7/session")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["b1", "b2", "b3"]));

    let (_, body) = fixture.delete(fixture.url("/api/chats/7/session")).await;
    assert_eq!(body["data"], json!([]));

    let (status, _) = fixture
        .post(fixture.vault(42, 99, "/session"), json!({ "messageIds": ["b1"] }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ocr_transcription() {
    let ocr_url = fake_ocr_service().await;
    let fixture = TestFixture::with_options(Some(TEST_KEY.to_string()), Some(ocr_url)).await;

    let (status, body) = fixture
        .post(
            fixture.url("/api/ocr"),
            json!({ "imageUrl": "https://cdn.example/receipt.png" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["text"], "text of https://cdn.example/receipt.png");

    // Image without text
    let (status, body) = fixture
        .post(fixture.url("/api/ocr"), json!({ "imageUrl": "https://cdn.example/blank.png" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["text"], "");

    let (status, body) = fixture
        .post(fixture.url("/api/ocr"), json!({ "imageUrl": "https://cdn.example/broken.png" }))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "TRANSCRIPTION_UNAVAILABLE");
}

#[tokio::test]
async fn test_ocr_unavailable() {
    // Not configured
    let fixture = TestFixture::new().await;
    let (status, body) = fixture
        .post(fixture.url("/api/ocr"), json!({ "imageUrl": "https://cdn.example/a.png" }))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "TRANSCRIPTION_UNAVAILABLE");

    // Configured but unreachable
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let fixture = TestFixture::with_options(Some(TEST_KEY.to_string()), Some(dead_url)).await;
    let (status, _) = fixture
        .post(fixture.url("/api/ocr"), json!({ "imageUrl": "https://cdn.example/a.png" }))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

//! Общие заготовки для тестов: моки TMDB и Bot API на одном wiremock-сервере.

use serde_json::{json, Value};
use teloxide::prelude::*;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) fn trending_page(results: Vec<Value>) -> Value {
    json!({ "page": 1, "results": results, "total_pages": 1, "total_results": 20 })
}

pub(crate) fn movie_json(id: u64, lang: &str) -> Value {
    json!({ "id": id, "title": format!("Movie {id}"), "original_language": lang, "origin_country": ["US"] })
}

pub(crate) fn show_json(id: u64, lang: &str, countries: &[&str]) -> Value {
    json!({ "id": id, "name": format!("Show {id}"), "original_language": lang, "origin_country": countries })
}

pub(crate) async fn mount_trending(server: &MockServer, endpoint: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/* ====== Bot API ====== */

pub(crate) fn bot_for(server: &MockServer) -> Bot {
    Bot::new("test-token").set_api_url(server.uri().parse().expect("mock server uri is a valid url"))
}

pub(crate) fn group_chat(id: i64) -> Value {
    json!({ "id": id, "type": "supergroup", "title": "Кино", "is_forum": true })
}

pub(crate) fn private_chat(id: i64) -> Value {
    json!({ "id": id, "type": "private", "first_name": "Ann" })
}

pub(crate) fn message_json(chat: Value, from_id: u64, thread: Option<i32>, text: &str) -> Value {
    let mut msg = json!({
        "message_id": 10,
        "date": 1_760_000_000,
        "chat": chat,
        "from": { "id": from_id, "is_bot": false, "first_name": "Ann" },
        "text": text
    });
    if let Some(thread) = thread {
        msg["message_thread_id"] = json!(thread);
        msg["is_topic_message"] = json!(true);
    }
    msg
}

pub(crate) fn message(chat: Value, from_id: u64, thread: Option<i32>, text: &str) -> Message {
    serde_json::from_value(message_json(chat, from_id, thread, text)).expect("valid telegram message")
}

pub(crate) async fn mount_send_message(server: &MockServer, status: u16) {
    let response = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": message_json(group_chat(-100), 1, None, "ok")
        }))
    } else {
        ResponseTemplate::new(status).set_body_json(json!({
            "ok": false,
            "error_code": status,
            "description": "Internal Server Error"
        }))
    };
    Mock::given(method("POST"))
        .and(path_regex(r"(?i)/sendmessage$"))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Тела всех запросов sendMessage, в порядке отправки.
pub(crate) async fn sent_messages(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path().to_ascii_lowercase().ends_with("/sendmessage"))
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}

pub(crate) async fn tmdb_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().starts_with("/trending/"))
        .count()
}

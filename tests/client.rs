//! HTTP-level behaviour of the OpenAI-compatible client against a mock server.

use edgequake_papersum::pipeline::llm::{call_with_retry, check_reachable};
use edgequake_papersum::{
    BackendError, CompletionClient, OpenAiCompatibleClient, RetryPolicy, SummarizerConfig,
};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, max_output_tokens: Option<u32>) -> OpenAiCompatibleClient {
    let config = SummarizerConfig::builder()
        .base_url(format!("{}/v1/", server.uri()))
        .model("test-model")
        .api_key("sk-test")
        .timeout_secs(5)
        .max_output_tokens(max_output_tokens)
        .build()
        .unwrap();
    OpenAiCompatibleClient::from_config(&config).unwrap()
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

#[tokio::test]
async fn posts_single_user_message_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [{"role": "user", "content": "Summarise this."}],
            "max_tokens": 4096
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"ok\": true}")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some(4096));
    assert_eq!(client.endpoint(), format!("{}/v1/chat/completions", server.uri()));
    let text = client.complete("Summarise this.").await.unwrap();
    assert_eq!(text, "{\"ok\": true}");
}

#[tokio::test]
async fn unset_max_tokens_is_left_out_of_the_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("hi")))
        .mount(&server)
        .await;

    client_for(&server, None).complete("p").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let body = body.as_object().unwrap();
    assert!(!body.contains_key("max_tokens"));
    assert_eq!(body["model"], "test-model");
    // Provider attribution headers only go to OpenRouter.
    assert!(requests[0].headers.get("x-title").is_none());
}

#[tokio::test]
async fn error_status_keeps_code_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limit exceeded"))
        .mount(&server)
        .await;

    let err = client_for(&server, None).complete("p").await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Status {
            status: 429,
            body: "rate limit exceeded".into()
        }
    );
    assert_eq!(err.to_string(), "Error code: 429 - rate limit exceeded");
}

#[tokio::test]
async fn missing_content_is_an_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client_for(&server, None).complete("p").await.unwrap_err();
    assert!(matches!(err, BackendError::InvalidResponse(_)));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = SummarizerConfig::builder()
        .base_url(format!("{}/v1", server.uri()))
        .timeout_secs(1)
        .build()
        .unwrap();
    let client = OpenAiCompatibleClient::from_config(&config).unwrap();
    let err = client.complete("p").await.unwrap_err();
    assert_eq!(err, BackendError::Timeout { secs: 1 });
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("third time")))
        .expect(1)
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(5),
    };
    let text = call_with_retry(&client_for(&server, None), "p", &policy)
        .await
        .unwrap();
    assert_eq!(text, "third time");
}

#[tokio::test]
async fn reachability_accepts_any_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    check_reachable(&format!("{}/v1", server.uri()), Duration::from_secs(5))
        .await
        .unwrap();
}

#[tokio::test]
async fn reachability_fails_when_nothing_listens() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let err = check_reachable(&format!("{uri}/v1"), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BackendError::Transport(_) | BackendError::Timeout { .. }
    ));
}

//! Integration tests for the AI gateway against mocked provider HTTP APIs.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cms_studio::config::{AiConfig, ProviderKind};
use cms_studio::error::LlmError;
use cms_studio::llm::{AiGateway, ChatMessage, CompletionRequest, RetryPolicy, collect_text};

const OPENAI_PATH: &str = "/v1/chat/completions";
const GEMINI_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";
const GEMINI_STREAM_PATH: &str = "/v1beta/models/gemini-2.5-flash:streamGenerateContent";

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
    }
}

fn openai_gateway(server: &MockServer) -> AiGateway {
    let config = AiConfig::new(ProviderKind::OpenAi, "sk-test").with_base_url(server.uri());
    AiGateway::new(&config).unwrap().with_retry_policy(fast_policy())
}

fn gemini_gateway(server: &MockServer) -> AiGateway {
    let config = AiConfig::new(ProviderKind::Gemini, "g-key").with_base_url(server.uri());
    AiGateway::new(&config).unwrap().with_retry_policy(fast_policy())
}

fn hello_request() -> CompletionRequest {
    CompletionRequest::new(vec![
        ChatMessage::system("You write landing pages."),
        ChatMessage::user("Say hello"),
    ])
}

fn openai_reply(text: &str) -> serde_json::Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": text }, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
    })
}

#[tokio::test]
async fn openai_completion_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OPENAI_PATH))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply("Hello!")))
        .expect(1)
        .mount(&server)
        .await;

    let response = openai_gateway(&server).generate(hello_request()).await.unwrap();
    assert_eq!(response.content, "Hello!");
    assert_eq!(response.input_tokens, 12);
    assert_eq!(response.output_tokens, 3);
}

#[tokio::test]
async fn rate_limits_exhaust_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OPENAI_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(3)
        .mount(&server)
        .await;

    let err = openai_gateway(&server).generate(hello_request()).await.unwrap_err();
    match err {
        LlmError::Http { status, body, .. } => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn unavailable_then_success_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OPENAI_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(OPENAI_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply("third time")))
        .expect(1)
        .mount(&server)
        .await;

    let response = openai_gateway(&server).generate(hello_request()).await.unwrap();
    assert_eq!(response.content, "third time");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OPENAI_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "bad request"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = openai_gateway(&server).generate(hello_request()).await.unwrap_err();
    assert!(matches!(err, LlmError::Http { status: 400, .. }));
}

#[tokio::test]
async fn server_errors_other_than_503_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = gemini_gateway(&server).generate(hello_request()).await.unwrap_err();
    assert!(matches!(err, LlmError::Http { status: 500, .. }));
}

#[tokio::test]
async fn gemini_completion_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(header("x-goog-api-key", "g-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello from Gemini" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 4 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = gemini_gateway(&server).generate(hello_request()).await.unwrap();
    assert_eq!(response.content, "Hello from Gemini");
    assert_eq!(response.output_tokens, 4);
}

#[tokio::test]
async fn openai_stream_yields_deltas_then_done() {
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OPENAI_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = openai_gateway(&server).stream(hello_request()).await.unwrap();
    assert_eq!(collect_text(stream).await.unwrap(), "Hello");
}

#[tokio::test]
async fn gemini_stream_yields_deltas() {
    let sse = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Fast \"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"storage\"}]},\"finishReason\":\"STOP\"}]}\n\n",
    );
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GEMINI_STREAM_PATH))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = gemini_gateway(&server).stream(hello_request()).await.unwrap();
    assert_eq!(collect_text(stream).await.unwrap(), "Fast storage");
}

#[tokio::test]
async fn streaming_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(OPENAI_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let result = openai_gateway(&server).stream(hello_request()).await;
    assert!(matches!(result, Err(LlmError::Http { status: 429, .. })));
}

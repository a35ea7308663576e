//! Provider integration tests.
//!
//! The mock tests serve canned SSE bodies from a local socket. The live tests
//! call the real APIs and are skipped when the API key env var is not set.
//! Run with: `cargo test -p prepwise-providers --test integration`

use prepwise_providers::google::GeminiProvider;
use prepwise_providers::openai::OpenAiProvider;
use prepwise_providers::{CompletionRequest, Credentials, LlmProvider, generate_text};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn openai_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

fn google_key() -> Option<String> {
    std::env::var("GOOGLE_AI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

/// Serve one HTTP request with an SSE body. Returns the base URL and a handle
/// resolving to the raw request head.
async fn serve_sse_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];

        // Read the head, then as much body as content-length announces.
        let head_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed before sending a request");
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while raw.len() < head_end + content_length {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        head
    });

    (format!("http://{addr}"), handle)
}

fn request_for(provider: &dyn LlmProvider, model: &str, prompt: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        messages: provider.format_prompt(prompt),
        max_tokens: 256,
        temperature: Some(0.0),
        system: None,
    }
}

#[tokio::test]
async fn test_gemini_against_mock_server() {
    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"[\\\"Why Rust?\\\",\"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" \\\"What is Send?\\\"]\"}]},\"finishReason\":\"STOP\"}],",
        "\"usageMetadata\":{\"promptTokenCount\":20,\"candidatesTokenCount\":9}}\n\n",
    );
    let (base_url, server) = serve_sse_once(body).await;

    let provider = GeminiProvider::new(Some(&base_url));
    let credentials = Credentials::ApiKey {
        api_key: "test-key".into(),
    };
    let request = request_for(&provider, "gemini-2.0-flash", "Two questions please");

    let text = generate_text(&provider, &request, &credentials).await.unwrap();
    assert_eq!(text, "[\"Why Rust?\", \"What is Send?\"]");

    let head = server.await.unwrap();
    assert!(head.starts_with(
        "POST /v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse&key=test-key"
    ));
}

#[tokio::test]
async fn test_openai_against_mock_server() {
    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"[\\\"Q1\\\"\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"]\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":3}}\n\n",
        "data: [DONE]\n\n",
    );
    let (base_url, server) = serve_sse_once(body).await;

    let provider = OpenAiProvider::openai(Some(&base_url));
    let credentials = Credentials::ApiKey {
        api_key: "sk-test".into(),
    };
    let request = request_for(&provider, "gpt-4o-mini", "One question");

    let text = generate_text(&provider, &request, &credentials).await.unwrap();
    assert_eq!(text, "[\"Q1\"]");

    let head = server.await.unwrap().to_lowercase();
    assert!(head.starts_with("post /v1/chat/completions"));
    assert!(head.contains("authorization: bearer sk-test"));
}

#[tokio::test]
async fn test_google_streaming_live() {
    let Some(api_key) = google_key() else {
        eprintln!("Skipping: GOOGLE_AI_API_KEY not set");
        return;
    };

    let provider = GeminiProvider::new(None);
    let credentials = Credentials::ApiKey { api_key };
    let request = request_for(&provider, "gemini-2.0-flash", "Reply with exactly the word 'hello'.");

    let text = generate_text(&provider, &request, &credentials).await.unwrap();
    assert!(
        text.to_lowercase().contains("hello"),
        "Expected 'hello' in response, got: {text}"
    );
}

#[tokio::test]
async fn test_openai_streaming_live() {
    let Some(api_key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };

    let provider = OpenAiProvider::openai(None);
    let credentials = Credentials::ApiKey { api_key };
    let request = request_for(&provider, "gpt-4o-mini", "Reply with exactly the word 'hello'.");

    let text = generate_text(&provider, &request, &credentials).await.unwrap();
    assert!(
        text.to_lowercase().contains("hello"),
        "Expected 'hello' in response, got: {text}"
    );
}

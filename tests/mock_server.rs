//! End-to-end tests against a local server speaking canned HTTP and SSE.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use groqchat::chat::{ChatSession, TurnOutcome};
use groqchat::{Error, Groq, JsonLinesLogger, Message, MessageRole, ModelRegistry, Renderer};

/// A request as seen by the mock server.
struct Captured {
    head: String,
    body: Value,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then_some(value.trim())
        })
    }

    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }
}

/// Accept one connection, capture the request, and reply with `response`.
async fn serve_once(response: String) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(at) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break at;
            }
        };
        let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
        let length = head
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().unwrap())
            })
            .unwrap_or(0);
        let mut body = buf[head_end + 4..].to_vec();
        while body.len() < length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed mid-body");
            body.extend_from_slice(&chunk[..n]);
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        Captured {
            head,
            body: serde_json::from_slice(&body).unwrap(),
        }
    });
    (format!("http://{addr}/openai/v1"), handle)
}

fn sse_response(events: &[&str]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str("data: ");
        body.push_str(event);
        body.push_str("\n\n");
    }
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
    )
}

fn error_response(status: &str, extra_headers: &str, body: &Value) -> String {
    let body = body.to_string();
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{extra_headers}Connection: close\r\n\r\n{body}",
        body.len()
    )
}

fn chunk(content: &str) -> String {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "created": 1714000000,
        "model": "llama3-8b-8192",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    })
    .to_string()
}

fn client(base_url: String) -> Groq {
    Groq::with_options(Some("test-key".to_string()), Some(base_url), None).unwrap()
}

#[derive(Default)]
struct Capture {
    text: String,
    errors: Vec<String>,
}

impl Renderer for Capture {
    fn print_message(&mut self, _: &Message) {}

    fn print_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn print_error(&mut self, error: &str) {
        self.errors.push(error.to_string());
    }

    fn print_info(&mut self, _: &str) {}

    fn finish_response(&mut self) {}
}

#[tokio::test]
async fn streamed_reply_is_assembled_and_recorded() {
    let (hel, lo, world) = (chunk("Hel"), chunk("lo, "), chunk("world"));
    let (base_url, server) =
        serve_once(sse_response(&[&chunk(""), &hel, &lo, &world, "[DONE]"])).await;

    let mut session = ChatSession::new(client(base_url), ModelRegistry::builtin());
    session.select_model("llama3-8b-8192").unwrap();
    session.set_max_tokens(8192);
    let mut capture = Capture::default();
    let outcome = session.submit("Say hi", &mut capture).await.unwrap();

    assert_eq!(outcome.reply(), Some("Hello, world"));
    assert_eq!(capture.text, "Hello, world");
    assert!(capture.errors.is_empty());
    let roles: Vec<MessageRole> = session.transcript().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);

    let captured = server.await.unwrap();
    assert_eq!(
        captured.request_line(),
        "POST /openai/v1/chat/completions HTTP/1.1"
    );
    assert_eq!(captured.header("authorization"), Some("Bearer test-key"));
    assert_eq!(captured.header("accept"), Some("text/event-stream"));
    assert_eq!(
        captured.body,
        json!({
            "model": "llama3-8b-8192",
            "messages": [{"role": "user", "content": "Say hi"}],
            "max_tokens": 8192,
            "stream": true
        })
    );
}

#[tokio::test]
async fn authentication_failure_keeps_only_the_prompt() {
    let body = json!({"error": {"message": "Invalid API Key", "type": "invalid_request_error"}});
    let (base_url, server) = serve_once(error_response("401 Unauthorized", "", &body)).await;

    let mut session = ChatSession::new(client(base_url), ModelRegistry::builtin());
    let mut capture = Capture::default();
    let outcome = session.submit("Say hi", &mut capture).await.unwrap();

    assert!(matches!(outcome, TurnOutcome::Failed(ref err) if err.is_authentication()));
    assert_eq!(session.message_count(), 1);
    assert_eq!(capture.errors, vec!["Authentication error: Invalid API Key"]);
    server.await.unwrap();
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let body = json!({"error": {"message": "Rate limit reached", "type": "tokens"}});
    let (base_url, server) =
        serve_once(error_response("429 Too Many Requests", "Retry-After: 7\r\n", &body)).await;

    let request = groqchat::ChatCompletionRequest::new_streaming(
        "gemma-7b-it",
        vec![Message::user("hi")],
        512,
    );
    let err = client(base_url).stream(request).await.err().unwrap();
    assert!(matches!(
        err,
        Error::RateLimit {
            retry_after: Some(7),
            ..
        }
    ));
    assert!(err.to_string().contains("Rate limit reached"));
    server.await.unwrap();
}

#[tokio::test]
async fn status_codes_map_to_typed_errors() {
    let cases: [(&str, fn(&Error) -> bool); 5] = [
        ("400 Bad Request", |e| e.is_bad_request()),
        ("403 Forbidden", |e| e.is_permission()),
        ("404 Not Found", |e| {
            matches!(e, Error::Api { status_code: 404, .. }) && !e.is_not_found()
        }),
        ("503 Service Unavailable", |e| {
            matches!(e, Error::ServiceUnavailable { .. })
        }),
        ("418 I'm a teapot", |e| {
            matches!(e, Error::Api { status_code: 418, .. })
        }),
    ];
    for (status, check) in cases {
        let body = json!({"error": {"message": "nope", "type": "test"}});
        let (base_url, server) = serve_once(error_response(status, "", &body)).await;
        let request = groqchat::ChatCompletionRequest::new_streaming(
            "gemma-7b-it",
            vec![Message::user("hi")],
            512,
        );
        let err = client(base_url).stream(request).await.err().unwrap();
        assert!(check(&err), "{status} mapped to {err:?}");
        assert!(err.is_stream_error(), "{status} is not a stream error");
        server.await.unwrap();
    }
}

#[tokio::test]
async fn in_band_error_fails_the_turn() {
    let error = json!({"error": {"message": "model overloaded", "type": "server_error"}}).to_string();
    let partial = chunk("partial");
    let (base_url, server) = serve_once(sse_response(&[&partial, &error])).await;

    let mut session = ChatSession::new(client(base_url), ModelRegistry::builtin());
    let mut capture = Capture::default();
    let outcome = session.submit("Say hi", &mut capture).await.unwrap();

    assert!(!outcome.is_completed());
    assert_eq!(capture.text, "partial");
    assert_eq!(capture.errors, vec!["server_error: model overloaded"]);
    assert_eq!(session.message_count(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn json_lines_logger_records_the_exchange() {
    let ok = chunk("ok");
    let (base_url, server) = serve_once(sse_response(&[&ok, "[DONE]"])).await;
    let path = std::env::temp_dir().join(format!("groqchat-it-{}.jsonl", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let logger = Arc::new(JsonLinesLogger::open(&path).unwrap());
    let client = client(base_url).with_logger(logger);
    let mut session = ChatSession::new(client, ModelRegistry::builtin());
    let mut capture = Capture::default();
    session.submit("ping", &mut capture).await.unwrap();
    server.await.unwrap();
    drop(session);

    let log = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    let kinds: Vec<String> = log
        .lines()
        .map(|line| {
            let record: Value = serde_json::from_str(line).unwrap();
            record["kind"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds, vec!["request", "chunk", "reply"]);
}

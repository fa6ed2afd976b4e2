use std::env;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{ChatCompletionChunk, ChatCompletionRequest};

const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/";

/// A boxed stream of decoded completion chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "GROQ_API_KEY";

/// Client for Groq's OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct Groq {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    timeout: Option<Duration>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl Groq {
    /// Create a new Groq client.
    ///
    /// The API key can be provided directly or read from the GROQ_API_KEY
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    ///
    /// `base_url` must be an absolute URL; a trailing slash is added when
    /// missing.  Without a `timeout` the HTTP client's defaults apply.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_VAR).map_err(|_| {
                Error::authentication(format!(
                    "API key not provided and {API_KEY_VAR} environment variable not set"
                ))
            })?,
        };
        if HeaderValue::from_str(&format!("Bearer {api_key}")).is_err() {
            return Err(Error::authentication(
                "API key contains characters that cannot be sent in a header",
            ));
        }

        let base_url = match base_url {
            Some(url) => normalize_base_url(&url)?,
            None => DEFAULT_API_URL.to_string(),
        };

        let mut builder = ReqwestClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
            logger: None,
        })
    }

    /// Attach a logger that observes every request, chunk, and reply.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn logger(&self) -> Option<&Arc<dyn ClientLogger>> {
        self.logger.as_ref()
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key is not a valid header value"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
        let error_message = detail
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| error_body.clone());
        let error_param = detail.as_ref().and_then(|e| e.param.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message, request_id),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message, request_id),
        }
    }

    /// Send a chat completion request and get a streaming response.
    ///
    /// The `stream` flag is forced on.  Returns a stream of decoded chunks that
    /// ends when the server sends `[DONE]` or closes the connection.
    pub async fn stream(&self, mut request: ChatCompletionRequest) -> Result<ChunkStream> {
        request.stream = true;
        if let Some(logger) = &self.logger {
            logger.log_request(&request);
        }

        let url = format!("{}chat/completions", self.base_url);
        let headers = self.default_headers()?;

        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        self.timeout.map(|t| t.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let logger = self.logger.clone();
        let chunks = process_sse(response.bytes_stream()).inspect(move |chunk| {
            if let (Some(logger), Ok(chunk)) = (&logger, chunk) {
                logger.log_stream_chunk(chunk);
            }
        });
        Ok(Box::pin(chunks))
    }
}

impl fmt::Debug for Groq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Groq")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(Error::url(format!("{raw} cannot be used as a base URL"), None));
    }
    let mut base = url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Groq::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url, DEFAULT_API_URL);
        assert_eq!(client.timeout, None);

        let client = Groq::with_options(
            Some("test-key".to_string()),
            Some("https://custom-api.example.com/v1".to_string()),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://custom-api.example.com/v1/");
        assert_eq!(client.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = Groq::with_options(Some("k".to_string()), Some("not a url".to_string()), None)
            .unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn api_key_must_be_header_safe() {
        let err = Groq::new(Some("bad\nkey".to_string())).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = Groq::new(Some("secret-key".to_string())).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn default_headers_use_bearer_auth() {
        let client = Groq::new(Some("abc".to_string())).unwrap();
        let headers = client.default_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer abc");
        assert_eq!(headers[header::ACCEPT], "text/event-stream");
    }
}

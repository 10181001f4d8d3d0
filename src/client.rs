use std::env;
use std::time::{Duration, Instant};

use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_TTFB};
use crate::sse::process_sse;
use crate::types::{
    ApiErrorBody, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Model,
};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variables consulted, in order, when no key is passed in.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Reads a credential from the first of `vars` that is set and non-blank.
pub fn credential_from_env(vars: &[&str]) -> Option<String> {
    vars.iter()
        .filter_map(|var| env::var(var).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Client for the Gemini API.
///
/// Only the connection phase is bounded by a client-level timeout.  A
/// streamed answer may legitimately take minutes, so bounding the body is
/// left to the caller (see [`crate::chat::ChatSession`]).
#[derive(Debug, Clone)]
pub struct Gemini {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    connect_timeout: Duration,
    model: Model,
    generation_config: GenerationConfig,
}

impl Gemini {
    /// Create a new Gemini client.
    ///
    /// The API key can be provided directly or read from `GEMINI_API_KEY`
    /// (falling back to `API_KEY`).
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => credential_from_env(&API_KEY_ENV_VARS).ok_or_else(|| {
                Error::authentication(
                    "API key not provided and neither GEMINI_API_KEY nor API_KEY is set",
                )
            })?,
        };

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            connect_timeout,
            model: Model::default(),
            generation_config: GenerationConfig::default(),
        })
    }

    /// Sets the model used by chats created from this client.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the sampling controls used by chats created from this client.
    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = config;
        self
    }

    /// Returns the configured model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Returns the configured sampling controls.
    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation_config
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&self.api_key).map_err(|_| {
            Error::validation(
                "API key contains characters not allowed in a header",
                Some("api_key".to_string()),
            )
        })?;
        headers.insert("x-goog-api-key", key);
        Ok(headers)
    }

    fn stream_url(&self) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("models/{}:streamGenerateContent", self.model))?;
        url.query_pairs_mut().append_pair("alt", "sse");
        Ok(url)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let body = serde_json::from_str::<ApiErrorBody>(&error_body).unwrap_or_else(|_| {
            let mut body = ApiErrorBody::default();
            body.error.message = Some(error_body);
            body
        });
        api_error_from_body(status_code, body, retry_after)
    }

    async fn post(&self, url: Url, request: &GenerateContentRequest) -> Result<Response> {
        CLIENT_REQUESTS.click();
        log::debug!(
            "POST {} ({} contents)",
            url.path(),
            request.contents.len()
        );
        let response = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.connect_timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    /// Generate a response as a stream of chunks.
    ///
    /// The returned stream ends when the server closes the response.
    pub async fn stream_generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<impl Stream<Item = Result<GenerateContentResponse>> + Send + 'static> {
        let url = self.stream_url()?;
        let started = Instant::now();
        let response = self.post(url, request).await?;
        STREAM_TTFB.add(started.elapsed().as_secs_f64());
        Ok(process_sse(response.bytes_stream()))
    }
}

/// Maps an HTTP status and the API's error envelope onto an [`Error`].
pub(crate) fn api_error_from_body(
    status_code: u16,
    body: ApiErrorBody,
    retry_after: Option<u64>,
) -> Error {
    let status = body.error.status;
    let message = body
        .error
        .message
        .unwrap_or_else(|| format!("HTTP {status_code}"));

    match status_code {
        400 if message.contains("API key") => Error::authentication(message),
        400 => Error::bad_request(message),
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::not_found(message),
        408 | 504 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message),
        502 | 503 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, status, message),
    }
}

use crate::{
    chat::ChatSession,
    embedding::{
        BatchContentEmbeddingResponse, BatchEmbedContentsRequest, ContentEmbeddingResponse,
        EmbedBuilder, EmbedContentRequest,
    },
    generation::{ContentBuilder, GenerateContentRequest, GenerationResponse},
    models::Content,
};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::{
    Client, ClientBuilder, RequestBuilder, Response,
    header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::{
    fmt::{self, Formatter},
    sync::{Arc, LazyLock},
};
use tracing::{Level, Span, instrument};
use url::Url;

static DEFAULT_BASE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://generativelanguage.googleapis.com/v1beta/")
        .expect("unreachable error: failed to parse default base URL")
});

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Model {
    #[default]
    #[serde(rename = "models/gemini-2.5-flash")]
    Gemini25Flash,
    #[serde(rename = "models/gemini-2.5-flash-lite")]
    Gemini25FlashLite,
    #[serde(rename = "models/gemini-2.5-pro")]
    Gemini25Pro,
    #[serde(rename = "models/text-embedding-004")]
    TextEmbedding004,
    #[serde(rename = "models/gemini-embedding-001")]
    GeminiEmbedding001,
    #[serde(untagged)]
    Custom(String),
}

impl Model {
    pub fn as_str(&self) -> &str {
        match self {
            Model::Gemini25Flash => "models/gemini-2.5-flash",
            Model::Gemini25FlashLite => "models/gemini-2.5-flash-lite",
            Model::Gemini25Pro => "models/gemini-2.5-pro",
            Model::TextEmbedding004 => "models/text-embedding-004",
            Model::GeminiEmbedding001 => "models/gemini-embedding-001",
            Model::Custom(model) => model,
        }
    }

    /// Resolve a configured model identifier such as `gemini-2.5-flash` or
    /// `models/gemini-2.5-pro`.
    pub fn from_name(name: &str) -> Self {
        let bare = name.strip_prefix("models/").unwrap_or(name);
        match bare {
            "gemini-2.5-flash" => Model::Gemini25Flash,
            "gemini-2.5-flash-lite" => Model::Gemini25FlashLite,
            "gemini-2.5-pro" => Model::Gemini25Pro,
            "text-embedding-004" => Model::TextEmbedding004,
            "gemini-embedding-001" => Model::GeminiEmbedding001,
            other => Model::Custom(format!("models/{other}")),
        }
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        Self::Custom(model)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to parse API key"))]
    InvalidApiKey { source: InvalidHeaderValue },

    #[snafu(display("failed to build HTTP client"))]
    BuildHttpClient { source: reqwest::Error },

    #[snafu(display("failed to construct URL (probably incorrect model name): {suffix}"))]
    ConstructUrl { source: url::ParseError, suffix: String },

    #[snafu(display("failed to perform request: {source}"))]
    PerformRequest { source: reqwest::Error },

    #[snafu(display(
        "bad response from server; code {code}; description: {}",
        description.as_deref().unwrap_or("none")
    ))]
    BadResponse {
        /// HTTP status code
        code: u16,
        /// HTTP error description
        description: Option<String>,
    },

    #[snafu(display("failed to obtain stream SSE part: {source}"))]
    BadPart { source: EventStreamError<reqwest::Error> },

    #[snafu(display("failed to deserialize JSON response: {source}"))]
    Deserialize { source: serde_json::Error },

    #[snafu(display("failed to decode response body: {source}"))]
    DecodeResponse { source: reqwest::Error },
}

/// Internal client for making requests to the Gemini API
pub struct GeminiClient {
    http_client: Client,
    pub model: Model,
    base_url: Url,
}

impl GeminiClient {
    fn with_base_url<M: Into<Model>>(
        client_builder: ClientBuilder,
        model: M,
        base_url: Url,
        api_key: &str,
    ) -> Result<Self, Error> {
        let headers = HeaderMap::from_iter([(
            HeaderName::from_static("x-goog-api-key"),
            HeaderValue::from_str(api_key).context(InvalidApiKeySnafu)?,
        )]);

        let http_client =
            client_builder.default_headers(headers).build().context(BuildHttpClientSnafu)?;

        Ok(Self { http_client, model: model.into(), base_url })
    }

    /// Check the response status code and return an error if it is not successful
    #[tracing::instrument(skip_all, err)]
    async fn check_response(response: Response) -> Result<Response, Error> {
        let status = response.status();
        if !status.is_success() {
            let description = response.text().await.ok();
            BadResponseSnafu { code: status.as_u16(), description }.fail()
        } else {
            Ok(response)
        }
    }

    /// Performs an HTTP request to the Gemini API with standardized error handling.
    ///
    /// `builder` constructs the request from the shared client; `deserializer`
    /// turns the checked response into the caller's type, which may be a
    /// byte stream for streaming endpoints.
    #[tracing::instrument(skip_all)]
    pub(crate) async fn perform_request<
        B: FnOnce(&Client) -> RequestBuilder,
        D: AsyncFn(Response) -> Result<T, Error>,
        T,
    >(
        &self,
        builder: B,
        deserializer: D,
    ) -> Result<T, Error> {
        let request = builder(&self.http_client);
        tracing::debug!("request built successfully");
        let response = request.send().await.context(PerformRequestSnafu)?;
        tracing::debug!("response received successfully");
        let response = Self::check_response(response).await?;
        tracing::debug!("response ok");
        deserializer(response).await
    }

    #[tracing::instrument(skip(self, body), fields(request.type = "post", request.url = %url))]
    async fn post_json<Req: serde::Serialize, Res: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        body: &Req,
    ) -> Result<Res, Error> {
        self.perform_request(
            |c| c.post(url).json(body),
            async |r| r.json().await.context(DecodeResponseSnafu),
        )
        .await
    }

    /// Generate content
    #[instrument(skip_all, fields(
        model = %self.model,
        messages.parts.count = request.contents.len(),
        system.instruction.present = request.system_instruction.is_some(),
        usage.prompt_tokens,
        usage.candidates_tokens,
        usage.total_tokens,
    ), ret(level = Level::TRACE), err)]
    pub(crate) async fn generate_content_raw(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerationResponse, Error> {
        let url = self.build_url("generateContent")?;
        let response: GenerationResponse = self.post_json(url, &request).await?;

        if let Some(usage) = &response.usage_metadata {
            #[rustfmt::skip]
            Span::current()
                .record("usage.prompt_tokens", usage.prompt_token_count)
                .record("usage.candidates_tokens", usage.candidates_token_count)
                .record("usage.total_tokens", usage.total_token_count);

            tracing::debug!("generation usage evaluated");
        }

        Ok(response)
    }

    /// Generate content with streaming
    #[instrument(skip_all, fields(
        model = %self.model,
        messages.parts.count = request.contents.len(),
        system.instruction.present = request.system_instruction.is_some(),
    ), err)]
    pub(crate) async fn generate_content_stream(
        &self,
        request: GenerateContentRequest,
    ) -> Result<impl Stream<Item = Result<GenerationResponse, Error>> + Send + use<>, Error> {
        let mut url = self.build_url("streamGenerateContent")?;
        url.query_pairs_mut().append_pair("alt", "sse");

        let stream = self
            .perform_request(|c| c.post(url).json(&request), async |r| Ok(r.bytes_stream()))
            .await?;

        Ok(stream.eventsource().map(|event| {
            let event = event.context(BadPartSnafu)?;
            serde_json::from_str::<GenerationResponse>(&event.data).context(DeserializeSnafu)
        }))
    }

    /// Embed content
    #[instrument(skip_all, fields(
        model = %self.model,
        task.type = request.task_type.as_ref().map(|t| format!("{:?}", t)),
        task.output.dimensionality = request.output_dimensionality,
    ))]
    pub(crate) async fn embed_content(
        &self,
        request: EmbedContentRequest,
    ) -> Result<ContentEmbeddingResponse, Error> {
        let url = self.build_url("embedContent")?;
        self.post_json(url, &request).await
    }

    /// Batch Embed content
    #[instrument(skip_all, fields(model = %self.model, batch.size = request.requests.len()))]
    pub(crate) async fn embed_content_batch(
        &self,
        request: BatchEmbedContentsRequest,
    ) -> Result<BatchContentEmbeddingResponse, Error> {
        let url = self.build_url("batchEmbedContents")?;
        self.post_json(url, &request).await
    }

    /// Build a URL for the API
    #[tracing::instrument(skip(self), ret(level = Level::DEBUG))]
    fn build_url(&self, endpoint: &str) -> Result<Url, Error> {
        let suffix = format!("{}:{endpoint}", self.model);
        self.base_url.join(&suffix).context(ConstructUrlSnafu { suffix })
    }
}

/// A builder for the `Gemini` client.
///
/// # Examples
///
/// ```no_run
/// use medqa_gemini::{GeminiBuilder, Model};
/// use reqwest::{ClientBuilder, Proxy};
///
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let proxy = Proxy::all("http://127.0.0.1:7890")?;
/// let gemini = GeminiBuilder::new("YOUR_API_KEY")
///     .with_model(Model::Gemini25Flash)
///     .with_http_client(ClientBuilder::new().proxy(proxy))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct GeminiBuilder {
    api_key: String,
    model: Model,
    client_builder: ClientBuilder,
    base_url: Url,
}

impl GeminiBuilder {
    /// Creates a new `GeminiBuilder` with the given API key.
    pub fn new<K: Into<String>>(key: K) -> Self {
        Self {
            api_key: key.into(),
            model: Model::default(),
            client_builder: ClientBuilder::default(),
            base_url: DEFAULT_BASE_URL.clone(),
        }
    }

    /// Sets the model for the client.
    pub fn with_model<M: Into<Model>>(mut self, model: M) -> Self {
        self.model = model.into();
        self
    }

    /// Sets a custom `reqwest::ClientBuilder`, e.g. one carrying a proxy.
    pub fn with_http_client(mut self, client_builder: ClientBuilder) -> Self {
        self.client_builder = client_builder;
        self
    }

    /// Sets a custom base URL for the API.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Builds the `Gemini` client.
    pub fn build(self) -> Result<Gemini, Error> {
        let client = GeminiClient::with_base_url(
            self.client_builder,
            self.model,
            self.base_url,
            &self.api_key,
        )?;
        Ok(Gemini { client: Arc::new(client) })
    }
}

/// Client for the Gemini API
#[derive(Clone)]
pub struct Gemini {
    client: Arc<GeminiClient>,
}

impl Gemini {
    /// Create a new client with the specified API key
    pub fn new<K: AsRef<str>>(api_key: K) -> Result<Self, Error> {
        Self::with_model(api_key, Model::default())
    }

    /// Create a new client with the specified API key and model
    pub fn with_model<K: AsRef<str>, M: Into<Model>>(api_key: K, model: M) -> Result<Self, Error> {
        GeminiBuilder::new(api_key.as_ref()).with_model(model).build()
    }

    /// Model every request from this client is sent to.
    pub fn model(&self) -> &Model {
        &self.client.model
    }

    /// Start building a content generation request
    pub fn generate_content(&self) -> ContentBuilder {
        ContentBuilder::new(self.client.clone())
    }

    /// Start building a content embedding request
    pub fn embed_content(&self) -> EmbedBuilder {
        EmbedBuilder::new(self.client.clone())
    }

    /// Open a conversation seeded with earlier turns.
    pub fn start_chat(&self, history: Vec<Content>) -> ChatSession {
        ChatSession::new(self.clone(), history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_resolve() {
        assert_eq!(Model::from_name("gemini-2.5-flash"), Model::Gemini25Flash);
        assert_eq!(Model::from_name("models/gemini-2.5-pro"), Model::Gemini25Pro);
        assert_eq!(
            Model::from_name("gemini-3-preview"),
            Model::Custom("models/gemini-3-preview".to_string())
        );
    }

    #[test]
    fn build_url_appends_endpoint_to_model() {
        let gemini = Gemini::new("test-key").unwrap();
        let url = gemini.client.build_url("streamGenerateContent").unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent"
        );
    }

    #[test]
    fn custom_base_url_is_used() {
        let base = Url::parse("http://127.0.0.1:9000/v1beta/").unwrap();
        let gemini = GeminiBuilder::new("k").with_base_url(base).build().unwrap();
        let url = gemini.client.build_url("generateContent").unwrap();
        assert!(url.as_str().starts_with("http://127.0.0.1:9000/v1beta/models/"));
    }

    #[test]
    fn rejects_api_key_with_control_characters() {
        let result = Gemini::new("bad\nkey");
        assert!(matches!(result, Err(Error::InvalidApiKey { .. })));
    }
}

//! Ollama-compatible extraction backend
//!
//! Talks to `POST {endpoint}/api/generate` with a non-streaming request.
//! The system prompt carries the record instructions and the JSON schema of
//! the response envelope; the user prompt is the job input.

use crate::config::{ExtractionConfig, UserAgentConfig};
use crate::extract::backend::{parse_response, Extractor};
use crate::extract::job::{ExtractionError, ExtractionErrorKind};
use crate::extract::schema::{Record, RecordKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: String,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Clone)]
pub struct OllamaExtractor {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OllamaExtractor {
    /// Builds the extractor from the `[extraction]` section
    ///
    /// The request timeout is the per-job timeout; the batcher enforces the
    /// same bound independently of the backend.
    pub fn new(
        config: &ExtractionConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent.user_agent())
            .timeout(config.job_timeout())
            .build()?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ExtractionConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(kind: RecordKind) -> String {
        format!(
            "{}\n\nRespond with a single JSON object matching this schema and nothing else. \
             Use an empty \"records\" list when the content holds no {}.\n\n{}",
            kind.instructions(),
            kind,
            kind.json_schema()
        )
    }

    /// Returns true when the backend answers `GET /api/tags`
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.endpoint);
        match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Health check against {} failed: {}", url, e);
                false
            }
        }
    }

    async fn generate(&self, input: &str, kind: RecordKind) -> Result<String, ExtractionError> {
        let request = GenerateRequest {
            model: &self.model,
            system: Self::system_prompt(kind),
            prompt: input,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                top_p: 0.9,
                top_k: 40,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::backend(format!(
                "backend returned HTTP {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| if e.is_timeout() {
                classify_transport(e)
            } else {
                ExtractionError::malformed(format!("unreadable backend envelope: {}", e))
            })?;

        Ok(generated.response)
    }
}

fn classify_transport(e: reqwest::Error) -> ExtractionError {
    if e.is_timeout() {
        ExtractionError::new(ExtractionErrorKind::Timeout, e.to_string())
    } else {
        ExtractionError::backend(e)
    }
}

#[async_trait]
impl Extractor for OllamaExtractor {
    async fn invoke(&self, input: &str, kind: RecordKind) -> Result<Vec<Record>, ExtractionError> {
        tracing::debug!(
            model = %self.model,
            kind = %kind,
            input_length = input.len(),
            "Calling extraction backend"
        );

        let text = self.generate(input, kind).await?;
        let records = parse_response(&text, kind)?;

        tracing::debug!(
            model = %self.model,
            records = records.len(),
            "Extraction backend response parsed"
        );
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

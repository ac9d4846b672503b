//! Google Cloud Text-to-Speech long-audio synthesis over REST

use super::traits::{JobStatus, JobSupplier};
use crate::config::{GoogleConfig, SynthesisConfig};
use crate::error::SupplierError;
use crate::retry::{is_transient_status, is_transient_transport};
use crate::types::{ArtifactLocator, JobHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Long-audio synthesizer backed by the Text-to-Speech REST API
///
/// `start` issues `POST /v1/{parent}:synthesizeLongAudio` and returns the
/// long-running operation name; `status` reads `GET /v1/{operation}`.
pub struct GoogleLongAudioSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
    synthesis: SynthesisConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeLongAudioRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig<'a>,
    output_gcs_uri: String,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig<'a> {
    audio_encoding: &'a str,
}

/// `google.longrunning.Operation`, reduced to the fields the relay reads
#[derive(Debug, Deserialize)]
struct LongRunningOperation {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationStatus>,
    #[serde(default)]
    metadata: Option<LongAudioMetadata>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LongAudioMetadata {
    #[serde(default)]
    progress_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: OperationStatus,
}

impl GoogleLongAudioSynthesizer {
    /// Create a synthesizer from configuration
    pub fn new(google: &GoogleConfig, synthesis: &SynthesisConfig) -> Result<Self, SupplierError> {
        let client = reqwest::Client::builder()
            .timeout(google.request_timeout)
            .build()
            .map_err(|e| {
                SupplierError::Misconfigured(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: google.tts_endpoint.trim_end_matches('/').to_string(),
            access_token: google.access_token.clone(),
            synthesis: synthesis.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<LongRunningOperation, SupplierError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or(body);

            return Err(if is_transient_status(status) {
                SupplierError::Unavailable(format!("{}: {}", status, message))
            } else {
                SupplierError::Rejected {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        response
            .json::<LongRunningOperation>()
            .await
            .map_err(|e| SupplierError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl JobSupplier for GoogleLongAudioSynthesizer {
    async fn start(
        &self,
        text: &str,
        destination: &ArtifactLocator,
    ) -> Result<JobHandle, SupplierError> {
        let parent = self.synthesis.parent.as_deref().ok_or_else(|| {
            SupplierError::Misconfigured("synthesis parent is not configured".into())
        })?;

        let body = SynthesizeLongAudioRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &self.synthesis.voice.language_code,
                name: &self.synthesis.voice.name,
                ssml_gender: &self.synthesis.voice.ssml_gender,
            },
            audio_config: AudioConfig {
                audio_encoding: self.synthesis.audio_encoding.api_name(),
            },
            output_gcs_uri: destination.uri(),
        };

        let url = format!("{}/v1/{}:synthesizeLongAudio", self.endpoint, parent);
        tracing::debug!(
            destination = %destination,
            text_len = text.len(),
            "Requesting long-audio synthesis"
        );

        let operation = self.send(self.client.post(&url).json(&body)).await?;

        match operation.name {
            Some(name) if !name.is_empty() => Ok(JobHandle(name)),
            _ => Err(SupplierError::InvalidResponse(
                "synthesis request did not return an operation name".into(),
            )),
        }
    }

    async fn status(&self, job: &JobHandle) -> Result<JobStatus, SupplierError> {
        let url = format!("{}/v1/{}", self.endpoint, job.0);
        let operation = self.send(self.client.get(&url)).await?;

        let progress_percent = operation
            .metadata
            .and_then(|m| m.progress_percentage)
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0).floor() as u8);

        if let Some(error) = operation.error {
            let message = error.message.unwrap_or_else(|| match error.code {
                Some(code) => format!("synthesis job failed with code {}", code),
                None => "unknown synthesis error".to_string(),
            });
            return Ok(JobStatus {
                done: true,
                error: Some(message),
                progress_percent,
            });
        }

        Ok(JobStatus {
            done: operation.done,
            error: None,
            progress_percent,
        })
    }

    fn name(&self) -> &'static str {
        "google-long-audio"
    }
}

fn transport_error(error: reqwest::Error) -> SupplierError {
    if is_transient_transport(&error) {
        SupplierError::Unavailable(error.to_string())
    } else {
        SupplierError::InvalidResponse(error.to_string())
    }
}

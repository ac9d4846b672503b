//! Core types for narration-relay

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a synthesis operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, format = Uuid)]
pub struct OperationId(pub Uuid);

impl OperationId {
    /// Generate a fresh random identifier
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Path of the progress event stream for this operation
    pub fn events_path(&self) -> String {
        format!("/api/events/{}", self.0)
    }

    /// Path of the one-shot artifact download for this operation
    pub fn download_path(&self) -> String {
        format!("/api/download/{}", self.0)
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Opaque reference to an externally running synthesis job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobHandle(pub String);

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of an artifact in the blob store (`gs://bucket/object`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ArtifactLocator {
    /// Bucket (container) name
    pub bucket: String,
    /// Object name within the bucket
    pub object: String,
}

impl ArtifactLocator {
    /// Create a locator from its parts
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    /// Parse a `gs://bucket/path/to/object` URI
    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        let rest = uri
            .strip_prefix("gs://")
            .ok_or_else(|| StoreError::InvalidLocator(format!("missing gs:// scheme: {uri}")))?;

        match rest.split_once('/') {
            Some((bucket, object)) if !bucket.is_empty() && !object.is_empty() => {
                Ok(Self::new(bucket, object))
            }
            _ => Err(StoreError::InvalidLocator(format!(
                "expected gs://bucket/object, got {uri}"
            ))),
        }
    }

    /// The `gs://` URI form of this locator
    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.object)
    }
}

impl std::fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.object)
    }
}

/// Lifecycle state of an operation
///
/// ```text
/// Pending ──► Running ◄──► PollingError
///    │           │
///    └─────┬─────┘
///          ▼
///   Ready | Failed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Job started, no status observed yet
    Pending,
    /// Job reported as in progress
    Running,
    /// Artifact is ready for download
    Ready,
    /// Job failed (terminal)
    Failed,
    /// Last status query failed transiently; polling continues
    PollingError,
}

impl OperationState {
    /// Position along the state machine; transitions never decrease it.
    ///
    /// `Running` and `PollingError` share a rank so a recovered query can
    /// move the record back to `Running`.
    pub fn rank(&self) -> u8 {
        match self {
            OperationState::Pending => 0,
            OperationState::Running | OperationState::PollingError => 1,
            OperationState::Ready | OperationState::Failed => 2,
        }
    }

    /// Terminal for polling
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Ready | OperationState::Failed)
    }

    fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "pending",
            OperationState::Running => "running",
            OperationState::Ready => "ready",
            OperationState::Failed => "failed",
            OperationState::PollingError => "polling_error",
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tracked lifecycle of one synthesis request
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    /// Operation ID
    pub id: OperationId,
    /// Handle of the external synthesis job
    pub job_handle: JobHandle,
    /// Where the finished artifact will appear
    pub artifact_locator: ArtifactLocator,
    /// Current lifecycle state
    pub state: OperationState,
    /// Progress percentage (0-100)
    pub progress_percent: u8,
    /// Last error, set only in `failed` / `polling_error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the operation was accepted
    pub created_at: DateTime<Utc>,
    /// When the record last changed
    pub updated_at: DateTime<Utc>,
    /// A download outcome has claimed the purge of this artifact
    #[serde(skip)]
    pub(crate) purge_claimed: bool,
}

impl OperationRecord {
    /// New record in `Pending`
    pub fn new(id: OperationId, job_handle: JobHandle, artifact_locator: ArtifactLocator) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_handle,
            artifact_locator,
            state: OperationState::Pending,
            progress_percent: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            purge_claimed: false,
        }
    }
}

/// Event pushed to a progress stream subscriber
///
/// The SSE event name is [`ProgressEvent::name`]; the JSON payload is the
/// serialized variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Subscription established
    Connected {
        /// Operation ID
        id: OperationId,
        /// Human-readable message
        message: String,
    },

    /// Progress advanced
    Progress {
        /// Operation ID
        id: OperationId,
        /// Progress percentage (0-100)
        percentage: u8,
    },

    /// Artifact ready for download
    Complete {
        /// Operation ID
        id: OperationId,
        /// Relative URL of the one-shot download
        #[serde(rename = "downloadUrl")]
        download_url: String,
        /// Human-readable message
        message: String,
    },

    /// Synthesis failed or progress could not be fetched
    Error {
        /// Operation ID
        id: OperationId,
        /// Human-readable summary
        message: String,
        /// Underlying error description
        error: String,
        /// Whether polling continues in the background
        transient: bool,
    },
}

impl ProgressEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Connected { .. } => "connected",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    /// After this event the stream is closed
    pub fn closes_stream(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
        )
    }

    /// Initial event of every subscription
    pub fn connected(id: OperationId) -> Self {
        ProgressEvent::Connected {
            id,
            message: format!("Connected to progress stream for operation {id}"),
        }
    }

    /// Events describing the change from `before` to `after`
    pub fn for_transition(before: &OperationRecord, after: &OperationRecord) -> Vec<Self> {
        let id = after.id;
        if after.state != before.state {
            match after.state {
                OperationState::Ready => {
                    let mut events = Vec::with_capacity(2);
                    if before.progress_percent < 100 {
                        events.push(ProgressEvent::Progress {
                            id,
                            percentage: 100,
                        });
                    }
                    events.push(Self::complete(id));
                    return events;
                }
                OperationState::Failed => return vec![Self::failed(after)],
                OperationState::PollingError => return vec![Self::polling_error(after)],
                OperationState::Pending | OperationState::Running => {}
            }
        }

        if after.progress_percent > before.progress_percent {
            vec![ProgressEvent::Progress {
                id,
                percentage: after.progress_percent,
            }]
        } else {
            Vec::new()
        }
    }

    /// Catch-up event for a subscriber joining with the record in this state
    ///
    /// A record sitting in `PollingError` is reported as plain progress: the
    /// error was delivered when it was entered and polling is still going.
    pub fn for_snapshot(record: &OperationRecord) -> Option<Self> {
        match record.state {
            OperationState::Pending => None,
            OperationState::Running | OperationState::PollingError => {
                (record.progress_percent > 0).then_some(ProgressEvent::Progress {
                    id: record.id,
                    percentage: record.progress_percent,
                })
            }
            OperationState::Ready => Some(Self::complete(record.id)),
            OperationState::Failed => Some(Self::failed(record)),
        }
    }

    fn complete(id: OperationId) -> Self {
        ProgressEvent::Complete {
            id,
            download_url: id.download_path(),
            message: "Audio ready for download.".to_string(),
        }
    }

    fn failed(record: &OperationRecord) -> Self {
        ProgressEvent::Error {
            id: record.id,
            message: "Audio synthesis failed.".to_string(),
            error: record
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown synthesis error".to_string()),
            transient: false,
        }
    }

    fn polling_error(record: &OperationRecord) -> Self {
        ProgressEvent::Error {
            id: record.id,
            message: "Error fetching progress.".to_string(),
            error: record
                .last_error
                .clone()
                .unwrap_or_else(|| "unknown polling error".to_string()),
            transient: true,
        }
    }
}

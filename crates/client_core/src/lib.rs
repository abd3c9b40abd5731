use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{
    domain::FileId,
    error::WorkflowError,
    protocol::{ErrorResponse, NotesResponse, UploadResponse},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

const CHOOSE_FILE_FIRST: &str = "Please choose a file first.";
const UPLOAD_FILE_FIRST: &str = "Upload a file first.";
const REQUEST_IN_FLIGHT: &str = "Another request is already in progress.";
const UPLOAD_FAILED: &str = "Failed to upload file";
const GENERATE_FAILED: &str = "Failed to generate notes";

/// A locally chosen file that has not been sent to the backend yet. Replaced
/// wholesale on re-selection, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    pub name: String,
    pub size_bytes: u64,
    pub content: Vec<u8>,
}

impl FileSelection {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }

    pub fn summary(&self) -> SelectionSummary {
        SelectionSummary {
            name: self.name.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

/// Read-model view of a selection: what a renderer needs, without the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSummary {
    pub name: String,
    pub size_bytes: u64,
}

/// Backend-confirmed upload result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_id: FileId,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesResult {
    pub text: String,
    pub cached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    Idle,
    FileSelected,
    Uploading,
    Uploaded,
    Generating,
    NotesReady,
    Error,
}

/// Workflow state as one tagged value. Each variant carries exactly the data
/// that may exist at that point, so a stored file without a selection or
/// notes without a stored file are unrepresentable.
#[derive(Debug, Clone)]
pub enum WorkflowState {
    Idle,
    FileSelected {
        selection: FileSelection,
    },
    Uploading {
        selection: FileSelection,
    },
    Uploaded {
        selection: FileSelection,
        stored: StoredFile,
    },
    Generating {
        selection: FileSelection,
        stored: StoredFile,
    },
    NotesReady {
        selection: FileSelection,
        stored: StoredFile,
        notes: NotesResult,
    },
    /// Failure flag plus whatever progress preceded it. `stored` is only
    /// ever set together with `selection`.
    Error {
        selection: Option<FileSelection>,
        stored: Option<StoredFile>,
        message: String,
    },
}

impl WorkflowState {
    pub fn phase(&self) -> WorkflowPhase {
        match self {
            WorkflowState::Idle => WorkflowPhase::Idle,
            WorkflowState::FileSelected { .. } => WorkflowPhase::FileSelected,
            WorkflowState::Uploading { .. } => WorkflowPhase::Uploading,
            WorkflowState::Uploaded { .. } => WorkflowPhase::Uploaded,
            WorkflowState::Generating { .. } => WorkflowPhase::Generating,
            WorkflowState::NotesReady { .. } => WorkflowPhase::NotesReady,
            WorkflowState::Error { .. } => WorkflowPhase::Error,
        }
    }

    pub fn selection(&self) -> Option<&FileSelection> {
        match self {
            WorkflowState::Idle => None,
            WorkflowState::FileSelected { selection }
            | WorkflowState::Uploading { selection }
            | WorkflowState::Uploaded { selection, .. }
            | WorkflowState::Generating { selection, .. }
            | WorkflowState::NotesReady { selection, .. } => Some(selection),
            WorkflowState::Error { selection, .. } => selection.as_ref(),
        }
    }

    pub fn stored_file(&self) -> Option<&StoredFile> {
        match self {
            WorkflowState::Uploaded { stored, .. }
            | WorkflowState::Generating { stored, .. }
            | WorkflowState::NotesReady { stored, .. } => Some(stored),
            WorkflowState::Error { stored, .. } => stored.as_ref(),
            _ => None,
        }
    }

    pub fn notes(&self) -> Option<&NotesResult> {
        match self {
            WorkflowState::NotesReady { notes, .. } => Some(notes),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            WorkflowState::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            WorkflowState::Uploading { .. } | WorkflowState::Generating { .. }
        )
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            phase: self.phase(),
            selection: self.selection().map(FileSelection::summary),
            stored_file: self.stored_file().cloned(),
            notes: self.notes().cloned(),
            error: self.error_message().map(str::to_string),
        }
    }
}

/// Immutable view published to renderers after every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    pub phase: WorkflowPhase,
    pub selection: Option<SelectionSummary>,
    pub stored_file: Option<StoredFile>,
    pub notes: Option<NotesResult>,
    pub error: Option<String>,
}

#[async_trait]
pub trait NotesBackend: Send + Sync {
    async fn upload(&self, selection: &FileSelection) -> Result<UploadResponse, WorkflowError>;
    async fn generate_notes(&self, file_id: &FileId) -> Result<NotesResponse, WorkflowError>;
    fn file_url(&self, file_id: &FileId) -> String;
}

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Shared response path for both backend calls: transport failures keep
    /// the transport's own message, non-success responses yield the body's
    /// `detail` when one can be decoded, else the per-call fallback.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> Result<reqwest::Response, WorkflowError> {
        let response = request
            .send()
            .await
            .map_err(|err| WorkflowError::transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.detail);
        let message = detail.unwrap_or_else(|| fallback.to_string());
        warn!(%status, error = %message, "api: backend call failed");
        Err(WorkflowError::server(message))
    }
}

#[async_trait]
impl NotesBackend for ApiClient {
    async fn upload(&self, selection: &FileSelection) -> Result<UploadResponse, WorkflowError> {
        let part = Part::bytes(selection.content.clone()).file_name(selection.name.clone());
        let form = Form::new().part("file", part);
        let response = self
            .execute(
                self.http
                    .post(format!("{}/upload", self.base_url))
                    .multipart(form),
                UPLOAD_FAILED,
            )
            .await?;
        response
            .json::<UploadResponse>()
            .await
            .map_err(|err| WorkflowError::transport(err.to_string()))
    }

    async fn generate_notes(&self, file_id: &FileId) -> Result<NotesResponse, WorkflowError> {
        let response = self
            .execute(
                self.http.post(format!(
                    "{}/notes/{}",
                    self.base_url,
                    urlencoding::encode(file_id.as_str())
                )),
                GENERATE_FAILED,
            )
            .await?;
        response
            .json::<NotesResponse>()
            .await
            .map_err(|err| WorkflowError::transport(err.to_string()))
    }

    fn file_url(&self, file_id: &FileId) -> String {
        format!(
            "{}/file/{}",
            self.base_url,
            urlencoding::encode(file_id.as_str())
        )
    }
}

struct WorkflowInner {
    /// Bumped on every `select_file`; an in-flight call whose epoch no longer
    /// matches discards its response instead of pairing stale results with
    /// the new selection.
    selection_epoch: u64,
    /// True while a backend call is outstanding. Outlives the Uploading and
    /// Generating variants: a mid-flight `select_file` rewinds the state but
    /// the orphaned call is still on the wire until it resumes.
    in_flight: bool,
    state: WorkflowState,
}

/// Owns the workflow state and sequences the two backend calls. One writer;
/// renderers read snapshots or subscribe to the broadcast channel.
pub struct NotesWorkflow {
    backend: Arc<dyn NotesBackend>,
    inner: Mutex<WorkflowInner>,
    events: broadcast::Sender<WorkflowSnapshot>,
}

impl NotesWorkflow {
    pub fn new(base_url: impl Into<String>) -> Arc<Self> {
        Self::with_backend(Arc::new(ApiClient::new(base_url)))
    }

    pub fn with_backend(backend: Arc<dyn NotesBackend>) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            backend,
            inner: Mutex::new(WorkflowInner {
                selection_epoch: 0,
                in_flight: false,
                state: WorkflowState::Idle,
            }),
            events,
        })
    }

    /// Replaces the selection and drops every derived value: stored file,
    /// notes, error. No failure mode.
    pub async fn select_file(&self, selection: FileSelection) {
        let mut inner = self.inner.lock().await;
        inner.selection_epoch += 1;
        info!(
            file = %selection.name,
            size_bytes = selection.size_bytes,
            "workflow: file selected"
        );
        inner.state = WorkflowState::FileSelected { selection };
        self.publish(&inner.state);
    }

    pub async fn upload(&self) -> Result<(), WorkflowError> {
        let (selection, epoch) = {
            let mut inner = self.inner.lock().await;
            if inner.in_flight {
                return Err(WorkflowError::validation(REQUEST_IN_FLIGHT));
            }
            let Some(selection) = inner.state.selection().cloned() else {
                let error = WorkflowError::validation(CHOOSE_FILE_FIRST);
                inner.state = WorkflowState::Error {
                    selection: None,
                    stored: None,
                    message: error.message.clone(),
                };
                self.publish(&inner.state);
                return Err(error);
            };
            inner.in_flight = true;
            inner.state = WorkflowState::Uploading {
                selection: selection.clone(),
            };
            self.publish(&inner.state);
            (selection, inner.selection_epoch)
        };

        let result = self.backend.upload(&selection).await;

        let mut inner = self.inner.lock().await;
        inner.in_flight = false;
        if inner.selection_epoch != epoch {
            info!(file = %selection.name, "upload: response discarded, selection changed mid-flight");
            return Ok(());
        }
        match result {
            Ok(response) => {
                let stored = StoredFile {
                    file_id: response.file_id,
                    filename: response.filename,
                };
                info!(file_id = %stored.file_id, filename = %stored.filename, "upload: stored file confirmed");
                inner.state = WorkflowState::Uploaded { selection, stored };
                self.publish(&inner.state);
                Ok(())
            }
            Err(error) => {
                warn!(file = %selection.name, "upload: failed: {error}");
                inner.state = WorkflowState::Error {
                    selection: Some(selection),
                    stored: None,
                    message: error.message.clone(),
                };
                self.publish(&inner.state);
                Err(error)
            }
        }
    }

    pub async fn generate(&self) -> Result<(), WorkflowError> {
        let (selection, stored, epoch) = {
            let mut inner = self.inner.lock().await;
            if inner.in_flight {
                return Err(WorkflowError::validation(REQUEST_IN_FLIGHT));
            }
            let context = inner
                .state
                .selection()
                .cloned()
                .zip(inner.state.stored_file().cloned());
            let Some((selection, stored)) = context else {
                let retained = inner.state.selection().cloned();
                let error = WorkflowError::validation(UPLOAD_FILE_FIRST);
                inner.state = WorkflowState::Error {
                    selection: retained,
                    stored: None,
                    message: error.message.clone(),
                };
                self.publish(&inner.state);
                return Err(error);
            };
            // Entering Generating drops any previous NotesResult.
            inner.in_flight = true;
            inner.state = WorkflowState::Generating {
                selection: selection.clone(),
                stored: stored.clone(),
            };
            self.publish(&inner.state);
            (selection, stored, inner.selection_epoch)
        };

        let result = self.backend.generate_notes(&stored.file_id).await;

        let mut inner = self.inner.lock().await;
        inner.in_flight = false;
        if inner.selection_epoch != epoch {
            info!(file_id = %stored.file_id, "notes: response discarded, selection changed mid-flight");
            return Ok(());
        }
        match result {
            Ok(response) => {
                let notes = NotesResult {
                    text: response.notes,
                    cached: response.cached,
                };
                info!(file_id = %stored.file_id, cached = notes.cached, "notes: generated");
                inner.state = WorkflowState::NotesReady {
                    selection,
                    stored,
                    notes,
                };
                self.publish(&inner.state);
                Ok(())
            }
            Err(error) => {
                warn!(file_id = %stored.file_id, "notes: generation failed: {error}");
                inner.state = WorkflowState::Error {
                    selection: Some(selection),
                    stored: Some(stored),
                    message: error.message.clone(),
                };
                self.publish(&inner.state);
                Err(error)
            }
        }
    }

    /// Viewable URL for the stored file, if one exists. No I/O.
    pub async fn current_file_url(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner
            .state
            .stored_file()
            .map(|stored| self.backend.file_url(&stored.file_id))
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        self.inner.lock().await.state.snapshot()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowSnapshot> {
        self.events.subscribe()
    }

    fn publish(&self, state: &WorkflowState) {
        let _ = self.events.send(state.snapshot());
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

use serde::{Deserialize, Serialize};

use crate::domain::FileId;

/// Body of a successful `POST /upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: FileId,
    pub filename: String,
}

/// Body of a successful `POST /notes/{file_id}`. `cached` is true when the
/// backend served a previously computed result for this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesResponse {
    pub notes: String,
    #[serde(default)]
    pub cached: bool,
}

/// Best-effort shape of a non-success body. The backend is an independently
/// evolving service; `detail` is absent whenever it answers with something
/// unstructured (a gateway timeout page, a bare string).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub detail: Option<String>,
}

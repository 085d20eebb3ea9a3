//! In-memory doubles for the hosted service, shared by unit tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent::ContentModel;
use crate::error::{AnalysisError, AnalysisResult};
use crate::gemini::{GenerateRequest, GenerateResponse};
use crate::remote::{FileState, FileStore, RemoteFile};

pub fn remote_file(name: &str, state: FileState) -> RemoteFile {
    RemoteFile {
        name: name.to_string(),
        uri: format!("https://files.example.test/{}", name),
        mime_type: "video/mp4".to_string(),
        display_name: None,
        state,
        error: None,
    }
}

pub struct ScriptedStore {
    statuses: Mutex<VecDeque<AnalysisResult<RemoteFile>>>,
    fallback: Option<RemoteFile>,
    upload_state: FileState,
    upload_error: Option<String>,
    uploads: Mutex<Vec<(PathBuf, String)>>,
    get_calls: AtomicUsize,
}

impl ScriptedStore {
    /// `get_file` answers from `statuses` in order.
    pub fn new(statuses: Vec<AnalysisResult<RemoteFile>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            fallback: None,
            upload_state: FileState::Active,
            upload_error: None,
            uploads: Mutex::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
        }
    }

    /// `get_file` always answers `file`.
    pub fn always(file: RemoteFile) -> Self {
        Self {
            fallback: Some(file),
            ..Self::new(vec![])
        }
    }

    pub fn upload_state(mut self, state: FileState) -> Self {
        self.upload_state = state;
        self
    }

    pub fn failing_upload(mut self, message: &str) -> Self {
        self.upload_error = Some(message.to_string());
        self
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileStore for ScriptedStore {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        _display_name: &str,
    ) -> AnalysisResult<RemoteFile> {
        assert!(path.exists(), "upload of a file that is not on disk");
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((path.to_path_buf(), mime_type.to_string()));
        if let Some(message) = &self.upload_error {
            return Err(AnalysisError::upload(message.clone()));
        }
        let mut file = remote_file(&format!("files/upload-{}", uploads.len()), self.upload_state);
        file.mime_type = mime_type.to_string();
        Ok(file)
    }

    async fn get_file(&self, name: &str) -> AnalysisResult<RemoteFile> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.statuses.lock().unwrap().pop_front() {
            return next.map(|mut f| {
                f.name = name.to_string();
                f
            });
        }
        match &self.fallback {
            Some(file) => Ok(RemoteFile {
                name: name.to_string(),
                ..file.clone()
            }),
            None => Err(AnalysisError::remote("no scripted status left")),
        }
    }
}

pub struct ScriptedModel {
    responses: Mutex<VecDeque<AnalysisResult<GenerateResponse>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<AnalysisResult<GenerateResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, request: &GenerateRequest) -> AnalysisResult<GenerateResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AnalysisError::remote("no scripted response left")))
    }
}

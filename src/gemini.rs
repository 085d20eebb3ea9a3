//! Gemini client: Files API ingestion and `generateContent`.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::agent::ContentModel;
use crate::error::{AnalysisError, AnalysisResult};
use crate::remote::{FileStore, RemoteFile};

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const MISSING_KEY: &str = "GOOGLE_API_KEY is not set; the model service is not configured";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenated text parts, ignoring function calls.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.parts.iter().filter_map(|p| p.function_call.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn file(file: &RemoteFile) -> Self {
        Self {
            file_data: Some(FileData {
                mime_type: file.mime_type.clone(),
                file_uri: file.uri.clone(),
            }),
            ..Default::default()
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GenerateResponse {
    /// Content of the first candidate, or an error explaining why there is none.
    pub fn into_content(self) -> AnalysisResult<Content> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AnalysisError::remote(format!(
                "the model blocked the prompt: {}",
                reason
            )));
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::remote("no candidates in model response"))?;
        candidate.content.ok_or_else(|| {
            AnalysisError::remote(format!(
                "model returned no content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct FileEnvelope {
    file: RemoteFile,
}

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: Client,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    async fn error_text(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("service returned {}: {}", status, body.trim())
    }
}

#[async_trait]
impl FileStore for GeminiClient {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> AnalysisResult<RemoteFile> {
        let key = self
            .api_key()
            .ok_or_else(|| AnalysisError::upload(MISSING_KEY))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalysisError::upload(format!("failed to read {:?}: {}", path, e)))?;

        info!(
            "[gemini] 📤 Uploading {} ({:.2} MB, {})",
            display_name,
            bytes.len() as f64 / 1024.0 / 1024.0,
            mime_type
        );

        // Resumable protocol: open a session, then send bytes and finalize in one go
        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header(API_KEY_HEADER, key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| AnalysisError::upload(format!("upload session request failed: {}", e)))?;

        if !start.status().is_success() {
            return Err(AnalysisError::upload(Self::error_text(start).await));
        }

        let upload_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AnalysisError::upload("upload session did not return an upload URL"))?;

        let finish = self
            .client
            .post(&upload_url)
            .header(API_KEY_HEADER, key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AnalysisError::upload(format!("upload request failed: {}", e)))?;

        if !finish.status().is_success() {
            return Err(AnalysisError::upload(Self::error_text(finish).await));
        }

        let envelope: FileEnvelope = finish
            .json()
            .await
            .map_err(|e| AnalysisError::upload(format!("failed to parse upload response: {}", e)))?;

        info!(
            "[gemini] ✅ Uploaded {} as {} ({:?})",
            display_name, envelope.file.name, envelope.file.state
        );
        Ok(envelope.file)
    }

    async fn get_file(&self, name: &str) -> AnalysisResult<RemoteFile> {
        let key = self
            .api_key()
            .ok_or_else(|| AnalysisError::remote(MISSING_KEY))?;
        let response = self
            .client
            .get(format!("{}/v1beta/{}", self.base_url, name))
            .header(API_KEY_HEADER, key)
            .send()
            .await
            .map_err(|e| AnalysisError::remote(format!("status request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AnalysisError::remote(Self::error_text(response).await));
        }

        let file: RemoteFile = response
            .json()
            .await
            .map_err(|e| AnalysisError::remote(format!("failed to parse file status: {}", e)))?;
        debug!("[gemini] {} is {:?}", file.name, file.state);
        Ok(file)
    }
}

#[async_trait]
impl ContentModel for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest) -> AnalysisResult<GenerateResponse> {
        let key = self
            .api_key()
            .ok_or_else(|| AnalysisError::remote(MISSING_KEY))?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, key)
            .json(request)
            .send()
            .await
            .map_err(|e| AnalysisError::remote(format!("model request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AnalysisError::remote(Self::error_text(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| AnalysisError::remote(format!("failed to parse model response: {}", e)))
    }
}

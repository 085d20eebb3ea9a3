//! Upload → wait → prompt → agent, for one request at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::error::{AnalysisError, AnalysisResult};
use crate::poll::{await_ready, PollPolicy};
use crate::prompt::{build_analysis_prompt, validate_query, PromptStyle};
use crate::remote::{FileStore, RemoteFile};
use crate::scratch::{ScratchVideo, VideoFormat};

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub file_name: String,
    pub bytes: Bytes,
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub content: String,
    pub model: String,
    pub remote_file: RemoteFile,
    pub status_checks: u32,
    pub tool_calls: usize,
    pub elapsed: Duration,
}

pub struct Analyzer {
    store: Arc<dyn FileStore>,
    agent: Arc<Agent>,
    policy: PollPolicy,
    scratch_dir: PathBuf,
    prompt_style: PromptStyle,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn FileStore>,
        agent: Arc<Agent>,
        policy: PollPolicy,
        scratch_dir: PathBuf,
        prompt_style: PromptStyle,
    ) -> Self {
        Self {
            store,
            agent,
            policy,
            scratch_dir,
            prompt_style,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Runs one analysis. Nothing is cached: every call uploads the video again.
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> AnalysisResult<AnalysisOutcome> {
        let started = Instant::now();

        // Both checks happen before anything touches the disk or the network
        let query = validate_query(&request.query)?;
        if request.bytes.is_empty() {
            return Err(AnalysisError::validation("The uploaded video file is empty."));
        }
        let format = VideoFormat::from_file_name(&request.file_name)?;

        let scratch = ScratchVideo::write(&self.scratch_dir, &request.bytes, format)
            .await
            .map_err(|e| AnalysisError::upload(format!("failed to save upload: {}", e)))?;

        info!(
            "[analyze] 📁 {} ({:.2} MB) -> {:?}",
            request.file_name,
            scratch.size() as f64 / 1024.0 / 1024.0,
            scratch.path()
        );

        let result = self
            .run(&scratch, &request.file_name, query, cancel)
            .await;

        // Exactly one cleanup attempt, whatever happened above
        scratch.remove().await;

        match &result {
            Ok(outcome) => info!(
                "[analyze] ✅ SUCCESS - {} in {:.2}s ({} status checks, {} tool calls)",
                outcome.remote_file.name,
                outcome.elapsed.as_secs_f64(),
                outcome.status_checks,
                outcome.tool_calls
            ),
            Err(e) => error!(
                "[analyze] ❌ ERROR after {:.2}s ({:?}): {}",
                started.elapsed().as_secs_f64(),
                e.kind(),
                e
            ),
        }

        result.map(|mut outcome| {
            outcome.elapsed = started.elapsed();
            outcome
        })
    }

    async fn run(
        &self,
        scratch: &ScratchVideo,
        display_name: &str,
        query: &str,
        cancel: &CancellationToken,
    ) -> AnalysisResult<AnalysisOutcome> {
        let submitted = tokio::select! {
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            uploaded = self.store.upload_file(
                scratch.path(),
                scratch.format().mime_type(),
                display_name,
            ) => uploaded?,
        };

        let ready = await_ready(self.store.as_ref(), submitted, &self.policy, cancel).await?;

        let prompt = build_analysis_prompt(query, self.prompt_style);

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("[analyze] cancelled while waiting for the model");
                return Err(AnalysisError::Cancelled);
            }
            response = self.agent.run(&prompt, std::slice::from_ref(&ready.file)) => response?,
        };

        Ok(AnalysisOutcome {
            content: response.content,
            model: response.model,
            remote_file: ready.file,
            status_checks: ready.status_checks,
            tool_calls: response.tool_calls,
            elapsed: Duration::ZERO,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::gemini::GenerateResponse;
    use crate::remote::FileState;
    use crate::test_support::{remote_file, ScriptedModel, ScriptedStore};

    fn answer(text: &str) -> GenerateResponse {
        serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        }))
        .unwrap()
    }

    fn analyzer(
        store: Arc<ScriptedStore>,
        model: Arc<ScriptedModel>,
        dir: &std::path::Path,
    ) -> Analyzer {
        let agent = Arc::new(Agent::new(AgentConfig::default(), model));
        Analyzer::new(
            store,
            agent,
            PollPolicy {
                interval: Duration::from_secs(1),
                timeout: Duration::from_millis(3500),
                max_status_errors: 0,
            },
            dir.to_path_buf(),
            PromptStyle::Detailed,
        )
    }

    fn request(query: &str) -> AnalysisRequest {
        AnalysisRequest {
            file_name: "holiday.mp4".to_string(),
            bytes: Bytes::from_static(b"fake video bytes"),
            query: query.to_string(),
        }
    }

    fn dir_is_empty(dir: &std::path::Path) -> bool {
        std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn blank_query_makes_no_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ScriptedStore::new(vec![]));
        let model = Arc::new(ScriptedModel::new(vec![]));
        let analyzer = analyzer(store.clone(), model.clone(), dir.path());

        for query in ["", "   \n"] {
            let err = analyzer
                .analyze(request(query), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(err.is_warning());
        }

        assert!(store.uploads().is_empty());
        assert_eq!(store.get_calls(), 0);
        assert_eq!(model.calls(), 0);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn unsupported_extension_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ScriptedStore::new(vec![]));
        let model = Arc::new(ScriptedModel::new(vec![]));
        let analyzer = analyzer(store.clone(), model, dir.path());

        let mut req = request("What is shown?");
        req.file_name = "slides.pdf".to_string();
        let err = analyzer.analyze(req, &CancellationToken::new()).await.unwrap_err();

        assert!(err.is_warning());
        assert!(store.uploads().is_empty());
    }

    #[tokio::test]
    async fn ready_immediately_invokes_model_once_and_returns_text_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ScriptedStore::new(vec![]));
        let model = Arc::new(ScriptedModel::new(vec![Ok(answer("**A dog** runs on a beach."))]));
        let analyzer = analyzer(store.clone(), model.clone(), dir.path());

        let outcome = analyzer
            .analyze(request("What is shown?"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.content, "**A dog** runs on a beach.");
        assert_eq!(model.calls(), 1);
        assert_eq!(store.get_calls(), 0);
        assert_eq!(store.uploads()[0].1, "video/mp4");

        let prompt = model.requests()[0].contents[0].parts[0].text.clone().unwrap();
        assert!(prompt.contains("\"What is shown?\""));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn same_input_twice_uploads_twice() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ScriptedStore::new(vec![]));
        let model = Arc::new(ScriptedModel::new(vec![Ok(answer("one")), Ok(answer("two"))]));
        let analyzer = analyzer(store.clone(), model.clone(), dir.path());

        let first = analyzer
            .analyze(request("What is shown?"), &CancellationToken::new())
            .await
            .unwrap();
        let second = analyzer
            .analyze(request("What is shown?"), &CancellationToken::new())
            .await
            .unwrap();

        assert_ne!(first.remote_file.name, second.remote_file.name);
        assert_eq!((first.content.as_str(), second.content.as_str()), ("one", "two"));
        let uploads = store.uploads();
        assert_eq!(uploads.len(), 2);
        assert_ne!(uploads[0].0, uploads[1].0);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn upload_failure_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ScriptedStore::new(vec![]).failing_upload("connection reset"));
        let model = Arc::new(ScriptedModel::new(vec![]));
        let analyzer = analyzer(store.clone(), model.clone(), dir.path());

        let err = analyzer
            .analyze(request("What is shown?"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Upload(_)));
        assert!(err.user_message().starts_with("An error occurred during analysis:"));
        assert_eq!(model.calls(), 0);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn model_failure_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ScriptedStore::new(vec![]));
        let model = Arc::new(ScriptedModel::new(vec![Err(AnalysisError::remote("quota"))]));
        let analyzer = analyzer(store, model, dir.path());

        let err = analyzer
            .analyze(request("What is shown?"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::RemoteProcessing(_)));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_remote_file_times_out_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ScriptedStore::always(remote_file("files/x", FileState::Processing))
                .upload_state(FileState::Processing),
        );
        let model = Arc::new(ScriptedModel::new(vec![]));
        let analyzer = analyzer(store.clone(), model.clone(), dir.path());

        let err = analyzer
            .analyze(request("What is shown?"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Timeout { .. }));
        assert_eq!(store.get_calls(), 3);
        assert_eq!(model.calls(), 0);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_wait_stops_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ScriptedStore::always(remote_file("files/x", FileState::Processing))
                .upload_state(FileState::Processing),
        );
        let model = Arc::new(ScriptedModel::new(vec![]));
        let analyzer = analyzer(store.clone(), model.clone(), dir.path());

        let cancel = CancellationToken::new();
        let trip = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trip.cancel();
        });

        let err = analyzer
            .analyze(request("What is shown?"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Cancelled));
        assert_eq!(store.get_calls(), 1);
        assert_eq!(model.calls(), 0);
        assert!(dir_is_empty(dir.path()));
    }

    /// Swaps the scratch file for a directory so the later delete fails.
    struct BlockingCleanupStore;

    #[async_trait::async_trait]
    impl FileStore for BlockingCleanupStore {
        async fn upload_file(
            &self,
            path: &std::path::Path,
            _mime_type: &str,
            _display_name: &str,
        ) -> AnalysisResult<RemoteFile> {
            std::fs::remove_file(path).unwrap();
            std::fs::create_dir(path).unwrap();
            Err(AnalysisError::upload("quota exceeded"))
        }

        async fn get_file(&self, _name: &str) -> AnalysisResult<RemoteFile> {
            unreachable!("upload never succeeds")
        }
    }

    #[tokio::test]
    async fn failed_cleanup_does_not_mask_the_request_error() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::new(vec![]));
        let agent = Arc::new(Agent::new(AgentConfig::default(), model.clone()));
        let analyzer = Analyzer::new(
            Arc::new(BlockingCleanupStore),
            agent,
            PollPolicy::default(),
            dir.path().to_path_buf(),
            PromptStyle::Detailed,
        );

        let err = analyzer
            .analyze(request("What is shown?"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Upload(ref m) if m == "quota exceeded"));
        assert_eq!(model.calls(), 0);
        // The single delete attempt failed and was not retried
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
        assert!(leftovers[0].as_ref().unwrap().path().is_dir());
    }
}

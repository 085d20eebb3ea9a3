use std::sync::Arc;

use serde::Serialize;

use crate::agent::{Agent, AgentConfig};
use crate::analysis::{AnalysisOutcome, Analyzer};
use crate::config::Config;
use crate::error::ErrorKind;
use crate::gemini::GeminiClient;
use crate::search::DuckDuckGo;

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub config: Config,
}

impl AppState {
    /// Wires the model client, search tool, agent and analyzer from `config`.
    pub fn from_config(config: Config) -> Self {
        let gemini = Arc::new(GeminiClient::new(
            config.model.api_key.clone(),
            config.model.base_url.clone(),
            config.model.model.clone(),
        ));

        let agent_config = AgentConfig {
            max_tool_rounds: config.model.max_tool_rounds,
            search_max_results: config.search.max_results,
            ..AgentConfig::default()
        };
        let mut agent = Agent::new(agent_config, gemini.clone());
        if config.search.enabled {
            agent = agent.with_search(Arc::new(DuckDuckGo::new(config.search.base_url.clone())));
        }

        let analyzer = Analyzer::new(
            gemini,
            Arc::new(agent),
            config.poll.clone(),
            config.scratch_dir.clone(),
            config.model.prompt_style,
        );

        Self {
            analyzer: Arc::new(analyzer),
            config,
        }
    }

    pub fn model_configured(&self) -> bool {
        self.config.model.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub content: String,
    pub model: String,
    pub file_name: String,
    pub remote_file: String,
    pub status_checks: u32,
    pub tool_calls: usize,
    pub elapsed_secs: f64,
}

impl AnalyzeResponse {
    pub fn new(file_name: String, outcome: AnalysisOutcome) -> Self {
        Self {
            content: outcome.content,
            model: outcome.model,
            file_name,
            remote_file: outcome.remote_file.name,
            status_checks: outcome.status_checks,
            tool_calls: outcome.tool_calls,
            elapsed_secs: outcome.elapsed.as_secs_f64(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub model_configured: bool,
    pub search_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
    /// Shown as a warning rather than an error.
    pub warning: bool,
}

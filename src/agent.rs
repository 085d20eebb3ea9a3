//! Agent that bundles the hosted model with the web-search capability.
//!
//! Built once at startup and handed to request handlers through app state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::gemini::{
    Content, FunctionCall, FunctionDeclaration, GenerateRequest, GenerateResponse, Part, Tool,
};
use crate::remote::RemoteFile;
use crate::search::{format_hits, SearchTool};

/// Hosted model that turns a request into a response.
#[async_trait]
pub trait ContentModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest) -> AnalysisResult<GenerateResponse>;
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Ask the model to format its answer as markdown.
    pub markdown: bool,
    /// Model turns that may be spent on tool calls before a final answer is forced.
    pub max_tool_rounds: usize,
    pub search_max_results: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Video Summarizer".to_string(),
            markdown: true,
            max_tool_rounds: 4,
            search_max_results: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub content: String,
    pub model: String,
    pub tool_calls: usize,
}

pub struct Agent {
    config: AgentConfig,
    model: Arc<dyn ContentModel>,
    search: Option<Arc<dyn SearchTool>>,
}

impl Agent {
    pub fn new(config: AgentConfig, model: Arc<dyn ContentModel>) -> Self {
        Self {
            config,
            model,
            search: None,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchTool>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn has_search(&self) -> bool {
        self.search.is_some()
    }

    fn system_instruction(&self) -> Content {
        let mut lines = vec![format!("Your name is {}.", self.config.name)];
        if let Some(search) = &self.search {
            lines.push(format!(
                "You can call the `{}` function to look up information that is not in the video.",
                search.name()
            ));
        }
        if self.config.markdown {
            lines.push("Use markdown to format your answers.".to_string());
        }
        Content::system(lines.join("\n"))
    }

    fn tools(&self) -> Vec<Tool> {
        let Some(search) = &self.search else {
            return Vec::new();
        };
        vec![Tool {
            function_declarations: vec![FunctionDeclaration {
                name: search.name().to_string(),
                description: search.description().to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Search query" },
                        "max_results": { "type": "integer", "description": "Number of results" }
                    },
                    "required": ["query"]
                }),
            }],
        }]
    }

    async fn call_tool(&self, call: &FunctionCall) -> Value {
        let Some(search) = self.search.as_ref().filter(|s| s.name() == call.name) else {
            warn!("[agent] model called unknown function {}", call.name);
            return json!({ "error": format!("unknown function '{}'", call.name) });
        };

        let Some(query) = call.args.get("query").and_then(Value::as_str) else {
            return json!({ "error": "missing 'query' argument" });
        };
        let max_results = call
            .args
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(self.config.search_max_results)
            .min(self.config.search_max_results.max(1));

        match search.search(query, max_results).await {
            Ok(hits) => json!({ "results": format_hits(&hits) }),
            Err(e) => {
                warn!("[agent] search for {:?} failed: {:#}", query, e);
                json!({ "error": format!("{:#}", e) })
            }
        }
    }

    /// Sends `prompt` with `videos` attached and returns the model's final text.
    pub async fn run(&self, prompt: &str, videos: &[RemoteFile]) -> AnalysisResult<AgentResponse> {
        let mut parts = vec![Part::text(prompt)];
        parts.extend(videos.iter().map(Part::file));

        let mut request = GenerateRequest {
            contents: vec![Content::user(parts)],
            system_instruction: Some(self.system_instruction()),
            tools: Vec::new(),
        };
        let mut tool_calls = 0usize;

        for round in 0..=self.config.max_tool_rounds {
            // Last round goes out without tools so the model has to answer
            request.tools = if round < self.config.max_tool_rounds {
                self.tools()
            } else {
                Vec::new()
            };

            let mut content = self.model.generate(&request).await?.into_content()?;
            let calls: Vec<FunctionCall> = content.function_calls().cloned().collect();

            if calls.is_empty() || request.tools.is_empty() {
                let text = content.text();
                if text.trim().is_empty() {
                    return Err(AnalysisError::remote("model returned an empty response"));
                }
                info!(
                    "[agent] ✅ {} answered after {} tool calls ({} chars)",
                    self.model_id(),
                    tool_calls,
                    text.len()
                );
                return Ok(AgentResponse {
                    content: text,
                    model: self.model_id().to_string(),
                    tool_calls,
                });
            }

            let mut responses = Vec::with_capacity(calls.len());
            for call in &calls {
                tool_calls += 1;
                info!("[agent] 🔧 round {} calling {}", round + 1, call.name);
                let result = self.call_tool(call).await;
                responses.push(Part::function_response(call.name.clone(), result));
            }

            content.role = Some("model".to_string());
            request.contents.push(content);
            request.contents.push(Content::user(responses));
        }

        Err(AnalysisError::remote("model did not produce a final answer"))
    }
}

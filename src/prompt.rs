use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

pub const EMPTY_QUERY_WARNING: &str = "Please enter a question or insight to analyze the video.";

/// Which instruction template wraps the user's question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// Summary, themes, answer and web research, spelled out in full.
    #[default]
    Detailed,
    /// Shorter four-point layout asking for markdown output.
    Concise,
}

impl FromStr for PromptStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detailed" => Ok(PromptStyle::Detailed),
            "concise" => Ok(PromptStyle::Concise),
            other => Err(format!("unknown prompt style '{}'", other)),
        }
    }
}

/// Rejects empty or whitespace-only queries and returns the trimmed text.
pub fn validate_query(query: &str) -> AnalysisResult<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::validation(EMPTY_QUERY_WARNING));
    }
    Ok(trimmed)
}

/// Builds the instruction text sent alongside the video.
///
/// Expects a query that already passed [`validate_query`].
pub fn build_analysis_prompt(query: &str, style: PromptStyle) -> String {
    match style {
        PromptStyle::Detailed => format!(
            r#"You are an advanced AI assistant tasked with analyzing the content and context of the uploaded video.
Your goal is to provide a comprehensive summary and insights based on the video content.

Here is the user's query:
"{query}"

Please perform the following tasks:
1. Summarize the main points and key takeaways from the video.
2. Identify any important themes, topics, or concepts discussed.
3. Provide answers or insights related to the user's query using information from the video.
4. Supplement your response with relevant web research if necessary.

Ensure your response is detailed, user-friendly, and actionable."#
        ),
        PromptStyle::Concise => format!(
            r#"Analyze this video and provide insights based on this query: "{query}"

Please provide:
1. Summary of key points
2. Direct answer to the query
3. Additional insights
4. Related context from web research (if needed)

Format the response in a clear, organized way using markdown."#
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_queries_are_rejected() {
        for query in ["", "   ", "\n\t "] {
            let err = validate_query(query).unwrap_err();
            assert!(err.is_warning());
            assert_eq!(err.to_string(), EMPTY_QUERY_WARNING);
        }
    }

    #[test]
    fn query_is_trimmed() {
        assert_eq!(validate_query("  What is shown?\n").unwrap(), "What is shown?");
    }

    #[test]
    fn detailed_prompt_embeds_query_and_tasks() {
        let prompt = build_analysis_prompt("What is shown?", PromptStyle::Detailed);
        assert!(prompt.contains("\"What is shown?\""));
        assert!(prompt.contains("Summarize the main points"));
        assert!(prompt.contains("Identify any important themes"));
        assert!(prompt.contains("web research"));
    }

    #[test]
    fn concise_prompt_asks_for_markdown() {
        let prompt = build_analysis_prompt("Who speaks?", PromptStyle::Concise);
        assert!(prompt.starts_with("Analyze this video"));
        assert!(prompt.contains("\"Who speaks?\""));
        assert!(prompt.contains("markdown"));
    }

    #[test]
    fn style_parses_case_insensitively() {
        assert_eq!("Concise".parse::<PromptStyle>().unwrap(), PromptStyle::Concise);
        assert!("verbose".parse::<PromptStyle>().is_err());
    }
}

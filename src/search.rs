//! Web search capability the agent can call for open-domain lookups.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information related to the video or the user's question."
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// DuckDuckGo Instant Answer API client.
pub struct DuckDuckGo {
    base_url: String,
    client: Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

impl DuckDuckGo {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

fn flatten_topics(topics: Vec<RelatedTopic>, hits: &mut Vec<SearchHit>) {
    for topic in topics {
        match topic {
            RelatedTopic::Topic { text, first_url } => {
                // Topic text reads "Title - snippet"
                let title = text
                    .split(" - ")
                    .next()
                    .unwrap_or(text.as_str())
                    .to_string();
                hits.push(SearchHit {
                    title,
                    url: first_url,
                    snippet: text,
                });
            }
            RelatedTopic::Group { topics } => flatten_topics(topics, hits),
        }
    }
}

fn hits_from_answer(answer: InstantAnswer, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    if !answer.abstract_text.is_empty() {
        hits.push(SearchHit {
            title: answer.heading,
            url: answer.abstract_url,
            snippet: answer.abstract_text,
        });
    }
    flatten_topics(answer.related_topics, &mut hits);
    hits.truncate(max_results);
    hits
}

#[async_trait]
impl SearchTool for DuckDuckGo {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        info!("[search] 🔎 {} (max {})", query, max_results);

        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .context("search request failed")?
            .error_for_status()
            .context("search service returned an error")?;

        // The API answers with a javascript content type, so parse the body by hand
        let body = response.text().await.context("failed to read search response")?;
        let answer: InstantAnswer =
            serde_json::from_str(&body).context("failed to parse search response")?;

        let hits = hits_from_answer(answer, max_results);
        debug!("[search] {} hits for {}", hits.len(), query);
        Ok(hits)
    }
}

/// Renders hits as a numbered markdown list for the model.
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, h)| format!("{}. [{}]({})\n   {}", i + 1, h.title, h.url, h.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

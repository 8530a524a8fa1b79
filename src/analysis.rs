//! Ranking/analysis client.
//!
//! Wraps the external language-model call that consumes the fused top-k
//! chunks and the query, producing free-text analysis: per-candidate
//! strengths and weaknesses, a suitability score out of 10, development
//! suggestions, and a final ranked ordering with justification. The prompt is
//! assembled by a pure function; the HTTP call runs at low temperature for
//! reproducibility and uses the same retry policy as the embedding client.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::error::{EngineError, Result};

/// One matched excerpt handed to the analysis model, tagged with the file it
/// came from.
#[derive(Debug, Clone)]
pub struct AnalysisExcerpt {
    pub source: String,
    pub text: String,
}

/// A ranking/analysis backend.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Analyze the matched excerpts against the query, returning the model's
    /// free-text output verbatim.
    async fn analyze(&self, query: &str, excerpts: &[AnalysisExcerpt]) -> Result<String>;
}

/// Assemble the recruiter instruction prompt from the matched excerpts.
pub fn build_prompt(query: &str, excerpts: &[AnalysisExcerpt]) -> String {
    let context = excerpts
        .iter()
        .map(|e| format!("[{}]\n{}", e.source, e.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an expert recruiter tasked with analyzing resumes and finding the best match \
for a given job description.\n\
\n\
Candidate resumes:\n\
{context}\n\
\n\
Based on the candidate resumes provided, analyze and evaluate the candidates' suitability \
for the position. Consider the following:\n\
\n\
1. Skills match: identify key skills and how well each candidate's skills align with the \
job requirements.\n\
2. Experience relevance: evaluate the candidates' past experience and its relevance to the \
job requirements.\n\
3. Education and qualifications: assess the candidates' educational background.\n\
4. Potential for growth: consider any indicators of the candidates' potential to grow into \
the role.\n\
5. Cultural fit: look for any information that might indicate how well the candidates would \
fit into the company culture.\n\
\n\
For each candidate, provide:\n\
- A brief summary of their strengths and weaknesses.\n\
- A suitability score out of 10.\n\
- Suggestions for areas where the candidate might need further development.\n\
\n\
Finally, rank the candidates in order of suitability, explaining your reasoning.\n\
\n\
Question: {query}\n\
\n\
Your analysis:"
    )
}

/// Analysis provider for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiAnalysisProvider {
    client: reqwest::Client,
    config: AnalysisConfig,
    api_key: String,
}

impl OpenAiAnalysisProvider {
    /// Create a provider from configuration. The API key is read from the
    /// environment variable named by `config.api_key_env`.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EngineError::AnalysisService(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::AnalysisService(e.to_string()))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    async fn request_completion(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [ { "role": "user", "content": prompt } ],
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying analysis request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EngineError::AnalysisService(e.to_string()))?;
                        return parse_completion_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, "analysis request failed, will retry");
                        last_err = Some(EngineError::AnalysisService(format!(
                            "analysis API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    return Err(EngineError::AnalysisService(format!(
                        "analysis API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    warn!(error = %e, "analysis request network error, will retry");
                    last_err = Some(EngineError::AnalysisService(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            EngineError::AnalysisService("analysis failed after retries".to_string())
        }))
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiAnalysisProvider {
    async fn analyze(&self, query: &str, excerpts: &[AnalysisExcerpt]) -> Result<String> {
        let prompt = build_prompt(query, excerpts);
        self.request_completion(&prompt).await
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            EngineError::AnalysisService("invalid completion response: missing content".into())
        })
}

/// Build the analysis provider described by the configuration.
pub fn create_provider(config: &AnalysisConfig) -> Result<std::sync::Arc<dyn AnalysisProvider>> {
    Ok(std::sync::Arc::new(OpenAiAnalysisProvider::new(
        config.clone(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excerpts() -> Vec<AnalysisExcerpt> {
        vec![
            AnalysisExcerpt {
                source: "alice.pdf".to_string(),
                text: "5 years Python, Django, AWS".to_string(),
            },
            AnalysisExcerpt {
                source: "bob.pdf".to_string(),
                text: "2 years graphic design".to_string(),
            },
        ]
    }

    #[test]
    fn test_prompt_contains_query_and_excerpts() {
        let prompt = build_prompt("Python backend experience", &excerpts());
        assert!(prompt.contains("Question: Python backend experience"));
        assert!(prompt.contains("[alice.pdf]\n5 years Python, Django, AWS"));
        assert!(prompt.contains("[bob.pdf]"));
    }

    #[test]
    fn test_prompt_covers_all_criteria() {
        let prompt = build_prompt("q", &excerpts());
        for criterion in [
            "Skills match",
            "Experience relevance",
            "Education and qualifications",
            "Potential for growth",
            "Cultural fit",
            "suitability score out of 10",
            "rank the candidates",
        ] {
            assert!(prompt.contains(criterion), "missing criterion: {}", criterion);
        }
    }

    #[test]
    fn test_prompt_preserves_excerpt_order() {
        let prompt = build_prompt("q", &excerpts());
        let alice = prompt.find("alice.pdf").unwrap();
        let bob = prompt.find("bob.pdf").unwrap();
        assert!(alice < bob);
    }

    #[test]
    fn test_parse_completion_response() {
        let json = serde_json::json!({
            "choices": [ { "message": { "content": "Candidate A ranks first." } } ]
        });
        assert_eq!(
            parse_completion_response(&json).unwrap(),
            "Candidate A ranks first."
        );
    }

    #[test]
    fn test_parse_completion_missing_content() {
        let json = serde_json::json!({ "choices": [] });
        assert!(matches!(
            parse_completion_response(&json),
            Err(EngineError::AnalysisService(_))
        ));
    }
}

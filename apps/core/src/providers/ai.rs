use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{preview_text, Action, Candidate, ProviderId};
use crate::registry::{Latency, Provider, ProviderError, QueryContext};

const MODEL: &str = "gemini-2.5-flash";
const ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TITLE_CHARS: usize = 100;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<PartIn<'a>>,
}

#[derive(Debug, Serialize)]
struct PartIn<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<PartOut>,
}

#[derive(Debug, Default, Deserialize)]
struct PartOut {
    #[serde(default)]
    text: Option<String>,
}

/// One-shot questions to Gemini. The answer row copies the full reply.
pub struct AiAssistant {
    api_key: Option<String>,
}

impl AiAssistant {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn ask(&self, key: &str, question: &str) -> Result<String, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::new(format!("http client: {e}")))?;
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![PartIn { text: question }],
            }],
        };
        let response = client
            .post(format!("{ENDPOINT}/{MODEL}:generateContent"))
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .map_err(|e| ProviderError::new(format!("Gemini request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::new(format!("Gemini returned {status}")));
        }
        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| ProviderError::new(format!("bad Gemini response: {e}")))?;
        answer_text(parsed).ok_or_else(|| ProviderError::new("Gemini returned no text"))
    }
}

impl Provider for AiAssistant {
    fn id(&self) -> ProviderId {
        ProviderId::Ai
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let Some(key) = self.api_key.as_deref() else {
            return Ok(vec![Candidate::info(
                "ai:no-key",
                "Gemini API key not found",
                "Set api_keys.gemini in config.toml",
            )]);
        };
        let question = query.residual.trim();
        if question.is_empty() {
            return Ok(vec![Candidate::info(
                "ai:hint",
                "Ask Gemini anything",
                "Type a question after the prefix",
            )]);
        }

        let answer = self.ask(key, question)?;
        if query.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        debug!(chars = answer.len(), "Gemini answered");
        Ok(vec![Candidate::new(
            "ai:answer",
            preview_text(&answer, TITLE_CHARS),
            Action::CopyText { text: answer },
        )
        .with_subtitle(format!("{MODEL} · Copy answer"))
        .with_icon("dialog-question")
        .pinned()])
    }

    fn latency(&self) -> Latency {
        Latency::Blocking
    }
}

fn answer_text(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

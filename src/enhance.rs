use crate::error::{ReportError, Result, Stage};
use crate::model::ReportDraft;
use crate::narrative::{SecurityCode, Weekday};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Enhancement flags, each independently toggled and explicitly defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceOptions {
    pub auto_correct: bool,
    pub enhance_writing: bool,
    pub suggest_content: bool,
    pub generate_summary: bool,
    pub analyze_threats: bool,
    pub highlight_patterns: bool,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            auto_correct: true,
            enhance_writing: true,
            suggest_content: false,
            generate_summary: false,
            analyze_threats: false,
            highlight_patterns: false,
        }
    }
}

/// One day's text as exchanged with the enhancement service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSuggestion {
    pub day: Weekday,
    pub content: String,
    #[serde(default)]
    pub code: Option<SecurityCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceRequest {
    pub narratives: Vec<NarrativeSuggestion>,
    pub summary: String,
    pub options: EnhanceOptions,
}

impl EnhanceRequest {
    /// Builds the request from the draft: up to seven narratives, empty
    /// days omitted.
    pub fn from_draft(draft: &ReportDraft, options: EnhanceOptions) -> Self {
        let narratives = draft
            .narratives
            .iter()
            .filter(|entry| entry.is_complete())
            .map(|entry| NarrativeSuggestion {
                day: entry.day,
                content: entry.content.clone(),
                code: Some(entry.code),
            })
            .collect();
        Self {
            narratives,
            summary: draft.summary_text.clone(),
            options,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhanceResponse {
    #[serde(default)]
    pub narratives: Vec<NarrativeSuggestion>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// The text-enhancement collaborator. Stateless and idempotent per call;
/// it never mutates the draft itself.
#[async_trait]
pub trait TextEnhancer: Send + Sync {
    async fn enhance(&self, request: &EnhanceRequest) -> Result<EnhanceResponse>;
}

/// Reference implementation against an HTTP JSON endpoint.
pub struct HttpTextEnhancer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTextEnhancer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl TextEnhancer for HttpTextEnhancer {
    async fn enhance(&self, request: &EnhanceRequest) -> Result<EnhanceResponse> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| ReportError::transient(Stage::Enhancement, e.to_string()))?;
        if !response.status().is_success() {
            return Err(ReportError::transient(
                Stage::Enhancement,
                format!("service returned {}", response.status()),
            ));
        }
        response
            .json::<EnhanceResponse>()
            .await
            .map_err(|e| ReportError::transient(Stage::Enhancement, e.to_string()))
    }
}

/// Merges a response into the draft, matching by weekday key. Days absent
/// from the response are left unchanged; the summary is only replaced when
/// it was requested. Narrative status is untouched; confirming suggestions
/// is an explicit human step.
pub fn apply_response(
    draft: &mut ReportDraft,
    response: &EnhanceResponse,
    options: EnhanceOptions,
) {
    for suggestion in &response.narratives {
        if suggestion.content.trim().is_empty() {
            continue;
        }
        let existing = draft.narratives.day(suggestion.day);
        let status = existing.status;
        let code = suggestion.code.unwrap_or(existing.code);
        draft
            .narratives
            .set_day(suggestion.day, suggestion.content.clone(), status, code);
    }
    if options.generate_summary {
        if let Some(summary) = &response.summary {
            if !summary.trim().is_empty() {
                draft.summary_text = summary.clone();
            }
        }
    }
}

//! Transcript scoring.
//!
//! [`FeedbackService`] is what the completion dispatcher talks to. The bundled
//! [`LlmFeedbackService`] asks the configured model for a structured
//! assessment and stores it in the `feedback` collection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use prepwise_core::config::Config;
use prepwise_core::error::{PrepwiseError, Result};
use prepwise_core::store::{DocumentStore, save_feedback};
use prepwise_core::types::{
    CategoryScore, FeedbackRecord, InterviewRecord, SavedMessage, deserialize_score,
};
use prepwise_providers::ProviderHandle;

/// Categories every assessment is scored on, in display order.
pub const FEEDBACK_CATEGORIES: [&str; 5] = [
    "Communication Skills",
    "Technical Knowledge",
    "Problem Solving",
    "Cultural & Role Fit",
    "Confidence & Clarity",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub interview_id: String,
    pub user_id: String,
    pub transcript: Vec<SavedMessage>,
    /// Existing feedback document to overwrite, if any.
    pub feedback_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOutcome {
    pub success: bool,
    pub feedback_id: Option<String>,
}

impl FeedbackOutcome {
    pub fn saved(feedback_id: impl Into<String>) -> Self {
        Self {
            success: true,
            feedback_id: Some(feedback_id.into()),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            feedback_id: None,
        }
    }
}

#[async_trait]
pub trait FeedbackService: Send + Sync {
    async fn create_feedback(&self, request: FeedbackRequest) -> Result<FeedbackOutcome>;
}

/// Model output before it is stamped with ids and a timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDraft {
    #[serde(deserialize_with = "deserialize_score")]
    pub total_score: u32,
    #[serde(default)]
    pub category_scores: Vec<CategoryScore>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub areas_for_improvement: Vec<String>,
    #[serde(default)]
    pub final_assessment: String,
}

impl FeedbackDraft {
    fn into_record(self, request: &FeedbackRequest) -> FeedbackRecord {
        FeedbackRecord {
            interview_id: request.interview_id.clone(),
            user_id: request.user_id.clone(),
            total_score: self.total_score,
            category_scores: self.category_scores,
            strengths: self.strengths,
            areas_for_improvement: self.areas_for_improvement,
            final_assessment: self.final_assessment,
            created_at: InterviewRecord::timestamp(Utc::now()),
        }
    }
}

/// Render a transcript as `- role: content` lines.
pub fn format_transcript(messages: &[SavedMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("- {}: {}\n", m.role.as_str(), m.content))
        .collect()
}

pub fn build_feedback_prompt(formatted_transcript: &str) -> String {
    let categories = FEEDBACK_CATEGORIES
        .iter()
        .map(|c| format!("- **{c}**"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are an AI interviewer analyzing a mock interview. Your task is to evaluate the candidate based on structured categories. Be thorough and detailed in your analysis. Don't be lenient with the candidate. If there are mistakes or areas for improvement, point them out.
Transcript:
{formatted_transcript}
Please score the candidate from 0 to 100 in the following areas. Do not add categories other than the ones provided:
{categories}

Return only a JSON object with the keys totalScore, categoryScores (an array of objects with name, score and comment), strengths, areasForImprovement and finalAssessment."
    )
}

/// Parse the model reply, tolerating prose around the JSON object.
pub fn parse_feedback(raw: &str) -> Result<FeedbackDraft> {
    let trimmed = raw.trim();
    if let Ok(draft) = serde_json::from_str::<FeedbackDraft>(trimmed) {
        return Ok(draft);
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => serde_json::from_str(&trimmed[s..=e])
            .map_err(|err| PrepwiseError::Parse(format!("feedback JSON: {err}"))),
        _ => Err(PrepwiseError::Parse(
            "no JSON object in feedback response".into(),
        )),
    }
}

/// Scores transcripts with the configured text-generation provider.
pub struct LlmFeedbackService {
    config: Arc<Config>,
    provider: ProviderHandle,
    store: Arc<dyn DocumentStore>,
}

impl LlmFeedbackService {
    pub fn new(config: Arc<Config>, provider: ProviderHandle, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config,
            provider,
            store,
        }
    }
}

#[async_trait]
impl FeedbackService for LlmFeedbackService {
    async fn create_feedback(&self, request: FeedbackRequest) -> Result<FeedbackOutcome> {
        let prompt = build_feedback_prompt(&format_transcript(&request.transcript));

        let raw = self
            .provider
            .generate(&self.config, &prompt)
            .await
            .map_err(|e| PrepwiseError::Provider(e.to_string()))?;

        let draft = match parse_feedback(&raw) {
            Ok(d) => d,
            Err(e) => {
                error!(interview_id = %request.interview_id, %e, "Unusable feedback response");
                return Ok(FeedbackOutcome::failed());
            }
        };

        let record = draft.into_record(&request);
        match save_feedback(self.store.as_ref(), request.feedback_id.as_deref(), &record).await {
            Ok(id) => {
                info!(
                    interview_id = %request.interview_id,
                    feedback_id = %id,
                    total_score = record.total_score,
                    "Feedback saved"
                );
                Ok(FeedbackOutcome::saved(id))
            }
            Err(e) => {
                error!(interview_id = %request.interview_id, %e, "Failed to save feedback");
                Ok(FeedbackOutcome::failed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prepwise_core::store::{FEEDBACK, MemoryDocumentStore};
    use prepwise_core::types::MessageRole;
    use prepwise_providers::{
        ChunkStream, CompletionChunk, CompletionRequest, Credentials, LlmProvider,
    };

    struct ScriptedProvider {
        reply: &'static str,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn format_prompt(&self, prompt: &str) -> Vec<serde_json::Value> {
            vec![serde_json::json!({ "text": prompt })]
        }

        async fn stream(
            &self,
            _request: &CompletionRequest,
            _credentials: &Credentials,
        ) -> anyhow::Result<ChunkStream> {
            let chunk = CompletionChunk {
                delta: Some(self.reply.to_string()),
                ..CompletionChunk::default()
            };
            let chunks: Vec<anyhow::Result<CompletionChunk>> = vec![Ok(chunk)];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    fn service(reply: &'static str, store: Arc<MemoryDocumentStore>) -> LlmFeedbackService {
        let provider = ProviderHandle::new(Arc::new(ScriptedProvider { reply }), Credentials::None);
        LlmFeedbackService::new(Arc::new(Config::default()), provider, store)
    }

    fn request(feedback_id: Option<&str>) -> FeedbackRequest {
        FeedbackRequest {
            interview_id: "int-1".into(),
            user_id: "user-1".into(),
            transcript: vec![
                SavedMessage::new(MessageRole::Assistant, "Why Rust?"),
                SavedMessage::new(MessageRole::User, "Memory safety."),
            ],
            feedback_id: feedback_id.map(String::from),
        }
    }

    const REPLY: &str = r#"Here is the assessment:
{"totalScore": 140, "categoryScores": [{"name": "Communication Skills", "score": 70, "comment": "Clear"}],
 "strengths": ["Concise"], "areasForImprovement": ["Depth"], "finalAssessment": "Solid start."}"#;

    #[test]
    fn test_format_transcript_lines() {
        let formatted = format_transcript(&request(None).transcript);
        assert_eq!(formatted, "- assistant: Why Rust?\n- user: Memory safety.\n");
    }

    #[test]
    fn test_prompt_lists_categories() {
        let prompt = build_feedback_prompt("- user: hi\n");
        for c in FEEDBACK_CATEGORIES {
            assert!(prompt.contains(c));
        }
        assert!(prompt.contains("- user: hi"));
    }

    #[test]
    fn test_parse_feedback_wrapped_and_invalid() {
        let draft = parse_feedback(REPLY).unwrap();
        assert_eq!(draft.total_score, 100);
        assert_eq!(draft.category_scores[0].name, "Communication Skills");

        let err = parse_feedback("I cannot score this.").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn test_parse_feedback_fractional_scores_and_missing_comment() {
        let draft = parse_feedback(
            r#"{"totalScore": 72.5, "categoryScores": [{"name": "Technical Knowledge", "score": 68.2}],
                "strengths": [], "areasForImprovement": [], "finalAssessment": "Fine."}"#,
        )
        .unwrap();
        assert_eq!(draft.total_score, 73);
        assert_eq!(draft.category_scores[0].score, 68);
        assert_eq!(draft.category_scores[0].comment, "");
    }

    #[tokio::test]
    async fn test_fractional_reply_still_saves_feedback() {
        let store = Arc::new(MemoryDocumentStore::new());
        let svc = service(
            r#"{"totalScore": 81.5, "categoryScores": [{"name": "Problem Solving", "score": 90.5}]}"#,
            store.clone(),
        );

        let outcome = svc.create_feedback(request(None)).await.unwrap();
        assert!(outcome.success);
        let id = outcome.feedback_id.unwrap();

        let saved = store.get(FEEDBACK, &id).await.unwrap().unwrap();
        assert_eq!(saved["totalScore"], 82);
        assert_eq!(saved["categoryScores"][0]["score"], 91);
        assert_eq!(saved["categoryScores"][0]["comment"], "");
    }

    #[tokio::test]
    async fn test_create_feedback_persists_record() {
        let store = Arc::new(MemoryDocumentStore::new());
        let svc = service(REPLY, store.clone());

        let outcome = svc.create_feedback(request(Some("fb-7"))).await.unwrap();
        assert_eq!(outcome, FeedbackOutcome::saved("fb-7"));

        let saved = store.get(FEEDBACK, "fb-7").await.unwrap().unwrap();
        assert_eq!(saved["interviewId"], "int-1");
        assert_eq!(saved["totalScore"], 100);
        assert_eq!(saved["strengths"][0], "Concise");
    }

    #[tokio::test]
    async fn test_unparseable_reply_reports_failure() {
        let store = Arc::new(MemoryDocumentStore::new());
        let svc = service("no json here", store.clone());

        let outcome = svc.create_feedback(request(None)).await.unwrap();
        assert_eq!(outcome, FeedbackOutcome::failed());
        assert_eq!(store.count(FEEDBACK).await, 0);
    }
}

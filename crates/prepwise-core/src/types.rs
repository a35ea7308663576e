use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Speaker role attached to a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    System,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Assistant => "assistant",
        }
    }
}

/// A finalized utterance captured during a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedMessage {
    pub role: MessageRole,
    pub content: String,
}

impl SavedMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// What a call is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    /// Voice workflow that collects parameters and triggers question generation.
    Generate,
    /// Live interview over previously generated questions.
    #[default]
    Interview,
}

impl std::str::FromStr for CallPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(Self::Generate),
            "interview" => Ok(Self::Interview),
            other => Err(format!("unknown call purpose: {other}")),
        }
    }
}

/// Persisted interview document. Field names match the stored camelCase layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    pub role: String,
    #[serde(rename = "type")]
    pub interview_type: String,
    pub level: String,
    pub techstack: Vec<String>,
    pub questions: Vec<String>,
    pub user_id: String,
    pub finalized: bool,
    pub cover_image: String,
    pub created_at: String,
}

impl InterviewRecord {
    /// ISO-8601 timestamp with millisecond precision and a `Z` suffix.
    pub fn timestamp(now: DateTime<Utc>) -> String {
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Split a comma-separated tech stack into trimmed entries in input order.
pub fn split_techstack(raw: &str) -> Vec<String> {
    raw.split(',').map(|t| t.trim().to_string()).collect()
}

/// Round a model-reported score to a whole number in `0..=100`.
pub fn clamp_score(raw: f64) -> u32 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u32
}

/// Accept any JSON number as a score; see [`clamp_score`].
pub fn deserialize_score<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    f64::deserialize(deserializer).map(clamp_score)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub name: String,
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u32,
    #[serde(default)]
    pub comment: String,
}

/// Scored assessment of an interview transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub interview_id: String,
    pub user_id: String,
    #[serde(deserialize_with = "deserialize_score")]
    pub total_score: u32,
    pub category_scores: Vec<CategoryScore>,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub final_assessment: String,
    pub created_at: String,
}

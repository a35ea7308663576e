//! `/api/vapi/generate`: generate interview questions and persist the interview.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use prepwise_core::config::Config;
use prepwise_core::cover::random_interview_cover;
use prepwise_core::error::{PrepwiseError, Result};
use prepwise_core::store::{DocumentStore, save_interview};
use prepwise_core::types::{InterviewRecord, split_techstack};
use prepwise_providers::ProviderHandle;

use crate::error::ApiError;
use crate::prompt::build_question_prompt;
use crate::questions::parse_questions;
use crate::state::AppState;

/// Raw request body. Fields stay loosely typed so that wrong types and
/// missing values are reported the same way.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    #[serde(rename = "type")]
    pub interview_type: Option<Value>,
    pub role: Option<Value>,
    pub level: Option<Value>,
    pub techstack: Option<Value>,
    pub amount: Option<Value>,
    pub userid: Option<Value>,
}

/// Validated generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    pub interview_type: String,
    pub role: String,
    pub level: String,
    /// Comma-separated, as sent by the client.
    pub techstack: String,
    pub amount: u64,
    pub user_id: String,
}

impl GenerateRequest {
    pub fn validate(&self) -> std::result::Result<GenerateParams, ApiError> {
        let params = (|| {
            Some(GenerateParams {
                interview_type: text(&self.interview_type)?,
                role: text(&self.role)?,
                level: text(&self.level)?,
                techstack: text(&self.techstack)?,
                amount: count(&self.amount)?,
                user_id: text(&self.userid)?,
            })
        })();
        params.ok_or_else(ApiError::missing_fields)
    }
}

fn text(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// A positive integer, given either as a number or a numeric string.
/// Whole floats such as `5.0` count; fractional ones do not.
fn count(value: &Option<Value>) -> Option<u64> {
    let n = match value {
        Some(Value::Number(n)) => match n.as_u64() {
            Some(n) => n,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 || f < 0.0 || f > u64::MAX as f64 {
                    return None;
                }
                f as u64
            }
        },
        Some(Value::String(s)) => s.trim().parse().ok()?,
        _ => return None,
    };
    (n > 0).then_some(n)
}

/// Generate questions for `params` and persist the resulting interview.
/// Returns the new interview id. Nothing is written unless generation and
/// parsing both succeed.
pub async fn create_interview(
    config: &Config,
    provider: &ProviderHandle,
    store: &dyn DocumentStore,
    params: &GenerateParams,
) -> Result<String> {
    info!(
        role = %params.role,
        level = %params.level,
        amount = params.amount,
        provider = provider.provider.id(),
        "Generating interview questions"
    );

    let prompt = build_question_prompt(params);
    let raw = provider
        .generate(config, &prompt)
        .await
        .map_err(|e| PrepwiseError::Provider(format!("{e:#}")))?;
    debug!(reply = %raw, "Model reply");

    let questions = parse_questions(&raw).inspect_err(|_| {
        warn!(reply = %raw, "Model reply did not contain a question list");
    })?;

    let record = InterviewRecord {
        role: params.role.clone(),
        interview_type: params.interview_type.clone(),
        level: params.level.clone(),
        techstack: split_techstack(&params.techstack),
        questions,
        user_id: params.user_id.clone(),
        finalized: true,
        cover_image: random_interview_cover(),
        created_at: InterviewRecord::timestamp(Utc::now()),
    };

    let interview_id = save_interview(store, &record).await?;
    info!(
        interview_id = %interview_id,
        questions = record.questions.len(),
        "Interview saved"
    );
    Ok(interview_id)
}

/// `POST /api/vapi/generate`
pub async fn generate_interview(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> std::result::Result<Json<Value>, ApiError> {
    let request: GenerateRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Rejected generate request body");
        ApiError::BadRequest(format!("Invalid JSON body: {e}"))
    })?;

    let params = request.validate().inspect_err(|_| {
        warn!(?request, "Missing required fields");
    })?;

    let interview_id =
        create_interview(&state.config, &state.provider, state.store.as_ref(), &params).await?;

    Ok(Json(json!({
        "success": true,
        "interviewId": interview_id,
        "message": "Interview created successfully",
    })))
}

/// `GET /api/vapi/generate`
pub async fn generate_status() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": "Interview API is running",
    }))
}

/// `OPTIONS /api/vapi/generate`. Preflight headers come from the CORS layer.
pub async fn generate_options() -> Json<Value> {
    Json(json!({}))
}

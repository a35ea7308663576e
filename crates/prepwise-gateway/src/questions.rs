//! Turning model output into a question list.

use prepwise_core::error::{PrepwiseError, Result};

pub const PARSE_FAILURE: &str = "Could not parse questions from AI response";

/// Parse the model's reply as a JSON array of questions.
///
/// The reply is tried as-is first. Models often wrap the array in prose or a
/// code fence, so the fallback takes the text between the first `[` and the
/// next `]` and parses that. An empty list counts as a failure.
pub fn parse_questions(raw: &str) -> Result<Vec<String>> {
    let questions = serde_json::from_str::<Vec<String>>(raw.trim())
        .ok()
        .or_else(|| {
            let inner = first_bracketed(raw)?;
            serde_json::from_str::<Vec<String>>(&format!("[{inner}]")).ok()
        });

    match questions {
        Some(q) if !q.is_empty() => Ok(q),
        _ => Err(PrepwiseError::Parse(PARSE_FAILURE.into())),
    }
}

/// Text between the first `[` and the first `]` after it.
fn first_bracketed(text: &str) -> Option<&str> {
    let open = text.find('[')?;
    let rest = &text[open + 1..];
    let close = rest.find(']')?;
    Some(&rest[..close])
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Client-side destinations after a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    Home,
    Feedback { interview_id: String },
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Feedback { interview_id } => format!("/interview/{interview_id}/feedback"),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Moves the user to another view.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

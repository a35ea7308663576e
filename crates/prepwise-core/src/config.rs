//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level Prepwise configuration, read from a JSON5 file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    3000
}

// --- Typed provider config ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<ProviderConfig>>,
}

/// Configuration for a single LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Settings for question and feedback generation requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

// --- Storage ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Jsonl,
    Memory,
    Firestore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory for the JSONL backend (default: `~/.prepwise/store`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub firestore: Option<FirestoreConfig>,
}

/// Firestore REST access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirestoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id_env: Option<String>,
    /// OAuth2 bearer token (e.g. from `gcloud auth print-access-token`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_env: Option<String>,
    #[serde(default = "default_firestore_database")]
    pub database: String,
}

fn default_firestore_database() -> String {
    "(default)".into()
}

impl FirestoreConfig {
    pub fn resolve_project_id(&self) -> Option<String> {
        resolve_secret_field(&self.project_id, &self.project_id_env)
    }

    pub fn resolve_access_token(&self) -> Option<String> {
        resolve_secret_field(&self.access_token, &self.access_token_env)
    }
}

// --- Voice ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Voice workflow used for question-generation calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id_env: Option<String>,

    /// Assistant definition for interview calls. A built-in interviewer is used when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant: Option<serde_json::Value>,
}

impl VoiceConfig {
    pub fn resolve_workflow_id(&self) -> Option<String> {
        resolve_secret_field(&self.workflow_id, &self.workflow_id_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "prepwise_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::PrepwiseError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::PrepwiseError::Io)?;

        let substituted = substitute_env_vars(&raw)?;

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::PrepwiseError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file path.
    pub fn config_dir() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(3000)
    }

    /// Gateway bind address.
    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// Model used for generation: explicit `generation.model`, then the first
    /// provider's default, then Gemini Flash.
    pub fn default_model(&self) -> String {
        self.generation
            .as_ref()
            .and_then(|g| g.model.clone())
            .or_else(|| self.first_provider().and_then(|p| p.default_model.clone()))
            .unwrap_or_else(|| "gemini-2.0-flash".to_string())
    }

    pub fn max_tokens(&self) -> u32 {
        self.generation
            .as_ref()
            .and_then(|g| g.max_tokens)
            .unwrap_or(2048)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.generation.as_ref().and_then(|g| g.temperature)
    }

    /// Get the first provider config.
    pub fn first_provider(&self) -> Option<&ProviderConfig> {
        self.models
            .as_ref()
            .and_then(|m| m.providers.as_ref())
            .and_then(|p| p.first())
    }

    pub fn store_backend(&self) -> StoreBackend {
        self.store.as_ref().map(|s| s.backend).unwrap_or_default()
    }

    /// Resolve the JSONL store directory.
    pub fn store_dir(&self) -> PathBuf {
        self.store
            .as_ref()
            .and_then(|s| s.dir.as_ref())
            .map(|d| {
                let expanded = shellexpand::tilde(d);
                PathBuf::from(expanded.as_ref())
            })
            .unwrap_or_else(|| data_dir().join("store"))
    }

    pub fn workflow_id(&self) -> Option<String> {
        self.voice.as_ref().and_then(|v| v.resolve_workflow_id())
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "store.backend").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Set a value by dotted path, creating intermediate objects. The result
    /// must still deserialize as a `Config`.
    pub fn set_path(&mut self, path: &str, value: serde_json::Value) -> crate::error::Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(crate::error::PrepwiseError::Config("empty config path".into()));
        };

        let mut current = &mut json;
        for segment in parents {
            let object = current.as_object_mut().ok_or_else(|| {
                crate::error::PrepwiseError::Config(format!("'{segment}' is not an object"))
            })?;
            current = object
                .entry(segment.to_string())
                .or_insert_with(|| serde_json::json!({}));
        }
        current
            .as_object_mut()
            .ok_or_else(|| crate::error::PrepwiseError::Config(format!("cannot set '{path}'")))?
            .insert(last.to_string(), value);

        *self = serde_json::from_value(json)
            .map_err(|e| crate::error::PrepwiseError::Config(format!("{path}: {e}")))?;
        Ok(())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        match self.models.as_ref().and_then(|m| m.providers.as_ref()) {
            Some(providers) if !providers.is_empty() => {
                for p in providers {
                    if p.id != "ollama" && p.resolve_api_key().is_none() {
                        warnings.push(format!("Provider '{}' has no API key configured", p.id));
                    }
                }
            }
            _ => warnings.push("No LLM provider configured".to_string()),
        }

        if self.workflow_id().is_none() {
            warnings.push(
                "No voice workflow id configured; generate calls cannot start".to_string(),
            );
        }

        if self.store_backend() == StoreBackend::Firestore {
            let firestore = self.store.as_ref().and_then(|s| s.firestore.as_ref());
            if firestore.and_then(|f| f.resolve_project_id()).is_none() {
                errors.push("Firestore backend requires a project id".to_string());
            }
            if firestore.and_then(|f| f.resolve_access_token()).is_none() {
                errors.push("Firestore backend requires an access token".to_string());
            }
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Prepwise data: `~/.prepwise/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".prepwise")
}

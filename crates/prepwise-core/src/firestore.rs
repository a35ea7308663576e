//! Firestore REST backend for [`DocumentStore`].
//!
//! Documents are plain JSON on our side; Firestore wants every value wrapped
//! in a typed envelope (`stringValue`, `arrayValue`, ...), so conversion runs
//! in both directions at the boundary.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::FirestoreConfig;
use crate::error::{PrepwiseError, Result};
use crate::store::DocumentStore;

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com";

pub struct FirestoreDocumentStore {
    base_url: String,
    project_id: String,
    database: String,
    access_token: String,
    client: reqwest::Client,
}

impl FirestoreDocumentStore {
    pub fn new(project_id: String, database: String, access_token: String) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id,
            database,
            access_token,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &FirestoreConfig) -> Result<Self> {
        let project_id = config
            .resolve_project_id()
            .ok_or_else(|| PrepwiseError::Config("Firestore project id is missing".into()))?;
        let access_token = config
            .resolve_access_token()
            .ok_or_else(|| PrepwiseError::Config("Firestore access token is missing".into()))?;
        let database = if config.database.is_empty() {
            "(default)".to_string()
        } else {
            config.database.clone()
        };
        Ok(Self::new(project_id, database, access_token))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents/{}",
            self.base_url, self.project_id, self.database, collection
        )
    }

    async fn check(response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PrepwiseError::Store(format!("Firestore error {status}: {body}")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| PrepwiseError::Store(format!("Firestore response: {e}")))
    }
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    async fn add(&self, collection: &str, data: Value) -> Result<String> {
        let body = json!({ "fields": to_fields(&data)? });
        let response = self
            .client
            .post(self.collection_url(collection))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PrepwiseError::Store(e.to_string()))?;

        let doc = Self::check(response).await?;
        let id = doc
            .get("name")
            .and_then(Value::as_str)
            .and_then(|name| name.rsplit('/').next())
            .ok_or_else(|| PrepwiseError::Store("Firestore response missing document name".into()))?
            .to_string();
        debug!(collection, id = %id, "Added Firestore document");
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        let body = json!({ "fields": to_fields(&data)? });
        let response = self
            .client
            .patch(format!("{}/{}", self.collection_url(collection), id))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PrepwiseError::Store(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(format!("{}/{}", self.collection_url(collection), id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PrepwiseError::Store(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc = Self::check(response).await?;
        let fields = doc.get("fields").cloned().unwrap_or_else(|| json!({}));
        Ok(Some(from_fields(&fields)?))
    }
}

/// Encode a JSON object as a Firestore `fields` map.
pub fn to_fields(data: &Value) -> Result<Value> {
    let obj = data
        .as_object()
        .ok_or_else(|| PrepwiseError::Store("Firestore documents must be JSON objects".into()))?;
    let fields: Map<String, Value> = obj
        .iter()
        .map(|(k, v)| (k.clone(), to_value(v)))
        .collect();
    Ok(Value::Object(fields))
}

fn to_value(v: &Value) -> Value {
    match v {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(obj) => {
            let fields: Map<String, Value> =
                obj.iter().map(|(k, v)| (k.clone(), to_value(v))).collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// Decode a Firestore `fields` map into plain JSON.
pub fn from_fields(fields: &Value) -> Result<Value> {
    let obj = fields
        .as_object()
        .ok_or_else(|| PrepwiseError::Store("Firestore fields must be an object".into()))?;
    let mut out = Map::new();
    for (k, v) in obj {
        out.insert(k.clone(), from_value(v)?);
    }
    Ok(Value::Object(out))
}

fn from_value(v: &Value) -> Result<Value> {
    let obj = v
        .as_object()
        .ok_or_else(|| PrepwiseError::Store(format!("untyped Firestore value: {v}")))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| PrepwiseError::Store("empty Firestore value".into()))?;

    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" => inner.clone(),
        "integerValue" => {
            let n: i64 = match inner {
                Value::String(s) => s
                    .parse()
                    .map_err(|e| PrepwiseError::Store(format!("bad integerValue {s}: {e}")))?,
                other => other.as_i64().unwrap_or_default(),
            };
            json!(n)
        }
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|vals| vals.iter().map(from_value).collect::<Result<Vec<_>>>())
                .transpose()?
                .unwrap_or_default();
            Value::Array(values)
        }
        "mapValue" => match inner.get("fields") {
            Some(fields) => from_fields(fields)?,
            None => json!({}),
        },
        other => {
            return Err(PrepwiseError::Store(format!(
                "unsupported Firestore value type: {other}"
            )))
        }
    };
    Ok(decoded)
}

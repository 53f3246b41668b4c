use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::DetectError;

/// Handling advice returned with a prediction.
///
/// Field names on the wire are the service's Indonesian ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "deskripsi")]
    pub description: String,
    #[serde(rename = "cara_penanganan", default)]
    pub steps: Vec<String>,
    #[serde(rename = "catatan", default)]
    pub note: String,
}

impl Recommendation {
    /// Older service builds sent the advice as one plain string.
    pub fn from_legacy(text: String) -> Self {
        Self {
            description: text,
            steps: Vec::new(),
            note: String::new(),
        }
    }
}

/// A successful classification. Serializes back to the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "prediction")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(deserialize_with = "structured_or_legacy")]
    pub recommendation: Recommendation,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecommendationWire {
    Structured(Recommendation),
    Legacy(String),
}

fn structured_or_legacy<'de, D>(deserializer: D) -> Result<Recommendation, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RecommendationWire::deserialize(deserializer)? {
        RecommendationWire::Structured(recommendation) => recommendation,
        RecommendationWire::Legacy(text) => Recommendation::from_legacy(text),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PredictionResponse {
    Failure { error: String },
    Success(PredictionResult),
}

/// Parse a 2xx body.
pub fn parse_prediction(body: &str) -> Result<PredictionResult, DetectError> {
    match serde_json::from_str::<PredictionResponse>(body) {
        Ok(PredictionResponse::Success(result)) => Ok(result),
        Ok(PredictionResponse::Failure { error }) => Err(DetectError::PredictionFailed(error)),
        Err(e) => {
            tracing::debug!("Unparseable prediction body: {}", e);
            Err(DetectError::MalformedResponse)
        }
    }
}

/// Best human-readable message for a non-2xx response: a JSON
/// `detail`/`message`/`error` field, then the raw body, then the status.
pub fn error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = message_field(&value) {
            return message;
        }
    }

    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        body.to_string()
    }
}

fn message_field(value: &Value) -> Option<String> {
    if let Value::String(text) = value {
        return Some(text.clone()).filter(|text| !text.trim().is_empty());
    }

    for key in ["detail", "message", "error"] {
        match value.get(key) {
            Some(Value::String(text)) if !text.trim().is_empty() => return Some(text.clone()),
            // FastAPI validation errors: [{"loc": [..], "msg": "..", "type": ".."}]
            Some(Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str).or(item.as_str()))
                    .collect();
                if !messages.is_empty() {
                    return Some(messages.join("; "));
                }
            }
            _ => {}
        }
    }
    None
}

use crate::error::ApiError;
use crate::responses::GenerateContentResponse;
use async_trait::async_trait;
use configuration::ApiConfig;
use core_types::Decision;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// The bounds of the confidence score a reasoning model may return.
pub const MAX_CONFIDENCE: f64 = 100.0;

/// A structured answer from the reasoning model.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentVerdict {
    pub decision: Decision,
    /// Signed conviction in [-100, 100]: positive is bullish, negative bearish.
    pub confidence_score: f64,
    pub reason: String,
}

/// An external reasoning service that turns a market context prompt into a verdict.
#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn evaluate(&self, prompt: &str) -> Result<SentimentVerdict, ApiError>;
}

/// A `SentimentAnalyzer` backed by the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_config: &ApiConfig, api_key: String) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.reasoning_timeout_secs))
            .build()?;

        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            api_config.gemini_base_url.trim_end_matches('/'),
            api_config.gemini_model
        );

        Ok(Self { client, endpoint, api_key })
    }
}

#[async_trait]
impl SentimentAnalyzer for GeminiClient {
    async fn evaluate(&self, prompt: &str) -> Result<SentimentVerdict, ApiError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateContentResponse>()
            .await?;

        let text = response
            .first_text()
            .ok_or_else(|| ApiError::Empty("generateContent".to_string()))?;

        parse_verdict(&text)
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    decision: String,
    #[serde(alias = "confidence")]
    confidence_score: f64,
    #[serde(default)]
    reason: String,
}

/// Extracts the JSON verdict from free model text, tolerating code fences and prose around it.
pub fn parse_verdict(text: &str) -> Result<SentimentVerdict, ApiError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json_slice = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(ApiError::InvalidData(format!("no JSON object in model reply: {}", text))),
    };

    let raw: RawVerdict =
        serde_json::from_str(json_slice).map_err(|e| ApiError::Deserialization(e.to_string()))?;

    if !raw.confidence_score.is_finite() {
        return Err(ApiError::InvalidData("confidence_score is not finite".to_string()));
    }

    let decision = raw
        .decision
        .parse::<Decision>()
        .map_err(|e| ApiError::InvalidData(e.to_string()))?;

    Ok(SentimentVerdict {
        decision,
        confidence_score: raw.confidence_score.clamp(-MAX_CONFIDENCE, MAX_CONFIDENCE),
        reason: raw.reason,
    })
}

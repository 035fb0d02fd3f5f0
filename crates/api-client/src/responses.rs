use serde::Deserialize;

// Bybit v5 wraps every payload in the same envelope and sends numbers as strings.

/// The common envelope of every Bybit v5 market endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitEnvelope<T> {
    pub ret_code: i64,
    pub ret_msg: String,
    pub result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListResult<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

/// A single row from `GET /v5/market/tickers`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTicker {
    pub symbol: String,
    #[serde(rename = "lastPrice", default)]
    pub last_price: String,
    #[serde(rename = "turnover24h", default)]
    pub turnover_24h: String,
    #[serde(rename = "price24hPcnt", default)]
    pub price_24h_pcnt: String,
}

/// A single row from `GET /v5/market/kline`:
/// `[startTime, open, high, low, close, volume, turnover]`, newest first.
pub type RawKline = Vec<String>;

// --- Gemini generateContent ---

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Part {
    pub text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if the model produced any.
    pub fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

use crate::responses::{BybitEnvelope, ListResult, RawKline, RawTicker};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use configuration::ApiConfig;
use core_types::{Kline, Ticker};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::time::Duration;

pub mod error;
pub mod responses;
pub mod sentiment;

// --- Public API ---
pub use error::ApiError;
pub use sentiment::{GeminiClient, SentimentAnalyzer, SentimentVerdict};

/// The read-only market data interface the agent depends on.
///
/// Every call may fail transiently. Callers treat an `Err` as "no data for
/// this symbol this cycle" and move on; nothing here is retried.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// The last traded price of a symbol.
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, ApiError>;

    /// Historical bars ordered oldest to newest. May be empty.
    async fn historical_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ApiError>;

    /// The 24h ticker of every listed instrument.
    async fn all_tickers(&self) -> Result<Vec<Ticker>, ApiError>;
}

/// A `MarketData` implementation backed by Bybit's public v5 market endpoints.
#[derive(Clone)]
pub struct BybitClient {
    client: reqwest::Client,
    base_url: String,
    category: String,
}

impl BybitClient {
    /// Builds a client whose every request is bounded by `request_timeout_secs`.
    pub fn new(api_config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: api_config.bybit_base_url.trim_end_matches('/').to_string(),
            category: api_config.category.clone(),
        })
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let text = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let envelope: BybitEnvelope<T> =
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialization(e.to_string()))?;

        if envelope.ret_code != 0 {
            return Err(ApiError::Exchange(envelope.ret_code, envelope.ret_msg));
        }
        envelope.result.ok_or_else(|| ApiError::Empty(path.to_string()))
    }
}

#[async_trait]
impl MarketData for BybitClient {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, ApiError> {
        let result: ListResult<RawTicker> = self
            .get_public(
                "/v5/market/tickers",
                &[("category", self.category.clone()), ("symbol", symbol.to_string())],
            )
            .await?;

        let raw = result
            .list
            .into_iter()
            .find(|t| t.symbol == symbol)
            .ok_or_else(|| ApiError::Empty(symbol.to_string()))?;

        let price = parse_decimal(&raw.last_price)
            .ok_or_else(|| ApiError::InvalidData(format!("lastPrice '{}' for {}", raw.last_price, symbol)))?;
        if price <= Decimal::ZERO {
            return Err(ApiError::InvalidData(format!("non-positive price {} for {}", price, symbol)));
        }
        Ok(price)
    }

    async fn historical_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ApiError> {
        let result: ListResult<RawKline> = self
            .get_public(
                "/v5/market/kline",
                &[
                    ("category", self.category.clone()),
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(parse_klines(result.list))
    }

    async fn all_tickers(&self) -> Result<Vec<Ticker>, ApiError> {
        let result: ListResult<RawTicker> = self
            .get_public("/v5/market/tickers", &[("category", self.category.clone())])
            .await?;

        Ok(parse_tickers(result.list))
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw.trim()).ok()
}

/// Converts raw ticker rows, dropping any row with a non-numeric field.
pub fn parse_tickers(raw: Vec<RawTicker>) -> Vec<Ticker> {
    raw.into_iter()
        .filter_map(|t| {
            Some(Ticker {
                last_price: parse_decimal(&t.last_price)?,
                turnover_24h: parse_decimal(&t.turnover_24h)?,
                price_24h_pcnt: parse_decimal(&t.price_24h_pcnt)?,
                symbol: t.symbol,
            })
        })
        .collect()
}

/// Converts raw kline rows (newest first) into bars ordered oldest to newest.
/// Malformed rows are skipped rather than failing the whole history.
pub fn parse_klines(raw: Vec<RawKline>) -> Vec<Kline> {
    let mut klines: Vec<Kline> = raw
        .iter()
        .filter_map(|row| {
            if row.len() < 6 {
                tracing::debug!(?row, "Skipping short kline row");
                return None;
            }
            let start_ms = row[0].parse::<i64>().ok()?;
            Some(Kline {
                open_time: Utc.timestamp_millis_opt(start_ms).single()?,
                open: parse_decimal(&row[1])?,
                high: parse_decimal(&row[2])?,
                low: parse_decimal(&row[3])?,
                close: parse_decimal(&row[4])?,
                volume: parse_decimal(&row[5])?,
            })
        })
        .collect();

    klines.sort_by_key(|k| k.open_time);
    klines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn klines_are_reversed_to_oldest_first() {
        let body = r#"{"retCode":0,"retMsg":"OK","result":{"list":[
            ["1700000120000","3","4","2","3.5","10","35"],
            ["1700000060000","2","3","1","2.5","11","27"],
            ["1700000000000","1","2","0.5","1.5","12","18"]
        ]}}"#;
        let envelope: BybitEnvelope<ListResult<RawKline>> = serde_json::from_str(body).unwrap();
        let klines = parse_klines(envelope.result.unwrap().list);

        assert_eq!(klines.len(), 3);
        assert_eq!(klines[0].close, Decimal::from_str("1.5").unwrap());
        assert_eq!(klines[2].close, Decimal::from_str("3.5").unwrap());
        assert!(klines[0].open_time < klines[2].open_time);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let raw = vec![
            vec!["1700000000000".to_string(), "1".into(), "2".into(), "0.5".into(), "1.5".into(), "12".into()],
            vec!["oops".to_string(), "1".into(), "2".into(), "0.5".into(), "1.5".into(), "12".into()],
            vec!["1700000060000".to_string(), "1".into()],
        ];
        assert_eq!(parse_klines(raw).len(), 1);
    }

    #[test]
    fn tickers_with_non_numeric_fields_are_dropped() {
        let body = r#"{"retCode":0,"retMsg":"OK","result":{"category":"linear","list":[
            {"symbol":"BTCUSDT","lastPrice":"65000.5","turnover24h":"1200000000","price24hPcnt":"0.012"},
            {"symbol":"NEWUSDT","lastPrice":"","turnover24h":"0","price24hPcnt":"0"}
        ]}}"#;
        let envelope: BybitEnvelope<ListResult<RawTicker>> = serde_json::from_str(body).unwrap();
        let tickers = parse_tickers(envelope.result.unwrap().list);

        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0].symbol, "BTCUSDT");
        assert_eq!(tickers[0].price_24h_pcnt, Decimal::from_str("0.012").unwrap());
    }

    #[test]
    fn error_envelope_carries_code() {
        let body = r#"{"retCode":10001,"retMsg":"params error","result":{}}"#;
        let envelope: BybitEnvelope<serde_json::Value> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.ret_code, 10001);
        assert_eq!(envelope.ret_msg, "params error");
    }
}

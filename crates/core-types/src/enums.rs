use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The direction of a futures position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Returns the opposite side of the position
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("LONG"),
            Side::Short => f.write_str("SHORT"),
        }
    }
}

impl FromStr for Side {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Side::Long),
            "SHORT" => Ok(Side::Short),
            other => Err(CoreError::InvalidInput("side".to_string(), other.to_string())),
        }
    }
}

/// The outcome of a single policy evaluation for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    EnterLong,
    EnterShort,
    Close,
    Hold,
}

impl Decision {
    /// The side an entry decision would open, if any.
    pub fn entry_side(&self) -> Option<Side> {
        match self {
            Decision::EnterLong => Some(Side::Long),
            Decision::EnterShort => Some(Side::Short),
            Decision::Close | Decision::Hold => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Decision::EnterLong => "ENTER_LONG",
            Decision::EnterShort => "ENTER_SHORT",
            Decision::Close => "CLOSE",
            Decision::Hold => "HOLD",
        };
        f.write_str(label)
    }
}

/// Parses the loose direction words that reasoning models answer with.
impl FromStr for Decision {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" | "BUY" | "BULLISH" | "ENTER_LONG" => Ok(Decision::EnterLong),
            "SHORT" | "SELL" | "BEARISH" | "ENTER_SHORT" => Ok(Decision::EnterShort),
            "CLOSE" => Ok(Decision::Close),
            "HOLD" | "NEUTRAL" | "WAIT" => Ok(Decision::Hold),
            other => Err(CoreError::InvalidInput("decision".to_string(), other.to_string())),
        }
    }
}

/// Why a position was closed. Written verbatim into the trade log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    #[serde(rename = "Stop Loss")]
    StopLoss,
    #[serde(rename = "Take Profit")]
    TakeProfit,
    #[serde(rename = "Trailing Stop")]
    TrailingStop,
    #[serde(rename = "Signal")]
    Signal,
    #[serde(rename = "Shutdown")]
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CloseReason::StopLoss => "Stop Loss",
            CloseReason::TakeProfit => "Take Profit",
            CloseReason::TrailingStop => "Trailing Stop",
            CloseReason::Signal => "Signal",
            CloseReason::Shutdown => "Shutdown",
        };
        f.write_str(label)
    }
}

impl FromStr for CloseReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Stop Loss" => Ok(CloseReason::StopLoss),
            "Take Profit" => Ok(CloseReason::TakeProfit),
            "Trailing Stop" => Ok(CloseReason::TrailingStop),
            "Signal" => Ok(CloseReason::Signal),
            "Shutdown" => Ok(CloseReason::Shutdown),
            other => Err(CoreError::InvalidInput("close reason".to_string(), other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Open,
    Close,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Open => f.write_str("OPEN"),
            TradeAction::Close => f.write_str("CLOSE"),
        }
    }
}

impl FromStr for TradeAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(TradeAction::Open),
            "CLOSE" => Ok(TradeAction::Close),
            other => Err(CoreError::InvalidInput("trade action".to_string(), other.to_string())),
        }
    }
}

/// Identifies one of the interchangeable signal policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyId {
    TrendFollowing,
    MeanReversion,
    RegimeSwitch,
    AiConfirmed,
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PolicyId::TrendFollowing => "trend_following",
            PolicyId::MeanReversion => "mean_reversion",
            PolicyId::RegimeSwitch => "regime_switch",
            PolicyId::AiConfirmed => "ai_confirmed",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parses_model_vocabulary() {
        assert_eq!("Bullish".parse::<Decision>().unwrap(), Decision::EnterLong);
        assert_eq!(" short ".parse::<Decision>().unwrap(), Decision::EnterShort);
        assert_eq!("neutral".parse::<Decision>().unwrap(), Decision::Hold);
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn close_reason_serializes_as_log_label() {
        let json = serde_json::to_string(&CloseReason::StopLoss).unwrap();
        assert_eq!(json, "\"Stop Loss\"");
        assert_eq!(CloseReason::TakeProfit.to_string(), "Take Profit");
    }

    #[test]
    fn only_entries_carry_a_side() {
        assert_eq!(Decision::EnterShort.entry_side(), Some(Side::Short));
        assert_eq!(Decision::Close.entry_side(), None);
        assert_eq!(Side::Long.opposite(), Side::Short);
    }
}

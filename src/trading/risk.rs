//! Risk levels and the confidence/risk gate applied before a signal is acted on

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::CombinedSignal;
use crate::config::TradingConfig;
use crate::data::SignalStrength;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl RiskLevel {
    /// Risk implied by how much the component signals agree
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence < 0.3 {
            RiskLevel::Extreme
        } else if confidence < 0.5 {
            RiskLevel::High
        } else if confidence < 0.7 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Extreme => "extreme",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "extreme" => Ok(RiskLevel::Extreme),
            other => bail!("Unknown risk level '{}' (use low/medium/high/extreme)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeDecision {
    Actionable,
    Skip(String),
}

impl TradeDecision {
    pub fn is_actionable(&self) -> bool {
        matches!(self, TradeDecision::Actionable)
    }
}

/// Minimum confidence and maximum risk a signal needs before it is worth acting on
#[derive(Debug, Clone)]
pub struct TradeGate {
    pub min_confidence: f64,
    pub max_risk_level: RiskLevel,
}

impl TradeGate {
    pub fn new(min_confidence: f64, max_risk_level: RiskLevel) -> Self {
        Self {
            min_confidence,
            max_risk_level,
        }
    }

    pub fn from_config(config: &TradingConfig) -> Self {
        Self::new(config.min_confidence, config.max_risk_level)
    }

    pub fn evaluate(&self, signal: &CombinedSignal) -> TradeDecision {
        if signal.overall_signal == SignalStrength::Neutral {
            return TradeDecision::Skip("Neutral signal".to_string());
        }

        if signal.confidence < self.min_confidence {
            return TradeDecision::Skip(format!(
                "Confidence {:.1}% below minimum {:.1}%",
                signal.confidence * 100.0,
                self.min_confidence * 100.0
            ));
        }

        if signal.risk_level > self.max_risk_level {
            return TradeDecision::Skip(format!(
                "Risk level {} exceeds maximum {}",
                signal.risk_level, self.max_risk_level
            ));
        }

        TradeDecision::Actionable
    }
}

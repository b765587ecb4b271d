use serde::{Deserialize, Serialize};
use std::fmt;

/// Traffic-light classification of a single measured quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Green => write!(f, "GREEN"),
            Severity::Yellow => write!(f, "YELLOW"),
            Severity::Red => write!(f, "RED"),
        }
    }
}

/// Severity of a single field discrepancy between two documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MismatchSeverity {
    None,
    Yellow,
    Red,
}

impl fmt::Display for MismatchSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchSeverity::None => write!(f, "NONE"),
            MismatchSeverity::Yellow => write!(f, "YELLOW"),
            MismatchSeverity::Red => write!(f, "RED"),
        }
    }
}

/// Overall quality band for an aggregate score in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityLevel {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl QualityLevel {
    /// Cutoffs: EXCELLENT >= 90, GOOD >= 75, ACCEPTABLE >= 60, POOR otherwise.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityLevel::Excellent
        } else if score >= 75.0 {
            QualityLevel::Good
        } else if score >= 60.0 {
            QualityLevel::Acceptable
        } else {
            QualityLevel::Poor
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityLevel::Excellent => write!(f, "EXCELLENT"),
            QualityLevel::Good => write!(f, "GOOD"),
            QualityLevel::Acceptable => write!(f, "ACCEPTABLE"),
            QualityLevel::Poor => write!(f, "POOR"),
        }
    }
}

/// Risk tier driving the final decision. Serialized as its number (1..=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    pub fn number(self) -> u8 {
        match self {
            RiskTier::Low => 1,
            RiskTier::Moderate => 2,
            RiskTier::High => 3,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(RiskTier::Low),
            2 => Some(RiskTier::Moderate),
            3 => Some(RiskTier::High),
            _ => None,
        }
    }
}

impl Serialize for RiskTier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for RiskTier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = u8::deserialize(deserializer)?;
        RiskTier::from_number(n)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid risk tier: {n}")))
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Final verification decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approve,
    Escalate,
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Approve => write!(f, "APPROVE"),
            Decision::Escalate => write!(f, "ESCALATE"),
            Decision::Reject => write!(f, "REJECT"),
        }
    }
}

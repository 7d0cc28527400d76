use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete severity of a detection, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Maps a feature score onto a severity. Lower bounds are inclusive.
    pub fn classify(score: u32) -> Self {
        match score {
            s if s >= 5 => Severity::Critical,
            4 => Severity::High,
            2 | 3 => Severity::Moderate,
            _ => Severity::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

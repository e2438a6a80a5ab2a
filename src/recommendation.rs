// src/recommendation.rs

use serde::Serialize;
use std::fmt;

/// What a change mainly trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Noise,
    Latency,
    Stability,
    Tracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Impact::Noise => "noise",
            Impact::Latency => "latency",
            Impact::Stability => "stability",
            Impact::Tracking => "tracking",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        f.write_str(s)
    }
}

/// One proposed firmware setting change, keyed by its CLI name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub setting: String,
    pub current_value: f64,
    pub recommended_value: f64,
    pub reason: String,
    pub impact: Impact,
    pub confidence: Confidence,
}

impl Recommendation {
    pub fn new(
        setting: impl Into<String>,
        current_value: f64,
        recommended_value: f64,
        reason: impl Into<String>,
        impact: Impact,
        confidence: Confidence,
    ) -> Self {
        Self {
            setting: setting.into(),
            current_value,
            recommended_value,
            reason: reason.into(),
            impact,
            confidence,
        }
    }

    /// False for entries that only restate the current value.
    pub fn is_change(&self) -> bool {
        (self.recommended_value - self.current_value).abs() > f64::EPSILON
    }

    /// Value as written to the device; firmware settings are integers.
    pub fn device_value(&self) -> i64 {
        self.recommended_value.round() as i64
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} [{}, {} confidence] {}",
            self.setting,
            self.current_value,
            self.recommended_value,
            self.impact,
            self.confidence,
            self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_change_entries_are_detected() {
        let same = Recommendation::new("p_roll", 45.0, 45.0, "", Impact::Tracking, Confidence::Low);
        let raised = Recommendation::new("p_roll", 45.0, 50.0, "", Impact::Tracking, Confidence::Low);
        assert!(!same.is_change());
        assert!(raised.is_change());
    }

    #[test]
    fn device_value_rounds() {
        let rec = Recommendation::new("d_roll", 30.0, 34.5, "", Impact::Stability, Confidence::High);
        assert_eq!(rec.device_value(), 35);
    }
}

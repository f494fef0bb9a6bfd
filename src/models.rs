//! Data models and the stress scoring formula for crew vitals.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer};

use crate::error::ProcessingError;

// ---

/// Weight applied to heart rate (beats per minute).
pub const HEART_RATE_WEIGHT: f64 = 0.6;

/// Weight applied to hours of sleep; sleep lowers the score.
pub const SLEEP_WEIGHT: f64 = 10.0;

/// Lower clamp bound of the stress score.
pub const STRESS_SCORE_MIN: f64 = 0.1;

/// Upper clamp bound of the stress score.
pub const STRESS_SCORE_MAX: f64 = 100.0;

/// Scores strictly above this are flagged `High`.
pub const HIGH_STRESS_THRESHOLD: f64 = 50.0;

/// Raw telemetry reading as posted by a crew device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VitalsReading {
    // ---
    pub crew_id: String,
    #[serde(deserialize_with = "numeric")]
    pub heart_rate: f64,
    #[serde(deserialize_with = "numeric")]
    pub sleep_hours: f64,
    pub timestamp: String,
}

/// Categorical stress level derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StressFlag {
    Normal,
    High,
}

/// A reading together with its derived stress fields, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVitals {
    // ---
    pub crew_id: String,
    pub heart_rate: f64,
    pub sleep_hours: f64,
    pub timestamp: String,
    pub stress_score: f64,
    pub stress_flag: StressFlag,
}

/// Persisted vitals document. `processed_at` is assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct VitalsRecord {
    // ---
    pub crew_id: String,
    pub heart_rate: f64,
    pub sleep_hours: f64,
    pub timestamp: String,
    pub stress_score: f64,
    pub stress_flag: StressFlag,
    pub processed_at: DateTime<Utc>,
}

/// Accept a JSON number or a string holding one (`"72"`, `" 7.5 "`).
fn numeric<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Numeric {
        Number(f64),
        Text(String),
    }

    match Numeric::deserialize(deserializer)? {
        Numeric::Number(n) => Ok(n),
        Numeric::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| de::Error::custom(format!("'{s}' is not a number: {e}"))),
    }
}

/// Compute the clamped stress score for a heart rate and sleep duration.
///
/// `heart_rate * 0.6 - sleep_hours * 10.0`, clamped to `[0.1, 100.0]`.
pub fn stress_score(heart_rate: f64, sleep_hours: f64) -> f64 {
    // ---
    let raw = heart_rate * HEART_RATE_WEIGHT - sleep_hours * SLEEP_WEIGHT;
    raw.clamp(STRESS_SCORE_MIN, STRESS_SCORE_MAX)
}

impl StressFlag {
    // ---
    pub fn from_score(score: f64) -> Self {
        if score > HIGH_STRESS_THRESHOLD {
            StressFlag::High
        } else {
            StressFlag::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StressFlag::Normal => "Normal",
            StressFlag::High => "High",
        }
    }
}

impl fmt::Display for StressFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VitalsReading {
    // ---
    /// Parse a request body into a validated reading.
    pub fn from_json(body: &[u8]) -> Result<Self, ProcessingError> {
        // ---
        let reading: VitalsReading = serde_json::from_slice(body)?;
        reading.validate()?;
        Ok(reading)
    }

    /// Check the value constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        // ---
        if self.crew_id.trim().is_empty() {
            return Err(ProcessingError::Validation("crew_id is empty".into()));
        }
        if self.timestamp.trim().is_empty() {
            return Err(ProcessingError::Validation("timestamp is empty".into()));
        }
        if !self.heart_rate.is_finite() || self.heart_rate <= 0.0 {
            return Err(ProcessingError::Validation(format!(
                "heart_rate must be a positive number, got {}",
                self.heart_rate
            )));
        }
        if !self.sleep_hours.is_finite() || self.sleep_hours < 0.0 {
            return Err(ProcessingError::Validation(format!(
                "sleep_hours must be a non-negative number, got {}",
                self.sleep_hours
            )));
        }
        Ok(())
    }

    /// Derive the stress score and flag for this reading.
    pub fn to_scored(&self) -> ScoredVitals {
        // ---
        let stress_score = stress_score(self.heart_rate, self.sleep_hours);

        ScoredVitals {
            crew_id: self.crew_id.clone(),
            heart_rate: self.heart_rate,
            sleep_hours: self.sleep_hours,
            timestamp: self.timestamp.clone(),
            stress_score,
            stress_flag: StressFlag::from_score(stress_score),
        }
    }
}

impl ScoredVitals {
    // ---
    /// Document key, `{crew_id}_{timestamp}`. Also the idempotency key.
    pub fn document_id(&self) -> String {
        format!("{}_{}", self.crew_id, self.timestamp)
    }

    pub fn into_record(self, processed_at: DateTime<Utc>) -> VitalsRecord {
        VitalsRecord {
            crew_id: self.crew_id,
            heart_rate: self.heart_rate,
            sleep_hours: self.sleep_hours,
            timestamp: self.timestamp,
            stress_score: self.stress_score,
            stress_flag: self.stress_flag,
            processed_at,
        }
    }
}

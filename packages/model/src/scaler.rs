//! Standardisation scaler.

use serde::{Deserialize, Serialize};

use crate::{ModelError, Scaler, check_len};

/// Per-feature `(x - mean) / scale` standardisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Builds a scaler from fitted means and scales.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] if the vectors are empty or differ in
    /// length.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, ModelError> {
        let scaler = Self { mean, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Parses and validates a scaler artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let scaler: Self = serde_json::from_str(json)?;
        scaler.validate()?;
        Ok(scaler)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.mean.is_empty() {
            return Err(ModelError::Invalid {
                message: "scaler has no features".to_string(),
            });
        }
        check_len("scaler scale", self.mean.len(), self.scale.len())
    }
}

impl Scaler for StandardScaler {
    fn transform(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_len("scaler input", self.mean.len(), features.len())?;

        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                // Constant features are fitted with a zero scale.
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }
}

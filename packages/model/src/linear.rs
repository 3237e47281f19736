//! Linear regression.

use serde::{Deserialize, Serialize};

use crate::{ModelError, Regressor, check_len};

/// `intercept + coefficients · x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearRegressor {
    /// Builds a regressor from fitted weights.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] if there are no coefficients or any
    /// weight is not finite.
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Result<Self, ModelError> {
        let model = Self {
            coefficients,
            intercept,
        };
        model.validate()?;
        Ok(model)
    }

    /// Parses and validates a regressor artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.coefficients.is_empty() {
            return Err(ModelError::Invalid {
                message: "regressor has no coefficients".to_string(),
            });
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelError::Invalid {
                message: "regressor weights must be finite".to_string(),
            });
        }
        Ok(())
    }
}

impl Regressor for LinearRegressor {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        check_len("regressor input", self.coefficients.len(), features.len())?;

        Ok(self
            .coefficients
            .iter()
            .zip(features)
            .fold(self.intercept, |acc, (w, x)| w.mul_add(*x, acc)))
    }
}

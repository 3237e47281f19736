//! Encoder + regressor inference over a feature frame.

use std::sync::Arc;

use taxi_demand_model::{Encoder, ModelError, Regressor};
use taxi_demand_models::{FeatureFrame, FeatureSchema};

use crate::DemandError;

/// The two-stage model: categorical encoding, then regression.
///
/// Holds shared handles to pre-fitted artifacts and never refits them, so
/// the same frame always produces bit-identical predictions.
#[derive(Clone)]
pub struct PredictionPipeline {
    schema: FeatureSchema,
    encoder: Arc<dyn Encoder>,
    regressor: Arc<dyn Regressor>,
}

impl std::fmt::Debug for PredictionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionPipeline")
            .field("schema", &self.schema)
            .field("encoded_width", &self.encoder.output_width())
            .finish_non_exhaustive()
    }
}

impl PredictionPipeline {
    /// Composes an encoder and a regressor.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::Model`] if the encoder's output width does
    /// not match the number of features the regressor was fitted on.
    pub fn new(
        schema: FeatureSchema,
        encoder: Arc<dyn Encoder>,
        regressor: Arc<dyn Regressor>,
    ) -> Result<Self, DemandError> {
        if encoder.output_width() != regressor.n_features() {
            return Err(ModelError::DimensionMismatch {
                what: "encoder output vs regressor input",
                expected: regressor.n_features(),
                actual: encoder.output_width(),
            }
            .into());
        }

        Ok(Self {
            schema,
            encoder,
            regressor,
        })
    }

    /// Schema the pipeline expects.
    #[must_use]
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Returns `frame` without the schema's label columns, ready for
    /// [`Self::predict`].
    #[must_use]
    pub fn drop_labels(&self, frame: &FeatureFrame) -> FeatureFrame {
        frame.without_columns(&self.schema.labels)
    }

    /// Predicts demand for every row of `frame`, in row order.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::InvalidFeatureSet`] if `frame` still carries a
    /// label column, or [`DemandError::Model`] if the encoder or regressor
    /// rejects a row.
    pub fn predict(&self, frame: &FeatureFrame) -> Result<Vec<f64>, DemandError> {
        if let Some(label) = frame.columns.iter().find(|c| self.schema.is_label(c)) {
            return Err(DemandError::InvalidFeatureSet {
                message: format!("label column '{label}' must be dropped before inference"),
            });
        }

        frame
            .rows
            .iter()
            .map(|row| -> Result<f64, DemandError> {
                let encoded = self.encoder.encode(&frame.columns, &row.values)?;
                Ok(self.regressor.predict(&encoded)?)
            })
            .collect()
    }
}

/// Displayed demand for a real-valued prediction: truncated toward zero,
/// not rounded.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn truncate_demand(prediction: f64) -> i64 {
    // `as` saturates and maps NaN to 0.
    prediction.trunc() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use taxi_demand_model::encoder::{CategoricalColumn, OneHotEncoder};
    use taxi_demand_model::linear::LinearRegressor;
    use taxi_demand_models::{FeatureRow, RegionId, TimeBucket};

    fn schema() -> FeatureSchema {
        FeatureSchema {
            version: 1,
            timestamp_column: "tpep_pickup_datetime".into(),
            region_column: "region".into(),
            categorical: vec!["region".into()],
            numeric: vec!["lag_1".into()],
            labels: vec!["total_pickups".into()],
        }
    }

    fn pipeline() -> PredictionPipeline {
        let encoder = OneHotEncoder::new(
            vec![CategoricalColumn {
                column: "region".into(),
                categories: vec![0, 1, 2],
                drop_first: true,
            }],
            vec!["lag_1".into()],
        )
        .unwrap();
        let regressor = LinearRegressor::new(vec![5.0, -2.0, 0.5], 1.0).unwrap();
        PredictionPipeline::new(schema(), Arc::new(encoder), Arc::new(regressor)).unwrap()
    }

    fn frame() -> FeatureFrame {
        FeatureFrame::new(
            TimeBucket::new(
                NaiveDate::from_ymd_opt(2016, 3, 1)
                    .unwrap()
                    .and_hms_opt(0, 15, 0)
                    .unwrap(),
            ),
            vec!["region".into(), "lag_1".into(), "total_pickups".into()],
            vec![
                FeatureRow {
                    region: RegionId(0),
                    values: vec![0.0, 10.0, 11.0],
                },
                FeatureRow {
                    region: RegionId(1),
                    values: vec![1.0, 4.0, 6.0],
                },
                FeatureRow {
                    region: RegionId(2),
                    values: vec![2.0, 8.0, 3.0],
                },
            ],
        )
    }

    #[test]
    fn predicts_one_value_per_row_in_order() {
        let pipeline = pipeline();
        let predictions = pipeline.predict(&pipeline.drop_labels(&frame())).unwrap();

        assert_eq!(predictions, vec![6.0, 8.0, 3.0]);
    }

    #[test]
    fn label_column_is_rejected() {
        let err = pipeline().predict(&frame()).unwrap_err();
        assert!(matches!(
            err,
            DemandError::InvalidFeatureSet { message } if message.contains("total_pickups")
        ));
    }

    #[test]
    fn predictions_are_deterministic() {
        let pipeline = pipeline();
        let input = pipeline.drop_labels(&frame());

        let a = pipeline.predict(&input).unwrap();
        let b = pipeline.predict(&input).unwrap();

        assert_eq!(
            a.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            b.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn empty_frame_predicts_nothing() {
        let pipeline = pipeline();
        let mut input = pipeline.drop_labels(&frame());
        input.rows.clear();
        assert!(pipeline.predict(&input).unwrap().is_empty());
    }

    #[test]
    fn mismatched_artifacts_are_rejected() {
        let encoder = OneHotEncoder::new(Vec::new(), vec!["lag_1".into()]).unwrap();
        let regressor = LinearRegressor::new(vec![1.0, 2.0], 0.0).unwrap();
        assert!(matches!(
            PredictionPipeline::new(schema(), Arc::new(encoder), Arc::new(regressor)),
            Err(DemandError::Model(ModelError::DimensionMismatch { .. }))
        ));
    }

    #[test]
    fn demand_truncates_toward_zero() {
        assert_eq!(truncate_demand(4.7), 4);
        assert_eq!(truncate_demand(10.2), 10);
        assert_eq!(truncate_demand(0.9), 0);
        assert_eq!(truncate_demand(-1.7), -1);
        assert_eq!(truncate_demand(f64::NAN), 0);
    }
}

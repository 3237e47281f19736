//! One-hot encoding of categorical columns.
//!
//! The encoded vector is laid out as one block per categorical column, in
//! the order the columns were declared, followed by the passthrough
//! columns unchanged. With `drop_first` the first category of a block gets
//! no slot, so it encodes as all zeros.

use serde::{Deserialize, Serialize};

use crate::{Encoder, ModelError, check_len};

/// Fitted categories of one categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    /// Column name.
    pub column: String,
    /// Known category values, in slot order.
    pub categories: Vec<i64>,
    /// Whether the first category was dropped at fit time.
    #[serde(default)]
    pub drop_first: bool,
}

impl CategoricalColumn {
    fn width(&self) -> usize {
        self.categories.len() - usize::from(self.drop_first)
    }

    fn slot(&self, value: f64) -> Option<usize> {
        if value.fract() != 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let value = value as i64;
        self.categories.iter().position(|&c| c == value)
    }
}

/// One-hot encoder with passthrough of the remaining columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categorical: Vec<CategoricalColumn>,
    #[serde(default)]
    passthrough: Vec<String>,
}

impl OneHotEncoder {
    /// Builds an encoder.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] if a categorical column has no
    /// categories or the encoder would produce an empty vector.
    pub fn new(
        categorical: Vec<CategoricalColumn>,
        passthrough: Vec<String>,
    ) -> Result<Self, ModelError> {
        let encoder = Self {
            categorical,
            passthrough,
        };
        encoder.validate()?;
        Ok(encoder)
    }

    /// Parses and validates an encoder artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let encoder: Self = serde_json::from_str(json)?;
        encoder.validate()?;
        Ok(encoder)
    }

    /// Names of every input column the encoder reads.
    pub fn input_columns(&self) -> impl Iterator<Item = &str> {
        self.categorical
            .iter()
            .map(|c| c.column.as_str())
            .chain(self.passthrough.iter().map(String::as_str))
    }

    fn validate(&self) -> Result<(), ModelError> {
        if let Some(empty) = self.categorical.iter().find(|c| c.categories.is_empty()) {
            return Err(ModelError::Invalid {
                message: format!("categorical column '{}' has no categories", empty.column),
            });
        }
        if self.output_width() == 0 {
            return Err(ModelError::Invalid {
                message: "encoder produces no features".to_string(),
            });
        }
        Ok(())
    }
}

fn find(columns: &[String], column: &str) -> Result<usize, ModelError> {
    columns
        .iter()
        .position(|c| c == column)
        .ok_or_else(|| ModelError::MissingColumn {
            column: column.to_string(),
        })
}

impl Encoder for OneHotEncoder {
    fn output_width(&self) -> usize {
        self.categorical.iter().map(CategoricalColumn::width).sum::<usize>()
            + self.passthrough.len()
    }

    fn encode(&self, columns: &[String], values: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_len("encoder input", columns.len(), values.len())?;

        let mut encoded = Vec::with_capacity(self.output_width());

        for cat in &self.categorical {
            let value = values[find(columns, &cat.column)?];
            let mut block = vec![0.0; cat.categories.len()];

            match cat.slot(value) {
                Some(slot) => block[slot] = 1.0,
                None => log::warn!("Unknown category {value} in column '{}'", cat.column),
            }

            let skip = usize::from(cat.drop_first);
            encoded.extend_from_slice(&block[skip..]);
        }

        for column in &self.passthrough {
            encoded.push(values[find(columns, column)?]);
        }

        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(drop_first: bool) -> OneHotEncoder {
        OneHotEncoder::new(
            vec![CategoricalColumn {
                column: "region".to_string(),
                categories: vec![0, 1, 2],
                drop_first,
            }],
            vec!["lag_1".to_string()],
        )
        .unwrap()
    }

    fn columns() -> Vec<String> {
        vec!["lag_1".to_string(), "region".to_string()]
    }

    #[test]
    fn encodes_by_column_name_not_position() {
        let enc = encoder(false);
        assert_eq!(enc.output_width(), 4);
        assert_eq!(
            enc.encode(&columns(), &[12.0, 1.0]).unwrap(),
            vec![0.0, 1.0, 0.0, 12.0]
        );
    }

    #[test]
    fn drop_first_removes_leading_slot() {
        let enc = encoder(true);
        assert_eq!(enc.output_width(), 3);
        assert_eq!(
            enc.encode(&columns(), &[5.0, 0.0]).unwrap(),
            vec![0.0, 0.0, 5.0]
        );
        assert_eq!(
            enc.encode(&columns(), &[5.0, 2.0]).unwrap(),
            vec![0.0, 1.0, 5.0]
        );
    }

    #[test]
    fn unknown_category_encodes_as_zeros() {
        let enc = encoder(false);
        assert_eq!(
            enc.encode(&columns(), &[1.0, 42.0]).unwrap(),
            vec![0.0, 0.0, 0.0, 1.0]
        );
        assert_eq!(
            enc.encode(&columns(), &[1.0, 1.5]).unwrap(),
            vec![0.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn missing_column_is_an_error() {
        let enc = encoder(false);
        let err = enc
            .encode(&["region".to_string()], &[1.0])
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingColumn { column } if column == "lag_1"));
    }

    #[test]
    fn parses_artifact_json() {
        let enc = OneHotEncoder::from_json(
            r#"{
                "categorical": [
                    {"column": "region", "categories": [0, 1], "drop_first": true},
                    {"column": "day_of_week", "categories": [0, 1, 2, 3, 4, 5, 6]}
                ],
                "passthrough": ["lag_1", "lag_2"]
            }"#,
        )
        .unwrap();

        assert_eq!(enc.output_width(), 1 + 7 + 2);
        assert_eq!(
            enc.input_columns().collect::<Vec<_>>(),
            vec!["region", "day_of_week", "lag_1", "lag_2"]
        );
    }

    #[test]
    fn rejects_empty_categories() {
        assert!(
            OneHotEncoder::from_json(
                r#"{"categorical": [{"column": "region", "categories": []}]}"#
            )
            .is_err()
        );
    }
}

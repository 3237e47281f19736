//! K-means cluster centers.

use serde::{Deserialize, Serialize};

use crate::{ClusterModel, ModelError, check_len};

/// Fitted k-means centers. Cluster `i` is the `i`-th center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansModel {
    cluster_centers: Vec<Vec<f64>>,
}

impl KMeansModel {
    /// Builds a model from its centers.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] if there are no centers, the centers
    /// are zero-dimensional, or their dimensions disagree.
    pub fn new(cluster_centers: Vec<Vec<f64>>) -> Result<Self, ModelError> {
        let model = Self { cluster_centers };
        model.validate()?;
        Ok(model)
    }

    /// Parses and validates a cluster model artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    /// Dimensionality of the centers.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.cluster_centers.first().map_or(0, Vec::len)
    }

    fn validate(&self) -> Result<(), ModelError> {
        let dims = self.dimensions();
        if dims == 0 {
            return Err(ModelError::Invalid {
                message: "cluster model has no centers".to_string(),
            });
        }
        for center in &self.cluster_centers {
            check_len("cluster center", dims, center.len())?;
        }
        Ok(())
    }
}

impl ClusterModel for KMeansModel {
    fn n_clusters(&self) -> usize {
        self.cluster_centers.len()
    }

    fn distances(&self, point: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_len("cluster input", self.dimensions(), point.len())?;

        Ok(self
            .cluster_centers
            .iter()
            .map(|center| {
                center
                    .iter()
                    .zip(point)
                    .map(|(c, p)| (c - p).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_distance_to_every_center() {
        let model = KMeansModel::new(vec![vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
        let distances = model.distances(&[0.0, 0.0]).unwrap();

        assert_eq!(model.n_clusters(), 2);
        assert_eq!(distances, vec![0.0, 5.0]);
    }

    #[test]
    fn rejects_ragged_centers() {
        assert!(KMeansModel::new(vec![vec![0.0, 0.0], vec![1.0]]).is_err());
        assert!(KMeansModel::new(Vec::new()).is_err());
    }

    #[test]
    fn rejects_wrong_point_dimension() {
        let model = KMeansModel::from_json(r#"{"cluster_centers": [[1.0, 2.0]]}"#).unwrap();
        assert!(model.distances(&[1.0, 2.0, 3.0]).is_err());
    }
}

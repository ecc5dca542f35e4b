use rand::{distributions::Distribution, thread_rng};
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

/// Errors returned by a [`LinearEmbedder`]
pub mod embedder_errors;
pub use embedder_errors::EmbedderError;

/// A model that maps each input vector to an embedding vector.
///
/// [`PcaPlotter`](crate::pca_plotter::PcaPlotter) runs an `Embedder` over its evaluation set on every redraw.
pub trait Embedder {
    /// The error returned when embedding fails
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return one embedding per input, in order
    fn embed(&self, inputs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, Self::Error>;
}

/// A linear embedding model, `embedding = W * input`, trained with a triplet loss.
///
/// Serializable with any serde-compatible format. Accumulated gradients are not serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearEmbedder {
    /// `embedding_dimension` rows of `input_dimension` weights
    weights: Vec<Vec<f64>>,
    input_dimension: usize,
    embedding_dimension: usize,

    #[serde(skip)]
    gradients: Vec<Vec<f64>>,
}

/// Hyperparameters for a [`LinearEmbedder`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbedderOptions {
    /// the length of each input vector
    pub input_dimension: usize,
    /// the length of each embedding vector
    pub embedding_dimension: usize,
}

impl LinearEmbedder {
    /// Create a new embedder with weights drawn from `N(0, 1/input_dimension)`
    ///
    /// # Example
    /// ```
    /// use pcaplot::embedder::{Embedder, EmbedderOptions, LinearEmbedder};
    ///
    /// let embedder = LinearEmbedder::new(&EmbedderOptions {
    ///     input_dimension: 4,
    ///     embedding_dimension: 2,
    /// });
    /// let embeddings = embedder.embed(&[vec![1.0, 0.0, -1.0, 0.5]])?;
    /// assert_eq!(embeddings[0].len(), 2);
    /// # Ok::<(), pcaplot::embedder::EmbedderError>(())
    /// ```
    pub fn new(options: &EmbedderOptions) -> Self {
        let std_dev = (options.input_dimension.max(1) as f64).sqrt().recip();
        let normal_distribution =
            Normal::new(0.0, std_dev).expect("Unable to create normal distribution");
        let mut randomness = thread_rng();
        let weights = (0..options.embedding_dimension)
            .map(|_| {
                (0..options.input_dimension)
                    .map(|_| normal_distribution.sample(&mut randomness))
                    .collect()
            })
            .collect();
        LinearEmbedder {
            weights,
            input_dimension: options.input_dimension,
            embedding_dimension: options.embedding_dimension,
            gradients: zeroed(options.embedding_dimension, options.input_dimension),
        }
    }

    /// Create an embedder from an explicit weight matrix of `embedding_dimension` rows, each `input_dimension` long
    ///
    /// # Errors
    /// Returns [`EmbedderError::RaggedWeights`] if the rows are not all the same length
    pub fn from_weights(weights: Vec<Vec<f64>>) -> Result<Self, EmbedderError> {
        let input_dimension = weights.first().map_or(0, |row| row.len());
        if let Some((row, bad_row)) = weights
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != input_dimension)
        {
            return Err(EmbedderError::RaggedWeights {
                row,
                expected: input_dimension,
                actual: bad_row.len(),
            });
        }
        let embedding_dimension = weights.len();
        Ok(LinearEmbedder {
            weights,
            input_dimension,
            embedding_dimension,
            gradients: zeroed(embedding_dimension, input_dimension),
        })
    }

    /// the length of each input vector
    pub fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    /// the length of each embedding vector
    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    /// the weight matrix, one row per embedding dimension
    pub fn weights(&self) -> &[Vec<f64>] {
        &self.weights
    }

    /// Embed a single input
    ///
    /// # Errors
    /// Returns an [`EmbedderError`] if the input is the wrong length or the embedding contains NaNs
    pub fn embed_one(&self, input: &[f64]) -> Result<Vec<f64>, EmbedderError> {
        self.check_input(input, 0)?;
        let embedding: Vec<f64> = self
            .weights
            .iter()
            .map(|row| row.iter().zip(input).map(|(w, x)| w * x).sum())
            .collect();
        if embedding.iter().any(|x| x.is_nan()) {
            return Err(EmbedderError::NansInEmbedding {
                input: input.to_vec(),
            });
        }
        Ok(embedding)
    }

    /// Calculate the triplet loss `max(0, |f(a) - f(p)|^2 - |f(a) - f(n)|^2 + margin)` of one (anchor, positive, negative) triplet, without accumulating gradients
    ///
    /// # Errors
    /// As [`LinearEmbedder::accumulate_triplet_gradient`]
    pub fn triplet_loss(
        &self,
        anchor: &[f64],
        positive: &[f64],
        negative: &[f64],
        margin: f64,
    ) -> Result<f64, EmbedderError> {
        for (position, input) in [anchor, positive, negative].iter().enumerate() {
            self.check_input(input, position)?;
        }
        let anchor_embedding = self.embed_one(anchor)?;
        let positive_gap = difference(&anchor_embedding, &self.embed_one(positive)?);
        let negative_gap = difference(&anchor_embedding, &self.embed_one(negative)?);
        Ok((squared_norm(&positive_gap) - squared_norm(&negative_gap) + margin).max(0.0))
    }

    /// Calculate the triplet loss `max(0, |f(a) - f(p)|^2 - |f(a) - f(n)|^2 + margin)` of one (anchor, positive, negative) triplet,
    /// and add its gradient with respect to the weights to the accumulated gradients.
    ///
    /// Returns the loss. When the loss is zero, the accumulated gradients are left unchanged.
    ///
    /// # Errors
    /// Returns an [`EmbedderError`] if any of the three inputs is the wrong length or embeds to NaN.
    /// [`EmbedderError::MissizedInput`] reports the anchor as position 0, the positive as 1, and the negative as 2
    pub fn accumulate_triplet_gradient(
        &mut self,
        anchor: &[f64],
        positive: &[f64],
        negative: &[f64],
        margin: f64,
    ) -> Result<f64, EmbedderError> {
        for (position, input) in [anchor, positive, negative].iter().enumerate() {
            self.check_input(input, position)?;
        }
        let anchor_embedding = self.embed_one(anchor)?;
        let positive_embedding = self.embed_one(positive)?;
        let negative_embedding = self.embed_one(negative)?;

        let positive_gap = difference(&anchor_embedding, &positive_embedding);
        let negative_gap = difference(&anchor_embedding, &negative_embedding);
        let loss = squared_norm(&positive_gap) - squared_norm(&negative_gap) + margin;
        if loss <= 0.0 {
            return Ok(0.0);
        }

        // d/dW |W(a - p)|^2 = 2 W(a - p)(a - p)^T
        let positive_input_gap = difference(anchor, positive);
        let negative_input_gap = difference(anchor, negative);
        if self.gradients.len() != self.embedding_dimension {
            // gradients aren't serialized, so a deserialized model starts without them
            self.gradients = zeroed(self.embedding_dimension, self.input_dimension);
        }
        for (i, gradient_row) in self.gradients.iter_mut().enumerate() {
            for (j, gradient) in gradient_row.iter_mut().enumerate() {
                *gradient += 2.0
                    * (positive_gap[i] * positive_input_gap[j]
                        - negative_gap[i] * negative_input_gap[j]);
            }
        }
        Ok(loss)
    }

    /// Apply the accumulated gradients to the weights, scaled by `learning_rate`.
    ///
    /// # Errors
    /// Returns [`EmbedderError::NansInWeights`] if the update produced NaN weights. The weights are left in their NaN state
    pub fn update(&mut self, learning_rate: f64) -> Result<(), EmbedderError> {
        for (weight_row, gradient_row) in self.weights.iter_mut().zip(&self.gradients) {
            for (weight, gradient) in weight_row.iter_mut().zip(gradient_row) {
                *weight -= learning_rate * gradient;
            }
        }
        if self.weights.iter().flatten().any(|w| w.is_nan()) {
            return Err(EmbedderError::NansInWeights);
        }
        Ok(())
    }

    /// Reset the accumulated gradients to zero
    pub fn zero_gradients(&mut self) {
        for row in self.gradients.iter_mut() {
            row.iter_mut().for_each(|g| *g = 0.0);
        }
    }

    fn check_input(&self, input: &[f64], position: usize) -> Result<(), EmbedderError> {
        if input.len() != self.input_dimension {
            return Err(EmbedderError::MissizedInput {
                position,
                expected: self.input_dimension,
                actual: input.len(),
            });
        }
        Ok(())
    }
}

impl Embedder for LinearEmbedder {
    type Error = EmbedderError;

    fn embed(&self, inputs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, EmbedderError> {
        inputs
            .iter()
            .enumerate()
            .map(|(position, input)| {
                self.check_input(input, position)?;
                self.embed_one(input)
            })
            .collect()
    }
}

fn zeroed(rows: usize, columns: usize) -> Vec<Vec<f64>> {
    vec![vec![0.0; columns]; rows]
}

fn difference(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

fn squared_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn identity_embedder() -> LinearEmbedder {
        LinearEmbedder::from_weights(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]).unwrap()
    }

    fn triplet_loss(embedder: &LinearEmbedder, a: &[f64], p: &[f64], n: &[f64], margin: f64) -> f64 {
        embedder.triplet_loss(a, p, n, margin).unwrap()
    }

    #[test]
    fn test_new_dimensions() {
        let embedder = LinearEmbedder::new(&EmbedderOptions {
            input_dimension: 5,
            embedding_dimension: 3,
        });
        assert_eq!(embedder.weights().len(), 3);
        assert!(embedder.weights().iter().all(|row| row.len() == 5));
        let embeddings = embedder.embed(&[vec![0.0; 5], vec![1.0; 5]]).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0], vec![0.0; 3]);
    }

    #[test]
    fn test_embed_one() {
        let embedder = identity_embedder();
        assert_eq!(embedder.embed_one(&[3.0, -2.0, 7.0]).unwrap(), vec![3.0, -2.0]);
    }

    #[test]
    fn test_embed_missized_input() {
        let embedder = identity_embedder();
        let result = embedder.embed(&[vec![1.0, 2.0, 3.0], vec![1.0]]);
        assert_eq!(
            result,
            Err(EmbedderError::MissizedInput {
                position: 1,
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn test_embed_nan() {
        let embedder = identity_embedder();
        assert!(matches!(
            embedder.embed_one(&[f64::NAN, 0.0, 0.0]),
            Err(EmbedderError::NansInEmbedding { .. })
        ));
    }

    #[test]
    fn test_ragged_weights() {
        let result = LinearEmbedder::from_weights(vec![vec![1.0, 2.0], vec![1.0]]);
        assert_eq!(
            result,
            Err(EmbedderError::RaggedWeights {
                row: 1,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_satisfied_triplet_has_no_loss() {
        let mut embedder = identity_embedder();
        let loss = embedder
            .accumulate_triplet_gradient(&[0.0, 0.0, 0.0], &[0.1, 0.0, 0.0], &[5.0, 5.0, 0.0], 1.0)
            .unwrap();
        assert_eq!(loss, 0.0);
        assert!(embedder.gradients.iter().flatten().all(|&g| g == 0.0));
    }

    #[test]
    fn test_triplet_loss_value() {
        // |a - p|^2 = 1, |a - n|^2 = 4
        let loss = triplet_loss(
            &identity_embedder(),
            &[0.0, 0.0, 0.0],
            &[1.0, 0.0, 0.0],
            &[0.0, 2.0, 0.0],
            5.0,
        );
        assert_eq!(loss, 2.0);
    }

    #[test]
    fn test_triplet_loss_agrees_with_accumulated_loss() {
        let mut embedder =
            LinearEmbedder::from_weights(vec![vec![0.3, -0.2, 0.5], vec![0.1, 0.4, -0.6]]).unwrap();
        let (a, p, n) = ([0.5, -1.0, 2.0], [0.7, 0.2, 1.0], [-0.4, 0.9, 1.5]);
        let loss = embedder.triplet_loss(&a, &p, &n, 1.0).unwrap();
        let accumulated = embedder.accumulate_triplet_gradient(&a, &p, &n, 1.0).unwrap();
        assert_eq!(loss, accumulated);
    }

    #[test]
    fn test_triplet_loss_reports_position() {
        let embedder = identity_embedder();
        assert_eq!(
            embedder.triplet_loss(&[0.0; 3], &[0.0; 3], &[0.0; 2], 1.0),
            Err(EmbedderError::MissizedInput {
                position: 2,
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_triplet_gradient_matches_finite_difference() {
        let embedder =
            LinearEmbedder::from_weights(vec![vec![0.3, -0.2, 0.5], vec![0.1, 0.4, -0.6]]).unwrap();
        let (a, p, n) = ([0.5, -1.0, 2.0], [0.7, 0.2, 1.0], [-0.4, 0.9, 1.5]);
        let margin = 10.0;
        let mut with_gradient = embedder.clone();
        with_gradient
            .accumulate_triplet_gradient(&a, &p, &n, margin)
            .unwrap();
        let epsilon = 1e-6;
        for i in 0..2 {
            for j in 0..3 {
                let mut plus = embedder.weights.clone();
                plus[i][j] += epsilon;
                let mut minus = embedder.weights.clone();
                minus[i][j] -= epsilon;
                let numeric = (triplet_loss(
                    &LinearEmbedder::from_weights(plus).unwrap(),
                    &a,
                    &p,
                    &n,
                    margin,
                ) - triplet_loss(
                    &LinearEmbedder::from_weights(minus).unwrap(),
                    &a,
                    &p,
                    &n,
                    margin,
                )) / (2.0 * epsilon);
                let analytic = with_gradient.gradients[i][j];
                assert!(
                    (numeric - analytic).abs() < 1e-5,
                    "weight ({}, {}): numeric {} analytic {}",
                    i,
                    j,
                    numeric,
                    analytic
                );
            }
        }
    }

    #[test]
    fn test_update_reduces_loss() {
        let mut embedder =
            LinearEmbedder::from_weights(vec![vec![0.3, -0.2, 0.5], vec![0.1, 0.4, -0.6]]).unwrap();
        let (a, p, n) = ([0.5, -1.0, 2.0], [0.7, 0.2, 1.0], [-0.4, 0.9, 1.5]);
        let before = embedder.accumulate_triplet_gradient(&a, &p, &n, 10.0).unwrap();
        embedder.update(0.01).unwrap();
        embedder.zero_gradients();
        let after = triplet_loss(&embedder, &a, &p, &n, 10.0);
        assert!(after < before, "loss went from {} to {}", before, after);
    }

    #[test]
    fn test_update_detects_nan() {
        let mut embedder = identity_embedder();
        embedder.gradients[0][0] = f64::NAN;
        assert_eq!(embedder.update(0.1), Err(EmbedderError::NansInWeights));
    }

    #[test]
    fn test_serialization_skips_gradients() {
        let mut embedder = identity_embedder();
        embedder
            .accumulate_triplet_gradient(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], 5.0)
            .unwrap();
        let mut buffer = Vec::new();
        ciborium::into_writer(&embedder, &mut buffer).unwrap();
        let mut loaded: LinearEmbedder = ciborium::from_reader(buffer.as_slice()).unwrap();
        assert_eq!(loaded.weights(), embedder.weights());
        assert!(loaded.gradients.is_empty());
        // training a loaded model rebuilds its gradients
        loaded
            .accumulate_triplet_gradient(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], 5.0)
            .unwrap();
        assert_eq!(loaded.gradients, embedder.gradients);
    }
}

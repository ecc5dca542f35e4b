use log::trace;
use nalgebra::{DMatrix, SVD};

/// Errors returned when fitting or applying a projection
pub mod projection_errors;
pub use projection_errors::ProjectionError;

/// Maps a collection of embedding vectors to one 2-dimensional coordinate per vector.
///
/// Implementations must not carry state between calls; every call fits a fresh projection.
pub trait Reducer {
    /// Fit a projection to `embeddings` and return the projected coordinate of each embedding, in order
    fn fit_transform(&self, embeddings: &[Vec<f64>]) -> Result<Vec<[f64; 2]>, ProjectionError>;
}

/// Principal component analysis reducing embeddings to their two highest-variance directions.
///
/// `Pca` holds no fitted state. Each call to [`Pca::fit`] (and so each call to [`Reducer::fit_transform`]) decomposes the data from scratch,
/// which means the orientation of the two axes is not stable between calls: for nearly identical inputs, an axis may come back mirrored,
/// or the two axes may swap when their variances are close. Each component's sign is chosen so its largest-magnitude loading is positive,
/// which makes the result deterministic for a given input, but says nothing about consecutive, slightly different inputs.
///
/// # Example
/// ```
/// use pcaplot::projection::{Pca, Reducer};
///
/// let embeddings = vec![
///     vec![-2.0, 0.1, 0.0],
///     vec![-1.0, -0.1, 0.0],
///     vec![1.0, 0.1, 0.0],
///     vec![2.0, -0.1, 0.0],
/// ];
/// let projected = Pca::new().fit_transform(&embeddings)?;
/// assert_eq!(projected.len(), embeddings.len());
/// # Ok::<(), pcaplot::projection::ProjectionError>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pca {}

/// The result of fitting a [`Pca`] to a set of embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaFit {
    /// per-feature mean of the fitted data
    pub mean: Vec<f64>,
    /// the two principal axes, in order of decreasing explained variance. Each has unit length
    pub components: [Vec<f64>; 2],
    /// the variance of the fitted data along each principal axis
    pub explained_variance: [f64; 2],
    /// the total variance of the fitted data, summed over all features
    pub total_variance: f64,
}

impl Pca {
    /// Create a new 2-component PCA
    pub fn new() -> Self {
        Pca {}
    }

    /// Fit the two principal components of `embeddings`.
    ///
    /// # Errors
    /// Returns a [`ProjectionError`] if
    /// * `embeddings` is empty
    /// * the embeddings are not all the same length
    /// * any value is NaN or infinite
    /// * fewer than two components can be extracted, i.e. there are fewer than two embeddings or the embeddings have fewer than two features
    /// * the singular value decomposition fails to converge
    pub fn fit(&self, embeddings: &[Vec<f64>]) -> Result<PcaFit, ProjectionError> {
        let samples = embeddings.len();
        if samples == 0 {
            return Err(ProjectionError::NoSamples);
        }
        let features = embeddings[0].len();
        for (row, embedding) in embeddings.iter().enumerate() {
            if embedding.len() != features {
                return Err(ProjectionError::RaggedEmbeddings {
                    row,
                    expected: features,
                    actual: embedding.len(),
                });
            }
            if let Some(column) = embedding.iter().position(|value| !value.is_finite()) {
                return Err(ProjectionError::NonFiniteValue { row, column });
            }
        }
        if samples.min(features) < 2 {
            return Err(ProjectionError::TooFewComponents { samples, features });
        }

        let mut mean = vec![0.0; features];
        for embedding in embeddings {
            for (total, value) in mean.iter_mut().zip(embedding) {
                *total += value;
            }
        }
        mean.iter_mut().for_each(|total| *total /= samples as f64);

        let centered = DMatrix::from_fn(samples, features, |i, j| embeddings[i][j] - mean[j]);
        let degrees_of_freedom = (samples - 1) as f64;
        let total_variance = centered.iter().map(|x| x * x).sum::<f64>() / degrees_of_freedom;

        let svd = SVD::try_new(centered, false, true, f64::EPSILON, 0)
            .ok_or(ProjectionError::DecompositionFailed)?;
        let v_t = svd.v_t.ok_or(ProjectionError::DecompositionFailed)?;
        let singular_values = svd.singular_values;

        // strongest directions first
        let mut order: Vec<usize> = (0..singular_values.len()).collect();
        order.sort_by(|&a, &b| singular_values[b].total_cmp(&singular_values[a]));

        let component = |rank: usize| -> Vec<f64> {
            let row = order[rank];
            let mut axis: Vec<f64> = v_t.row(row).iter().copied().collect();
            let dominant = axis
                .iter()
                .copied()
                .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
            if dominant < 0.0 {
                axis.iter_mut().for_each(|x| *x = -*x);
            }
            axis
        };
        let variance = |rank: usize| singular_values[order[rank]].powi(2) / degrees_of_freedom;

        let fit = PcaFit {
            mean,
            components: [component(0), component(1)],
            explained_variance: [variance(0), variance(1)],
            total_variance,
        };
        trace!(
            "fit pca to {} embeddings of dimension {}. explained variance ratio: {:?}",
            samples,
            features,
            fit.explained_variance_ratio()
        );
        Ok(fit)
    }
}

impl Reducer for Pca {
    fn fit_transform(&self, embeddings: &[Vec<f64>]) -> Result<Vec<[f64; 2]>, ProjectionError> {
        let fit = self.fit(embeddings)?;
        fit.transform(embeddings)
    }
}

impl PcaFit {
    /// Project `embeddings` onto the fitted principal axes.
    ///
    /// # Errors
    /// Returns [`ProjectionError::RaggedEmbeddings`] if an embedding's length differs from the fitted feature count
    pub fn transform(&self, embeddings: &[Vec<f64>]) -> Result<Vec<[f64; 2]>, ProjectionError> {
        embeddings
            .iter()
            .enumerate()
            .map(|(row, embedding)| {
                if embedding.len() != self.mean.len() {
                    return Err(ProjectionError::RaggedEmbeddings {
                        row,
                        expected: self.mean.len(),
                        actual: embedding.len(),
                    });
                }
                let mut coordinates = [0.0; 2];
                for (coordinate, axis) in coordinates.iter_mut().zip(self.components.iter()) {
                    *coordinate = embedding
                        .iter()
                        .zip(&self.mean)
                        .zip(axis)
                        .map(|((x, mu), v)| (x - mu) * v)
                        .sum();
                }
                Ok(coordinates)
            })
            .collect()
    }

    /// The fraction of the total variance explained by each component. Both are zero when the fitted data has no variance
    pub fn explained_variance_ratio(&self) -> [f64; 2] {
        if self.total_variance == 0.0 {
            return [0.0, 0.0];
        }
        [
            self.explained_variance[0] / self.total_variance,
            self.explained_variance[1] / self.total_variance,
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn stretched_along_first_axis() -> Vec<Vec<f64>> {
        vec![
            vec![-4.0, 0.2, 0.0],
            vec![-2.0, -0.3, 0.1],
            vec![0.0, 0.1, -0.1],
            vec![2.0, 0.3, 0.0],
            vec![4.0, -0.2, 0.0],
        ]
    }

    #[test]
    fn test_first_component_follows_largest_variance() {
        let fit = Pca::new().fit(&stretched_along_first_axis()).unwrap();
        let first = &fit.components[0];
        assert!(first[0] > 0.99, "first component was {:?}", first);
        assert!(first[1].abs() < 0.1, "first component was {:?}", first);
    }

    #[test]
    fn test_components_are_unit_length_and_orthogonal() {
        let fit = Pca::new().fit(&stretched_along_first_axis()).unwrap();
        let [a, b] = &fit.components;
        let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
        let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        assert!((norm_a - 1.0).abs() < 1e-9);
        assert!((norm_b - 1.0).abs() < 1e-9);
        assert!(dot.abs() < 1e-9);
    }

    #[test]
    fn test_explained_variance_is_ordered() {
        let fit = Pca::new().fit(&stretched_along_first_axis()).unwrap();
        assert!(fit.explained_variance[0] >= fit.explained_variance[1]);
        let ratio = fit.explained_variance_ratio();
        assert!(ratio[0] > 0.9, "ratio was {:?}", ratio);
        assert!(ratio[0] + ratio[1] <= 1.0 + 1e-9);
    }

    #[test]
    fn test_first_component_variance_matches_projection() {
        let data = stretched_along_first_axis();
        let fit = Pca::new().fit(&data).unwrap();
        let projected = fit.transform(&data).unwrap();
        let variance = projected.iter().map(|p| p[0] * p[0]).sum::<f64>() / (data.len() - 1) as f64;
        assert!((variance - fit.explained_variance[0]).abs() < 1e-9);
    }

    #[test]
    fn test_projection_is_centered() {
        let data = stretched_along_first_axis();
        let projected = Pca::new().fit_transform(&data).unwrap();
        assert_eq!(projected.len(), data.len());
        let mean_x = projected.iter().map(|p| p[0]).sum::<f64>() / projected.len() as f64;
        let mean_y = projected.iter().map(|p| p[1]).sum::<f64>() / projected.len() as f64;
        assert!(mean_x.abs() < 1e-9);
        assert!(mean_y.abs() < 1e-9);
    }

    #[test]
    fn test_sign_is_deterministic() {
        let data = stretched_along_first_axis();
        let first = Pca::new().fit_transform(&data).unwrap();
        let second = Pca::new().fit_transform(&data).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_wide_embeddings() {
        // fewer samples than features
        let data = vec![
            vec![1.0, 0.0, 0.0, 0.0, 2.0],
            vec![0.0, 1.0, 0.0, 0.0, -1.0],
            vec![0.0, 0.0, 1.0, 3.0, 0.0],
        ];
        let projected = Pca::new().fit_transform(&data).unwrap();
        assert_eq!(projected.len(), 3);
    }

    #[test]
    fn test_identical_points_project_to_origin() {
        let data = vec![vec![1.0, 2.0]; 4];
        let fit = Pca::new().fit(&data).unwrap();
        assert_eq!(fit.explained_variance_ratio(), [0.0, 0.0]);
        for point in fit.transform(&data).unwrap() {
            assert!(point[0].abs() < 1e-12 && point[1].abs() < 1e-12);
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(Pca::new().fit(&[]), Err(ProjectionError::NoSamples));
    }

    #[test]
    fn test_ragged_input() {
        let data = vec![vec![1.0, 2.0], vec![1.0]];
        assert_eq!(
            Pca::new().fit(&data),
            Err(ProjectionError::RaggedEmbeddings {
                row: 1,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_nan_input() {
        let data = vec![vec![1.0, 2.0], vec![1.0, f64::NAN]];
        assert_eq!(
            Pca::new().fit(&data),
            Err(ProjectionError::NonFiniteValue { row: 1, column: 1 })
        );
    }

    #[test]
    fn test_single_sample() {
        let data = vec![vec![1.0, 2.0, 3.0]];
        assert_eq!(
            Pca::new().fit(&data),
            Err(ProjectionError::TooFewComponents {
                samples: 1,
                features: 3
            })
        );
    }

    #[test]
    fn test_single_feature() {
        let data = vec![vec![1.0], vec![2.0], vec![3.0]];
        assert_eq!(
            Pca::new().fit(&data),
            Err(ProjectionError::TooFewComponents {
                samples: 3,
                features: 1
            })
        );
    }

    #[test]
    fn test_transform_rejects_wrong_length() {
        let fit = Pca::new().fit(&stretched_along_first_axis()).unwrap();
        assert_eq!(
            fit.transform(&[vec![1.0, 2.0]]),
            Err(ProjectionError::RaggedEmbeddings {
                row: 0,
                expected: 3,
                actual: 2
            })
        );
    }
}

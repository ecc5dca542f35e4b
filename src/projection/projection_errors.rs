use std::fmt;

/// Errors returned when fitting or applying a [`Pca`](crate::projection::Pca) projection
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionError {
    /// No embeddings were provided
    NoSamples,
    /// An embedding did not have the same length as the first embedding
    RaggedEmbeddings {
        /// index of the offending embedding
        row: usize,
        /// length of the first embedding
        expected: usize,
        /// length of the offending embedding
        actual: usize,
    },
    /// An embedding contained a NaN or infinite value
    NonFiniteValue {
        /// index of the offending embedding
        row: usize,
        /// index of the offending value within the embedding
        column: usize,
    },
    /// Fewer than two principal components can be extracted from the data. At least two samples and two features are required
    TooFewComponents {
        /// number of embeddings received
        samples: usize,
        /// length of each embedding
        features: usize,
    },
    /// The singular value decomposition did not converge
    DecompositionFailed,
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProjectionError::NoSamples => write!(f, "no embeddings to project"),
            ProjectionError::RaggedEmbeddings {
                row,
                expected,
                actual,
            } => write!(
                f,
                "embedding {} has length {}, but expected length {}",
                row, actual, expected
            ),
            ProjectionError::NonFiniteValue { row, column } => write!(
                f,
                "embedding {} has a non-finite value at index {}",
                row, column
            ),
            ProjectionError::TooFewComponents { samples, features } => write!(
                f,
                "unable to extract 2 principal components from {} samples with {} features. min(samples, features) must be at least 2",
                samples, features
            ),
            ProjectionError::DecompositionFailed => {
                write!(f, "singular value decomposition failed to converge")
            }
        }
    }
}

impl std::error::Error for ProjectionError {}

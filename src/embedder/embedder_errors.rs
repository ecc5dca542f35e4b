use std::fmt;

/// Errors returned by a [`LinearEmbedder`](crate::embedder::LinearEmbedder)
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedderError {
    /// An input vector did not have the length the embedder was built for
    MissizedInput {
        /// the index of the offending input within its batch. 0 for single inputs
        position: usize,
        /// the embedder's input dimension
        expected: usize,
        /// the length of the offending input
        actual: usize,
    },
    /// An embedding contained NaN values, usually because the weights diverged
    NansInEmbedding {
        /// the input that produced the NaN embedding
        input: Vec<f64>,
    },
    /// The updated weights contained NaN values
    NansInWeights,
    /// A row of a weight matrix did not have the same length as the first row
    RaggedWeights {
        /// the index of the offending row
        row: usize,
        /// the length of the first row
        expected: usize,
        /// the length of the offending row
        actual: usize,
    },
}

impl fmt::Display for EmbedderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EmbedderError::MissizedInput {
                position,
                expected,
                actual,
            } => write!(
                f,
                "input {} has length {}, but the embedder expects length {}",
                position, actual, expected
            ),
            EmbedderError::NansInEmbedding { input } => {
                write!(f, "embedding contains NaN values for input {:?}", input)
            }
            EmbedderError::NansInWeights => write!(f, "updated weights contain NaN values"),
            EmbedderError::RaggedWeights {
                row,
                expected,
                actual,
            } => write!(
                f,
                "weight row {} has length {}, but the first row has length {}",
                row, actual, expected
            ),
        }
    }
}

impl std::error::Error for EmbedderError {}

use std::{error::Error, fmt, sync::Arc};

use crate::{projection::ProjectionError, surface::SurfaceError};

/// An error returned by a [`TrainingObserver`](crate::training_observer::TrainingObserver).
///
/// Failures in the predictor, the reducer, or the rendering surface are carried as the error's [source](Error::source), unmodified.
#[derive(Debug, Clone)]
pub struct ObserverError {
    error_kind: ObserverErrorType,
    /// the epoch being handled when the error occurred. `None` at the start of training
    epoch: Option<usize>,
}

#[derive(Debug, Clone)]
enum ObserverErrorType {
    Predict(Arc<dyn Error + Send + Sync>),
    Reduce(ProjectionError),
    Render(SurfaceError),
    MissingLoss,
    EpochOutOfSequence { expected: usize },
    MismatchedLabels { inputs: usize, labels: usize },
    MismatchedEmbeddings { inputs: usize, embeddings: usize },
    Other(Arc<dyn Error + Send + Sync>),
}

impl ObserverError {
    /// Wrap a failure of an observer's own, for observers defined outside this crate.
    /// `epoch` is the epoch being handled, or `None` at the start of training
    ///
    /// # Example
    /// ```
    /// use pcaplot::observer_error::ObserverError;
    ///
    /// let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
    /// let error = ObserverError::other(io_error, Some(4));
    /// assert_eq!(error.to_string(), "epoch 4: disk full");
    /// assert!(error.is_other());
    /// ```
    pub fn other<E: Error + Send + Sync + 'static>(source: E, epoch: Option<usize>) -> Self {
        Self {
            error_kind: ObserverErrorType::Other(Arc::new(source)),
            epoch,
        }
    }

    pub(crate) fn predict<E: Error + Send + Sync + 'static>(source: E, epoch: Option<usize>) -> Self {
        Self {
            error_kind: ObserverErrorType::Predict(Arc::new(source)),
            epoch,
        }
    }

    pub(crate) fn reduce(source: ProjectionError, epoch: Option<usize>) -> Self {
        Self {
            error_kind: ObserverErrorType::Reduce(source),
            epoch,
        }
    }

    pub(crate) fn render(source: SurfaceError, epoch: Option<usize>) -> Self {
        Self {
            error_kind: ObserverErrorType::Render(source),
            epoch,
        }
    }

    pub(crate) fn missing_loss(epoch: usize) -> Self {
        Self {
            error_kind: ObserverErrorType::MissingLoss,
            epoch: Some(epoch),
        }
    }

    pub(crate) fn epoch_out_of_sequence(expected: usize, actual: usize) -> Self {
        Self {
            error_kind: ObserverErrorType::EpochOutOfSequence { expected },
            epoch: Some(actual),
        }
    }

    pub(crate) fn mismatched_labels(inputs: usize, labels: usize) -> Self {
        Self {
            error_kind: ObserverErrorType::MismatchedLabels { inputs, labels },
            epoch: None,
        }
    }

    pub(crate) fn mismatched_embeddings(
        inputs: usize,
        embeddings: usize,
        epoch: Option<usize>,
    ) -> Self {
        Self {
            error_kind: ObserverErrorType::MismatchedEmbeddings { inputs, embeddings },
            epoch,
        }
    }

    /// the epoch being handled when the error occurred, or `None` if it occurred at the start of training or during construction
    pub fn epoch(&self) -> Option<usize> {
        self.epoch
    }

    /// true if the error was caused by an epoch reported without a loss value
    pub fn is_missing_loss(&self) -> bool {
        matches!(self.error_kind, ObserverErrorType::MissingLoss)
    }

    /// true if the error was caused by an epoch number that doesn't follow the epochs already seen
    pub fn is_epoch_out_of_sequence(&self) -> bool {
        matches!(self.error_kind, ObserverErrorType::EpochOutOfSequence { .. })
    }

    /// true if the error came from the predictor
    pub fn is_predict(&self) -> bool {
        matches!(self.error_kind, ObserverErrorType::Predict(_))
    }

    /// true if the error came from the rendering surface
    pub fn is_render(&self) -> bool {
        matches!(self.error_kind, ObserverErrorType::Render(_))
    }

    /// true if the error was built with [`ObserverError::other`]
    pub fn is_other(&self) -> bool {
        matches!(self.error_kind, ObserverErrorType::Other(_))
    }
}

impl fmt::Display for ObserverError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "epoch {}: ", epoch)?;
        }
        match &self.error_kind {
            ObserverErrorType::Predict(source) => {
                write!(f, "predictor failed to embed the evaluation set: {}", source)
            }
            ObserverErrorType::Reduce(source) => {
                write!(f, "failed to project embeddings: {}", source)
            }
            ObserverErrorType::Render(source) => write!(f, "failed to draw figure: {}", source),
            ObserverErrorType::MissingLoss => write!(f, "no training loss was reported"),
            ObserverErrorType::EpochOutOfSequence { expected } => {
                write!(f, "epoch out of sequence, expected epoch {}", expected)
            }
            ObserverErrorType::MismatchedLabels { inputs, labels } => write!(
                f,
                "evaluation set has {} inputs but {} labels",
                inputs, labels
            ),
            ObserverErrorType::MismatchedEmbeddings { inputs, embeddings } => write!(
                f,
                "predictor returned {} embeddings for {} inputs",
                embeddings, inputs
            ),
            ObserverErrorType::Other(source) => write!(f, "{}", source),
        }
    }
}

impl Error for ObserverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.error_kind {
            ObserverErrorType::Predict(source) => Some(source.as_ref()),
            ObserverErrorType::Reduce(source) => Some(source),
            ObserverErrorType::Render(source) => Some(source),
            ObserverErrorType::Other(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_observer_error_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ObserverError>();
    }

    #[test]
    fn test_observer_error_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<ObserverError>();
    }

    #[test]
    fn test_source_is_preserved() {
        let error = ObserverError::reduce(ProjectionError::NoSamples, Some(3));
        let source = error.source().unwrap();
        assert_eq!(source.to_string(), ProjectionError::NoSamples.to_string());
        assert_eq!(error.epoch(), Some(3));
    }

    #[test]
    fn test_display() {
        let error = ObserverError::mismatched_labels(4, 3);
        assert_eq!(error.to_string(), "evaluation set has 4 inputs but 3 labels");
        let error = ObserverError::missing_loss(2);
        assert_eq!(error.to_string(), "epoch 2: no training loss was reported");
    }

    #[test]
    fn test_other_keeps_source_and_epoch() {
        let error = ObserverError::other(ProjectionError::NoSamples, None);
        assert!(error.is_other());
        assert!(!error.is_render());
        assert_eq!(error.epoch(), None);
        assert_eq!(error.to_string(), ProjectionError::NoSamples.to_string());
        assert!(error.source().is_some());
    }
}

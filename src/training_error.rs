use crate::{embedder::EmbedderError, observer_error::ObserverError};

/// Indicates that an error was encountered during training
///
/// If displayed, this error will show the epoch at which the error was encountered, as well as what went wrong.
#[derive(Clone, Debug)]
pub struct TrainingError {
    /// What went wrong
    pub kind: TrainingErrorKind,
    /// The epoch at which the error was encountered. 0 if the error was encountered before the first epoch started
    pub epoch: usize,
}

/// The cause of a [`TrainingError`]
#[derive(Clone, Debug)]
pub enum TrainingErrorKind {
    /// The model failed while embedding or updating
    Model(EmbedderError),
    /// An observer failed. Training does not continue past a failed observer
    Observer(ObserverError),
    /// Triplets need at least two classes, so every anchor has a negative
    TooFewClasses {
        /// the number of distinct labels in the data
        classes: usize,
    },
    /// The data set was empty
    NoData,
}

impl TrainingError {
    pub(crate) fn model(source: EmbedderError, epoch: usize) -> Self {
        TrainingError {
            kind: TrainingErrorKind::Model(source),
            epoch,
        }
    }

    pub(crate) fn observer(source: ObserverError, epoch: usize) -> Self {
        TrainingError {
            kind: TrainingErrorKind::Observer(source),
            epoch,
        }
    }
}

impl std::fmt::Display for TrainingError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "epoch {} encountered error ", self.epoch)?;
        match &self.kind {
            TrainingErrorKind::Model(source) => write!(f, "{}", source),
            TrainingErrorKind::Observer(source) => write!(f, "in observer: {}", source),
            TrainingErrorKind::TooFewClasses { classes } => write!(
                f,
                "data has {} distinct labels, but triplets need at least 2",
                classes
            ),
            TrainingErrorKind::NoData => write!(f, "no data"),
        }
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            TrainingErrorKind::Model(source) => Some(source),
            TrainingErrorKind::Observer(source) => Some(source),
            _ => None,
        }
    }
}

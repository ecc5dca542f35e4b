use std::fmt;

use crate::Sample;

/// Used by the [`train_embedder`](crate::train_embedder) function to determine how the model should be trained.
#[derive(Clone, PartialEq, Debug)]
pub struct TrainingOptions {
    /// number of epochs for which to train, where an epoch is one complete pass through the training data, with each sample used once as an anchor
    pub num_epochs: usize,
    /// number of triplets whose gradients are averaged before each weight update
    pub batch_size: usize,
    /// the factor applied to the averaged gradients when updating the model
    pub learning_rate: f64,
    /// how much farther from the anchor the negative must be than the positive (in squared distance) before a triplet stops contributing to the loss
    pub margin: f64,
}

/// Indicates whether the model should be tested against a validation data set after each epoch
#[derive(Clone, PartialEq, Debug)]
pub enum EachEpoch<'a> {
    /// Test the model against the validation data set after each epoch, and report the validation loss through the [`TrainingObserver`](crate::training_observer::TrainingObserver)
    ValidateModel(&'a [Sample]),
    /// Do not test the model against a validation data set after each epoch
    DoNotValidateModel,
}

impl TrainingOptions {
    /// Create a new TrainingOptions struct with the given parameters.
    /// # Errors
    /// Returns [`TrainingOptionsError`] error if...
    /// * `num_epochs` or `batch_size` is 0
    /// * `learning_rate` is not a positive, finite number
    /// * `margin` is negative or not finite
    pub fn new(
        num_epochs: usize,
        batch_size: usize,
        learning_rate: f64,
        margin: f64,
    ) -> Result<TrainingOptions, TrainingOptionsError> {
        if num_epochs == 0 {
            return Err(TrainingOptionsError::NoEpochs);
        }
        if batch_size == 0 {
            return Err(TrainingOptionsError::EmptyBatch);
        }
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(TrainingOptionsError::InvalidLearningRate(learning_rate));
        }
        if !(margin.is_finite() && margin >= 0.0) {
            return Err(TrainingOptionsError::InvalidMargin(margin));
        }
        Ok(TrainingOptions {
            num_epochs,
            batch_size,
            learning_rate,
            margin,
        })
    }
}

impl Default for TrainingOptions {
    /// Returns a TrainingOptions struct with the following default values:
    /// * `num_epochs`: 20
    /// * `batch_size`: 32
    /// * `learning_rate`: 0.01
    /// * `margin`: 1.0
    fn default() -> Self {
        TrainingOptions {
            num_epochs: 20,
            batch_size: 32,
            learning_rate: 0.01,
            margin: 1.0,
        }
    }
}

/// Errors that can occur when creating a new TrainingOptions struct
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrainingOptionsError {
    /// The number of epochs was zero
    NoEpochs,
    /// The batch size was zero
    EmptyBatch,
    /// The learning rate was zero, negative, or not finite
    InvalidLearningRate(f64),
    /// The margin was negative or not finite
    InvalidMargin(f64),
}

impl fmt::Display for TrainingOptionsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrainingOptionsError::NoEpochs => write!(f, "Number of epochs must be at least 1"),
            TrainingOptionsError::EmptyBatch => write!(f, "Batch size must be at least 1"),
            TrainingOptionsError::InvalidLearningRate(learning_rate) => write!(f, "Learning rate must be positive and finite, got {}", learning_rate),
            TrainingOptionsError::InvalidMargin(margin) => write!(f, "Margin must be non-negative and finite, got {}", margin),
        }
    }
}

impl std::error::Error for TrainingOptionsError {}

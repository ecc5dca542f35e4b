#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! A library to watch an embedding model learn.
//!
//! The `pcaplot` crate contains a training observer, [`pca_plotter::PcaPlotter`], that keeps a figure up to date while a model trains:
//! on the left, the model's embeddings of a fixed evaluation set, projected to two dimensions with principal component analysis and coloured by class;
//! on the right, the training loss of every epoch so far.
//!
//! The plotter works with any model implementing [`embedder::Embedder`], any [`projection::Reducer`], and any [`surface::RenderSurface`].
//! The crate also contains a small trainable model, [`embedder::LinearEmbedder`], and a training loop, [`train_embedder`],
//! that learns embeddings with a triplet loss and reports to any [`training_observer::TrainingObserver`].
//!
//! ## What is a triplet loss?
//! Each training step looks at three samples: an anchor, a positive with the same label as the anchor, and a negative with a different label.
//! The loss is `max(0, |f(anchor) - f(positive)|^2 - |f(anchor) - f(negative)|^2 + margin)`,
//! which pulls samples of the same class together and pushes samples of different classes apart until they are at least `margin` farther away.
//! Watching the projected embeddings separate into clusters is the point of the plotter.
//!
//! # Examples
//! Train a 2-dimensional embedding of 3-dimensional data, drawing the projection and the loss curve to an SVG file after every epoch,
//! then save the model:
//! ```
//! use pcaplot::embedder::{EmbedderOptions, LinearEmbedder};
//! use pcaplot::pca_plotter::PcaPlotter;
//! use pcaplot::surface::FigureSurface;
//! use pcaplot::{Sample, training_options::TrainingOptions, EachEpoch};
//! use tempfile::{tempdir, tempfile};
//!
//! // initialize the model
//! let untrained_model = LinearEmbedder::new(&EmbedderOptions {
//!     input_dimension: 3,
//!     embedding_dimension: 2,
//! });
//!
//! let training_data: Vec<Sample> = Vec::new();
//! /* Load training data */
//! # let training_data = vec![
//! #     Sample::new(vec![1.0, 0.0, 0.1], 0),
//! #     Sample::new(vec![0.9, 0.1, 0.0], 0),
//! #     Sample::new(vec![0.0, 1.0, 0.9], 1),
//! #     Sample::new(vec![0.1, 0.9, 1.0], 1),
//! # ];
//!
//! // plot the embeddings of the training data as the model learns
//! let inputs: Vec<Vec<f64>> = training_data.iter().map(|s| s.features().clone()).collect();
//! let labels: Vec<i64> = training_data.iter().map(|s| s.label()).collect();
//! let dir = tempdir()?;
//! let mut plotter = PcaPlotter::new(&inputs, &labels, FigureSurface::new(dir.path().join("training.svg"))?)?;
//!
//! // train the model
//! let options = TrainingOptions { num_epochs: 5, ..TrainingOptions::default() };
//! let trained_model = pcaplot::train_embedder(untrained_model, &training_data, EachEpoch::DoNotValidateModel, &mut plotter, options)?;
//! assert_eq!(plotter.losses().len(), 5);
//!
//! // save the model
//! // LinearEmbedder implements the serde Serialize trait, so it can be saved to a file using any serde-compatible format
//! // here we use the ciborium crate to save the model in the CBOR format
//! let mut file = tempfile()?;
//! ciborium::into_writer(&trained_model, &mut file)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Contains the [`Embedder`](crate::embedder::Embedder) trait and the trainable [`LinearEmbedder`](crate::embedder::LinearEmbedder).
pub mod embedder;
/// The error returned by observers, [`ObserverError`](crate::observer_error::ObserverError).
pub mod observer_error;
/// Contains the [`PcaPlotter`](crate::pca_plotter::PcaPlotter) observer.
pub mod pca_plotter;
/// Reduces embeddings to two dimensions for plotting.
pub mod projection;
/// Figures the plotter draws on.
pub mod surface;
/// Provides a trait for observing the training process during [`crate::train_embedder`].
pub mod training_observer;
/// Options for training a model with [`crate::train_embedder`].
pub mod training_options;

/// The error returned by [`crate::train_embedder`] and [`crate::validate_embedder`].
pub mod training_error;

use embedder::{EmbedderError, LinearEmbedder};
use log::{debug, trace};
use rand::{thread_rng, Rng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use shuffle::{fy, shuffler::Shuffler};
use training_observer::{EpochLogs, TrainingObserver};
use training_options::TrainingOptions;

pub use training_error::{TrainingError, TrainingErrorKind};
pub use training_observer::EmptyObserver;
pub use training_options::EachEpoch;

/// A sample of data to be used in training a model.
///
/// Used for both [training](train_embedder) and [validation](validate_embedder) data.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Sample {
    /// The input data for the model
    features: Vec<f64>,
    /// The class of the sample
    label: i64,
}

impl Sample {
    /// Create a new Sample
    pub fn new(features: Vec<f64>, label: i64) -> Self {
        Sample { features, label }
    }

    /// Get the features of the sample
    pub fn features(&self) -> &Vec<f64> {
        &self.features
    }
    /// Get the label of the sample
    pub fn label(&self) -> i64 {
        self.label
    }
}

/// Train the provided model with the provided data, using a triplet loss.
///
/// Each epoch, every training sample is used once as an anchor, in a random order. Each anchor is paired with a random positive
/// (another sample with the same label, or the anchor itself if it is the only one of its class) and a random negative (a sample with a different label).
/// The gradients of `options.batch_size` triplets are averaged before each update.
///
/// The observer is called once before the first epoch, with the untrained model, and after each epoch, with the epoch's mean triplet loss.
/// If `validate` is [`EachEpoch::ValidateModel`], the model is also [validated](validate_embedder) after each epoch and the validation loss is reported to the observer;
/// otherwise the reported validation loss is `None`.
///
/// Returns the trained model if no errors are thrown.
///
/// # Errors
/// returns a [TrainingError] if
/// * the training or validation data is empty, or has fewer than two classes. The error is returned before the observer is called
/// * the model reports an error at any point during training
/// * the observer returns an error. Training stops at the first observer error
///
/// # Example
/// train a model, using the provided [EmptyObserver] to ignore all training events:
/// ```
/// use pcaplot::{train_embedder, Sample, training_options::TrainingOptions, EmptyObserver, EachEpoch};
/// use pcaplot::embedder::{EmbedderOptions, LinearEmbedder};
/// # use pcaplot::TrainingError;
///
/// let untrained_model = LinearEmbedder::new(&EmbedderOptions { input_dimension: 2, embedding_dimension: 2 });
/// let mut training_data: Vec<Sample> = Vec::new();
///
/// /* Load training data */
/// # training_data.push(Sample::new(vec![1.0, 2.0], 0));
/// # training_data.push(Sample::new(vec![-1.0, 1.0], 1));
///
/// let trained_model = train_embedder(
///     untrained_model,
///     &training_data,
///     EachEpoch::DoNotValidateModel,
///     &mut EmptyObserver::new(),
///     TrainingOptions::default())?;
/// # Ok::<(), TrainingError>(())
/// ```
pub fn train_embedder<O: TrainingObserver<LinearEmbedder>>(
    mut model: LinearEmbedder,
    training_data: &[Sample],
    validate: EachEpoch,
    observer: &mut O,
    options: TrainingOptions,
) -> Result<LinearEmbedder, TrainingError> {
    let training_classes = ClassIndex::new(training_data).map_err(|kind| TrainingError { kind, epoch: 0 })?;
    let validation = match validate {
        EachEpoch::ValidateModel(validation_data) => {
            let validation_classes = ClassIndex::new(validation_data).map_err(|kind| TrainingError { kind, epoch: 0 })?;
            Some((validation_data, validation_classes))
        }
        EachEpoch::DoNotValidateModel => None,
    };
    // a zero batch size would never update the model
    let batch_size = options.batch_size.max(1);

    observer
        .on_train_begin(&model)
        .map_err(|e| TrainingError::observer(e, 0))?;

    let mut randomness = thread_rng();
    let mut fys = fy::FisherYates::default();
    for epoch in 1..=options.num_epochs {
        let mut epoch_loss = 0.0;
        // shuffle the anchors
        let mut anchors: Vec<usize> = (0..training_data.len()).collect();
        fys.shuffle(&mut anchors, &mut randomness)
            .expect("Shuffling can't fail");

        model.zero_gradients();
        for batch in anchors.chunks(batch_size) {
            for &anchor in batch {
                let (positive, negative) = training_classes.random_triplet(anchor, &mut randomness);
                trace!("epoch {} triplet ({}, {}, {})", epoch, anchor, positive, negative);
                epoch_loss += model
                    .accumulate_triplet_gradient(
                        &training_data[anchor].features,
                        &training_data[positive].features,
                        &training_data[negative].features,
                        options.margin,
                    )
                    .map_err(|e| TrainingError::model(e, epoch))?;
            }
            // average the gradients over the batch
            model
                .update(options.learning_rate / batch.len() as f64)
                .map_err(|e| TrainingError::model(e, epoch))?;
            model.zero_gradients();
        }
        epoch_loss /= training_data.len() as f64;

        let validation_loss = match &validation {
            Some((validation_data, validation_classes)) => Some(
                mean_fixed_triplet_loss(&model, validation_data, validation_classes, options.margin)
                    .map_err(|e| TrainingError::model(e, epoch))?,
            ),
            None => None,
        };
        debug!(
            "epoch {} finished: loss {} validation loss {:?}",
            epoch, epoch_loss, validation_loss
        );
        // notify the observer that the epoch has ended
        observer
            .on_epoch_end(
                &model,
                epoch,
                &EpochLogs {
                    loss: Some(epoch_loss),
                    validation_loss,
                },
            )
            .map_err(|e| TrainingError::observer(e, epoch))?;
    }

    Ok(model)
}

/// Calculates the mean triplet loss of the model on the provided validation data, without updating the model.
///
/// Every sample is used once as an anchor. Triplets are chosen deterministically, so validating the same model on the same data always gives the same loss
/// and losses from different epochs can be compared.
///
/// # Errors
/// returns a [TrainingError] with an epoch of 0 if the data is empty, has fewer than two classes, or the model reports an error
pub fn validate_embedder(
    model: &LinearEmbedder,
    validation_data: &[Sample],
    margin: f64,
) -> Result<f64, TrainingError> {
    let classes = ClassIndex::new(validation_data).map_err(|kind| TrainingError { kind, epoch: 0 })?;
    mean_fixed_triplet_loss(model, validation_data, &classes, margin).map_err(|e| TrainingError::model(e, 0))
}

fn mean_fixed_triplet_loss(
    model: &LinearEmbedder,
    data: &[Sample],
    classes: &ClassIndex,
    margin: f64,
) -> Result<f64, EmbedderError> {
    let mut loss = 0.0;
    for anchor in 0..data.len() {
        let (positive, negative) = classes.fixed_triplet(anchor);
        loss += model.triplet_loss(
            &data[anchor].features,
            &data[positive].features,
            &data[negative].features,
            margin,
        )?;
    }
    Ok(loss / data.len() as f64)
}

/// The indices of the samples of each class, for picking positives and negatives
#[derive(Debug)]
struct ClassIndex {
    /// sample indices, grouped by label. Classes are in ascending label order
    members: Vec<Vec<usize>>,
    /// for each sample, its class and its position within that class
    slots: Vec<(usize, usize)>,
}

impl ClassIndex {
    fn new(data: &[Sample]) -> Result<Self, TrainingErrorKind> {
        if data.is_empty() {
            return Err(TrainingErrorKind::NoData);
        }
        let mut by_label: FxHashMap<i64, Vec<usize>> = FxHashMap::default();
        for (index, sample) in data.iter().enumerate() {
            by_label.entry(sample.label).or_default().push(index);
        }
        if by_label.len() < 2 {
            return Err(TrainingErrorKind::TooFewClasses {
                classes: by_label.len(),
            });
        }
        let mut labelled: Vec<(i64, Vec<usize>)> = by_label.into_iter().collect();
        labelled.sort_unstable_by_key(|(label, _)| *label);
        let members: Vec<Vec<usize>> = labelled.into_iter().map(|(_, indices)| indices).collect();

        let mut slots = vec![(0, 0); data.len()];
        for (class, indices) in members.iter().enumerate() {
            for (position, &index) in indices.iter().enumerate() {
                slots[index] = (class, position);
            }
        }
        Ok(ClassIndex { members, slots })
    }

    /// a uniformly random (positive, negative) pair for `anchor`. The positive is never the anchor unless the anchor is alone in its class
    fn random_triplet<R: Rng>(&self, anchor: usize, randomness: &mut R) -> (usize, usize) {
        let (class, _) = self.slots[anchor];
        let same = &self.members[class];
        let positive = if same.len() == 1 {
            anchor
        } else {
            // draw from every member but the last; if that's the anchor, the last stands in for it
            let candidate = same[randomness.gen_range(0..same.len() - 1)];
            if candidate == anchor {
                same[same.len() - 1]
            } else {
                candidate
            }
        };

        let mut other_class = randomness.gen_range(0..self.members.len() - 1);
        if other_class >= class {
            other_class += 1;
        }
        let others = &self.members[other_class];
        let negative = others[randomness.gen_range(0..others.len())];
        (positive, negative)
    }

    /// a (positive, negative) pair for `anchor` that depends only on the data: the next member of the anchor's class, and a member of the next class
    fn fixed_triplet(&self, anchor: usize) -> (usize, usize) {
        let (class, position) = self.slots[anchor];
        let same = &self.members[class];
        let positive = same[(position + 1) % same.len()];
        let others = &self.members[(class + 1) % self.members.len()];
        let negative = others[position % others.len()];
        (positive, negative)
    }
}

use log::debug;

use crate::{
    embedder::Embedder,
    observer_error::ObserverError,
    projection::{Pca, Reducer},
    surface::{FigureSurface, LinePlot, Region, RenderSurface, ScatterPlot},
    training_observer::{EpochLogs, TrainingObserver},
};

/// Title of the projection region
pub const PROJECTION_TITLE: &str = "PCA of Test Set Embeddings";
/// Heading of the projection region's legend
pub const LEGEND_TITLE: &str = "Classes";
/// Title of the loss region
pub const LOSS_TITLE: &str = "Training Loss Over Epochs";

/// A [`TrainingObserver`] that keeps a figure of the model's embeddings and the training loss up to date.
///
/// At the start of training, and after every epoch, the model being trained embeds a fixed evaluation set;
/// the embeddings are reduced to two dimensions (with [`Pca`], unless another [`Reducer`] is given) and drawn as a scatter plot coloured by label.
/// After every epoch the loss curve so far is drawn next to it.
///
/// The reducer is refit on every redraw, so the axes of consecutive scatter plots are not aligned with each other. See [`Pca`].
///
/// The loss history grows by one value per epoch for the whole run, and is cleared when a new run starts.
///
/// # Example
/// ```
/// use pcaplot::embedder::LinearEmbedder;
/// use pcaplot::pca_plotter::PcaPlotter;
/// use pcaplot::surface::FigureSurface;
/// use pcaplot::training_observer::{EpochLogs, TrainingObserver};
/// # let dir = tempfile::tempdir()?;
/// # let figure_path = dir.path().join("figure.svg");
///
/// let model = LinearEmbedder::from_weights(vec![vec![1.0, 0.0, 0.5], vec![0.0, 1.0, -0.5]])?;
/// let inputs = vec![
///     vec![1.0, 0.0, 0.0],
///     vec![0.9, 0.1, 0.0],
///     vec![0.0, 1.0, 1.0],
///     vec![0.1, 0.8, 1.0],
/// ];
/// let labels = vec![0, 0, 1, 1];
/// let mut plotter = PcaPlotter::new(&inputs, &labels, FigureSurface::new(&figure_path)?)?;
///
/// plotter.on_train_begin(&model)?;
/// plotter.on_epoch_end(&model, 1, &EpochLogs::with_loss(0.8))?;
/// plotter.on_epoch_end(&model, 2, &EpochLogs::with_loss(0.5))?;
/// assert_eq!(plotter.losses(), &[0.8, 0.5]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct PcaPlotter<'a, S: RenderSurface = FigureSurface, R: Reducer = Pca> {
    inputs: &'a [Vec<f64>],
    labels: &'a [i64],
    losses: Vec<f64>,
    reducer: R,
    surface: S,
}

impl<'a, S: RenderSurface> PcaPlotter<'a, S, Pca> {
    /// Create a plotter that projects the embeddings of `inputs` with [`Pca`] and draws them on `surface`, coloured by `labels`.
    ///
    /// # Errors
    /// Returns an [`ObserverError`] if `inputs` and `labels` are not the same length
    pub fn new(inputs: &'a [Vec<f64>], labels: &'a [i64], surface: S) -> Result<Self, ObserverError> {
        PcaPlotter::with_reducer(inputs, labels, Pca::new(), surface)
    }
}

impl<'a, S: RenderSurface, R: Reducer> PcaPlotter<'a, S, R> {
    /// As [`PcaPlotter::new`], projecting with `reducer`
    pub fn with_reducer(
        inputs: &'a [Vec<f64>],
        labels: &'a [i64],
        reducer: R,
        surface: S,
    ) -> Result<Self, ObserverError> {
        if inputs.len() != labels.len() {
            return Err(ObserverError::mismatched_labels(inputs.len(), labels.len()));
        }
        Ok(PcaPlotter {
            inputs,
            labels,
            losses: Vec::new(),
            reducer,
            surface,
        })
    }

    /// the training loss of each epoch completed since training started, in order
    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    /// the surface the figure is drawn on
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// the reducer used to project embeddings
    pub fn reducer(&self) -> &R {
        &self.reducer
    }

    /// Consume the plotter, returning its surface
    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Redraw the projection of the evaluation set's embeddings, and, if `loss_epoch` is given, the loss curve over epochs `1..=loss_epoch`.
    ///
    /// Runs `model` and the reducer exactly once each.
    fn plot<M: Embedder + ?Sized>(
        &mut self,
        model: &M,
        loss_epoch: Option<usize>,
    ) -> Result<(), ObserverError> {
        let embeddings = model
            .embed(self.inputs)
            .map_err(|e| ObserverError::predict(e, loss_epoch))?;
        if embeddings.len() != self.inputs.len() {
            return Err(ObserverError::mismatched_embeddings(
                self.inputs.len(),
                embeddings.len(),
                loss_epoch,
            ));
        }
        let points = self
            .reducer
            .fit_transform(&embeddings)
            .map_err(|e| ObserverError::reduce(e, loss_epoch))?;
        debug!(
            "projected {} embeddings of dimension {} (epoch {:?})",
            embeddings.len(),
            embeddings.first().map_or(0, |e| e.len()),
            loss_epoch
        );

        let render = |e| ObserverError::render(e, loss_epoch);
        self.surface.clear(Region::Projection).map_err(render)?;
        self.surface
            .scatter(
                Region::Projection,
                ScatterPlot {
                    title: PROJECTION_TITLE.to_string(),
                    points,
                    labels: self.labels.to_vec(),
                    legend_title: LEGEND_TITLE.to_string(),
                },
            )
            .map_err(render)?;
        if let Some(epoch) = loss_epoch {
            self.surface.clear(Region::Loss).map_err(render)?;
            self.surface
                .line(
                    Region::Loss,
                    LinePlot {
                        title: LOSS_TITLE.to_string(),
                        x_label: "Epochs".to_string(),
                        y_label: "Loss".to_string(),
                        xs: (1..=epoch).collect(),
                        ys: self.losses.clone(),
                    },
                )
                .map_err(render)?;
        }
        self.surface.flush().map_err(render)
    }
}

impl<'a, M, S, R> TrainingObserver<M> for PcaPlotter<'a, S, R>
where
    M: Embedder + ?Sized,
    S: RenderSurface,
    R: Reducer,
{
    /// Clears the loss history, shows the surface, and draws the projection of the untrained model's embeddings
    fn on_train_begin(&mut self, model: &M) -> Result<(), ObserverError> {
        self.losses.clear();
        self.surface
            .show()
            .map_err(|e| ObserverError::render(e, None))?;
        self.plot(model, None)
    }

    /// Records the epoch's loss, then redraws the projection and the loss curve.
    ///
    /// # Errors
    /// Besides failures while redrawing, the epoch is rejected without being recorded if `logs` has no loss,
    /// or if `epoch` is not one more than the number of epochs already recorded
    fn on_epoch_end(&mut self, model: &M, epoch: usize, logs: &EpochLogs) -> Result<(), ObserverError> {
        let loss = logs.loss.ok_or_else(|| ObserverError::missing_loss(epoch))?;
        let expected = self.losses.len() + 1;
        if epoch != expected {
            return Err(ObserverError::epoch_out_of_sequence(expected, epoch));
        }
        self.losses.push(loss);
        self.plot(model, Some(epoch))
    }
}

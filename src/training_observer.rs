use crate::observer_error::ObserverError;

/// Values reported to observers at the end of each epoch
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EpochLogs {
    /// mean training loss over the epoch. `None` if the training loop did not report one
    pub loss: Option<f64>,
    /// loss over the validation data, if the model was validated after the epoch
    pub validation_loss: Option<f64>,
}

impl EpochLogs {
    /// logs carrying only a training loss
    pub fn with_loss(loss: f64) -> Self {
        EpochLogs {
            loss: Some(loss),
            validation_loss: None,
        }
    }
}

/// Structs implementing this trait can be used to observe the training of a model of type `M`.
///
/// The model is lent to the observer on every call, so an observer can use it (for example, to embed an evaluation set) without owning it
/// or holding a borrow across the training loop's updates.
///
/// Any error returned by an observer aborts training; observers are not expected to recover from their own failures.
pub trait TrainingObserver<M: ?Sized> {
    /// called by [`crate::train_embedder`] once, before the first epoch
    fn on_train_begin(&mut self, model: &M) -> Result<(), ObserverError>;

    /// called by [`crate::train_embedder`] at the end of each epoch. `epoch` is one-indexed, so it equals the number of epochs completed
    fn on_epoch_end(&mut self, model: &M, epoch: usize, logs: &EpochLogs) -> Result<(), ObserverError>;
}

/// Both observers are notified, first `A` then `B`. If `A` fails, `B` is not called
impl<M: ?Sized, A: TrainingObserver<M>, B: TrainingObserver<M>> TrainingObserver<M> for (A, B) {
    fn on_train_begin(&mut self, model: &M) -> Result<(), ObserverError> {
        self.0.on_train_begin(model)?;
        self.1.on_train_begin(model)
    }

    fn on_epoch_end(&mut self, model: &M, epoch: usize, logs: &EpochLogs) -> Result<(), ObserverError> {
        self.0.on_epoch_end(model, epoch, logs)?;
        self.1.on_epoch_end(model, epoch, logs)
    }
}

impl<M: ?Sized, T: TrainingObserver<M> + ?Sized> TrainingObserver<M> for &mut T {
    fn on_train_begin(&mut self, model: &M) -> Result<(), ObserverError> {
        (**self).on_train_begin(model)
    }

    fn on_epoch_end(&mut self, model: &M, epoch: usize, logs: &EpochLogs) -> Result<(), ObserverError> {
        (**self).on_epoch_end(model, epoch, logs)
    }
}

// EmptyObserver is basically a singleton, so there's no point in implementing any other common traits
/// An observer that does nothing when called.
/// Used for ignoring training events in the [`crate::train_embedder`] function.
#[derive(Default)]
pub struct EmptyObserver {}
impl EmptyObserver {
    /// Create a new instance of the EmptyObserver
    pub fn new() -> Self {
        EmptyObserver {}
    }
}
impl<M: ?Sized> TrainingObserver<M> for EmptyObserver {
    fn on_train_begin(&mut self, _model: &M) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _model: &M, _epoch: usize, _logs: &EpochLogs) -> Result<(), ObserverError> {
        Ok(())
    }
}

#![allow(dead_code)]
use std::{cell::Cell, path::PathBuf};

use pcaplot::{
    embedder::Embedder,
    projection::{Pca, ProjectionError, Reducer},
    surface::{LinePlot, Region, RenderSurface, ScatterPlot, SurfaceError},
    Sample,
};

/// Everything a [`RecordingSurface`] was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Show,
    Clear(Region),
    Scatter(Region, ScatterPlot),
    Line(Region, LinePlot),
    Flush,
}

/// A surface that remembers every call instead of drawing. Optionally fails on the nth flush
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub events: Vec<SurfaceEvent>,
    fail_on_flush: Option<usize>,
    flushes: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        RecordingSurface::default()
    }

    /// flushes 1..n-1 succeed, flush n fails
    pub fn failing_on_flush(n: usize) -> Self {
        RecordingSurface {
            fail_on_flush: Some(n),
            ..RecordingSurface::default()
        }
    }

    pub fn last_scatter(&self) -> Option<&ScatterPlot> {
        self.events.iter().rev().find_map(|event| match event {
            SurfaceEvent::Scatter(_, plot) => Some(plot),
            _ => None,
        })
    }

    pub fn last_line(&self) -> Option<&LinePlot> {
        self.events.iter().rev().find_map(|event| match event {
            SurfaceEvent::Line(_, plot) => Some(plot),
            _ => None,
        })
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl RenderSurface for RecordingSurface {
    fn show(&mut self) -> Result<(), SurfaceError> {
        self.events.push(SurfaceEvent::Show);
        Ok(())
    }

    fn clear(&mut self, region: Region) -> Result<(), SurfaceError> {
        self.events.push(SurfaceEvent::Clear(region));
        Ok(())
    }

    fn scatter(&mut self, region: Region, plot: ScatterPlot) -> Result<(), SurfaceError> {
        self.events.push(SurfaceEvent::Scatter(region, plot));
        Ok(())
    }

    fn line(&mut self, region: Region, plot: LinePlot) -> Result<(), SurfaceError> {
        self.events.push(SurfaceEvent::Line(region, plot));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SurfaceError> {
        self.flushes += 1;
        if self.fail_on_flush == Some(self.flushes) {
            return Err(SurfaceError::Render {
                path: PathBuf::from("recording"),
                message: format!("flush {} failed", self.flushes),
            });
        }
        self.events.push(SurfaceEvent::Flush);
        Ok(())
    }
}

/// Wraps an embedder, counting calls to [`Embedder::embed`]
pub struct CountingEmbedder<E> {
    inner: E,
    calls: Cell<usize>,
}

impl<E> CountingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        CountingEmbedder {
            inner,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl<E: Embedder> Embedder for CountingEmbedder<E> {
    type Error = E::Error;

    fn embed(&self, inputs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, Self::Error> {
        self.calls.set(self.calls.get() + 1);
        self.inner.embed(inputs)
    }
}

/// [`Pca`], counting calls to [`Reducer::fit_transform`]
#[derive(Default)]
pub struct CountingReducer {
    calls: Cell<usize>,
}

impl CountingReducer {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Reducer for CountingReducer {
    fn fit_transform(&self, embeddings: &[Vec<f64>]) -> Result<Vec<[f64; 2]>, ProjectionError> {
        self.calls.set(self.calls.get() + 1);
        Pca::new().fit_transform(embeddings)
    }
}

/// `per_class` samples around each of two 4-dimensional centres a unit distance apart, with a little deterministic jitter
pub fn two_clusters(per_class: usize, offset: usize) -> Vec<Sample> {
    let centres = [[0.5, 0.5, 0.0, 0.0], [0.0, 0.0, 0.5, 0.5]];
    let mut samples = Vec::with_capacity(2 * per_class);
    for i in offset..offset + per_class {
        for (label, centre) in centres.iter().enumerate() {
            let features = centre
                .iter()
                .enumerate()
                .map(|(j, c)| c + 0.05 * (((i * 7 + j * 3 + label) % 11) as f64 / 11.0 - 0.5))
                .collect();
            samples.push(Sample::new(features, label as i64));
        }
    }
    samples
}

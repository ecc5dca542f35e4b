use std::{
    collections::BTreeSet,
    ops::Range,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::{debug, info};
use plotters::{coord::Shift, drawing::DrawingAreaErrorKind, prelude::*, style::TRANSPARENT};
use strum::{Display, EnumString};

/// Errors returned while building or drawing a figure
pub mod surface_errors;
pub use surface_errors::SurfaceError;

/// One of the two drawing regions of a figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// the left region, holding the projected embeddings
    Projection,
    /// the right region, holding the loss curve
    Loss,
}

impl Region {
    fn index(self) -> usize {
        match self {
            Region::Projection => 0,
            Region::Loss => 1,
        }
    }
}

/// A scatter plot whose points are coloured by an integer class label, with a legend entry per distinct label
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterPlot {
    /// title drawn above the plot
    pub title: String,
    /// the (x, y) position of each point
    pub points: Vec<[f64; 2]>,
    /// the class label of each point. Must be the same length as `points`
    pub labels: Vec<i64>,
    /// heading of the legend
    pub legend_title: String,
}

/// A single line plotted over integer x values
#[derive(Debug, Clone, PartialEq)]
pub struct LinePlot {
    /// title drawn above the plot
    pub title: String,
    /// description of the x axis
    pub x_label: String,
    /// description of the y axis
    pub y_label: String,
    /// x value of each point
    pub xs: Vec<usize>,
    /// y value of each point. Must be the same length as `xs`
    pub ys: Vec<f64>,
}

/// A figure with two addressable drawing regions.
///
/// Drawing into a region replaces whatever the region held; nothing is guaranteed to be displayed until [`RenderSurface::flush`] is called.
pub trait RenderSurface {
    /// make the figure visible
    fn show(&mut self) -> Result<(), SurfaceError>;
    /// erase the contents of `region`
    fn clear(&mut self, region: Region) -> Result<(), SurfaceError>;
    /// draw a labelled scatter plot with a legend in `region`
    fn scatter(&mut self, region: Region, plot: ScatterPlot) -> Result<(), SurfaceError>;
    /// draw a line plot in `region`
    fn line(&mut self, region: Region, plot: LinePlot) -> Result<(), SurfaceError>;
    /// bring the displayed figure up to date with everything drawn so far
    fn flush(&mut self) -> Result<(), SurfaceError>;
}

/// Image formats a [`FigureSurface`] can write, chosen by the figure's file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FigureFormat {
    /// Scalable vector graphics
    Svg,
}

/// Size in pixels of a [`FigureSurface`] built with [`FigureSurface::new`]. Two side-by-side panels, each 450x400
pub const DEFAULT_FIGURE_SIZE: (u32, u32) = (900, 400);

#[derive(Debug, Clone, PartialEq)]
enum Panel {
    Scatter(ScatterPlot),
    Line(LinePlot),
}

/// A [`RenderSurface`] that keeps the contents of both regions and redraws the whole figure into an image file on every flush.
///
/// Point an image viewer that reloads on change at the file to watch training live.
#[derive(Debug)]
pub struct FigureSurface {
    path: PathBuf,
    format: FigureFormat,
    size: (u32, u32),
    panels: [Option<Panel>; 2],
    visible: bool,
    frames_rendered: usize,
}

impl FigureSurface {
    /// Create a figure of [`DEFAULT_FIGURE_SIZE`] that will be written to `path`.
    ///
    /// # Errors
    /// Returns a [`SurfaceError`] if `path` has no extension, or its extension is not one of the [`FigureFormat`]s
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SurfaceError> {
        FigureSurface::with_size(path, DEFAULT_FIGURE_SIZE)
    }

    /// As [`FigureSurface::new`], with a figure of `size` (width, height) pixels
    pub fn with_size(path: impl Into<PathBuf>, size: (u32, u32)) -> Result<Self, SurfaceError> {
        let path = path.into();
        let format = figure_format(&path)?;
        Ok(FigureSurface {
            path,
            format,
            size,
            panels: [None, None],
            visible: false,
            frames_rendered: 0,
        })
    }

    /// the file the figure is written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// the output format of the figure
    pub fn format(&self) -> FigureFormat {
        self.format
    }

    /// whether [`RenderSurface::show`] has been called
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// the number of times the figure has been written to its file
    pub fn frames_rendered(&self) -> usize {
        self.frames_rendered
    }

    fn render(&mut self) -> Result<(), SurfaceError> {
        let result = match self.format {
            FigureFormat::Svg => {
                let root = SVGBackend::new(&self.path, self.size).into_drawing_area();
                draw_figure(&root, self.size, &self.panels).map_err(|e| e.to_string())
            }
        };
        result.map_err(|message| SurfaceError::Render {
            path: self.path.clone(),
            message,
        })?;
        self.frames_rendered += 1;
        debug!(
            "rendered frame {} to {}",
            self.frames_rendered,
            self.path.display()
        );
        Ok(())
    }
}

impl RenderSurface for FigureSurface {
    /// Renders the current (possibly empty) figure so there is a file to watch
    fn show(&mut self) -> Result<(), SurfaceError> {
        if !self.visible {
            info!("drawing figure to {}", self.path.display());
        }
        self.visible = true;
        self.render()
    }

    fn clear(&mut self, region: Region) -> Result<(), SurfaceError> {
        self.panels[region.index()] = None;
        Ok(())
    }

    fn scatter(&mut self, region: Region, plot: ScatterPlot) -> Result<(), SurfaceError> {
        self.panels[region.index()] = Some(Panel::Scatter(plot));
        Ok(())
    }

    fn line(&mut self, region: Region, plot: LinePlot) -> Result<(), SurfaceError> {
        self.panels[region.index()] = Some(Panel::Line(plot));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SurfaceError> {
        self.render()
    }
}

fn figure_format(path: &Path) -> Result<FigureFormat, SurfaceError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .ok_or_else(|| SurfaceError::MissingExtension {
            path: path.to_path_buf(),
        })?;
    FigureFormat::from_str(extension).map_err(|_| SurfaceError::UnsupportedFormat {
        path: path.to_path_buf(),
        extension: extension.to_string(),
    })
}

fn draw_figure<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    size: (u32, u32),
    panels: &[Option<Panel>; 2],
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally((size.0 / 2) as i32);
    for (area, panel) in [left, right].iter().zip(panels.iter()) {
        match panel {
            Some(Panel::Scatter(plot)) => draw_scatter(area, plot)?,
            Some(Panel::Line(plot)) => draw_line(area, plot)?,
            None => {}
        }
    }
    root.present()?;
    Ok(())
}

fn draw_scatter<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    plot: &ScatterPlot,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let x_range = padded_range(plot.points.iter().map(|p| p[0]));
    let y_range = padded_range(plot.points.iter().map(|p| p[1]));
    let mut chart = ChartBuilder::on(area)
        .caption(&plot.title, ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_range, y_range)?;
    chart.configure_mesh().draw()?;

    let classes: BTreeSet<i64> = plot.labels.iter().copied().collect();
    let (Some(&lowest), Some(&highest)) = (classes.first(), classes.last()) else {
        return Ok(());
    };

    // an empty series carries the legend heading
    chart
        .draw_series(std::iter::empty::<Circle<(f64, f64), i32>>())?
        .label(plot.legend_title.clone())
        .legend(|(x, y)| PathElement::new(vec![(x, y)], &TRANSPARENT));
    for class in classes {
        let color = seismic_color(normalize(class, lowest, highest));
        chart
            .draw_series(
                plot.points
                    .iter()
                    .zip(&plot.labels)
                    .filter(|(_, &label)| label == class)
                    .map(|(point, _)| Circle::new((point[0], point[1]), 3, color.filled())),
            )?
            .label(class.to_string())
            .legend(move |(x, y)| Circle::new((x, y), 3, color.filled()));
    }
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    Ok(())
}

fn draw_line<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    plot: &LinePlot,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let x_min = plot.xs.iter().copied().min().unwrap_or(0);
    let x_max = plot.xs.iter().copied().max().unwrap_or(1).max(x_min + 1);
    let y_range = padded_range(plot.ys.iter().copied());
    let mut chart = ChartBuilder::on(area)
        .caption(&plot.title, ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_range)?;
    chart
        .configure_mesh()
        .x_desc(plot.x_label.clone())
        .y_desc(plot.y_label.clone())
        .draw()?;
    let points = || plot.xs.iter().copied().zip(plot.ys.iter().copied());
    chart.draw_series(LineSeries::new(points(), &BLUE))?;
    chart.draw_series(points().map(|(x, y)| Circle::new((x, y), 2, BLUE.filled())))?;
    Ok(())
}

/// The range spanned by the finite `values`, padded by 10% on each side. Never empty
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (low, high) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), v| {
            (low.min(v), high.max(v))
        });
    if low > high {
        return -1.0..1.0;
    }
    let spread = high - low;
    if spread < 1e-12 {
        return (low - 1.0)..(high + 1.0);
    }
    (low - spread * 0.1)..(high + spread * 0.1)
}

fn normalize(class: i64, lowest: i64, highest: i64) -> f64 {
    if highest == lowest {
        return 0.0;
    }
    // labels may span more than i64::MAX
    (class as f64 - lowest as f64) / (highest as f64 - lowest as f64)
}

/// Diverging dark blue -> white -> dark red colour map, `t` in [0, 1]
fn seismic_color(t: f64) -> RGBColor {
    const ANCHORS: [(f64, [f64; 3]); 5] = [
        (0.0, [0.0, 0.0, 0.3]),
        (0.25, [0.0, 0.0, 1.0]),
        (0.5, [1.0, 1.0, 1.0]),
        (0.75, [1.0, 0.0, 0.0]),
        (1.0, [0.5, 0.0, 0.0]),
    ];
    let t = t.clamp(0.0, 1.0);
    let upper = ANCHORS
        .iter()
        .position(|(stop, _)| *stop >= t)
        .unwrap_or(ANCHORS.len() - 1)
        .max(1);
    let (t0, c0) = ANCHORS[upper - 1];
    let (t1, c1) = ANCHORS[upper];
    let w = (t - t0) / (t1 - t0);
    let channel = |i: usize| ((c0[i] + w * (c1[i] - c0[i])) * 255.0).round() as u8;
    RGBColor(channel(0), channel(1), channel(2))
}

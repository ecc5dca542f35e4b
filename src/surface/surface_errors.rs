use std::{fmt, path::PathBuf};

/// Errors returned by a [`RenderSurface`](crate::surface::RenderSurface)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The figure path has no file extension, so the output format can't be determined
    MissingExtension {
        /// the path of the figure
        path: PathBuf,
    },
    /// The figure path's file extension is not a supported output format
    UnsupportedFormat {
        /// the path of the figure
        path: PathBuf,
        /// the unsupported extension
        extension: String,
    },
    /// The plotting backend failed while drawing or writing the figure
    Render {
        /// the path of the figure
        path: PathBuf,
        /// the backend's description of the failure
        message: String,
    },
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SurfaceError::MissingExtension { path } => write!(
                f,
                "figure path {} has no file extension - unable to determine output format",
                path.display()
            ),
            SurfaceError::UnsupportedFormat { path, extension } => write!(
                f,
                "unsupported figure format '{}' for {}. Supported formats are: svg",
                extension,
                path.display()
            ),
            SurfaceError::Render { path, message } => {
                write!(f, "failed to render figure {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for SurfaceError {}

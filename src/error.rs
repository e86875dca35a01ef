use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop the simulation or the load -> transform -> render pipeline.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("could not open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv file has no header row")]
    EmptyHeader,

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column {0} is not numeric")]
    NotNumeric(String),

    #[error("output directory does not exist: {0}")]
    OutputDirMissing(PathBuf),

    #[error("plotting error: {0}")]
    Plot(String),

    #[error("invalid event: {0}")]
    Event(String),

    #[error("write error: {0}")]
    Write(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

use std::path::PathBuf;

use thiserror::Error;

use crate::cell::GridId;
use crate::view::Axis;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("cell belongs to grid {cell} but was inserted into grid {grid}")]
    TableMismatch { cell: GridId, grid: GridId },

    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("{axis} view {index} has been disposed")]
    DisposedView { axis: Axis, index: i32 },

    #[error("resource directory does not exist: {}", .0.display())]
    MissingResource(PathBuf),

    #[error("table has no cells to export")]
    EmptyTable,

    #[error("region of {columns} x {rows} positions is too large to visit")]
    RegionTooLarge { columns: u64, rows: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("delimited data error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("raster error: {0}")]
    Raster(String),
}

pub type Result<T> = std::result::Result<T, TableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_and_keep_source() {
        let err: TableError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, TableError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "io error: gone");
    }

    #[test]
    fn disposed_view_message_names_axis() {
        let err = TableError::DisposedView {
            axis: Axis::Column,
            index: 3,
        };
        assert_eq!(err.to_string(), "column view 3 has been disposed");
    }
}

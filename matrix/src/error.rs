use std::fmt;

use cube::CubeError;

#[derive(Debug)]
pub enum MatrixError {
    /// Unparseable or unknown command-line argument.
    InvalidArgument(String),

    DimensionOutOfRange(i64),

    /// Fewer rows than processes: some process would own no column.
    TooSmall { nrows: usize, dim: u32 },

    Cube(CubeError),
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "{msg}"),
            Self::DimensionOutOfRange(d) => write!(f, "crazy dim {d} (want 0 <= dim <= {})", cube::MAX_DIM),
            Self::TooSmall { nrows, dim } => {
                write!(f, "{nrows} rows cannot be split over {} processes (dim {dim})", 1u64 << dim)
            }
            Self::Cube(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for MatrixError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cube(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CubeError> for MatrixError {
    fn from(e: CubeError) -> Self { Self::Cube(e) }
}

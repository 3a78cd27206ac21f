//! Distributed Gauss-Jordan elimination over a column-striped matrix, one
//! hypercube vertex per process.

pub mod args;
pub mod error;
pub mod gaussjordan;
pub mod partition;

pub use error::MatrixError;

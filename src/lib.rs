//! Hybrid data - dataset iterators with well-defined exhaustion
//!
//! Thin construction layer over a small tensor dataset model. Every iterator
//! built here is constructed under a CPU placement and over a dataset wrapped
//! for end-of-range detection, so running past the last element always
//! surfaces as [`DataError::OutOfRange`].
//!
//! # Architecture
//!
//! - **Datasets**: lazy element producers with transformation chaining
//! - **Detect end**: wrapping that normalizes exhaustion and drops remainders
//! - **Iterators**: one-shot and initializable cursors
//! - **Adapter**: construction strategy resolved once per process
//!
//! # Example
//!
//! ```ignore
//! use hybrid_data::data::{make_one_shot_iterator, Dataset, TensorSliceDataset};
//!
//! let ds = TensorSliceDataset::new(tensor)?.batch(32, false)?;
//! let mut it = make_one_shot_iterator(&ds, Some(true))?;
//! loop {
//!     match it.get_next() {
//!         Ok(batch) => { /* ... */ }
//!         Err(e) if e.is_out_of_range() => break,
//!         Err(e) => return Err(e),
//!     }
//! }
//! ```

pub mod config;
pub mod data;
pub mod device;

// Re-export commonly used items
pub use config::{DataConfig, IteratorApi};
pub use data::{make_initializable_iterator, make_one_shot_iterator, Dataset};
pub use device::{DeviceScope, DeviceSpec};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("End of sequence")]
    OutOfRange,

    #[error("GetNext() failed because the iterator has not been initialized")]
    Uninitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DataError {
    /// True for the end-of-sequence signal
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, DataError::OutOfRange)
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

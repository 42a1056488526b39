//! Dataset model, end-of-range detection and iterator construction
pub mod dataset_ops;
pub mod detect_end;
pub mod iterator;
pub mod numpy_dataset;
pub mod ops;

pub use dataset_ops::{make_initializable_iterator, make_one_shot_iterator, IteratorAdapter};
pub use detect_end::{raises_out_of_range, DetectEndDataset};
pub use iterator::{DatasetIterator, InitializableIterator, OneShotIterator};
pub use numpy_dataset::{DatasetMetadata, NumpyDataset};
pub use ops::{
    BatchDataset, MapDataset, ShuffleDataset, TakeDataset, TensorSliceDataset, VecDataset,
};

use candle_core::Tensor;

use crate::Result;

/// Fresh pass over a dataset's elements
pub type ElementStream<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// Lazy, re-iterable sequence of elements
///
/// Every call to [`Dataset::stream`] starts an independent pass; datasets
/// themselves hold no cursor state.
pub trait Dataset: Send + Sync {
    type Item: Send + 'static;

    /// Start a new pass over the elements
    fn stream(&self) -> Result<ElementStream<Self::Item>>;

    /// Start a new pass with the batch steps' remainder policy overridden
    ///
    /// `None` leaves every batch step with its own policy. Datasets without
    /// a batch step have no remainder and stream unchanged; transformations
    /// forward the override to their input.
    fn stream_with_remainder(
        &self,
        drop_remainder: Option<bool>,
    ) -> Result<ElementStream<Self::Item>> {
        let _ = drop_remainder;
        self.stream()
    }

    /// Nominal number of rows per element, if this dataset is batched
    fn batch_size(&self) -> Option<usize> {
        None
    }

    /// Whether a trailing partial batch is discarded, if this dataset decides it
    fn drop_remainder(&self) -> Option<bool> {
        None
    }

    /// Number of elements per pass, when known without iterating
    fn cardinality(&self) -> Option<usize> {
        None
    }

    /// Group consecutive elements into batches of `batch_size`
    fn batch(self, batch_size: usize, drop_remainder: bool) -> Result<BatchDataset<Self>>
    where
        Self: Sized,
        Self::Item: Batchable,
    {
        BatchDataset::new(self, batch_size, drop_remainder)
    }

    /// Apply `f` to every element
    fn map<U, F>(self, f: F) -> MapDataset<Self, F, U>
    where
        Self: Sized,
        U: Send + 'static,
        F: Fn(Self::Item) -> Result<U> + Send + Sync + 'static,
    {
        MapDataset::new(self, f)
    }

    /// Keep at most `count` elements
    fn take(self, count: usize) -> TakeDataset<Self>
    where
        Self: Sized,
    {
        TakeDataset::new(self, count)
    }

    /// Shuffle the full dataset on every pass
    ///
    /// With a seed the order is reproducible per pass number, without one
    /// the thread rng is used.
    fn shuffle(self, seed: Option<u64>) -> ShuffleDataset<Self>
    where
        Self: Sized,
    {
        ShuffleDataset::new(self, seed)
    }

    /// Method-form construction of a one-shot iterator
    fn make_one_shot_iterator(&self) -> Result<OneShotIterator<Self::Item>>
    where
        Self: Sized,
    {
        Ok(OneShotIterator::from_stream(self.stream()?))
    }

    /// Method-form construction of an initializable iterator
    fn make_initializable_iterator(&self) -> Result<InitializableIterator<Self::Item>>
    where
        Self: Sized + Clone + 'static,
    {
        Ok(InitializableIterator::new(std::sync::Arc::new(self.clone())))
    }
}

/// Elements that can be stacked into a batch
pub trait Batchable: Sized + Send + 'static {
    /// Stack `items` along a new leading dimension
    fn stack(items: &[Self]) -> Result<Self>;

    /// Number of rows along the leading dimension
    fn batch_len(&self) -> usize;
}

impl Batchable for Tensor {
    fn stack(items: &[Self]) -> Result<Self> {
        Ok(Tensor::stack(items, 0)?)
    }

    fn batch_len(&self) -> usize {
        self.dims().first().copied().unwrap_or(1)
    }
}

impl Batchable for (Tensor, Tensor) {
    fn stack(items: &[Self]) -> Result<Self> {
        let (inputs, targets): (Vec<Tensor>, Vec<Tensor>) = items.iter().cloned().unzip();
        Ok((Tensor::stack(&inputs, 0)?, Tensor::stack(&targets, 0)?))
    }

    fn batch_len(&self) -> usize {
        self.0.batch_len()
    }
}

impl<T: Clone + Send + 'static> Batchable for Vec<T> {
    fn stack(items: &[Self]) -> Result<Self> {
        Ok(items.concat())
    }

    fn batch_len(&self) -> usize {
        self.len()
    }
}

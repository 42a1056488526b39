//! Dataset sources and transformations
use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{Batchable, Dataset, ElementStream};
use crate::{DataError, Result};

/// Rows of a tensor along its first dimension
#[derive(Debug, Clone)]
pub struct TensorSliceDataset {
    tensor: Tensor,
    len: usize,
}

impl TensorSliceDataset {
    /// Slice `tensor` along dim 0; scalars are rejected
    pub fn new(tensor: Tensor) -> Result<Self> {
        let len = match tensor.dims().first() {
            Some(&len) => len,
            None => {
                return Err(DataError::InvalidArgument(
                    "Cannot slice a zero-dimensional tensor".to_string(),
                ))
            }
        };
        Ok(Self { tensor, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Dataset for TensorSliceDataset {
    type Item = Tensor;

    fn stream(&self) -> Result<ElementStream<Tensor>> {
        let tensor = self.tensor.clone();
        Ok(Box::new(
            (0..self.len).map(move |idx| tensor.get(idx).map_err(DataError::from)),
        ))
    }

    fn cardinality(&self) -> Option<usize> {
        Some(self.len)
    }
}

/// In-memory elements, cloned out on every pass
#[derive(Debug)]
pub struct VecDataset<T> {
    items: Arc<Vec<T>>,
}

impl<T> VecDataset<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }
}

impl<T> Clone for VecDataset<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Dataset for VecDataset<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn stream(&self) -> Result<ElementStream<T>> {
        let items = Arc::clone(&self.items);
        Ok(Box::new((0..items.len()).map(move |idx| Ok(items[idx].clone()))))
    }

    fn cardinality(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

/// Consecutive elements stacked into batches
#[derive(Debug, Clone)]
pub struct BatchDataset<D> {
    inner: D,
    batch_size: usize,
    drop_remainder: bool,
}

impl<D> BatchDataset<D>
where
    D: Dataset,
    D::Item: Batchable,
{
    pub fn new(inner: D, batch_size: usize, drop_remainder: bool) -> Result<Self> {
        if batch_size == 0 {
            return Err(DataError::InvalidArgument(
                "batch_size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            inner,
            batch_size,
            drop_remainder,
        })
    }
}

impl<D> Dataset for BatchDataset<D>
where
    D: Dataset,
    D::Item: Batchable,
{
    type Item = D::Item;

    fn stream(&self) -> Result<ElementStream<D::Item>> {
        self.stream_with_remainder(None)
    }

    fn stream_with_remainder(
        &self,
        drop_remainder: Option<bool>,
    ) -> Result<ElementStream<D::Item>> {
        Ok(Box::new(BatchStream {
            inner: self.inner.stream_with_remainder(drop_remainder)?,
            batch_size: self.batch_size,
            drop_remainder: drop_remainder.unwrap_or(self.drop_remainder),
            buffer: Vec::with_capacity(self.batch_size),
            done: false,
        }))
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.batch_size)
    }

    fn drop_remainder(&self) -> Option<bool> {
        Some(self.drop_remainder)
    }

    fn cardinality(&self) -> Option<usize> {
        let n = self.inner.cardinality()?;
        if self.drop_remainder {
            Some(n / self.batch_size)
        } else {
            Some((n + self.batch_size - 1) / self.batch_size)
        }
    }
}

struct BatchStream<T> {
    inner: ElementStream<T>,
    batch_size: usize,
    drop_remainder: bool,
    buffer: Vec<T>,
    done: bool,
}

impl<T: Batchable> Iterator for BatchStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while self.buffer.len() < self.batch_size {
            match self.inner.next() {
                Some(Ok(item)) => self.buffer.push(item),
                // The partial buffer is kept; the caller may resume after an error.
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        let partial = self.buffer.len() < self.batch_size;
        if self.buffer.is_empty() || (partial && self.drop_remainder) {
            self.buffer.clear();
            return None;
        }

        let batch = T::stack(&self.buffer);
        self.buffer.clear();
        Some(batch)
    }
}

/// Element-wise transformation
pub struct MapDataset<D, F, U> {
    inner: D,
    f: Arc<F>,
    _output: PhantomData<fn() -> U>,
}

impl<D, F, U> MapDataset<D, F, U> {
    pub fn new(inner: D, f: F) -> Self {
        Self {
            inner,
            f: Arc::new(f),
            _output: PhantomData,
        }
    }
}

impl<D: Clone, F, U> Clone for MapDataset<D, F, U> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            f: Arc::clone(&self.f),
            _output: PhantomData,
        }
    }
}

impl<D, F, U> Dataset for MapDataset<D, F, U>
where
    D: Dataset,
    U: Send + 'static,
    F: Fn(D::Item) -> Result<U> + Send + Sync + 'static,
{
    type Item = U;

    fn stream(&self) -> Result<ElementStream<U>> {
        self.stream_with_remainder(None)
    }

    fn stream_with_remainder(&self, drop_remainder: Option<bool>) -> Result<ElementStream<U>> {
        let f = Arc::clone(&self.f);
        let inner = self.inner.stream_with_remainder(drop_remainder)?;
        Ok(Box::new(inner.map(move |item| item.and_then(|x| f(x)))))
    }

    fn batch_size(&self) -> Option<usize> {
        self.inner.batch_size()
    }

    fn drop_remainder(&self) -> Option<bool> {
        self.inner.drop_remainder()
    }

    fn cardinality(&self) -> Option<usize> {
        self.inner.cardinality()
    }
}

/// At most `count` leading elements
#[derive(Debug, Clone)]
pub struct TakeDataset<D> {
    inner: D,
    count: usize,
}

impl<D> TakeDataset<D> {
    pub fn new(inner: D, count: usize) -> Self {
        Self { inner, count }
    }
}

impl<D: Dataset> Dataset for TakeDataset<D> {
    type Item = D::Item;

    fn stream(&self) -> Result<ElementStream<D::Item>> {
        self.stream_with_remainder(None)
    }

    fn stream_with_remainder(
        &self,
        drop_remainder: Option<bool>,
    ) -> Result<ElementStream<D::Item>> {
        let inner = self.inner.stream_with_remainder(drop_remainder)?;
        Ok(Box::new(inner.take(self.count)))
    }

    fn batch_size(&self) -> Option<usize> {
        self.inner.batch_size()
    }

    fn drop_remainder(&self) -> Option<bool> {
        self.inner.drop_remainder()
    }

    fn cardinality(&self) -> Option<usize> {
        self.inner.cardinality().map(|n| n.min(self.count))
    }
}

/// Full-buffer shuffle, reshuffled on each pass
#[derive(Debug, Clone)]
pub struct ShuffleDataset<D> {
    inner: D,
    seed: Option<u64>,
    passes: Arc<AtomicU64>,
}

impl<D> ShuffleDataset<D> {
    pub fn new(inner: D, seed: Option<u64>) -> Self {
        Self {
            inner,
            seed,
            passes: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<D: Dataset> Dataset for ShuffleDataset<D> {
    type Item = D::Item;

    fn stream(&self) -> Result<ElementStream<D::Item>> {
        self.stream_with_remainder(None)
    }

    fn stream_with_remainder(
        &self,
        drop_remainder: Option<bool>,
    ) -> Result<ElementStream<D::Item>> {
        let mut items = self
            .inner
            .stream_with_remainder(drop_remainder)?
            .collect::<Result<Vec<_>>>()?;
        let pass = self.passes.fetch_add(1, Ordering::Relaxed);

        match self.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(pass));
                items.shuffle(&mut rng);
            }
            None => {
                let mut rng = rand::thread_rng();
                items.shuffle(&mut rng);
            }
        }

        log::trace!("Shuffled {} elements (pass {})", items.len(), pass);
        Ok(Box::new(items.into_iter().map(Ok)))
    }

    fn batch_size(&self) -> Option<usize> {
        self.inner.batch_size()
    }

    fn drop_remainder(&self) -> Option<bool> {
        self.inner.drop_remainder()
    }

    fn cardinality(&self) -> Option<usize> {
        self.inner.cardinality()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn collect<D: Dataset>(ds: &D) -> Result<Vec<D::Item>> {
        ds.stream()?.collect()
    }

    fn range(n: u32) -> Result<TensorSliceDataset> {
        TensorSliceDataset::new(Tensor::arange(0u32, n, &Device::Cpu)?)
    }

    #[test]
    fn test_tensor_slices() -> Result<()> {
        let ds = range(4)?;
        assert_eq!(ds.cardinality(), Some(4));

        let values = collect(&ds)?
            .iter()
            .map(|t| t.to_scalar::<u32>())
            .collect::<candle_core::Result<Vec<_>>>()?;
        assert_eq!(values, vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_scalar_slice_rejected() -> Result<()> {
        let scalar = Tensor::new(1u32, &Device::Cpu)?;
        assert!(TensorSliceDataset::new(scalar).is_err());
        Ok(())
    }

    #[test]
    fn test_batch_keeps_remainder() -> Result<()> {
        let ds = range(10)?.batch(4, false)?;
        assert_eq!(ds.cardinality(), Some(3));
        assert_eq!(ds.batch_size(), Some(4));

        let batches = collect(&ds)?;
        let lens: Vec<usize> = batches.iter().map(|b| b.batch_len()).collect();
        assert_eq!(lens, vec![4, 4, 2]);
        assert_eq!(batches[2].to_vec1::<u32>()?, vec![8, 9]);
        Ok(())
    }

    #[test]
    fn test_batch_drops_remainder() -> Result<()> {
        let ds = range(10)?.batch(4, true)?;
        assert_eq!(ds.cardinality(), Some(2));
        assert_eq!(collect(&ds)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_batch_size_zero() -> Result<()> {
        assert!(matches!(
            range(3)?.batch(0, false),
            Err(DataError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_map_and_take() -> Result<()> {
        let ds = VecDataset::new(vec![1i64, 2, 3, 4, 5])
            .map(|x| Ok(x * 10))
            .take(3);
        assert_eq!(ds.cardinality(), Some(3));
        assert_eq!(collect(&ds)?, vec![10, 20, 30]);
        Ok(())
    }

    #[test]
    fn test_map_error_propagates() -> Result<()> {
        let ds = VecDataset::new(vec![1i64, 2]).map(|x| {
            if x == 2 {
                Err(DataError::InvalidArgument("two".to_string()))
            } else {
                Ok(x)
            }
        });
        let results: Vec<Result<i64>> = ds.stream()?.collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DataError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn test_seeded_shuffle_is_a_permutation() -> Result<()> {
        let items: Vec<i64> = (0..32).collect();
        let ds = VecDataset::new(items.clone()).shuffle(Some(7));
        let first = collect(&ds)?;
        let second = collect(&ds)?;
        assert_ne!(first, second, "each pass reshuffles");

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, items);

        // Same seed and pass number give the same order
        let replay = VecDataset::new(items).shuffle(Some(7));
        assert_eq!(collect(&replay)?, first);
        Ok(())
    }

    #[test]
    fn test_remainder_override_reaches_batch_step() -> Result<()> {
        let ds = range(10)?.batch(4, false)?.map(Ok).shuffle(Some(3));
        let lens = |items: Vec<Tensor>| items.iter().map(|b| b.batch_len()).collect::<Vec<_>>();

        let kept = lens(ds.stream_with_remainder(None)?.collect::<Result<Vec<_>>>()?);
        assert_eq!(kept.len(), 3);

        let dropped = lens(ds.stream_with_remainder(Some(true))?.collect::<Result<Vec<_>>>()?);
        assert_eq!(dropped, vec![4, 4]);

        // An unbatched source has no remainder to drop
        let rows = VecDataset::new(vec![vec![1u8, 2, 3], vec![4]]);
        assert_eq!(rows.stream_with_remainder(Some(true))?.count(), 2);
        Ok(())
    }
}

//! End-of-range detection
//!
//! [`raises_out_of_range`] wraps a dataset so that exhaustion is always seen
//! the same way by iterators: the wrapped stream simply ends, whether the
//! inner stream ended or reported [`DataError::OutOfRange`] itself. The
//! remainder policy is handed down to the batch steps of the inner pipeline,
//! so undersized batches are dropped where they are formed, wherever they
//! later land in the sequence.
use super::{Dataset, ElementStream};
use crate::device::{current_device, DeviceSpec};
use crate::{DataError, Result};

/// Run `body` with `dataset` wrapped for end-of-range detection
///
/// The effective drop-remainder policy is `drop_remainder` if set, else the
/// dataset's own policy, else `false`. The wrapped dataset is only handed to
/// `body`; it is released when the scope ends.
pub fn raises_out_of_range<D, R, F>(
    dataset: &D,
    drop_remainder: Option<bool>,
    body: F,
) -> Result<R>
where
    D: Dataset + Clone,
    F: FnOnce(&DetectEndDataset<D>) -> Result<R>,
{
    let wrapped = DetectEndDataset::new(dataset.clone(), drop_remainder);
    log::debug!(
        "Detecting end of range (drop_remainder={:?}, placement={})",
        wrapped.drop_remainder,
        wrapped
            .placement
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unplaced".to_string())
    );
    body(&wrapped)
}

/// Dataset whose passes end cleanly, with an optional remainder override
#[derive(Debug, Clone)]
pub struct DetectEndDataset<D> {
    inner: D,
    /// Policy pushed down to the batch steps; `None` keeps their own
    drop_remainder: Option<bool>,
    placement: Option<DeviceSpec>,
}

impl<D: Dataset> DetectEndDataset<D> {
    pub fn new(inner: D, drop_remainder: Option<bool>) -> Self {
        let drop_remainder = drop_remainder.or(inner.drop_remainder());
        Self {
            inner,
            drop_remainder,
            placement: current_device(),
        }
    }

    /// Placement active when the wrapper was created
    pub fn placement(&self) -> Option<DeviceSpec> {
        self.placement
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Dataset> Dataset for DetectEndDataset<D> {
    type Item = D::Item;

    fn stream(&self) -> Result<ElementStream<D::Item>> {
        Ok(Box::new(DetectEndStream {
            inner: Some(self.inner.stream_with_remainder(self.drop_remainder)?),
        }))
    }

    fn batch_size(&self) -> Option<usize> {
        self.inner.batch_size()
    }

    fn drop_remainder(&self) -> Option<bool> {
        Some(self.drop_remainder.unwrap_or(false))
    }

    fn cardinality(&self) -> Option<usize> {
        // A remainder may be dropped here that the inner dataset still counts.
        if self.drop_remainder == Some(true) && self.inner.drop_remainder() != Some(true) {
            return None;
        }
        self.inner.cardinality()
    }
}

struct DetectEndStream<T> {
    /// `None` once the inner stream is exhausted
    inner: Option<ElementStream<T>>,
}

impl<T> Iterator for DetectEndStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.inner.as_mut()?.next();
        match next {
            None | Some(Err(DataError::OutOfRange)) => {
                self.inner = None;
                None
            }
            other => other,
        }
    }
}

//! One-shot and initializable iterators
//!
//! Both surface exhaustion as [`DataError::OutOfRange`] from `get_next`.
//! Their `Iterator` impls turn that signal into `None`, so a plain `for`
//! loop stops at the end and still sees every other error.
use std::sync::Arc;

use super::{Dataset, ElementStream};
use crate::device::{current_device, DeviceSpec};
use crate::{DataError, Result};

/// Common interface over dataset iterators
pub trait DatasetIterator {
    type Item;

    /// Next element, or `DataError::OutOfRange` past the end
    fn get_next(&mut self) -> Result<Self::Item>;

    /// Placement active when the iterator was constructed
    fn device(&self) -> Option<DeviceSpec>;

    /// Elements returned since construction or the last initialization
    fn produced(&self) -> usize;
}

/// Iterator usable right after construction
pub struct OneShotIterator<T> {
    stream: ElementStream<T>,
    device: Option<DeviceSpec>,
    produced: usize,
    exhausted: bool,
}

impl<T> OneShotIterator<T> {
    /// Wrap a stream, recording the current placement
    pub fn from_stream(stream: ElementStream<T>) -> Self {
        Self::placed(stream, current_device())
    }

    fn placed(stream: ElementStream<T>, device: Option<DeviceSpec>) -> Self {
        Self {
            stream,
            device,
            produced: 0,
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<T> DatasetIterator for OneShotIterator<T> {
    type Item = T;

    fn get_next(&mut self) -> Result<T> {
        if self.exhausted {
            return Err(DataError::OutOfRange);
        }

        match self.stream.next() {
            Some(Ok(item)) => {
                self.produced += 1;
                Ok(item)
            }
            None | Some(Err(DataError::OutOfRange)) => {
                self.exhausted = true;
                log::debug!("End of sequence after {} elements", self.produced);
                Err(DataError::OutOfRange)
            }
            Some(Err(e)) => Err(e),
        }
    }

    fn device(&self) -> Option<DeviceSpec> {
        self.device
    }

    fn produced(&self) -> usize {
        self.produced
    }
}

impl<T> Iterator for OneShotIterator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.get_next() {
            Ok(item) => Some(Ok(item)),
            Err(DataError::OutOfRange) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Iterator that must be initialized before the first `get_next`
pub struct InitializableIterator<T> {
    dataset: Arc<dyn Dataset<Item = T>>,
    device: Option<DeviceSpec>,
    current: Option<OneShotIterator<T>>,
}

impl<T: Send + 'static> InitializableIterator<T> {
    pub fn new(dataset: Arc<dyn Dataset<Item = T>>) -> Self {
        Self {
            dataset,
            device: current_device(),
            current: None,
        }
    }

    /// Start (or restart) from the first element
    pub fn initialize(&mut self) -> Result<()> {
        let stream = self.dataset.stream()?;
        self.current = Some(OneShotIterator::placed(stream, self.device));
        log::debug!("Initialized iterator");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }
}

impl<T> DatasetIterator for InitializableIterator<T> {
    type Item = T;

    fn get_next(&mut self) -> Result<T> {
        match self.current.as_mut() {
            Some(it) => it.get_next(),
            None => Err(DataError::Uninitialized),
        }
    }

    fn device(&self) -> Option<DeviceSpec> {
        self.device
    }

    fn produced(&self) -> usize {
        self.current.as_ref().map_or(0, |it| it.produced)
    }
}

impl<T> Iterator for InitializableIterator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.get_next() {
            Ok(item) => Some(Ok(item)),
            Err(DataError::OutOfRange) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Free-function construction of a one-shot iterator
pub fn one_shot<D: Dataset>(dataset: &D) -> Result<OneShotIterator<D::Item>> {
    let stream = dataset.stream()?;
    log::debug!("Constructed one-shot iterator");
    Ok(OneShotIterator::from_stream(stream))
}

/// Free-function construction of an initializable iterator
pub fn initializable<D>(dataset: &D) -> Result<InitializableIterator<D::Item>>
where
    D: Dataset + Clone + 'static,
{
    log::debug!("Constructed initializable iterator");
    Ok(InitializableIterator::new(Arc::new(dataset.clone())))
}

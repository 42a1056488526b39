//! Iterator construction with CPU placement and end-of-range detection
//!
//! Every construction enters a `/cpu:0` placement first, then wraps the
//! dataset with [`raises_out_of_range`], and builds the iterator over the
//! wrapped dataset with whichever primitive the adapter was resolved to.
use std::sync::OnceLock;

use super::detect_end::{raises_out_of_range, DetectEndDataset};
use super::iterator::{self, InitializableIterator, OneShotIterator};
use super::Dataset;
use crate::config::{DataConfig, IteratorApi};
use crate::device::{with_device, DeviceSpec};
use crate::Result;

static GLOBAL: OnceLock<IteratorAdapter> = OnceLock::new();

/// Construction strategy for dataset iterators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IteratorAdapter {
    api: IteratorApi,
    default_drop_remainder: Option<bool>,
}

impl IteratorAdapter {
    /// Adapter using `api`; `Auto` is resolved immediately
    pub fn new(api: IteratorApi) -> Self {
        Self {
            api: api.resolve(),
            default_drop_remainder: None,
        }
    }

    pub fn from_config(config: &DataConfig) -> Self {
        Self {
            api: config.iterator_api.resolve(),
            default_drop_remainder: config.default_drop_remainder,
        }
    }

    /// Adapter configured from the environment
    ///
    /// Invalid settings are logged and replaced by the defaults.
    pub fn from_env() -> Self {
        let config = DataConfig::from_env().unwrap_or_else(|e| {
            log::warn!("Ignoring data configuration from environment: {}", e);
            DataConfig::default()
        });
        Self::from_config(&config)
    }

    /// Process-wide adapter, resolved from the environment on first use
    pub fn global() -> &'static IteratorAdapter {
        GLOBAL.get_or_init(|| {
            let adapter = IteratorAdapter::from_env();
            log::info!("Iterator construction uses the {} api", adapter.api);
            adapter
        })
    }

    pub fn api(&self) -> IteratorApi {
        self.api
    }

    /// One-shot iterator over `dataset`
    pub fn make_one_shot_iterator<D>(
        &self,
        dataset: &D,
        drop_remainder: Option<bool>,
    ) -> Result<OneShotIterator<D::Item>>
    where
        D: Dataset + Clone,
    {
        with_device(DeviceSpec::cpu(), || {
            let drop_remainder = self.drop_remainder_for(dataset, drop_remainder);
            raises_out_of_range(dataset, drop_remainder, |wrapped: &DetectEndDataset<D>| {
                match self.api {
                    IteratorApi::DatasetMethod => wrapped.make_one_shot_iterator(),
                    _ => iterator::one_shot(wrapped),
                }
            })
        })
    }

    /// Initializable iterator over `dataset`; the caller initializes it
    pub fn make_initializable_iterator<D>(
        &self,
        dataset: &D,
        drop_remainder: Option<bool>,
    ) -> Result<InitializableIterator<D::Item>>
    where
        D: Dataset + Clone + 'static,
    {
        with_device(DeviceSpec::cpu(), || {
            let drop_remainder = self.drop_remainder_for(dataset, drop_remainder);
            raises_out_of_range(dataset, drop_remainder, |wrapped: &DetectEndDataset<D>| {
                match self.api {
                    IteratorApi::DatasetMethod => wrapped.make_initializable_iterator(),
                    _ => iterator::initializable(wrapped),
                }
            })
        })
    }

    fn drop_remainder_for<D: Dataset>(&self, dataset: &D, requested: Option<bool>) -> Option<bool> {
        requested
            .or(dataset.drop_remainder())
            .or(self.default_drop_remainder)
    }
}

impl Default for IteratorAdapter {
    fn default() -> Self {
        Self::new(IteratorApi::Auto)
    }
}

/// One-shot iterator over `dataset` using the process-wide adapter
pub fn make_one_shot_iterator<D>(
    dataset: &D,
    drop_remainder: Option<bool>,
) -> Result<OneShotIterator<D::Item>>
where
    D: Dataset + Clone,
{
    IteratorAdapter::global().make_one_shot_iterator(dataset, drop_remainder)
}

/// Initializable iterator over `dataset` using the process-wide adapter
pub fn make_initializable_iterator<D>(
    dataset: &D,
    drop_remainder: Option<bool>,
) -> Result<InitializableIterator<D::Item>>
where
    D: Dataset + Clone + 'static,
{
    IteratorAdapter::global().make_initializable_iterator(dataset, drop_remainder)
}

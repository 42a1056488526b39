//! NumPy dataset source (.npy format)
use candle_core::{Device, Tensor};
use ndarray::{Array2, ArrayView1};
use ndarray_npy::ReadNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use super::{Dataset, ElementStream};
use crate::{DataError, Result};

/// Metadata from dataset.json
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetMetadata {
    pub vocab_size: usize,
    pub seq_len: usize,
    #[serde(default)]
    pub num_examples: usize,
    #[serde(default)]
    pub description: String,
}

/// Dataset loaded from NumPy .npy files
///
/// Each element is an `(input, label)` pair of `u32` rows of length
/// `seq_len`, materialized on the CPU.
#[derive(Debug, Clone)]
pub struct NumpyDataset {
    inputs: Arc<Array2<i32>>, // [N, seq_len]
    labels: Arc<Array2<i32>>, // [N, seq_len]
    metadata: DatasetMetadata,
}

fn read_npy<T: ReadNpyExt>(path: &Path) -> Result<T> {
    T::read_npy(File::open(path)?).map_err(|e| {
        DataError::Config(format!("Failed to read {}: {}", path.display(), e))
    })
}

impl NumpyDataset {
    /// Load from directory containing .npy files and dataset.json
    pub fn from_directory<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dir = path.as_ref();

        log::info!("Loading NumPy dataset from: {:?}", dir);

        // Load metadata
        let metadata_path = dir.join("dataset.json");
        let metadata: Option<DatasetMetadata> = if metadata_path.exists() {
            let file = File::open(&metadata_path)?;
            Some(serde_json::from_reader(BufReader::new(file))?)
        } else {
            log::warn!("dataset.json not found, using defaults");
            None
        };

        // Python saves as i64
        let inputs = read_npy::<Array2<i64>>(&dir.join("all__inputs.npy"))?.mapv(|x| x as i32);
        log::info!("Loaded inputs: shape {:?}", inputs.shape());

        let labels = read_npy::<Array2<i64>>(&dir.join("all__labels.npy"))?.mapv(|x| x as i32);
        log::info!("Loaded labels: shape {:?}", labels.shape());

        Self::from_arrays(inputs, labels, metadata)
    }

    /// Build from in-memory arrays
    pub fn from_arrays(
        inputs: Array2<i32>,
        labels: Array2<i32>,
        metadata: Option<DatasetMetadata>,
    ) -> Result<Self> {
        if inputs.shape() != labels.shape() {
            return Err(DataError::Config(format!(
                "Shape mismatch: inputs {:?} != labels {:?}",
                inputs.shape(),
                labels.shape()
            )));
        }

        let num_examples = inputs.nrows();
        let seq_len = inputs.ncols();
        let metadata = metadata.unwrap_or_else(|| DatasetMetadata {
            vocab_size: 256,
            seq_len,
            num_examples,
            description: "Unknown".to_string(),
        });

        log::info!(
            "Dataset loaded: {} examples, seq_len={}, vocab_size={}",
            num_examples,
            seq_len,
            metadata.vocab_size
        );

        Ok(Self {
            inputs: Arc::new(inputs),
            labels: Arc::new(labels),
            metadata,
        })
    }

    /// Get number of examples
    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inputs.nrows() == 0
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.metadata.vocab_size
    }

    /// Get sequence length
    pub fn seq_len(&self) -> usize {
        self.inputs.ncols()
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn get_input(&self, idx: usize) -> ArrayView1<i32> {
        self.inputs.row(idx)
    }

    pub fn get_label(&self, idx: usize) -> ArrayView1<i32> {
        self.labels.row(idx)
    }

    fn example(&self, idx: usize) -> Result<(Tensor, Tensor)> {
        let seq_len = self.seq_len();
        // Convert i32 to u32 for Candle
        let input: Vec<u32> = self.get_input(idx).iter().map(|&x| x as u32).collect();
        let label: Vec<u32> = self.get_label(idx).iter().map(|&x| x as u32).collect();
        Ok((
            Tensor::from_vec(input, seq_len, &Device::Cpu)?,
            Tensor::from_vec(label, seq_len, &Device::Cpu)?,
        ))
    }
}

impl Dataset for NumpyDataset {
    type Item = (Tensor, Tensor);

    fn stream(&self) -> Result<ElementStream<(Tensor, Tensor)>> {
        let dataset = self.clone();
        Ok(Box::new((0..self.len()).map(move |idx| dataset.example(idx))))
    }

    fn cardinality(&self) -> Option<usize> {
        Some(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{make_one_shot_iterator, Batchable, DatasetIterator};
    use ndarray::array;
    use ndarray_npy::WriteNpyExt;

    fn write_fixture(dir: &Path, rows: usize) -> anyhow::Result<()> {
        let inputs = Array2::<i64>::from_shape_fn((rows, 3), |(i, j)| (i * 3 + j) as i64);
        let labels = inputs.mapv(|x| x + 100);
        inputs.write_npy(File::create(dir.join("all__inputs.npy"))?)?;
        labels.write_npy(File::create(dir.join("all__labels.npy"))?)?;
        std::fs::write(
            dir.join("dataset.json"),
            r#"{"vocab_size": 11, "seq_len": 3, "description": "fixture"}"#,
        )?;
        Ok(())
    }

    #[test]
    fn test_metadata_deserialization() {
        let json = r#"{
            "vocab_size": 11,
            "seq_len": 81,
            "num_examples": 1000000,
            "description": "Sudoku-Extreme"
        }"#;

        let metadata: DatasetMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.vocab_size, 11);
        assert_eq!(metadata.seq_len, 81);
        assert_eq!(metadata.num_examples, 1000000);
    }

    #[test]
    fn test_load_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path(), 5)?;

        let ds = NumpyDataset::from_directory(dir.path())?;
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.seq_len(), 3);
        assert_eq!(ds.vocab_size(), 11);
        assert_eq!(ds.metadata().description, "fixture");

        let (input, label) = ds.stream()?.next().unwrap()?;
        assert_eq!(input.to_vec1::<u32>()?, vec![0, 1, 2]);
        assert_eq!(label.to_vec1::<u32>()?, vec![100, 101, 102]);
        Ok(())
    }

    #[test]
    fn test_missing_inputs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(NumpyDataset::from_directory(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_shape_mismatch() {
        let inputs = array![[1, 2], [3, 4]];
        let labels = array![[1, 2, 3]];
        let err = NumpyDataset::from_arrays(inputs, labels, None).unwrap_err();
        assert!(matches!(err, DataError::Config(_)));
    }

    #[test]
    fn test_batched_iteration() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path(), 5)?;
        let ds = NumpyDataset::from_directory(dir.path())?.batch(2, false)?;

        let mut it = make_one_shot_iterator(&ds, Some(true))?;
        let (inputs, labels) = it.get_next()?;
        assert_eq!(inputs.dims(), &[2, 3]);
        assert_eq!(labels.batch_len(), 2);
        it.get_next()?;
        assert!(it.get_next().unwrap_err().is_out_of_range());
        Ok(())
    }
}

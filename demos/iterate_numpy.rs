/// Iterate a NumPy dataset until end of sequence
///
/// Usage: cargo run --example iterate_numpy -- <data_dir> [batch_size] [--drop-remainder]
use hybrid_data::data::{
    make_initializable_iterator, make_one_shot_iterator, DatasetIterator, NumpyDataset,
};
use hybrid_data::{DataError, Dataset};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("=== Hybrid data - NumPy iteration ===");

    let mut args = std::env::args().skip(1);
    let data_path = args.next().ok_or_else(|| {
        anyhow::anyhow!("usage: iterate_numpy <data_dir> [batch_size] [--drop-remainder]")
    })?;
    let mut batch_size = 16;
    let mut drop_remainder = None;
    for arg in args {
        if arg == "--drop-remainder" {
            drop_remainder = Some(true);
        } else {
            batch_size = arg.parse()?;
        }
    }

    let dataset = NumpyDataset::from_directory(&data_path)?;

    log::info!("Dataset loaded:");
    log::info!("  - Total examples: {}", dataset.len());
    log::info!("  - Vocab size: {}", dataset.vocab_size());
    log::info!("  - Sequence length: {}", dataset.seq_len());
    log::info!("  - Description: {}", dataset.metadata().description);

    let batched = dataset.shuffle(None).batch(batch_size, false)?;
    log::info!("  - Batch size: {}", batch_size);
    log::info!("  - Num batches: {:?}", batched.cardinality());

    // One pass through a one-shot iterator
    let mut it = make_one_shot_iterator(&batched, drop_remainder)?;
    let mut rows = 0;
    loop {
        match it.get_next() {
            Ok((inputs, _targets)) => rows += inputs.dims()[0],
            Err(DataError::OutOfRange) => break,
            Err(e) => return Err(e.into()),
        }
    }
    log::info!("One-shot: {} batches, {} rows on {:?}", it.produced(), rows, it.device());

    // Two epochs through an initializable iterator
    let mut it = make_initializable_iterator(&batched, drop_remainder)?;
    for epoch in 0..2 {
        it.initialize()?;
        let batches = it.by_ref().collect::<Result<Vec<_>, _>>()?;
        log::info!("Epoch {}: {} batches", epoch, batches.len());
    }

    Ok(())
}

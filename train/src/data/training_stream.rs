use super::*;
use crate::{
    common::*,
    config::{Config, ModelConfig, PreprocessorConfig, TrainingConfig},
};
use futures::stream::{self, StreamExt as _};

/// The number of optimization steps per epoch.
///
/// Trailing records that do not fill a whole batch are left out, except that
/// a dataset smaller than one batch still yields one short batch.
pub fn steps_per_epoch(num_records: usize, batch_size: usize) -> usize {
    (num_records / batch_size).max(1)
}

/// Splits records into fixed-order evaluation batches covering every record once.
pub fn eval_batches(records: &[ImageRecord], batch_size: usize) -> impl Iterator<Item = &[ImageRecord]> {
    records.chunks(batch_size)
}

/// Loads, augments and normalizes shuffled training batches for every epoch.
#[derive(Debug)]
pub struct TrainingStream {
    records: Vec<ImageRecord>,
    batch_size: usize,
    epochs: usize,
    image_size: usize,
    buffer_size: usize,
    seed: Option<u64>,
    device: Device,
    augment: RandomAffine,
    normalizer: Normalizer,
}

impl TrainingStream {
    pub fn new(dataset: &DirectoryDataset, config: &Config) -> Result<Self> {
        let Config {
            model:
                ModelConfig {
                    image_size,
                    ref normalization,
                    ..
                },
            training:
                TrainingConfig {
                    batch_size,
                    epochs,
                    shuffle_seed,
                    ..
                },
            preprocessor:
                PreprocessorConfig {
                    buffer_size,
                    device,
                    ..
                },
            ..
        } = *config;

        ensure!(
            !dataset.is_empty(),
            "the training dataset at '{}' has no images",
            dataset.dir().display()
        );

        Ok(Self {
            records: dataset.records().to_vec(),
            batch_size: batch_size.get(),
            epochs: epochs.get(),
            image_size: image_size.get(),
            buffer_size: buffer_size.get(),
            seed: shuffle_seed,
            device,
            augment: RandomAffineInit::from(&config.preprocessor).build()?,
            normalizer: Normalizer::new(normalization),
        })
    }

    pub fn steps_per_epoch(&self) -> usize {
        steps_per_epoch(self.records.len(), self.batch_size)
    }

    /// Shuffles the records and groups them into the batches of an epoch.
    pub fn epoch_batches(&self, epoch: usize) -> Vec<Vec<ImageRecord>> {
        let mut rng = self.rng(epoch as u64);
        let mut records = self.records.clone();
        records.shuffle(&mut rng);

        records
            .chunks(self.batch_size)
            .take(self.steps_per_epoch())
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Loads one training batch. It runs on the blocking thread pool.
    pub fn prepare_batch(&self, records: &[ImageRecord], epoch: usize, step: usize) -> Result<Batch> {
        let Batch { images, labels } = load_batch(records, self.image_size)?;
        let mut rng = self.rng(((epoch as u64) << 32) ^ step as u64 ^ 0x5eed);
        let images = self
            .augment
            .forward(&images.to_device(self.device), &mut rng)?;
        let images = self.normalizer.forward(&images);
        Ok(Batch { images, labels })
    }

    /// Feeds batches of epochs `start_epoch..epochs` to the training worker.
    ///
    /// Each epoch is followed by an end-of-epoch marker.
    pub async fn run(self, start_epoch: usize, tx: mpsc::Sender<TrainingMessage>) -> Result<()> {
        let this = Arc::new(self);

        for epoch in start_epoch..this.epochs {
            let batches = this.epoch_batches(epoch);
            let mut batch_stream = stream::iter(batches.into_iter().enumerate())
                .map(|(step, records)| {
                    let this = this.clone();
                    tokio::task::spawn_blocking(move || {
                        let batch = this.prepare_batch(&records, epoch, step)?;
                        Fallible::Ok(TrainingRecord { epoch, step, batch })
                    })
                    .map(|result| Fallible::Ok(result??))
                })
                .buffered(this.buffer_size);

            while let Some(record) = batch_stream.next().await {
                tx.send(TrainingMessage::Batch(record?))
                    .await
                    .map_err(|_| format_err!("failed to send message to training worker"))?;
            }

            tx.send(TrainingMessage::EndOfEpoch { epoch })
                .await
                .map_err(|_| format_err!("failed to send message to training worker"))?;
        }

        Ok(())
    }

    fn rng(&self, salt: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(salt)),
            None => StdRng::from_entropy(),
        }
    }
}

/// Loads and normalizes an evaluation batch without augmentation.
pub fn prepare_eval_batch(
    records: &[ImageRecord],
    image_size: usize,
    normalizer: &Normalizer,
) -> Result<Batch> {
    let Batch { images, labels } = load_batch(records, image_size)?;
    Ok(Batch {
        images: normalizer.forward(&images),
        labels,
    })
}

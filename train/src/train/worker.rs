use crate::{
    common::*,
    config::{Config, ModelConfig, TrainingConfig},
    data::{Batch, DirectoryDataset, Normalizer, TrainingMessage, TrainingRecord},
    evaluate::{self, EvalMetrics},
    history::{EpochRecord, History},
    logging::LoggingMessage,
    loss::{self, ClassificationLossInit},
    model::Classifier,
    utils::{self, LrScheduler, RateCounter},
};

/// Where the training worker starts and how long an epoch is.
#[derive(Debug, Clone, Copy)]
pub struct TrainingPlan {
    pub start_epoch: usize,
    pub steps_per_epoch: usize,
}

/// Sample-weighted running means of an epoch.
#[derive(Debug, Default)]
struct EpochStats {
    loss_sum: f64,
    accuracy_sum: f64,
    num_samples: usize,
}

impl EpochStats {
    fn add(&mut self, loss: f64, accuracy: f64, num_samples: usize) {
        self.loss_sum += loss * num_samples as f64;
        self.accuracy_sum += accuracy * num_samples as f64;
        self.num_samples += num_samples;
    }

    fn mean(&self) -> (f64, f64) {
        if self.num_samples == 0 {
            return (0.0, 0.0);
        }
        let num = self.num_samples as f64;
        (self.loss_sum / num, self.accuracy_sum / num)
    }
}

/// Runs the training loop until the data channel is closed.
///
/// It returns the trained model and the per-epoch history.
pub fn training_worker(
    config: Arc<Config>,
    model: Classifier,
    val_dataset: Arc<DirectoryDataset>,
    checkpoint_dir: Arc<Path>,
    plan: TrainingPlan,
    mut data_rx: mpsc::Receiver<TrainingMessage>,
    logging_tx: broadcast::Sender<LoggingMessage>,
) -> Result<(Classifier, History)> {
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
                ref lr_schedule,
                beta1,
                beta2,
                weight_decay,
                loss: loss_kind,
                save_checkpoint_epochs,
                ..
            },
        ..
    } = *config;
    let TrainingPlan {
        start_epoch,
        steps_per_epoch,
    } = plan;
    let device = model.device();
    let batch_size = batch_size.get();
    let image_size = image_size.get();

    info!("use device {:?}", device);

    let loss_fn = ClassificationLossInit::new(loss_kind).build()?;
    let normalizer = Normalizer::new(normalization);
    let init_step = start_epoch * steps_per_epoch;
    let mut lr_scheduler = LrScheduler::new(lr_schedule, epochs.get(), init_step)?;
    let mut optimizer = nn::Adam {
        beta1: beta1.raw(),
        beta2: beta2.raw(),
        wd: weight_decay.raw(),
    }
    .build(model.head_vs(), lr_scheduler.lr())?;

    let mut history = History::default();
    let mut epoch_stats = EpochStats::default();
    let mut training_step = init_step;
    let mut rate_counter = RateCounter::with_second_interval();

    info!("start training from epoch {}", start_epoch);

    while let Some(msg) = data_rx.blocking_recv() {
        match msg {
            TrainingMessage::Batch(TrainingRecord { epoch, step, batch }) => {
                let Batch { images, labels } = batch.to_device(device);
                let num_samples = batch.len();

                let lr = lr_scheduler.next();
                optimizer.set_lr(lr);

                let logits = model.forward_t(&images, true);
                let loss = loss_fn.forward(&logits, &labels)?;
                optimizer.backward_step(&loss);

                let loss = f64::from(&loss);
                let accuracy = tch::no_grad(|| f64::from(loss::accuracy(&logits, &labels)));
                epoch_stats.add(loss, accuracy, num_samples);

                rate_counter.add(1.0);
                if let Some(batch_rate) = rate_counter.rate() {
                    info!(
                        "epoch: {}\tstep: {}/{}\tlr: {:.6}\tloss: {:.4}\tacc: {:.4}\t{:.2} batches/s",
                        epoch,
                        step + 1,
                        steps_per_epoch,
                        lr,
                        loss,
                        accuracy,
                        batch_rate
                    );
                } else {
                    debug!(
                        "epoch: {}\tstep: {}/{}\tlr: {:.6}\tloss: {:.4}\tacc: {:.4}",
                        epoch,
                        step + 1,
                        steps_per_epoch,
                        lr,
                        loss,
                        accuracy
                    );
                }

                logging_tx
                    .send(LoggingMessage::TrainingStep {
                        step: training_step,
                        lr,
                        loss,
                        accuracy,
                    })
                    .map_err(|_| format_err!("cannot send message to logger"))?;

                training_step += 1;
            }
            TrainingMessage::EndOfEpoch { epoch } => {
                let (loss, accuracy) = epoch_stats.mean();
                epoch_stats = EpochStats::default();

                let EvalMetrics {
                    loss: val_loss,
                    accuracy: val_accuracy,
                } = evaluate::evaluate_dataset(
                    &model,
                    &loss_fn,
                    &val_dataset,
                    batch_size,
                    image_size,
                    &normalizer,
                )?;

                let record = EpochRecord {
                    epoch,
                    loss,
                    accuracy,
                    val_loss,
                    val_accuracy,
                };
                info!(
                    "epoch {}/{}\tloss: {:.4}\tacc: {:.4}\tval_loss: {:.4}\tval_acc: {:.4}",
                    epoch + 1,
                    epochs,
                    loss,
                    accuracy,
                    val_loss,
                    val_accuracy
                );

                if let Some(0) = save_checkpoint_epochs.map(|epochs| epoch % epochs.get()) {
                    let path =
                        utils::save_checkpoint(model.head_vs(), &checkpoint_dir, epoch, val_loss)?;
                    info!("save checkpoint {}", path.display());
                }

                logging_tx
                    .send(LoggingMessage::Epoch(record.clone()))
                    .map_err(|_| format_err!("cannot send message to logger"))?;
                history.push(record);
            }
        }
    }

    info!("training finished");
    Ok((model, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn epoch_stats_are_sample_weighted() {
        let mut stats = EpochStats::default();
        assert_eq!(stats.mean(), (0.0, 0.0));

        stats.add(1.0, 0.5, 4);
        stats.add(0.0, 1.0, 1);
        let (loss, accuracy) = stats.mean();
        assert_abs_diff_eq!(loss, 0.8, epsilon = 1e-9);
        assert_abs_diff_eq!(accuracy, 0.6, epsilon = 1e-9);
    }
}

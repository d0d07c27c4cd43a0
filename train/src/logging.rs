//! Data logging toolkit.

use crate::{common::*, history::EpochRecord};

/// The message accepted by the logging worker.
#[derive(Debug, Clone)]
pub enum LoggingMessage {
    TrainingStep {
        step: usize,
        lr: f64,
        loss: f64,
        accuracy: f64,
    },
    Epoch(EpochRecord),
}

/// The logging channel capacity. It holds the messages of two whole epochs
/// so that an epoch record is not lagged out by step messages.
pub fn channel_capacity(steps_per_epoch: usize) -> usize {
    ((steps_per_epoch + 1) * 2).max(64)
}

/// Writes received messages as TensorBoard scalars until every sender is dropped.
///
/// When `enable_events` is false, messages are drained without writing files.
pub async fn logging_worker(
    logging_dir: Arc<Path>,
    enable_events: bool,
    mut rx: broadcast::Receiver<LoggingMessage>,
) -> Result<()> {
    let mut event_writer = if enable_events {
        let event_dir = logging_dir.join("events");
        tokio::fs::create_dir_all(&event_dir).await?;
        let event_path_prefix = event_dir
            .join("classifier")
            .into_os_string()
            .into_string()
            .map_err(|path| format_err!("non-unicode event path {:?}", path))?;

        let writer = EventWriterInit::default()
            .from_prefix_async(event_path_prefix, None)
            .await?;
        Some(writer)
    } else {
        info!("event logging is disabled");
        None
    };

    loop {
        let msg = match rx.recv().await {
            Ok(msg) => msg,
            Err(broadcast::error::RecvError::Lagged(num)) => {
                warn!("logging worker skipped {} messages", num);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let event_writer = match &mut event_writer {
            Some(writer) => writer,
            None => continue,
        };

        match msg {
            LoggingMessage::TrainingStep {
                step,
                lr,
                loss,
                accuracy,
            } => {
                let step = step as i64;
                event_writer
                    .write_scalar_async("step/learning_rate", step, lr as f32)
                    .await?;
                event_writer
                    .write_scalar_async("step/loss", step, loss as f32)
                    .await?;
                event_writer
                    .write_scalar_async("step/accuracy", step, accuracy as f32)
                    .await?;
            }
            LoggingMessage::Epoch(record) => {
                let EpochRecord {
                    epoch,
                    loss,
                    accuracy,
                    val_loss,
                    val_accuracy,
                } = record;
                let epoch = epoch as i64;

                for (tag, value) in [
                    ("epoch/train_loss", loss),
                    ("epoch/val_loss", val_loss),
                    ("epoch/train_accuracy", accuracy),
                    ("epoch/val_accuracy", val_accuracy),
                ] {
                    event_writer
                        .write_scalar_async(tag, epoch, value as f32)
                        .await?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_events_until_closed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let logging_dir: Arc<Path> = dir.path().into();
        let (tx, rx) = broadcast::channel(4);
        let worker = tokio::spawn(logging_worker(logging_dir, true, rx));

        tx.send(LoggingMessage::TrainingStep {
            step: 0,
            lr: 1e-4,
            loss: 0.7,
            accuracy: 0.5,
        })
        .map_err(|_| format_err!("send failed"))?;
        drop(tx);
        worker.await??;

        let num_files = fs::read_dir(dir.path().join("events"))?.count();
        assert_eq!(num_files, 1);
        Ok(())
    }

    #[test]
    fn epoch_record_survives_a_full_epoch_of_steps() -> Result<()> {
        let steps_per_epoch = 500;
        let (tx, mut rx) = broadcast::channel(channel_capacity(steps_per_epoch));

        for step in 0..steps_per_epoch {
            tx.send(LoggingMessage::TrainingStep {
                step,
                lr: 1e-4,
                loss: 0.7,
                accuracy: 0.5,
            })
            .map_err(|_| format_err!("send failed"))?;
        }
        tx.send(LoggingMessage::Epoch(EpochRecord {
            epoch: 0,
            loss: 0.7,
            accuracy: 0.5,
            val_loss: 0.6,
            val_accuracy: 0.55,
        }))
        .map_err(|_| format_err!("send failed"))?;
        drop(tx);

        let mut num_steps = 0;
        let mut num_epochs = 0;
        loop {
            match rx.try_recv() {
                Ok(LoggingMessage::TrainingStep { .. }) => num_steps += 1,
                Ok(LoggingMessage::Epoch(record)) => {
                    assert_eq!(record.epoch, 0);
                    num_epochs += 1;
                }
                Err(broadcast::error::TryRecvError::Lagged(num)) => {
                    panic!("lagged by {} messages", num)
                }
                Err(_) => break,
            }
        }
        assert_eq!(num_steps, steps_per_epoch);
        assert_eq!(num_epochs, 1);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_worker_writes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tx, rx) = broadcast::channel(4);
        let worker = tokio::spawn(logging_worker(dir.path().into(), false, rx));
        drop(tx);
        worker.await??;
        assert!(!dir.path().join("events").exists());
        Ok(())
    }
}

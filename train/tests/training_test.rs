use anyhow::{format_err, Result};
use futures::FutureExt as _;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tch::Device;
use tokio::sync::{broadcast, mpsc};
use train::{
    config::Config,
    data::{DirectoryDataset, TrainingMessage, TrainingRecord, TrainingStream},
    logging,
    model::Classifier,
    train::{training_worker, TrainingPlan},
};

const EPOCHS: usize = 3;

fn write_images(root: &Path, per_class: usize) -> Result<()> {
    for (class, color) in [("cat", [200u8, 40, 40]), ("dog", [40u8, 40, 200])] {
        let class_dir = root.join(class);
        fs::create_dir_all(&class_dir)?;
        for index in 0..per_class {
            let image = image::RgbImage::from_pixel(40, 36, image::Rgb(color));
            image.save(class_dir.join(format!("{}.png", index)))?;
        }
    }
    Ok(())
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: Arc<Config>,
    train_set: DirectoryDataset,
    val_set: Arc<DirectoryDataset>,
    checkpoint_dir: PathBuf,
}

fn fixture() -> Result<Fixture> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    let train_dir = root.join("train");
    let val_dir = root.join("val");
    let checkpoint_dir = root.join("checkpoints");
    write_images(&train_dir, 3)?;
    write_images(&val_dir, 1)?;
    fs::create_dir_all(&checkpoint_dir)?;

    let text = format!(
        r#"{{
            version: "0.1.0",
            model: {{
                backbone_weights: "resnet50.ot",
                hidden_units: 8,
                dropout: 0.0,
                image_size: 32,
                normalization: {{ type: "ImageNet" }},
            }},
            dataset: {{
                train_dir: {train:?},
                val_dir: {val:?},
                test_dir: {val:?},
                extensions: ["png"],
            }},
            logging: {{ dir: {logs:?}, enable_events: false }},
            preprocessor: {{ buffer_size: 2, device: "cpu" }},
            training: {{
                batch_size: 2,
                epochs: {epochs},
                lr_schedule: {{ type: "InverseTimeDecay", lr: 1e-3 }},
                shuffle_seed: 5,
                save_checkpoint_epochs: 2,
                device: "cpu",
            }},
            output: {{ model_file: {model:?} }},
        }}"#,
        train = train_dir,
        val = val_dir,
        logs = root.join("logs"),
        model = root.join("model.ot"),
        epochs = EPOCHS,
    );
    let config_file = root.join("train.json5");
    fs::write(&config_file, text)?;
    let config = Config::open(&config_file)?;

    let extensions = &config.dataset.extensions;
    let train_set = DirectoryDataset::load_blocking(&train_dir, extensions)?;
    let val_set = DirectoryDataset::load_blocking(&val_dir, extensions)?;

    Ok(Fixture {
        _dir: dir,
        config: Arc::new(config),
        train_set,
        val_set: Arc::new(val_set),
        checkpoint_dir,
    })
}

/// Returns the epochs encoded in the checkpoint file names, sorted.
fn checkpoint_epochs(dir: &Path) -> Result<Vec<usize>> {
    let mut epochs: Vec<usize> = fs::read_dir(dir)?
        .map(|entry| -> Result<_> {
            let name = entry?.file_name().to_string_lossy().into_owned();
            let epoch = name
                .split('_')
                .nth(1)
                .ok_or_else(|| format_err!("unexpected checkpoint name {}", name))?
                .parse()?;
            Ok(epoch)
        })
        .collect::<Result<_>>()?;
    epochs.sort_unstable();
    Ok(epochs)
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_sends_marker_after_each_epoch() -> Result<()> {
    let Fixture {
        config, train_set, ..
    } = fixture()?;
    let stream = TrainingStream::new(&train_set, &config)?;
    let steps_per_epoch = stream.steps_per_epoch();
    assert_eq!(steps_per_epoch, 3);

    let (tx, mut rx) = mpsc::channel(2);
    let feeder = tokio::spawn(stream.run(1, tx));

    let mut received = vec![];
    while let Some(msg) = rx.recv().await {
        let item = match msg {
            TrainingMessage::Batch(TrainingRecord { epoch, step, batch }) => {
                assert_eq!(batch.images.size(), [2, 3, 32, 32]);
                (epoch, Some(step))
            }
            TrainingMessage::EndOfEpoch { epoch } => (epoch, None),
        };
        received.push(item);
    }
    feeder.await??;

    let expect: Vec<_> = (1..EPOCHS)
        .flat_map(|epoch| {
            (0..steps_per_epoch)
                .map(Some)
                .chain([None])
                .map(move |step| (epoch, step))
        })
        .collect();
    assert_eq!(received, expect);
    Ok(())
}

async fn run_training(fixture: &Fixture, start_epoch: usize) -> Result<train::history::History> {
    let Fixture {
        config,
        train_set,
        val_set,
        checkpoint_dir,
        ..
    } = fixture;

    let model = Classifier::new(&config.model, train_set.classes().len(), Device::Cpu)?;
    let stream = TrainingStream::new(train_set, config)?;
    let plan = TrainingPlan {
        start_epoch,
        steps_per_epoch: stream.steps_per_epoch(),
    };
    let (data_tx, data_rx) = mpsc::channel(2);
    let (logging_tx, _logging_rx) =
        broadcast::channel(logging::channel_capacity(plan.steps_per_epoch));

    let feeding_future = tokio::spawn(stream.run(start_epoch, data_tx)).map(|result| result?);
    let training_future = {
        let config = config.clone();
        let val_set = val_set.clone();
        let checkpoint_dir: Arc<Path> = checkpoint_dir.as_path().into();
        tokio::task::spawn_blocking(move || {
            training_worker(
                config,
                model,
                val_set,
                checkpoint_dir,
                plan,
                data_rx,
                logging_tx,
            )
        })
        .map(|result| result?)
    };

    let ((), (_model, history)) = futures::try_join!(feeding_future, training_future)?;
    Ok(history)
}

#[tokio::test(flavor = "multi_thread")]
async fn train_three_epochs_with_checkpoints() -> Result<()> {
    let fixture = fixture()?;
    let history = run_training(&fixture, 0).await?;

    let epochs: Vec<_> = history.records.iter().map(|record| record.epoch).collect();
    assert_eq!(epochs, [0, 1, 2]);
    for record in &history.records {
        assert!(record.loss.is_finite());
        assert!(record.val_loss.is_finite());
        assert!((0.0..=1.0).contains(&record.accuracy));
        assert!((0.0..=1.0).contains(&record.val_accuracy));
    }

    assert_eq!(checkpoint_epochs(&fixture.checkpoint_dir)?, [0, 2]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_trains_remaining_epochs() -> Result<()> {
    let fixture = fixture()?;
    let history = run_training(&fixture, 1).await?;

    let epochs: Vec<_> = history.records.iter().map(|record| record.epoch).collect();
    assert_eq!(epochs, [1, 2]);
    assert_eq!(checkpoint_epochs(&fixture.checkpoint_dir)?, [2]);
    Ok(())
}

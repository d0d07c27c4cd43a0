//! Fine-tunes the head of a pretrained ResNet-50 classifier on a directory dataset.

pub mod common;
pub mod config;
pub mod data;
pub mod evaluate;
pub mod history;
pub mod logging;
pub mod loss;
pub mod model;
pub mod train;
pub mod utils;

use crate::{
    common::*,
    config::{Config, DatasetConfig},
    data::{DirectoryDataset, Normalizer, TrainingStream},
    evaluate::ClassificationReport,
    model::Classifier,
    train::TrainingPlan,
};

/// The entry of training program.
pub async fn start(config: Arc<Config>) -> Result<()> {
    let start_time = Local::now();
    let logging_dir: Arc<Path> = config
        .logging
        .dir
        .join(format!("{}", start_time.format(utils::FILE_STRFTIME)))
        .into();
    let checkpoint_dir: Arc<Path> = logging_dir.join("checkpoints").into();

    // create dirs and save config
    {
        tokio::fs::create_dir_all(&*logging_dir).await?;
        tokio::fs::create_dir_all(&*checkpoint_dir).await?;
        let path = logging_dir.join("config.json");
        let text = serde_json::to_string_pretty(&*config)?;
        tokio::fs::write(&path, text).await?;
    }

    // load datasets
    info!("loading datasets");
    let (train_set, val_set, test_set) = {
        let DatasetConfig {
            train_dir,
            val_dir,
            test_dir,
            extensions,
        } = &config.dataset;
        futures::try_join!(
            DirectoryDataset::load(train_dir, extensions),
            DirectoryDataset::load(val_dir, extensions),
            DirectoryDataset::load(test_dir, extensions),
        )?
    };
    check_datasets(&train_set, &val_set, &test_set)?;
    let classes = train_set.classes().clone();
    info!(
        "classes: {}; {} training, {} validation, {} testing images",
        classes.iter().join(", "),
        train_set.len(),
        val_set.len(),
        test_set.len()
    );
    for (name, count) in classes.iter().zip(train_set.class_counts()) {
        info!("{} training images of class {}", count, name);
    }

    // build model
    info!("preparing the model");
    let (model, start_epoch) = {
        let config = config.clone();
        let num_classes = classes.len();
        tokio::task::spawn_blocking(move || -> Result<_> {
            let mut model = Classifier::new(&config.model, num_classes, config.training.device)?;
            model.load_backbone(&config.model.backbone_weights)?;
            let start_epoch = utils::try_load_checkpoint(
                model.head_vs_mut(),
                &config.logging.dir,
                &config.training.load_checkpoint,
            )?
            .map(|epoch| epoch + 1)
            .unwrap_or(0);
            Ok((model, start_epoch))
        })
        .await??
    };
    if start_epoch >= config.training.epochs.get() {
        warn!(
            "the checkpoint already covers all {} epochs",
            config.training.epochs
        );
    }

    // train
    info!("training the model");
    let stream = TrainingStream::new(&train_set, &config)?;
    let plan = TrainingPlan {
        start_epoch,
        steps_per_epoch: stream.steps_per_epoch(),
    };
    let (data_tx, data_rx) = mpsc::channel(config.preprocessor.buffer_size.get());
    let (logging_tx, logging_rx) =
        broadcast::channel(logging::channel_capacity(plan.steps_per_epoch));

    let feeding_future = tokio::task::spawn(stream.run(start_epoch, data_tx))
        .map(|result| Fallible::Ok(result??));
    let logging_future = tokio::task::spawn(logging::logging_worker(
        logging_dir.clone(),
        config.logging.enable_events,
        logging_rx,
    ))
    .map(|result| Fallible::Ok(result??));
    let training_future = {
        let config = config.clone();
        let val_set = Arc::new(val_set);
        let checkpoint_dir = checkpoint_dir.clone();
        tokio::task::spawn_blocking(move || {
            train::training_worker(
                config,
                model,
                val_set,
                checkpoint_dir,
                plan,
                data_rx,
                logging_tx,
            )
        })
        .map(|result| Fallible::Ok(result??))
    };

    let ((), (), (model, history)) =
        futures::try_join!(feeding_future, logging_future, training_future)?;

    // evaluate
    info!("evaluating the network");
    let (model, report) = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || -> Result<_> {
            let normalizer = Normalizer::new(&config.model.normalization);
            let y_pred = evaluate::predict_dataset(
                &model,
                &test_set,
                config.training.batch_size.get(),
                config.model.image_size.get(),
                &normalizer,
            )?;
            let y_true: Vec<_> = test_set
                .records()
                .iter()
                .map(|record| record.class_index)
                .collect();
            let report = ClassificationReport::new(&y_true, &y_pred, test_set.classes())?;
            Ok((model, report))
        })
        .await??
    };
    info!("classification report\n{}", report);
    if let Some(path) = &config.output.report_file {
        report.save_json(path)?;
    }

    // save outputs
    info!("saving the model");
    {
        let model_file = &config.output.model_file;
        if let Some(parent) = model_file.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        model.save(model_file)?;
        info!("model saved to {}", model_file.display());
    }

    if let Some(path) = &config.output.history_file {
        history.save_csv(path)?;
    }
    history.save_csv(logging_dir.join("history.csv"))?;

    if history.is_empty() {
        warn!("no epoch was trained, skip plotting");
    } else {
        let plot_file = &config.output.plot_file;
        history.plot(plot_file)?;
        info!("plot saved to {}", plot_file.display());
    }

    Ok(())
}

/// Fails unless the splits share one class list and the validation split has images.
fn check_datasets(
    train_set: &DirectoryDataset,
    val_set: &DirectoryDataset,
    test_set: &DirectoryDataset,
) -> Result<()> {
    train_set.ensure_same_classes(val_set)?;
    train_set.ensure_same_classes(test_set)?;
    ensure!(
        !val_set.is_empty(),
        "the validation dataset at '{}' has no images",
        val_set.dir().display()
    );
    Ok(())
}

use super::FILE_STRFTIME;
use crate::{common::*, config::LoadCheckpoint};
use regex::Regex;

static CHECKPOINT_FILENAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}\.\d{3}[+-]\d{4})_(\d{4,})_\d+\.\d+\.ckpt$")
        .unwrap()
});

/// Builds the checkpoint file name for the given epoch and validation loss.
pub fn checkpoint_filename(time: &DateTime<Local>, epoch: usize, loss: f64) -> String {
    format!("{}_{:04}_{:08.5}.ckpt", time.format(FILE_STRFTIME), epoch, loss)
}

/// Save parameters to a checkpoint file.
pub fn save_checkpoint(
    vs: &nn::VarStore,
    checkpoint_dir: &Path,
    epoch: usize,
    loss: f64,
) -> Result<PathBuf> {
    let filename = checkpoint_filename(&Local::now(), epoch, loss);
    let path = checkpoint_dir.join(filename);
    vs.save(&path)?;
    Ok(path)
}

/// Finds the checkpoint file to load with specified checkpoint loading method.
///
/// It returns the file path and the epoch parsed from the file name, if any.
pub fn find_checkpoint(
    logging_dir: &Path,
    load_checkpoint: &LoadCheckpoint,
) -> Result<Option<(PathBuf, Option<usize>)>> {
    let found = match load_checkpoint {
        LoadCheckpoint::Disabled => {
            info!("checkpoint loading is disabled");
            None
        }
        LoadCheckpoint::FromRecent => {
            let pattern = format!("{}/*/checkpoints/*.ckpt", logging_dir.display());
            let paths: Vec<_> = glob::glob(&pattern)?.try_collect()?;
            let checkpoint_file = paths
                .into_iter()
                .filter_map(|path| {
                    let (datetime, epoch) = parse_checkpoint_filename(&path)?;
                    Some((path, datetime, epoch))
                })
                .max_by_key(|(_path, datetime, _epoch)| *datetime)
                .map(|(path, _datetime, epoch)| (path, Some(epoch)));

            if checkpoint_file.is_none() {
                warn!("no checkpoint file found");
            }

            checkpoint_file
        }
        LoadCheckpoint::FromFile { file } => {
            if file.is_file() {
                let epoch = parse_checkpoint_filename(file).map(|(_datetime, epoch)| epoch);
                Some((file.to_owned(), epoch))
            } else {
                warn!("{} is not a file", file.display());
                None
            }
        }
    };

    Ok(found)
}

/// Load parameters from a diretory with specified checkpoint loading method.
///
/// It returns the epoch recorded in the checkpoint file name when a file is loaded.
pub fn try_load_checkpoint(
    vs: &mut nn::VarStore,
    logging_dir: &Path,
    load_checkpoint: &LoadCheckpoint,
) -> Result<Option<usize>> {
    match find_checkpoint(logging_dir, load_checkpoint)? {
        Some((path, epoch)) => {
            info!("load checkpoint file {}", path.display());
            let missing = vs
                .load_partial(&path)
                .with_context(|| format!("failed to load checkpoint '{}'", path.display()))?;
            ensure!(
                missing.is_empty(),
                "checkpoint '{}' does not contain variables: {}",
                path.display(),
                missing.iter().join(", ")
            );
            Ok(epoch)
        }
        None => Ok(None),
    }
}

fn parse_checkpoint_filename(path: &Path) -> Option<(DateTime<chrono::FixedOffset>, usize)> {
    let file_name = path.file_name()?.to_str()?;
    let captures = CHECKPOINT_FILENAME_REGEX.captures(file_name)?;
    let datetime = DateTime::parse_from_str(captures.get(1)?.as_str(), FILE_STRFTIME).ok()?;
    let epoch = captures.get(2)?.as_str().parse().ok()?;
    Some((datetime, epoch))
}

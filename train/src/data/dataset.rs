use super::ImageRecord;
use crate::common::*;

/// A labeled image dataset laid out as one subdirectory per class.
///
/// Class indexes follow the lexicographic order of the subdirectory names.
#[derive(Debug, Clone)]
pub struct DirectoryDataset {
    dir: PathBuf,
    classes: ClassList,
    records: Vec<ImageRecord>,
}

impl DirectoryDataset {
    /// Scans the dataset directory on the blocking thread pool.
    pub async fn load(dir: impl AsRef<Path>, extensions: &HashSet<String>) -> Result<Self> {
        let dir = dir.as_ref().to_owned();
        let extensions = extensions.clone();
        tokio::task::spawn_blocking(move || Self::load_blocking(dir, &extensions)).await?
    }

    pub fn load_blocking(dir: impl AsRef<Path>, extensions: &HashSet<String>) -> Result<Self> {
        let dir = dir.as_ref();
        let extensions: HashSet<String> = extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();

        let class_dirs: Vec<(String, PathBuf)> = fs::read_dir(dir)
            .with_context(|| format!("failed to read dataset directory '{}'", dir.display()))?
            .map(|entry| -> Result<_> {
                let entry = entry?;
                let path = entry.path();
                if !path.is_dir() {
                    return Ok(None);
                }
                let name = entry
                    .file_name()
                    .into_string()
                    .map_err(|name| format_err!("non-unicode class directory {:?}", name))?;
                Ok(Some((name, path)))
            })
            .filter_map(|result| result.transpose())
            .try_collect::<_, Vec<_>, _>()?
            .into_iter()
            .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
            .collect();

        ensure!(
            !class_dirs.is_empty(),
            "no class directories found in '{}'",
            dir.display()
        );

        let classes = ClassList::new(class_dirs.iter().map(|(name, _)| name.clone()))?;
        let records: Vec<ImageRecord> = class_dirs
            .iter()
            .enumerate()
            .map(|(class_index, (_, class_dir))| -> Result<_> {
                let paths = list_images(class_dir, &extensions)?;
                Ok(paths
                    .into_iter()
                    .map(move |path| ImageRecord { path, class_index }))
            })
            .flatten_ok()
            .try_collect()?;

        Ok(Self {
            dir: dir.to_owned(),
            classes,
            records,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn classes(&self) -> &ClassList {
        &self.classes
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of images per class, in class index order.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.classes.len()];
        self.records
            .iter()
            .for_each(|record| counts[record.class_index] += 1);
        counts
    }

    /// Fails unless both datasets share the same class list.
    pub fn ensure_same_classes(&self, other: &Self) -> Result<()> {
        ensure!(
            self.classes == other.classes,
            "classes of '{}' ({}) differ from classes of '{}' ({})",
            other.dir.display(),
            other.classes.iter().join(", "),
            self.dir.display(),
            self.classes.iter().join(", "),
        );
        Ok(())
    }
}

/// Lists image files under a directory recursively, sorted by path.
fn list_images(dir: &Path, extensions: &HashSet<String>) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let paths: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|result| match result {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("skip unreadable path: {}", err);
                None
            }
        })
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.contains(&ext.to_lowercase()))
                .unwrap_or(false)
        })
        .sorted()
        .collect();
    Ok(paths)
}

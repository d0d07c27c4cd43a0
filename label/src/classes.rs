use anyhow::{ensure, Context, Result};
use indexmap::IndexSet;
use std::{fs, path::Path};

/// Class names of the PASCAL VOC trained MobileNet-SSD, background first.
pub const PASCAL_VOC_CLASSES: [&str; 21] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tvmonitor",
];

/// An ordered list of unique class names. The class index is the position in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassList {
    names: IndexSet<String>,
}

impl ClassList {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = IndexSet::new();
        for name in names {
            let name = name.into();
            ensure!(!name.is_empty(), "class name must not be empty");
            ensure!(!set.contains(&name), "duplicated class name '{}'", name);
            set.insert(name);
        }
        Ok(Self { names: set })
    }

    /// Loads class names from a text file, one per line. Blank lines are skipped.
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read classes file '{}'", path.display()))?;
        let names = text
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty());
        Self::new(names)
    }

    pub fn pascal_voc() -> Self {
        Self {
            names: PASCAL_VOC_CLASSES
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get_index(index).map(|name| name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get_index_of(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|name| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn pascal_voc_order() {
        let classes = ClassList::pascal_voc();
        assert_eq!(classes.len(), 21);
        assert_eq!(classes.name(0), Some("background"));
        assert_eq!(classes.name(15), Some("person"));
        assert_eq!(classes.index_of("tvmonitor"), Some(20));
        assert_eq!(classes.name(21), None);
    }

    #[test]
    fn reject_duplicates() {
        assert!(ClassList::new(["cat", "dog", "cat"]).is_err());
        assert!(ClassList::new(["cat", ""]).is_err());
    }

    #[test]
    fn load_skips_blank_lines() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "camouflage_clothes\n\n  normal_clothes  \n")?;
        let classes = ClassList::load(file.path())?;
        assert_eq!(
            classes.iter().collect::<Vec<_>>(),
            ["camouflage_clothes", "normal_clothes"]
        );
        Ok(())
    }
}

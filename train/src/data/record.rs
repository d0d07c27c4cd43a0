use crate::common::*;

/// An image file and the index of its class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub class_index: usize,
}

/// A batch of images with their class indexes.
#[derive(Debug)]
pub struct Batch {
    /// Images in `[batch, 3, height, width]` shape.
    pub images: Tensor,
    /// Class indexes in `[batch]` shape.
    pub labels: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.size()[0] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_device(&self, device: Device) -> Self {
        Self {
            images: self.images.to_device(device),
            labels: self.labels.to_device(device),
        }
    }
}

/// The record that is accepted by training worker.
#[derive(Debug)]
pub struct TrainingRecord {
    pub epoch: usize,
    pub step: usize,
    pub batch: Batch,
}

/// The message sent from the data feeding worker to the training worker.
#[derive(Debug)]
pub enum TrainingMessage {
    Batch(TrainingRecord),
    EndOfEpoch { epoch: usize },
}

//! Dataset loading, augmentation and batching.

mod augment;
mod dataset;
mod loader;
mod record;
mod training_stream;

pub use augment::*;
pub use dataset::*;
pub use loader::*;
pub use record::*;
pub use training_stream::*;

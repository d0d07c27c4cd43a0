//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use chrono::{DateTime, Local};
pub use futures::future::FutureExt;
pub use image::imageops::FilterType;
pub use itertools::Itertools;
pub use label::ClassList;
pub use noisy_float::prelude::*;
pub use once_cell::sync::Lazy;
pub use rand::{prelude::*, rngs::StdRng, seq::SliceRandom};
pub use semver::{Version, VersionReq};
pub use slice_of_array::SliceFlatExt as _;
pub use serde::{de::Error as DeserializeError, Deserialize, Deserializer, Serialize, Serializer};
pub use std::{
    borrow::Cow,
    collections::HashSet,
    fmt::{self, Debug, Display},
    fs,
    future::Future,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
pub use tch::{
    nn::{self, ModuleT, OptimizerConfig as _},
    Device, IndexOp, Kind, Reduction, Tensor,
};
pub use tfrecord::{EventWriter, EventWriterInit};
pub use tokio::sync::{broadcast, mpsc};
pub use tracing::{debug, info, warn};

pub type Fallible<T> = Result<T, Error>;

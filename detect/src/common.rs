pub use anyhow::{bail, ensure, format_err, Context, Result};
pub use bbox::{prelude::*, Transform, HW, TLBR};
pub use label::{ClassList, Label};
pub use noisy_float::prelude::*;
pub use once_cell::sync::Lazy;
pub use opencv::{
    core::{self as core_cv, Mat, Point, Rect as CvRect, Scalar, Size},
    dnn, highgui, imgproc,
    prelude::*,
    videoio,
};
pub use rand::{prelude::*, rngs::StdRng};
pub use semver::{Version, VersionReq};
pub use serde::{de::Error as DeserializeError, Deserialize, Deserializer, Serialize};
pub use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
pub use tracing::{debug, info, warn};

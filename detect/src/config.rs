//! Detection program configuration, merged from a JSON5 file and command line arguments.

use crate::common::*;
use structopt::StructOpt;

pub use classes::*;
pub use input::*;
pub use model::*;
pub use output::*;
pub use preprocess::*;

pub static CONFIG_VERSION: Lazy<VersionReq> = Lazy::new(|| VersionReq::parse("0.1.0").unwrap());

#[derive(Debug, Clone, StructOpt)]
/// Run a MobileNet-SSD detector over a camera or a video file
pub struct Args {
    #[structopt(long)]
    /// optional configuration file, overridden by command line options
    pub config_file: Option<PathBuf>,
    #[structopt(short, long)]
    /// path to Caffe 'deploy' prototxt file
    pub prototxt: Option<PathBuf>,
    #[structopt(short, long)]
    /// path to Caffe pre-trained model
    pub model: Option<PathBuf>,
    #[structopt(short, long)]
    /// path to input video file, camera 0 by default
    pub input: Option<PathBuf>,
    #[structopt(short, long)]
    /// path to output video file
    pub output: Option<PathBuf>,
    #[structopt(short, long)]
    /// whether or not output frames are displayed, enabled when positive
    pub display: Option<i32>,
    #[structopt(short, long)]
    /// minimum probability to filter weak detections
    pub confidence: Option<f64>,
    #[structopt(short, long)]
    /// whether or not the GPU is used, enabled when positive
    pub use_gpu: Option<i32>,
}

impl Args {
    /// Loads the configuration file if given, then applies command line overrides.
    pub fn into_config(self) -> Result<Config> {
        let Args {
            config_file,
            prototxt,
            model,
            input,
            output,
            display,
            confidence,
            use_gpu,
        } = self;

        let mut config = match &config_file {
            Some(path) => Config::open(path)
                .with_context(|| format!("failed to load config file '{}'", path.display()))?,
            None => Config::default(),
        };

        if let Some(prototxt) = prototxt {
            config.model.prototxt = Some(prototxt);
        }
        if let Some(model) = model {
            config.model.caffe_model = Some(model);
        }
        if let Some(path) = input {
            config.input = InputConfig::File { path };
        }
        if let Some(file) = output {
            config.output.file = Some(file);
        }
        if let Some(display) = display {
            config.display = display > 0;
        }
        if let Some(confidence) = confidence {
            config.confidence_threshold = R64::try_new(confidence)
                .ok_or_else(|| format_err!("invalid confidence {}", confidence))?;
        }
        if let Some(use_gpu) = use_gpu {
            config.model.use_gpu = use_gpu > 0;
        }

        config.check()?;
        Ok(config)
    }
}

/// The main detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_version")]
    pub version: Version,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// If set, show annotated frames in a window.
    #[serde(default = "default_true")]
    pub display: bool,
    /// Detections at or below this confidence are dropped.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: R64,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub classes: ClassesConfig,
    /// If set, the per-class colors are reproducible.
    pub palette_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: Version::new(0, 1, 0),
            model: Default::default(),
            input: Default::default(),
            output: Default::default(),
            display: true,
            confidence_threshold: default_confidence_threshold(),
            preprocess: Default::default(),
            classes: Default::default(),
            palette_seed: None,
        }
    }
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)?;
        Ok(config)
    }

    pub fn check(&self) -> Result<()> {
        ensure!(
            self.model.prototxt.is_some(),
            "the prototxt file must be specified"
        );
        ensure!(
            self.model.caffe_model.is_some(),
            "the Caffe model file must be specified"
        );
        ensure!(
            (0.0..=1.0).contains(&self.confidence_threshold.raw()),
            "confidence_threshold must be in range [0, 1]"
        );
        ensure!(self.output.fps > 0.0, "output fps must be positive");
        ensure!(
            self.output.fourcc.chars().count() == 4,
            "fourcc must have exactly four characters"
        );
        self.preprocess.check()?;
        Ok(())
    }
}

mod model {
    use super::*;

    /// The Caffe model files and inference device.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct ModelConfig {
        pub prototxt: Option<PathBuf>,
        pub caffe_model: Option<PathBuf>,
        #[serde(default)]
        pub use_gpu: bool,
        #[serde(default)]
        pub gpu_backend: GpuBackend,
    }

    /// The OpenCV DNN backend and target pair used when the GPU is enabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum GpuBackend {
        /// CUDA backend with CUDA target.
        Cuda,
        /// OpenCV backend with OpenCL target.
        OpenCl,
    }

    impl Default for GpuBackend {
        fn default() -> Self {
            Self::Cuda
        }
    }
}

mod input {
    use super::*;

    /// The video source.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum InputConfig {
        Camera { index: i32 },
        File { path: PathBuf },
    }

    impl Default for InputConfig {
        fn default() -> Self {
            Self::Camera { index: 0 }
        }
    }
}

mod output {
    use super::*;

    /// Video recording options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OutputConfig {
        /// If set, annotated frames are written to this file.
        pub file: Option<PathBuf>,
        #[serde(default = "default_fourcc")]
        pub fourcc: String,
        #[serde(default = "default_fps")]
        pub fps: R64,
    }

    impl Default for OutputConfig {
        fn default() -> Self {
            Self {
                file: None,
                fourcc: default_fourcc(),
                fps: default_fps(),
            }
        }
    }

    fn default_fourcc() -> String {
        "MJPG".into()
    }

    fn default_fps() -> R64 {
        r64(30.0)
    }
}

mod preprocess {
    use super::*;

    /// Frame resizing and network input options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PreprocessConfig {
        /// Frames are resized to this width, keeping the aspect ratio.
        #[serde(default = "default_frame_width")]
        pub frame_width: i32,
        /// The square network input size.
        #[serde(default = "default_blob_size")]
        pub blob_size: i32,
        /// Pixel values are multiplied by this factor after mean subtraction.
        #[serde(default = "default_scale_factor")]
        pub scale_factor: R64,
        /// The value subtracted from every channel.
        #[serde(default = "default_mean")]
        pub mean: R64,
    }

    impl PreprocessConfig {
        pub(super) fn check(&self) -> Result<()> {
            ensure!(self.frame_width > 0, "frame_width must be positive");
            ensure!(self.blob_size > 0, "blob_size must be positive");
            ensure!(self.scale_factor > 0.0, "scale_factor must be positive");
            Ok(())
        }
    }

    impl Default for PreprocessConfig {
        fn default() -> Self {
            Self {
                frame_width: default_frame_width(),
                blob_size: default_blob_size(),
                scale_factor: default_scale_factor(),
                mean: default_mean(),
            }
        }
    }

    fn default_frame_width() -> i32 {
        400
    }

    fn default_blob_size() -> i32 {
        300
    }

    fn default_scale_factor() -> R64 {
        r64(0.007843)
    }

    fn default_mean() -> R64 {
        r64(127.5)
    }
}

mod classes {
    use super::*;

    /// The class names indexed by the network output.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum ClassesConfig {
        PascalVoc,
        File { path: PathBuf },
    }

    impl Default for ClassesConfig {
        fn default() -> Self {
            Self::PascalVoc
        }
    }

    impl ClassesConfig {
        pub fn load(&self) -> Result<ClassList> {
            let classes = match self {
                Self::PascalVoc => ClassList::pascal_voc(),
                Self::File { path } => ClassList::load(path)?,
            };
            Ok(classes)
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> R64 {
    r64(0.2)
}

pub fn deserialize_version<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    let version = Version::parse(&text).map_err(|err| {
        D::Error::custom(format!(
            "failed to parse version number '{}': {:?}",
            text, err
        ))
    })?;

    if !CONFIG_VERSION.matches(&version) {
        return Err(D::Error::custom(format!(
            "incompatible version: get '{}', but it is incompatible with requirement '{}'",
            version, &*CONFIG_VERSION,
        )));
    }

    Ok(version)
}

//! Training program configuration format.

use crate::common::*;

pub use dataset::*;
pub use model::*;
pub use preprocessor::*;
pub use training::*;

pub static CONFIG_VERSION: Lazy<VersionReq> = Lazy::new(|| VersionReq::parse("0.1.0").unwrap());

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_version")]
    pub version: Version,
    pub model: ModelConfig,
    pub dataset: DatasetConfig,
    pub logging: LoggingConfig,
    pub preprocessor: PreprocessorConfig,
    pub training: TrainingConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        let ModelConfig {
            dropout,
            image_size,
            ..
        } = self.model;
        ensure!(
            (0.0..1.0).contains(&dropout.raw()),
            "dropout must be in range [0, 1)"
        );
        ensure!(image_size.get() >= 32, "image_size must be at least 32");
        ensure!(
            self.training.epochs.get() > 0,
            "the number of epochs must be positive"
        );
        self.preprocessor.check()?;
        Ok(())
    }
}

mod model {
    use super::*;

    /// The classifier configuration.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelConfig {
        /// The libtorch weights file of the ImageNet-pretrained ResNet-50 backbone.
        pub backbone_weights: PathBuf,
        /// The width of the hidden fully-connected layer in the head.
        #[serde(default = "default_hidden_units")]
        pub hidden_units: NonZeroUsize,
        /// The dropout probability applied after the hidden layer.
        #[serde(default = "default_dropout")]
        pub dropout: R64,
        /// Input images are resized to this square size.
        #[serde(default = "default_image_size")]
        pub image_size: NonZeroUsize,
        #[serde(default)]
        pub normalization: Normalization,
    }

    /// Pixel normalization applied before feeding the backbone.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum Normalization {
        /// Subtract a per-channel mean in RGB order from 0..255 pixels.
        MeanSubtraction { mean: [R64; 3] },
        /// Scale to 0..1 and standardize with ImageNet statistics.
        ImageNet,
    }

    impl Default for Normalization {
        fn default() -> Self {
            Self::MeanSubtraction {
                mean: [r64(123.68), r64(116.779), r64(103.939)],
            }
        }
    }

    fn default_hidden_units() -> NonZeroUsize {
        NonZeroUsize::new(256).unwrap()
    }

    fn default_dropout() -> R64 {
        r64(0.5)
    }

    fn default_image_size() -> NonZeroUsize {
        NonZeroUsize::new(224).unwrap()
    }
}

mod dataset {
    use super::*;

    /// Dataset options. Each directory holds one subdirectory per class.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        pub train_dir: PathBuf,
        pub val_dir: PathBuf,
        pub test_dir: PathBuf,
        /// Accepted image file extensions, compared case-insensitively.
        #[serde(default = "default_extensions")]
        pub extensions: HashSet<String>,
    }

    fn default_extensions() -> HashSet<String> {
        [".jpg", ".jpeg", ".png", ".bmp", ".tif", ".tiff"]
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_string())
            .collect()
    }
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    /// If set, write TensorBoard event files.
    #[serde(default = "default_true")]
    pub enable_events: bool,
}

/// Output file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where the fine-tuned model is saved.
    pub model_file: PathBuf,
    /// The loss/accuracy plot image.
    #[serde(default = "default_plot_file")]
    pub plot_file: PathBuf,
    /// Optional CSV file of per-epoch metrics.
    pub history_file: Option<PathBuf>,
    /// Optional JSON file of the test set classification report.
    pub report_file: Option<PathBuf>,
}

mod preprocessor {
    use super::*;

    /// Training data augmentation options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PreprocessorConfig {
        /// The maximum rotation in degrees.
        #[serde(default = "default_rotation_degrees")]
        pub rotation_degrees: R64,
        /// The zoom factor is sampled from `[1 - zoom_range, 1 + zoom_range]`.
        #[serde(default = "default_ratio_0_1")]
        pub zoom_range: R64,
        /// The maximum horizontal shift as a fraction of the width.
        #[serde(default = "default_ratio_0_1")]
        pub width_shift: R64,
        /// The maximum vertical shift as a fraction of the height.
        #[serde(default = "default_ratio_0_1")]
        pub height_shift: R64,
        /// The maximum shear angle in degrees.
        #[serde(default = "default_shear_degrees")]
        pub shear_degrees: R64,
        /// If set, flip images horizontally with probability 0.5.
        #[serde(default = "default_true")]
        pub horizontal_flip: bool,
        /// The number of batches buffered between the loader and the trainer.
        #[serde(default = "default_buffer_size")]
        pub buffer_size: NonZeroUsize,
        /// The device where the preprocessor works on.
        #[serde(with = "tch_serde::serde_device", default = "default_device")]
        pub device: Device,
    }

    impl PreprocessorConfig {
        pub(super) fn check(&self) -> Result<()> {
            ensure!(
                self.rotation_degrees >= 0.0,
                "rotation_degrees must be non-negative"
            );
            ensure!(
                (0.0..1.0).contains(&self.zoom_range.raw()),
                "zoom_range must be in range [0, 1)"
            );
            ensure!(self.width_shift >= 0.0, "width_shift must be non-negative");
            ensure!(
                self.height_shift >= 0.0,
                "height_shift must be non-negative"
            );
            ensure!(
                self.shear_degrees >= 0.0,
                "shear_degrees must be non-negative"
            );
            Ok(())
        }
    }

    fn default_rotation_degrees() -> R64 {
        r64(25.0)
    }

    fn default_ratio_0_1() -> R64 {
        r64(0.1)
    }

    fn default_shear_degrees() -> R64 {
        r64(0.2)
    }

    fn default_buffer_size() -> NonZeroUsize {
        NonZeroUsize::new(2).unwrap()
    }

    fn default_device() -> Device {
        Device::Cpu
    }
}

mod training {
    use super::*;

    /// The training options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TrainingConfig {
        /// The batch size.
        pub batch_size: NonZeroUsize,
        /// The number of passes over the training set.
        pub epochs: NonZeroUsize,
        /// Learning rate scheduling strategy.
        pub lr_schedule: LearningRateSchedule,
        #[serde(default = "default_beta1")]
        pub beta1: R64,
        #[serde(default = "default_beta2")]
        pub beta2: R64,
        #[serde(default = "default_weight_decay")]
        pub weight_decay: R64,
        /// The loss function.
        #[serde(default)]
        pub loss: LossKind,
        /// If set, the training set is shuffled with this seed.
        pub shuffle_seed: Option<u64>,
        /// If set, it saves a checkpoint file per this epochs.
        pub save_checkpoint_epochs: Option<NonZeroUsize>,
        /// Checkpoint file loading method.
        #[serde(default)]
        pub load_checkpoint: LoadCheckpoint,
        /// The training device.
        #[serde(with = "tch_serde::serde_device")]
        pub device: Device,
    }

    /// The learning rate scheduling strategy.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LearningRateSchedule {
        /// Use constant learning rate.
        Constant { lr: R64 },
        /// Use specific learning rate at specified steps.
        StepWise { steps: Vec<(usize, R64)> },
        /// Use `lr / (1 + decay * step)`. The decay defaults to `lr / epochs`.
        InverseTimeDecay { lr: R64, decay: Option<R64> },
    }

    /// The classification loss.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum LossKind {
        /// Binary cross entropy between softmax probabilities and one-hot targets.
        BinaryCrossEntropy,
        /// Categorical cross entropy on logits.
        CrossEntropy,
    }

    impl Default for LossKind {
        fn default() -> Self {
            Self::BinaryCrossEntropy
        }
    }

    /// Checkpoint file loading method.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LoadCheckpoint {
        /// Disable checkpoint file loading.
        Disabled,
        /// Load the most recent checkpoint file.
        FromRecent,
        /// Load the checkpoint file at specified path.
        FromFile { file: PathBuf },
    }

    impl Default for LoadCheckpoint {
        fn default() -> Self {
            Self::Disabled
        }
    }

    fn default_beta1() -> R64 {
        r64(0.9)
    }

    fn default_beta2() -> R64 {
        r64(0.999)
    }

    fn default_weight_decay() -> R64 {
        r64(0.0)
    }
}

fn default_true() -> bool {
    true
}

fn default_plot_file() -> PathBuf {
    PathBuf::from("plot.png")
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

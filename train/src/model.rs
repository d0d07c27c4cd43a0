//! The fine-tuned classifier.

use crate::{common::*, config::ModelConfig};
use tch::vision::resnet;

const BACKBONE_PREFIX: &str = "backbone.";
const HEAD_PREFIX: &str = "head.";
const BACKBONE_FEATURES: i64 = 2048;

/// A frozen ResNet-50 feature extractor with a trainable classification head.
///
/// The backbone and the head own separate variable stores, so that optimizers
/// and checkpoints only ever see the head variables.
pub struct Classifier {
    backbone_vs: nn::VarStore,
    head_vs: nn::VarStore,
    backbone: nn::FuncT<'static>,
    head: nn::SequentialT,
    num_classes: usize,
}

impl Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("device", &self.head_vs.device())
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

impl Classifier {
    pub fn new(config: &ModelConfig, num_classes: usize, device: Device) -> Result<Self> {
        let ModelConfig {
            hidden_units,
            dropout,
            ..
        } = *config;
        ensure!(num_classes > 0, "the number of classes must be positive");

        let mut backbone_vs = nn::VarStore::new(device);
        let backbone = resnet::resnet50_no_final_layer(&backbone_vs.root());
        backbone_vs.freeze();

        let head_vs = nn::VarStore::new(device);
        let head = {
            let root = head_vs.root();
            let hidden_units = hidden_units.get() as i64;
            let dropout = dropout.raw();

            nn::seq_t()
                .add(nn::linear(
                    &root / "fc1",
                    BACKBONE_FEATURES,
                    hidden_units,
                    Default::default(),
                ))
                .add_fn(|xs| xs.relu())
                .add_fn_t(move |xs, train| xs.dropout(dropout, train))
                .add(nn::linear(
                    &root / "fc2",
                    hidden_units,
                    num_classes as i64,
                    Default::default(),
                ))
        };

        Ok(Self {
            backbone_vs,
            head_vs,
            backbone,
            head,
            num_classes,
        })
    }

    /// Loads pretrained backbone weights. Unknown entries in the file are ignored.
    pub fn load_backbone(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let num_variables = self.backbone_vs.len();
        let missing = self
            .backbone_vs
            .load_partial(path)
            .with_context(|| format!("failed to load backbone weights '{}'", path.display()))?;

        ensure!(
            missing.len() < num_variables,
            "no backbone variable is found in '{}'",
            path.display()
        );
        if !missing.is_empty() {
            warn!(
                "{} backbone variables are missing in '{}'",
                missing.len(),
                path.display()
            );
        }
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn device(&self) -> Device {
        self.head_vs.device()
    }

    /// The trainable head variables.
    pub fn head_vs(&self) -> &nn::VarStore {
        &self.head_vs
    }

    pub fn head_vs_mut(&mut self) -> &mut nn::VarStore {
        &mut self.head_vs
    }

    /// Computes `[batch, num_classes]` logits.
    pub fn forward_t(&self, images: &Tensor, train: bool) -> Tensor {
        let features = tch::no_grad(|| self.backbone.forward_t(images, false));
        self.head.forward_t(&features, train)
    }

    /// Computes `[batch, num_classes]` class probabilities in evaluation mode.
    pub fn predict(&self, images: &Tensor) -> Tensor {
        tch::no_grad(|| self.forward_t(images, false).softmax(-1, Kind::Float))
    }

    /// Saves the backbone and head variables into one file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let named_tensors: Vec<(String, Tensor)> =
            prefixed_variables(&self.backbone_vs, BACKBONE_PREFIX)
                .chain(prefixed_variables(&self.head_vs, HEAD_PREFIX))
                .collect();
        Tensor::save_multi(&named_tensors, path)
            .with_context(|| format!("failed to save model '{}'", path.display()))?;
        Ok(())
    }

    /// Restores a model file written by [Classifier::save].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let named_tensors = Tensor::load_multi(path)
            .with_context(|| format!("failed to load model '{}'", path.display()))?;

        let mut backbone_vars = self.backbone_vs.variables();
        let mut head_vars = self.head_vs.variables();
        let num_expected = backbone_vars.len() + head_vars.len();
        let mut num_loaded = 0;

        for (name, tensor) in named_tensors {
            let var = if let Some(name) = name.strip_prefix(BACKBONE_PREFIX) {
                backbone_vars.get_mut(name)
            } else if let Some(name) = name.strip_prefix(HEAD_PREFIX) {
                head_vars.get_mut(name)
            } else {
                None
            };
            let var = match var {
                Some(var) => var,
                None => {
                    warn!("ignore unknown entry '{}' in '{}'", name, path.display());
                    continue;
                }
            };

            tch::no_grad(|| var.f_copy_(&tensor))
                .with_context(|| format!("failed to restore variable '{}'", name))?;
            num_loaded += 1;
        }

        ensure!(
            num_loaded == num_expected,
            "'{}' holds {} of {} model variables",
            path.display(),
            num_loaded,
            num_expected
        );
        Ok(())
    }
}

fn prefixed_variables<'a>(
    vs: &'a nn::VarStore,
    prefix: &'a str,
) -> impl Iterator<Item = (String, Tensor)> + 'a {
    vs.variables()
        .into_iter()
        .map(move |(name, tensor)| (format!("{}{}", prefix, name), tensor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Normalization;

    fn model_config() -> ModelConfig {
        ModelConfig {
            backbone_weights: PathBuf::from("resnet50.ot"),
            hidden_units: NonZeroUsize::new(16).unwrap(),
            dropout: r64(0.5),
            image_size: NonZeroUsize::new(32).unwrap(),
            normalization: Normalization::default(),
        }
    }

    #[test]
    fn only_head_is_trainable() -> Result<()> {
        let model = Classifier::new(&model_config(), 3, Device::Cpu)?;
        assert_eq!(model.head_vs().trainable_variables().len(), 4);
        assert!(model
            .backbone_vs
            .variables()
            .values()
            .all(|var| !var.requires_grad()));
        Ok(())
    }

    #[test]
    fn output_shapes() -> Result<()> {
        let model = Classifier::new(&model_config(), 3, Device::Cpu)?;
        let images = Tensor::rand(&[2, 3, 32, 32], (Kind::Float, Device::Cpu));

        let logits = model.forward_t(&images, true);
        assert_eq!(logits.size(), [2, 3]);

        let probs = model.predict(&images);
        let sums = Vec::<f32>::from(&probs.sum_dim_intlist(&[-1], false, Kind::Float));
        sums.iter().for_each(|&sum| assert!((sum - 1.0).abs() < 1e-4));
        Ok(())
    }

    #[test]
    fn save_and_load_restore_head() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("model.ot");
        let images = Tensor::rand(&[1, 3, 32, 32], (Kind::Float, Device::Cpu));

        let model = Classifier::new(&model_config(), 2, Device::Cpu)?;
        model.save(&path)?;
        let expect = model.predict(&images);

        let mut restored = Classifier::new(&model_config(), 2, Device::Cpu)?;
        restored.load(&path)?;
        let output = restored.predict(&images);

        assert!(f64::from((output - expect).abs().max()) < 1e-5);
        Ok(())
    }

    #[test]
    fn load_rejects_mismatched_head() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("model.ot");
        Classifier::new(&model_config(), 2, Device::Cpu)?.save(&path)?;

        let mut other = Classifier::new(&model_config(), 5, Device::Cpu)?;
        assert!(other.load(&path).is_err());
        Ok(())
    }
}

use crate::{common::*, config::LossKind};

const DEFAULT_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone)]
pub struct ClassificationLossInit {
    pub kind: LossKind,
    /// Probabilities are clamped to `[epsilon, 1 - epsilon]` before binary cross entropy.
    pub epsilon: f64,
}

impl ClassificationLossInit {
    pub fn new(kind: LossKind) -> Self {
        Self {
            kind,
            epsilon: DEFAULT_EPSILON,
        }
    }

    pub fn build(self) -> Result<ClassificationLoss> {
        let Self { kind, epsilon } = self;
        ensure!(
            (0.0..0.5).contains(&epsilon),
            "epsilon must be in range [0, 0.5)"
        );
        Ok(ClassificationLoss { kind, epsilon })
    }
}

/// Mean classification loss of logits against class indexes.
#[derive(Debug, Clone)]
pub struct ClassificationLoss {
    kind: LossKind,
    epsilon: f64,
}

impl ClassificationLoss {
    /// Computes a scalar loss from `[batch, classes]` logits and `[batch]` class indexes.
    pub fn forward(&self, logits: &Tensor, labels: &Tensor) -> Result<Tensor> {
        let (_, num_classes) = logits.size2()?;
        let loss = match self.kind {
            LossKind::BinaryCrossEntropy => {
                let probs = logits
                    .softmax(-1, Kind::Float)
                    .clamp(self.epsilon, 1.0 - self.epsilon);
                let targets = labels.onehot(num_classes).to_kind(Kind::Float);
                probs.binary_cross_entropy::<Tensor>(&targets, None, Reduction::Mean)
            }
            LossKind::CrossEntropy => logits.cross_entropy_for_logits(labels),
        };
        Ok(loss)
    }
}

/// The fraction of rows whose highest logit is at the target class.
pub fn accuracy(logits: &Tensor, labels: &Tensor) -> Tensor {
    logits
        .argmax(-1, false)
        .eq_tensor(labels)
        .to_kind(Kind::Float)
        .mean(Kind::Float)
}

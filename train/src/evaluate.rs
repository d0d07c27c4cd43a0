//! Test set evaluation and the per-class classification report.

use crate::{
    common::*,
    data::{eval_batches, prepare_eval_batch, DirectoryDataset, Normalizer},
    loss::{accuracy, ClassificationLoss},
    model::Classifier,
};
use prettytable::{cell, row, Table};

/// Mean loss and accuracy over a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Computes the sample-weighted loss and accuracy over every record of a dataset
/// in evaluation mode.
pub fn evaluate_dataset(
    model: &Classifier,
    loss_fn: &ClassificationLoss,
    dataset: &DirectoryDataset,
    batch_size: usize,
    image_size: usize,
    normalizer: &Normalizer,
) -> Result<EvalMetrics> {
    ensure!(
        !dataset.is_empty(),
        "the dataset at '{}' has no images",
        dataset.dir().display()
    );
    let device = model.device();
    let mut loss_sum = 0.0;
    let mut accuracy_sum = 0.0;

    for records in eval_batches(dataset.records(), batch_size) {
        let batch = prepare_eval_batch(records, image_size, normalizer)?.to_device(device);
        let num_samples = batch.len() as f64;
        let (loss, acc) = tch::no_grad(|| -> Result<_> {
            let logits = model.forward_t(&batch.images, false);
            let loss = f64::from(loss_fn.forward(&logits, &batch.labels)?);
            let acc = f64::from(accuracy(&logits, &batch.labels));
            Ok((loss, acc))
        })?;
        loss_sum += loss * num_samples;
        accuracy_sum += acc * num_samples;
    }

    let total = dataset.len() as f64;
    Ok(EvalMetrics {
        loss: loss_sum / total,
        accuracy: accuracy_sum / total,
    })
}

/// Predicts the class index of every record in dataset order.
pub fn predict_dataset(
    model: &Classifier,
    dataset: &DirectoryDataset,
    batch_size: usize,
    image_size: usize,
    normalizer: &Normalizer,
) -> Result<Vec<usize>> {
    let device = model.device();
    let mut predictions = Vec::with_capacity(dataset.len());

    for records in eval_batches(dataset.records(), batch_size) {
        let batch = prepare_eval_batch(records, image_size, normalizer)?;
        let probs = model.predict(&batch.images.to_device(device));
        let indexes = Vec::<i64>::from(&probs.argmax(-1, false).to_device(Device::Cpu));
        predictions.extend(indexes.into_iter().map(|index| index as usize));
    }

    Ok(predictions)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Precision, recall and F1 score per class, with overall accuracy and averages.
///
/// Metrics with a zero denominator are reported as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub total: usize,
}

impl ClassificationReport {
    pub fn new(y_true: &[usize], y_pred: &[usize], classes: &ClassList) -> Result<Self> {
        ensure!(
            y_true.len() == y_pred.len(),
            "got {} targets but {} predictions",
            y_true.len(),
            y_pred.len()
        );
        let num_classes = classes.len();
        ensure!(
            y_true.iter().chain(y_pred).all(|&index| index < num_classes),
            "class index out of range for {} classes",
            num_classes
        );

        let mut true_positives = vec![0usize; num_classes];
        let mut predicted = vec![0usize; num_classes];
        let mut support = vec![0usize; num_classes];
        y_true.iter().zip(y_pred).for_each(|(&target, &pred)| {
            support[target] += 1;
            predicted[pred] += 1;
            if target == pred {
                true_positives[target] += 1;
            }
        });

        let class_metrics: Vec<_> = classes
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let precision = safe_div(true_positives[index], predicted[index]);
                let recall = safe_div(true_positives[index], support[index]);
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    name: name.to_string(),
                    precision,
                    recall,
                    f1_score,
                    support: support[index],
                }
            })
            .collect();

        let total = y_true.len();
        let accuracy = safe_div(true_positives.iter().sum(), total);

        let macro_avg = {
            let n = num_classes as f64;
            AverageMetrics {
                precision: class_metrics.iter().map(|m| m.precision).sum::<f64>() / n,
                recall: class_metrics.iter().map(|m| m.recall).sum::<f64>() / n,
                f1_score: class_metrics.iter().map(|m| m.f1_score).sum::<f64>() / n,
            }
        };
        let weighted_avg = {
            let weighted = |metric: fn(&ClassMetrics) -> f64| {
                let sum: f64 = class_metrics
                    .iter()
                    .map(|m| metric(m) * m.support as f64)
                    .sum();
                if total > 0 {
                    sum / total as f64
                } else {
                    0.0
                }
            };
            AverageMetrics {
                precision: weighted(|m| m.precision),
                recall: weighted(|m| m.recall),
                f1_score: weighted(|m| m.f1_score),
            }
        };

        Ok(Self {
            classes: class_metrics,
            accuracy,
            macro_avg,
            weighted_avg,
            total,
        })
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(row!["", "precision", "recall", "f1-score", "support"]);

        self.classes.iter().for_each(|m| {
            table.add_row(row![
                m.name,
                format!("{:.2}", m.precision),
                format!("{:.2}", m.recall),
                format!("{:.2}", m.f1_score),
                m.support,
            ]);
        });

        table.add_row(row![
            "accuracy",
            "",
            "",
            format!("{:.2}", self.accuracy),
            self.total
        ]);
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            table.add_row(row![
                name,
                format!("{:.2}", avg.precision),
                format!("{:.2}", avg.recall),
                format!("{:.2}", avg.f1_score),
                self.total,
            ]);
        }

        table
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("failed to write report '{}'", path.display()))?;
        Ok(())
    }
}

impl Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_table())
    }
}

fn safe_div(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn classes() -> ClassList {
        ClassList::new(["camouflage_clothes", "normal_clothes"]).unwrap()
    }

    #[test]
    fn binary_report() -> Result<()> {
        let y_true = [0, 0, 0, 1, 1];
        let y_pred = [0, 0, 1, 1, 0];
        let report = ClassificationReport::new(&y_true, &y_pred, &classes())?;

        let camo = &report.classes[0];
        assert_abs_diff_eq!(camo.precision, 2.0 / 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(camo.recall, 2.0 / 3.0, epsilon = 1e-9);
        assert_eq!(camo.support, 3);

        let normal = &report.classes[1];
        assert_abs_diff_eq!(normal.precision, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(normal.recall, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(normal.f1_score, 0.5, epsilon = 1e-9);

        assert_abs_diff_eq!(report.accuracy, 0.6, epsilon = 1e-9);
        assert_abs_diff_eq!(report.macro_avg.recall, (2.0 / 3.0 + 0.5) / 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            report.weighted_avg.recall,
            (2.0 / 3.0 * 3.0 + 0.5 * 2.0) / 5.0,
            epsilon = 1e-9
        );
        assert_eq!(report.total, 5);
        Ok(())
    }

    #[test]
    fn zero_division_yields_zero() -> Result<()> {
        let report = ClassificationReport::new(&[0, 0], &[0, 0], &classes())?;
        let normal = &report.classes[1];
        assert_eq!(normal.precision, 0.0);
        assert_eq!(normal.recall, 0.0);
        assert_eq!(normal.f1_score, 0.0);
        assert_eq!(normal.support, 0);
        assert_eq!(report.accuracy, 1.0);
        Ok(())
    }

    #[test]
    fn reject_mismatched_inputs() {
        assert!(ClassificationReport::new(&[0, 1], &[0], &classes()).is_err());
        assert!(ClassificationReport::new(&[0, 2], &[0, 1], &classes()).is_err());
    }

    #[test]
    fn table_and_json() -> Result<()> {
        let report = ClassificationReport::new(&[0, 1, 1], &[0, 1, 0], &classes())?;
        let text = report.to_string();
        assert!(text.contains("camouflage_clothes"));
        assert!(text.contains("weighted avg"));

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("report.json");
        report.save_json(&path)?;
        let loaded: ClassificationReport = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(loaded.total, 3);
        assert_eq!(loaded.classes[1].name, "normal_clothes");
        assert_abs_diff_eq!(loaded.accuracy, report.accuracy, epsilon = 1e-12);
        Ok(())
    }
}

//! Per-epoch training metrics and the loss/accuracy chart.

use crate::common::*;
use plotters::prelude::*;

const PLOT_SIZE: (u32, u32) = (640, 480);

/// Metrics collected at the end of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub records: Vec<EpochRecord>,
}

impl History {
    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create history file '{}'", path.display()))?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open history file '{}'", path.display()))?;
        let records: Vec<EpochRecord> = reader.deserialize().try_collect()?;
        Ok(Self { records })
    }

    /// Draws training and validation loss and accuracy against the epoch.
    pub fn plot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure!(!self.is_empty(), "cannot plot an empty history");

        let x_max = self.records.iter().map(|r| r.epoch).max().unwrap_or(0) as f64;
        let y_max = self
            .records
            .iter()
            .flat_map(|r| [r.loss, r.val_loss, r.accuracy, r.val_accuracy])
            .filter(|val| val.is_finite())
            .fold(1.0, f64::max);

        let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Training Loss and Accuracy on Dataset", ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0f64..x_max.max(1.0), 0f64..y_max * 1.05)?;

        chart
            .configure_mesh()
            .x_desc("Epoch #")
            .y_desc("Loss/Accuracy")
            .draw()?;

        let series: [(&str, fn(&EpochRecord) -> f64, RGBColor); 4] = [
            ("train_loss", |r| r.loss, RED),
            ("val_loss", |r| r.val_loss, BLUE),
            ("train_acc", |r| r.accuracy, MAGENTA),
            ("val_acc", |r| r.val_accuracy, GREEN),
        ];

        for (label, metric, color) in series {
            let points: Vec<(f64, f64)> = self
                .records
                .iter()
                .map(|r| (r.epoch as f64, metric(r)))
                .collect();
            chart
                .draw_series(LineSeries::new(points, &color))?
                .label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerLeft)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;

        root.present()
            .with_context(|| format!("failed to write plot '{}'", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> History {
        let mut history = History::default();
        (0..3).for_each(|epoch| {
            history.push(EpochRecord {
                epoch,
                loss: 0.5 / (epoch + 1) as f64,
                accuracy: 0.6 + 0.1 * epoch as f64,
                val_loss: 0.25,
                val_accuracy: 0.75,
            })
        });
        history
    }

    #[test]
    fn csv_columns_and_reload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("history.csv");
        let history = history();
        history.save_csv(&path)?;

        let text = fs::read_to_string(&path)?;
        assert_eq!(
            text.lines().next(),
            Some("epoch,loss,accuracy,val_loss,val_accuracy")
        );
        assert_eq!(text.lines().count(), 4);

        let loaded = History::load_csv(&path)?;
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.records[2].epoch, 2);
        assert_eq!(loaded.records[1].val_accuracy, 0.75);
        Ok(())
    }

    #[test]
    fn empty_history_is_not_plotted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("plot.png");
        assert!(History::default().plot(&path).is_err());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn plot_writes_png() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("plot.png");
        history().plot(&path)?;

        assert!(fs::metadata(&path)?.len() > 0);
        let image = image::open(&path)?;
        assert_eq!((image.width(), image.height()), PLOT_SIZE);
        Ok(())
    }
}

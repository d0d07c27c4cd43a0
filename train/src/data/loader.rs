use super::{Batch, ImageRecord};
use crate::{common::*, config::Normalization};

const IMAGENET_MEAN: [f64; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f64; 3] = [0.229, 0.224, 0.225];

/// Decodes an image file into a `[3, size, size]` float tensor of RGB pixels in `0..=255`.
pub fn load_image(path: &Path, image_size: usize) -> Result<Tensor> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode image '{}'", path.display()))?
        .to_rgb8();
    let size = image_size as u32;
    let image = image::imageops::resize(&image, size, size, FilterType::Nearest);
    let (width, height) = image.dimensions();

    let tensor = Tensor::of_slice(image.as_raw())
        .view([height as i64, width as i64, 3])
        .permute(&[2, 0, 1])
        .to_kind(Kind::Float);
    Ok(tensor)
}

/// Loads the images of the records and stacks them into a batch on the CPU.
pub fn load_batch(records: &[ImageRecord], image_size: usize) -> Result<Batch> {
    ensure!(!records.is_empty(), "cannot build an empty batch");

    let images: Vec<Tensor> = records
        .iter()
        .map(|record| load_image(&record.path, image_size))
        .try_collect()?;
    let labels: Vec<i64> = records
        .iter()
        .map(|record| record.class_index as i64)
        .collect();

    Ok(Batch {
        images: Tensor::stack(&images, 0),
        labels: Tensor::of_slice(&labels),
    })
}

/// Pixel normalization in front of the backbone.
#[derive(Debug, Clone)]
pub struct Normalizer {
    scale: f64,
    mean: [f64; 3],
    std: [f64; 3],
}

impl Normalizer {
    pub fn new(normalization: &Normalization) -> Self {
        match *normalization {
            Normalization::MeanSubtraction { mean } => Self {
                scale: 1.0,
                mean: [mean[0].raw(), mean[1].raw(), mean[2].raw()],
                std: [1.0; 3],
            },
            Normalization::ImageNet => Self {
                scale: 1.0 / 255.0,
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD,
            },
        }
    }

    /// Normalizes `[batch, 3, height, width]` images with pixels in `0..=255`.
    pub fn forward(&self, images: &Tensor) -> Tensor {
        let options = (Kind::Float, images.device());
        let mean = Tensor::of_slice(&self.mean)
            .to_kind(Kind::Float)
            .view([1, 3, 1, 1])
            .to_device(options.1);
        let std = Tensor::of_slice(&self.std)
            .to_kind(Kind::Float)
            .view([1, 3, 1, 1])
            .to_device(options.1);

        (images.to_kind(options.0) * self.scale - mean) / std
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn load_and_resize_image() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("red.png");
        let image = image::RgbImage::from_pixel(40, 20, image::Rgb([255, 0, 10]));
        image.save(&path)?;

        let tensor = load_image(&path, 32)?;
        assert_eq!(tensor.size(), [3, 32, 32]);
        assert_abs_diff_eq!(f64::from(tensor.i((0, 5, 7))), 255.0);
        assert_abs_diff_eq!(f64::from(tensor.i((1, 5, 7))), 0.0);
        assert_abs_diff_eq!(f64::from(tensor.i((2, 31, 31))), 10.0);
        Ok(())
    }

    #[test]
    fn load_batch_keeps_record_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let records: Vec<_> = (0..3)
            .map(|index| -> Result<_> {
                let path = dir.path().join(format!("{}.png", index));
                image::RgbImage::from_pixel(8, 8, image::Rgb([index as u8; 3])).save(&path)?;
                Ok(ImageRecord {
                    path,
                    class_index: 2 - index,
                })
            })
            .try_collect()?;

        let batch = load_batch(&records, 16)?;
        assert_eq!(batch.images.size(), [3, 3, 16, 16]);
        assert_eq!(Vec::<i64>::from(&batch.labels), [2, 1, 0]);
        assert_abs_diff_eq!(f64::from(batch.images.i((2, 0, 0, 0))), 2.0);
        Ok(())
    }

    #[test]
    fn missing_image_is_an_error() {
        assert!(load_image(Path::new("/nonexistent/image.jpg"), 8).is_err());
    }

    #[test]
    fn mean_subtraction() {
        let normalizer = Normalizer::new(&Normalization::default());
        let images = Tensor::full(&[1, 3, 2, 2], 200.0, (Kind::Float, Device::Cpu));
        let output = normalizer.forward(&images);
        assert_abs_diff_eq!(f64::from(output.i((0, 0, 0, 0))), 200.0 - 123.68, epsilon = 1e-4);
        assert_abs_diff_eq!(f64::from(output.i((0, 2, 1, 1))), 200.0 - 103.939, epsilon = 1e-4);
    }

    #[test]
    fn imagenet_standardization() {
        let normalizer = Normalizer::new(&Normalization::ImageNet);
        let images = Tensor::full(&[1, 3, 1, 1], 255.0, (Kind::Float, Device::Cpu));
        let output = normalizer.forward(&images);
        let expect = (1.0 - 0.485) / 0.229;
        assert_abs_diff_eq!(f64::from(output.i((0, 0, 0, 0))), expect, epsilon = 1e-4);
    }
}

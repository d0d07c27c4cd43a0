use crate::{common::*, config::PreprocessorConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RandomAffineInit {
    pub rotate_degrees: f64,
    pub zoom_range: f64,
    pub width_shift: f64,
    pub height_shift: f64,
    pub shear_degrees: f64,
    pub horizontal_flip: bool,
}

impl RandomAffineInit {
    pub fn build(self) -> Result<RandomAffine> {
        let Self {
            rotate_degrees,
            zoom_range,
            width_shift,
            height_shift,
            shear_degrees,
            horizontal_flip,
        } = self;

        ensure!(rotate_degrees >= 0.0, "rotate_degrees must be non-negative");
        ensure!(
            (0.0..1.0).contains(&zoom_range),
            "zoom_range must be in range [0, 1)"
        );
        ensure!(width_shift >= 0.0, "width_shift must be non-negative");
        ensure!(height_shift >= 0.0, "height_shift must be non-negative");
        ensure!(shear_degrees >= 0.0, "shear_degrees must be non-negative");

        Ok(RandomAffine {
            rotate_radians: rotate_degrees.to_radians(),
            zoom_range,
            width_shift,
            height_shift,
            shear_radians: shear_degrees.to_radians(),
            horizontal_flip,
        })
    }
}

impl Default for RandomAffineInit {
    fn default() -> Self {
        Self {
            rotate_degrees: 0.0,
            zoom_range: 0.0,
            width_shift: 0.0,
            height_shift: 0.0,
            shear_degrees: 0.0,
            horizontal_flip: false,
        }
    }
}

impl From<&PreprocessorConfig> for RandomAffineInit {
    fn from(config: &PreprocessorConfig) -> Self {
        Self {
            rotate_degrees: config.rotation_degrees.raw(),
            zoom_range: config.zoom_range.raw(),
            width_shift: config.width_shift.raw(),
            height_shift: config.height_shift.raw(),
            shear_degrees: config.shear_degrees.raw(),
            horizontal_flip: config.horizontal_flip,
        }
    }
}

/// Random rotation, zoom, shift, shear and horizontal flip of image batches.
///
/// Transforms are expressed in normalized `[-1, 1]` coordinates and map output
/// pixels to input pixels. Pixels sampled outside the input repeat the border.
#[derive(Debug, Clone)]
pub struct RandomAffine {
    rotate_radians: f64,
    zoom_range: f64,
    width_shift: f64,
    height_shift: f64,
    shear_radians: f64,
    horizontal_flip: bool,
}

impl RandomAffine {
    /// Augments `[batch, channels, height, width]` images with one transform per image.
    pub fn forward<R>(&self, images: &Tensor, rng: &mut R) -> Result<Tensor>
    where
        R: Rng + ?Sized,
    {
        tch::no_grad(|| {
            let device = images.device();
            let (batch_size, channels, height, width) = images.size4()?;

            let thetas: Vec<_> = (0..batch_size)
                .map(|_| self.sample_matrix(rng).narrow(0, 0, 2))
                .collect();
            let thetas = Tensor::stack(&thetas, 0).to_device(device);

            let grid = Tensor::affine_grid_generator(
                &thetas,
                &[batch_size, channels, height, width],
                false,
            );
            // bilinear interpolation with border padding
            let output = images
                .to_kind(Kind::Float)
                .grid_sampler(&grid, 0, 1, false);
            Ok(output)
        })
    }

    /// Samples one 3x3 transform acting on `(x, y, 1)` columns.
    pub fn sample_matrix<R>(&self, rng: &mut R) -> Tensor
    where
        R: Rng + ?Sized,
    {
        let mut sample = |range: f64| {
            if range > 0.0 {
                rng.gen_range(-range..=range)
            } else {
                0.0
            }
        };

        let angle = sample(self.rotate_radians);
        let tx = (sample(self.width_shift) * 2.0) as f32;
        let ty = (sample(self.height_shift) * 2.0) as f32;
        let shear = sample(self.shear_radians);
        let zx = (1.0 + sample(self.zoom_range)) as f32;
        let zy = (1.0 + sample(self.zoom_range)) as f32;

        let cos = angle.cos() as f32;
        let sin = angle.sin() as f32;
        let rotation = Tensor::of_slice(
            &[
                [cos, -sin, 0.0], // row 1
                [sin, cos, 0.0],  // row 2
                [0.0, 0.0, 1.0],  // row 3
            ]
            .flat(),
        )
        .view([3, 3]);
        let translation = Tensor::of_slice(
            &[
                [1.0, 0.0, tx], // row 1
                [0.0, 1.0, ty], // row 2
                [0.0, 0.0, 1.0],
            ]
            .flat(),
        )
        .view([3, 3]);
        let shearing = Tensor::of_slice(
            &[
                [1.0, -shear.sin() as f32, 0.0], // row 1
                [0.0, shear.cos() as f32, 0.0],  // row 2
                [0.0, 0.0, 1.0],                 // row 3
            ]
            .flat(),
        )
        .view([3, 3]);
        let zoom = Tensor::of_slice(
            &[
                [zx, 0.0, 0.0], // row 1
                [0.0, zy, 0.0], // row 2
                [0.0, 0.0, 1.0],
            ]
            .flat(),
        )
        .view([3, 3]);

        let transform = rotation
            .matmul(&translation)
            .matmul(&shearing)
            .matmul(&zoom);

        if self.horizontal_flip && rng.gen::<bool>() {
            let flip = Tensor::of_slice(
                &[
                    [-1.0f32, 0.0, 0.0], // row 1
                    [0.0, 1.0, 0.0],     // row 2
                    [0.0, 0.0, 1.0],     // row 3
                ]
                .flat(),
            )
            .view([3, 3]);
            transform.matmul(&flip)
        } else {
            transform
        }
    }
}

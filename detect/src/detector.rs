//! MobileNet-SSD inference through the OpenCV DNN module.

use crate::{
    common::*,
    config::{GpuBackend, ModelConfig, PreprocessConfig},
};

/// Number of values in each row of the SSD output.
const ROW_LEN: usize = 7;

/// An accepted detection with a ratio box.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: Label<TLBR<f32>, usize>,
    pub confidence: f32,
}

/// The Caffe SSD network.
pub struct SsdDetector {
    net: dnn::Net,
    blob_size: i32,
    scale_factor: f64,
    mean: f64,
}

impl std::fmt::Debug for SsdDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsdDetector")
            .field("blob_size", &self.blob_size)
            .field("scale_factor", &self.scale_factor)
            .field("mean", &self.mean)
            .finish()
    }
}

impl SsdDetector {
    pub fn new(model: &ModelConfig, preprocess: &PreprocessConfig) -> Result<Self> {
        let ModelConfig {
            prototxt,
            caffe_model,
            use_gpu,
            gpu_backend,
        } = model;
        let prototxt = prototxt
            .as_ref()
            .ok_or_else(|| format_err!("the prototxt file is not specified"))?;
        let caffe_model = caffe_model
            .as_ref()
            .ok_or_else(|| format_err!("the Caffe model file is not specified"))?;

        info!("loading model");
        let mut net = dnn::read_net_from_caffe(&path_to_str(prototxt)?, &path_to_str(caffe_model)?)
            .with_context(|| {
                format!(
                    "failed to load Caffe model '{}' with '{}'",
                    caffe_model.display(),
                    prototxt.display()
                )
            })?;

        if *use_gpu {
            match gpu_backend {
                GpuBackend::Cuda => {
                    info!("setting preferable backend and target to CUDA");
                    net.set_preferable_backend(dnn::DNN_BACKEND_CUDA)?;
                    net.set_preferable_target(dnn::DNN_TARGET_CUDA)?;
                }
                GpuBackend::OpenCl => {
                    info!("setting preferable backend to OpenCV and target to OpenCL");
                    net.set_preferable_backend(dnn::DNN_BACKEND_OPENCV)?;
                    net.set_preferable_target(dnn::DNN_TARGET_OPENCL)?;
                }
            }
        }

        Ok(Self {
            net,
            blob_size: preprocess.blob_size,
            scale_factor: preprocess.scale_factor.raw(),
            mean: preprocess.mean.raw(),
        })
    }

    /// Runs the network on a BGR frame and keeps detections above `threshold`.
    pub fn detect(&mut self, frame: &Mat, threshold: f32) -> Result<Vec<Detection>> {
        let mut resized = Mat::default();
        let size = Size::new(self.blob_size, self.blob_size);
        imgproc::resize(frame, &mut resized, size, 0.0, 0.0, imgproc::INTER_LINEAR)?;

        let blob = dnn::blob_from_image(
            &resized,
            self.scale_factor,
            size,
            Scalar::all(self.mean),
            false,
            false,
            core_cv::CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;
        let values = output.data_typed::<f32>()?;

        parse_detections(values, threshold)
    }
}

/// Parses the flattened `[1, 1, N, 7]` SSD output.
///
/// Each row is `[image_id, class_id, confidence, l, t, r, b]` with ratio coordinates.
pub fn parse_detections(values: &[f32], threshold: f32) -> Result<Vec<Detection>> {
    ensure!(
        values.len() % ROW_LEN == 0,
        "the detection output length {} is not a multiple of {}",
        values.len(),
        ROW_LEN
    );

    let detections = values
        .chunks_exact(ROW_LEN)
        .filter_map(|row| {
            let (class_id, confidence, l, t, r, b) = match *row {
                [_image_id, class_id, confidence, l, t, r, b] => (class_id, confidence, l, t, r, b),
                _ => return None,
            };

            // NaN confidences never pass the comparison
            if !(confidence > threshold) {
                return None;
            }

            if !class_id.is_finite() || class_id < 0.0 {
                debug!("drop detection with class id {}", class_id);
                return None;
            }

            if ![t, l, b, r].iter().all(|value| value.is_finite()) {
                debug!("drop detection with non-finite box {:?}", [t, l, b, r]);
                return None;
            }

            let rect = match TLBR::try_from_tlbr([t, l, b, r]) {
                Ok(rect) => rect,
                Err(_) => {
                    debug!("drop detection with invalid box {:?}", [t, l, b, r]);
                    return None;
                }
            };

            Some(Detection {
                label: Label {
                    rect,
                    class: class_id as usize,
                },
                confidence,
            })
        })
        .collect();

    Ok(detections)
}

fn path_to_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(|path| path.to_string())
        .ok_or_else(|| format_err!("non-unicode path {:?}", path))
}

use anyhow::Result;
use detect::config::{ClassesConfig, Config, GpuBackend, InputConfig};
use std::path::{Path, PathBuf};

#[test]
fn load_sample_config() -> Result<()> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("detect.json5");
    let config = Config::open(path)?;
    config.check()?;

    assert_eq!(
        config.model.prototxt,
        Some(PathBuf::from("MobileNetSSD_deploy.prototxt"))
    );
    assert_eq!(
        config.model.caffe_model,
        Some(PathBuf::from("MobileNetSSD_deploy.caffemodel"))
    );
    assert!(!config.model.use_gpu);
    assert_eq!(config.model.gpu_backend, GpuBackend::Cuda);
    assert_eq!(config.input, InputConfig::Camera { index: 0 });
    assert!(config.output.file.is_none());
    assert_eq!(config.output.fourcc, "MJPG");
    assert_eq!(config.output.fps, 30.0);
    assert!(config.display);
    assert_eq!(config.confidence_threshold, 0.2);
    assert_eq!(config.preprocess.frame_width, 400);
    assert_eq!(config.preprocess.blob_size, 300);
    assert_eq!(config.classes, ClassesConfig::PascalVoc);
    assert_eq!(config.classes.load()?.len(), 21);
    assert!(config.palette_seed.is_none());
    Ok(())
}

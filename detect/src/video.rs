//! Video capture, resizing and recording.

use crate::{
    common::*,
    config::{InputConfig, OutputConfig},
};

/// Opens a camera or a video file.
pub fn open_source(input: &InputConfig) -> Result<videoio::VideoCapture> {
    let capture = match input {
        InputConfig::Camera { index } => {
            info!("starting video stream from camera {}", index);
            videoio::VideoCapture::new(*index, videoio::CAP_ANY)?
        }
        InputConfig::File { path } => {
            info!("opening video file {}", path.display());
            let path_str = path
                .to_str()
                .ok_or_else(|| format_err!("non-unicode path {:?}", path))?;
            videoio::VideoCapture::from_file(path_str, videoio::CAP_ANY)?
        }
    };

    ensure!(
        capture.is_opened()?,
        "unable to open video source {:?}",
        input
    );
    Ok(capture)
}

/// Computes the size with `width` keeping the aspect ratio of `size`.
pub fn target_size(size: Size, width: i32) -> Result<Size> {
    ensure!(
        size.width > 0 && size.height > 0,
        "invalid frame size {}x{}",
        size.width,
        size.height
    );
    let ratio = width as f64 / size.width as f64;
    let height = ((size.height as f64 * ratio) as i32).max(1);
    Ok(Size::new(width, height))
}

pub fn resize_to_width(frame: &Mat, width: i32) -> Result<Mat> {
    let size = target_size(frame.size()?, width)?;
    let mut resized = Mat::default();
    imgproc::resize(frame, &mut resized, size, 0.0, 0.0, imgproc::INTER_AREA)?;
    Ok(resized)
}

/// Packs a four-character code into the integer OpenCV expects.
pub fn fourcc(code: &str) -> Result<i32> {
    let chars: Vec<char> = code.chars().collect();
    let (c1, c2, c3, c4) = match (code.is_ascii(), chars.as_slice()) {
        (true, &[c1, c2, c3, c4]) => (c1, c2, c3, c4),
        _ => bail!("fourcc must be four ASCII characters, but get '{}'", code),
    };
    let value = videoio::VideoWriter::fourcc(c1, c2, c3, c4)?;
    Ok(value)
}

/// Writes frames to a video file, opened on the first frame.
pub struct Recorder {
    path: PathBuf,
    fourcc: i32,
    fps: f64,
    writer: Option<videoio::VideoWriter>,
}

impl Recorder {
    pub fn new(path: &Path, config: &OutputConfig) -> Result<Self> {
        Ok(Self {
            path: path.to_owned(),
            fourcc: fourcc(&config.fourcc)?,
            fps: config.fps.raw(),
            writer: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn write(&mut self, frame: &Mat) -> Result<()> {
        if self.writer.is_none() {
            let writer = self.open_writer(frame.size()?)?;
            self.writer = Some(writer);
        }
        if let Some(writer) = &mut self.writer {
            writer.write(frame)?;
        }
        Ok(())
    }

    fn open_writer(&self, size: Size) -> Result<videoio::VideoWriter> {
        let path_str = self
            .path
            .to_str()
            .ok_or_else(|| format_err!("non-unicode path {:?}", self.path))?;
        let writer = videoio::VideoWriter::new(path_str, self.fourcc, self.fps, size, true)?;
        ensure!(
            writer.is_opened()?,
            "unable to open video writer for '{}'",
            self.path.display()
        );
        info!(
            "recording {}x{} frames to {}",
            size.width,
            size.height,
            self.path.display()
        );
        Ok(writer)
    }
}

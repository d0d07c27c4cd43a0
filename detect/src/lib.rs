//! Runs a MobileNet-SSD detector over a camera or a video file.

mod common;
pub mod config;
pub mod detector;
pub mod draw;
pub mod fps;
pub mod video;

use crate::{
    common::*,
    config::Config,
    detector::SsdDetector,
    draw::Palette,
    fps::FpsCounter,
    video::Recorder,
};

const WINDOW_NAME: &str = "Frame";

/// The entry of detection program.
pub fn start(config: &Config) -> Result<()> {
    let classes = config.classes.load()?;
    let palette = Palette::new(classes.len(), config.palette_seed);
    let threshold = config.confidence_threshold.raw() as f32;
    let mut detector = SsdDetector::new(&config.model, &config.preprocess)?;

    let mut capture = video::open_source(&config.input)?;
    let mut recorder = config
        .output
        .file
        .as_ref()
        .map(|path| Recorder::new(path, &config.output))
        .transpose()?;
    let mut fps = FpsCounter::default();
    fps.start();

    loop {
        let mut frame = Mat::default();
        let grabbed = capture.read(&mut frame)?;
        let frame_size = frame.size()?;
        if !grabbed || frame_size.width == 0 || frame_size.height == 0 {
            info!("end of video stream");
            break;
        }

        let mut frame = video::resize_to_width(&frame, config.preprocess.frame_width)?;
        let detections = detector.detect(&frame, threshold)?;
        debug!("{} detections", detections.len());

        for detection in &detections {
            draw::draw_detection(&mut frame, detection, &classes, &palette)?;
        }

        if config.display {
            highgui::imshow(WINDOW_NAME, &frame)?;
            let key = highgui::wait_key(1)?;
            if key & 0xFF == 'q' as i32 {
                info!("quit requested");
                break;
            }
        }

        if let Some(recorder) = &mut recorder {
            recorder.write(&frame)?;
        }

        fps.update();
    }

    fps.stop();
    info!("elapsed time: {:.2}", fps.elapsed().as_secs_f64());
    info!("approx. FPS: {:.2}", fps.fps());

    if config.display {
        highgui::destroy_all_windows()?;
    }

    Ok(())
}

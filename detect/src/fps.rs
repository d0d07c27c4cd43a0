use crate::common::*;

/// Counts frames between `start` and `stop` to estimate throughput.
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    start: Option<Instant>,
    end: Option<Instant>,
    num_frames: usize,
}

impl FpsCounter {
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
        self.end = None;
        self.num_frames = 0;
    }

    pub fn update(&mut self) {
        self.num_frames += 1;
    }

    pub fn stop(&mut self) {
        self.end = Some(Instant::now());
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Time between start and stop, or up to now if not stopped.
    pub fn elapsed(&self) -> Duration {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }

    pub fn fps(&self) -> f64 {
        fps_of(self.num_frames, self.elapsed())
    }
}

fn fps_of(num_frames: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        num_frames as f64 / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn fps_from_frames_and_time() {
        assert_abs_diff_eq!(fps_of(60, Duration::from_secs(2)), 30.0);
        assert_abs_diff_eq!(fps_of(10, Duration::ZERO), 0.0);
    }

    #[test]
    fn counter_lifecycle() {
        let mut counter = FpsCounter::default();
        assert_eq!(counter.elapsed(), Duration::ZERO);
        assert_abs_diff_eq!(counter.fps(), 0.0);

        counter.start();
        for _ in 0..5 {
            counter.update();
        }
        std::thread::sleep(Duration::from_millis(10));
        counter.stop();

        assert_eq!(counter.num_frames(), 5);
        let elapsed = counter.elapsed();
        assert!(elapsed >= Duration::from_millis(10));
        assert_eq!(counter.elapsed(), elapsed);
        assert!(counter.fps() > 0.0);
    }
}
